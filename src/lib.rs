//! # linkyd - EDF electricity consumption poller
//!
//! Periodically fetches electricity usage and cost readings plus grid outage
//! status from the EDF customer API, keeps a rolling in-memory store of them
//! and derives daily, weekly, monthly and year-over-year figures for display
//! cards.
//!
//! ## Architecture
//!
//! - `api`: EDF API trait, response types and the HTTP client
//! - `calendar`: month arithmetic and half-hour buckets on naive local time
//! - `store`: half-hourly, daily and monthly reading containers
//! - `scheduler`: once-a-day refresh planning and atomic store publication
//! - `engine`: rolling sums and evolutions over the store
//! - `outage`: grid status polling with staleness tracking
//! - `presentation`: entity states and their attribute vocabulary
//! - `service`: poll loops and shared state
//! - `web`: HTTP API
//! - `config`, `logging`, `error`: ambient plumbing

pub mod api;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod outage;
pub mod presentation;
pub mod scheduler;
pub mod service;
pub mod store;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{LinkydError, Result};
pub use service::Service;

use crate::api::EdfApi;
use crate::api::types::{ApiErrorBody, ApiResponse, DailyData, GridInfo, MonthlyData};
use crate::calendar::YearMonth;
use crate::config::ApiConfig;
use crate::error::{LinkydError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// EDF API client over HTTPS
pub struct HttpEdfApi {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    pdl_id: String,
    business_partner: String,
    insee_code: String,
    logger: StructuredLogger,
}

impl HttpEdfApi {
    /// Create a new client from the `api` configuration section
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()?;
        let logger = get_logger_with_context(
            LogContext::new("edf_api")
                .with_pdl(&cfg.pdl_id)
                .with_field("insee", cfg.insee_code.clone()),
        );
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            access_token: cfg.access_token.trim().to_string(),
            pdl_id: cfg.pdl_id.clone(),
            business_partner: cfg.business_partner.clone(),
            insee_code: cfg.insee_code.clone(),
            logger,
        })
    }

    fn contract_url(&self, resource: &str) -> String {
        format!(
            "{}/customers/{}/pdls/{}/{}",
            self.base_url, self.business_partner, self.pdl_id, resource
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        if self.access_token.is_empty() {
            return Err(LinkydError::config("No EDF access token configured"));
        }

        self.logger.debug(&format!("GET {}", url));
        let resp = self
            .http
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("linkyd/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            // Error statuses usually still carry an errorCode payload
            if let Ok(err) = serde_json::from_slice::<ApiErrorBody>(&body) {
                return Err(err.into_error());
            }
            self.logger
                .error(&format!("EDF API error: {} for {}", status, url));
            return Err(LinkydError::transport(format!("HTTP {}", status)));
        }

        serde_json::from_slice::<ApiResponse<T>>(&body)
            .map_err(|e| LinkydError::transport(format!("Unexpected response: {}", e)))?
            .into_result()
    }
}

#[async_trait::async_trait]
impl EdfApi for HttpEdfApi {
    async fn get_elec_daily_data(&self, start: NaiveDate, end: NaiveDate) -> Result<DailyData> {
        let url = self.contract_url("elec-daily-consumptions");
        self.get_json(
            &url,
            &[
                ("startDate", start.format("%Y-%m-%d").to_string()),
                ("endDate", end.format("%Y-%m-%d").to_string()),
            ],
        )
        .await
    }

    async fn get_elec_monthly_data(
        &self,
        start: YearMonth,
        end: YearMonth,
    ) -> Result<MonthlyData> {
        let url = self.contract_url("elec-monthly-consumptions");
        self.get_json(
            &url,
            &[("startMonth", start.to_string()), ("endMonth", end.to_string())],
        )
        .await
    }

    async fn get_grid_info(&self) -> Result<GridInfo> {
        let url = format!("{}/grid/outages", self.base_url);
        self.get_json(&url, &[("inseeCode", self.insee_code.clone())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let api = HttpEdfApi::new(&ApiConfig::default()).unwrap();
        let err = api.get_grid_info().await.unwrap_err();
        assert!(matches!(err, LinkydError::Config { .. }));
    }

    #[test]
    fn contract_urls_embed_identifiers() {
        let cfg = ApiConfig {
            base_url: "https://example.test/api/".to_string(),
            business_partner: "BP1".to_string(),
            pdl_id: "PDL1".to_string(),
            ..ApiConfig::default()
        };
        let api = HttpEdfApi::new(&cfg).unwrap();
        assert_eq!(
            api.contract_url("elec-daily-consumptions"),
            "https://example.test/api/customers/BP1/pdls/PDL1/elec-daily-consumptions"
        );
    }
}

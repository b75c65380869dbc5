use anyhow::Result;
use linkyd::api::HttpEdfApi;
use linkyd::logging::{get_logger, init_logging};
use linkyd::{Config, Service};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging)?;
    let logger = get_logger("main");
    logger.info(&format!("linkyd {} starting up", env!("APP_VERSION")));

    let api = Arc::new(HttpEdfApi::new(&config.api)?);
    let service = Arc::new(
        Service::new(config, api).map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?,
    );

    #[cfg(feature = "web")]
    let web_task = {
        let web = &service.config().web;
        if web.enabled {
            let (host, port) = (web.host.clone(), web.port);
            let svc = service.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = linkyd::web::serve(svc, &host, port).await {
                    get_logger("web").error(&format!("Web server error: {}", e));
                }
            }))
        } else {
            None
        }
    };

    let poller = {
        let svc = service.clone();
        tokio::spawn(async move { svc.run().await })
    };

    tokio::signal::ctrl_c().await?;
    logger.info("Shutdown signal received");
    service.request_shutdown();

    if let Err(e) = poller.await {
        logger.error(&format!("Poll loop task failed: {}", e));
    }
    #[cfg(feature = "web")]
    if let Some(task) = web_task {
        let _ = task.await;
    }
    logger.info("linkyd shutdown complete");
    Ok(())
}

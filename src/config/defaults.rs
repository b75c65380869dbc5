use super::*;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.edf.fr/api/v2".to_string(),
            access_token: String::new(),
            pdl_id: String::new(),
            business_partner: String::new(),
            insee_code: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            day_offset: 1,
            extended_aggregates_enabled: true,
            refresh_hour: 11,
            lookback_days: 14,
            round_weeks_to_month: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            data_interval_minutes: 30,
            outage_interval_minutes: 10,
        }
    }
}

impl Default for OutageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_minutes: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/linkyd.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            data: DataConfig::default(),
            polling: PollingConfig::default(),
            outage: OutageConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            timezone: "Europe/Paris".to_string(),
        }
    }
}

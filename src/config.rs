#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub log_level: String,
    pub worker_id: String,
    pub poll_interval_ms: u64,
    pub lease_ms: i64,
    pub delivery_max_attempts: u32,
    pub job_max_attempts: u32,
    pub circuit_failure_threshold: i64,
    pub circuit_recovery_timeout_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("DATABASE_URL")
            && !value.trim().is_empty()
        {
            config.database_url = value;
        }
        if let Ok(value) = std::env::var("TELEMETRY_BIND_ADDR")
            && !value.trim().is_empty()
        {
            config.bind_addr = value;
        }
        if let Ok(value) = std::env::var("LOG_LEVEL")
            && !value.trim().is_empty()
        {
            config.log_level = value;
        }
        if let Ok(value) = std::env::var("TELEMETRY_WORKER_ID")
            && !value.trim().is_empty()
        {
            config.worker_id = value;
        }
        if let Ok(value) = std::env::var("TELEMETRY_POLL_INTERVAL_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.poll_interval_ms = parsed.max(10);
        }
        if let Ok(value) = std::env::var("TELEMETRY_LEASE_MS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.lease_ms = parsed.max(1000);
        }
        if let Ok(value) = std::env::var("TELEMETRY_DELIVERY_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.delivery_max_attempts = parsed.max(1);
        }
        if let Ok(value) = std::env::var("TELEMETRY_JOB_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.job_max_attempts = parsed.max(1);
        }
        if let Ok(value) = std::env::var("TELEMETRY_CIRCUIT_FAILURE_THRESHOLD")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.circuit_failure_threshold = parsed.max(1);
        }
        if let Ok(value) = std::env::var("TELEMETRY_CIRCUIT_RECOVERY_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.circuit_recovery_timeout_secs = parsed.max(1);
        }

        config
    }

    pub fn is_production(&self) -> bool {
        let url = self.database_url.to_lowercase();
        url.contains("prod") || url.contains("production")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:telemetry.db".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            log_level: "info".to_string(),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            poll_interval_ms: 500,
            lease_ms: 30_000,
            delivery_max_attempts: 8,
            job_max_attempts: 5,
            circuit_failure_threshold: 5,
            circuit_recovery_timeout_secs: 60,
        }
    }
}

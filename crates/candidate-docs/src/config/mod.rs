use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            base_url: env::var("PIPELINE_BASE_URL").unwrap_or(defaults.base_url),
            read_timeout: secs_var("PIPELINE_READ_TIMEOUT_SECS", defaults.read_timeout)?,
            write_timeout: secs_var("PIPELINE_WRITE_TIMEOUT_SECS", defaults.write_timeout)?,
            upload_timeout: secs_var("PIPELINE_UPLOAD_TIMEOUT_SECS", defaults.upload_timeout)?,
            extraction_timeout: secs_var(
                "PIPELINE_EXTRACTION_TIMEOUT_SECS",
                defaults.extraction_timeout,
            )?,
        };

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            min_interval: interval_var("SYNC_MIN_INTERVAL_MS", defaults.min_interval)?,
            max_interval: millis_var("SYNC_MAX_INTERVAL_MS", defaults.max_interval)?,
            max_attempts: count_var("SYNC_MAX_ATTEMPTS", defaults.max_attempts)?,
            max_wait: secs_var("SYNC_MAX_WAIT_SECS", defaults.max_wait)?,
            category_attempts: count_var("CATEGORY_POLL_ATTEMPTS", defaults.category_attempts)?,
            category_interval: interval_var(
                "CATEGORY_POLL_INTERVAL_MS",
                defaults.category_interval,
            )?,
        };

        if sync.min_interval > sync.max_interval {
            return Err(ConfigError::IntervalRange {
                min: sync.min_interval,
                max: sync.max_interval,
            });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline,
            sync,
        })
    }
}

fn parse_var(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(None),
    }
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(parse_var(name)?.map(Duration::from_secs).unwrap_or(default))
}

fn millis_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(parse_var(name)?.map(Duration::from_millis).unwrap_or(default))
}

/// Poll intervals must be positive; a zero interval never grows under backoff.
fn interval_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let interval = millis_var(name, default)?;
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval { name });
    }
    Ok(interval)
}

fn count_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match parse_var(name)? {
        Some(value) => u32::try_from(value).map_err(|_| ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Location of the verification pipeline and the per-call safety timeouts applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub base_url: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub upload_timeout: Duration,
    pub extraction_timeout: Duration,
}

const UPLOAD_TIMEOUT_PER_MIB: Duration = Duration::from_secs(10);

impl PipelineConfig {
    /// Upload deadline grows with the payload: the base timeout plus ten seconds per started MiB.
    pub fn upload_timeout_for(&self, size_bytes: u64) -> Duration {
        let mebibytes = size_bytes.div_ceil(1024 * 1024);
        let extra = u32::try_from(mebibytes).unwrap_or(u32::MAX);
        self.upload_timeout
            .saturating_add(UPLOAD_TIMEOUT_PER_MIB.saturating_mul(extra))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3001/api".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(120),
            extraction_timeout: Duration::from_secs(30),
        }
    }
}

/// Polling cadence for the status and category synchronizers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub max_wait: Duration,
    pub category_attempts: u32,
    pub category_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(2_000),
            max_interval: Duration::from_millis(10_000),
            max_attempts: 30,
            max_wait: Duration::from_secs(120),
            category_attempts: 15,
            category_interval: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    IntervalRange { min: Duration, max: Duration },
    ZeroInterval { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a non-negative integer (found '{value}')")
            }
            ConfigError::IntervalRange { min, max } => write!(
                f,
                "SYNC_MIN_INTERVAL_MS ({}ms) must not exceed SYNC_MAX_INTERVAL_MS ({}ms)",
                min.as_millis(),
                max.as_millis()
            ),
            ConfigError::ZeroInterval { name } => write!(f, "{name} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::IntervalRange { .. }
            | ConfigError::ZeroInterval { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "PIPELINE_BASE_URL",
            "PIPELINE_READ_TIMEOUT_SECS",
            "SYNC_MIN_INTERVAL_MS",
            "SYNC_MAX_INTERVAL_MS",
            "SYNC_MAX_ATTEMPTS",
            "CATEGORY_POLL_ATTEMPTS",
            "CATEGORY_POLL_INTERVAL_MS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_poll_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SYNC_MAX_ATTEMPTS", "lots");
        let err = AppConfig::load().expect_err("invalid attempts rejected");
        assert!(err.to_string().contains("SYNC_MAX_ATTEMPTS"));
        reset_env();
    }

    #[test]
    fn rejects_inverted_interval_range() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SYNC_MIN_INTERVAL_MS", "5000");
        env::set_var("SYNC_MAX_INTERVAL_MS", "1000");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::IntervalRange { .. })
        ));
        reset_env();
    }

    #[test]
    fn rejects_zero_poll_intervals() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        for name in ["SYNC_MIN_INTERVAL_MS", "CATEGORY_POLL_INTERVAL_MS"] {
            reset_env();
            env::set_var(name, "0");
            match AppConfig::load() {
                Err(ConfigError::ZeroInterval { name: rejected }) => assert_eq!(rejected, name),
                other => panic!("expected {name}=0 to be rejected, got {other:?}"),
            }
        }
        reset_env();
    }

    #[test]
    fn upload_timeout_scales_with_started_mebibytes() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.upload_timeout_for(0), Duration::from_secs(120));
        assert_eq!(pipeline.upload_timeout_for(1), Duration::from_secs(130));
        assert_eq!(
            pipeline.upload_timeout_for(3 * 1024 * 1024),
            Duration::from_secs(150)
        );
    }
}

use anyhow::Context;
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LOG_FILTER: &str = "gestor_oversight=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = match std::env::var("OVERSIGHT_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("OVERSIGHT_MAX_CONNECTIONS is not a number: {value}"))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// `OVERSIGHT_LOG` wins over `RUST_LOG`; logs go to stderr so command output
/// stays pipeable.
pub fn init_logging() {
    let filter = std::env::var("OVERSIGHT_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

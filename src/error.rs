use thiserror::Error;

/// Problems with the environment-provided configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
    #[error("no WS90 stations configured. Please set WS90_STATIONS or WS90_STATION_<N>_MAC/WS90_STATION_<N>_NAME environment variables")]
    NoStations,
    #[error("invalid {name} value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Failures talking to PostgreSQL
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid database URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("sslrootcert parameter missing")]
    MissingRootCert,
    #[error("SSL setup failed: {0}")]
    Tls(#[from] openssl::error::ErrorStack),
    #[error("giving up after {0} attempts")]
    RetriesExhausted(usize),
    #[error("stored rain history is not valid JSON: {0}")]
    InvalidHistory(#[from] serde_json::Error),
}

use log::{error, warn};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::DatabaseError;

/// How hard to try before giving up on one operation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub wait: Duration,
}

/// Database URL split into the libpq-compatible part and the CA file
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    url: String,
    sslrootcert: String,
}

impl DatabaseTarget {
    /// Extract `sslrootcert` from the query string, which tokio-postgres
    /// does not understand, and keep every other parameter
    pub fn parse(database_url: &str) -> Result<Self, DatabaseError> {
        let url = Url::parse(database_url)?;

        let mut sslrootcert = None;
        let mut clean_params = Vec::new();
        for (key, value) in url.query_pairs() {
            if key == "sslrootcert" {
                sslrootcert = Some(value.into_owned());
            } else {
                clean_params.push((key.into_owned(), value.into_owned()));
            }
        }
        let sslrootcert = sslrootcert.ok_or(DatabaseError::MissingRootCert)?;

        let mut clean_url = url.clone();
        clean_url.set_query(None);
        if !clean_params.is_empty() {
            let query = clean_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            clean_url.set_query(Some(&query));
        }

        Ok(DatabaseTarget {
            url: clean_url.to_string(),
            sslrootcert,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, DatabaseError> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_ca_file(sslrootcert_path)?;
    builder.set_verify(SslVerifyMode::NONE); // TEMPORARY FOR SELF-SIGNED CERTS

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Connect and run `operation`, reconnecting on any failure
///
/// Each attempt opens a fresh connection; the operation's output is
/// returned from the first attempt that succeeds.
pub async fn with_retry<T, F, Fut>(
    target: &DatabaseTarget,
    policy: RetryPolicy,
    operation: F,
) -> Result<T, DatabaseError>
where
    F: Fn(tokio_postgres::Client) -> Fut,
    Fut: Future<Output = Result<T, tokio_postgres::Error>>,
{
    for attempt in 1..=policy.max_attempts {
        let connector = match create_ssl_connector(&target.sslrootcert) {
            Ok(c) => c,
            Err(e) => {
                error!("SSL connector error: {}", e);
                return Err(e);
            }
        };

        match tokio_postgres::connect(target.url(), connector).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Connection error: {}", e);
                    }
                });

                match operation(client).await {
                    Ok(output) => return Ok(output),
                    Err(e) => warn!("Attempt {}: query error: {}", attempt, e),
                }
            }
            Err(e) => warn!("Attempt {}: connection error: {}", attempt, e),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.wait).await;
        }
    }

    Err(DatabaseError::RetriesExhausted(policy.max_attempts))
}

use std::time::Duration;

use crate::error::Error;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub secret: String,
    pub host: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout; `None` leaves long transfers unbounded.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        secret: impl Into<String>,
        host: impl Into<String>,
    ) -> Result<Self, Error> {
        let config = Self {
            client_id: client_id.into(),
            secret: secret.into(),
            host: host.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::new(
            std::env::var("CLOUDFS_CLIENT_ID").unwrap_or_default(),
            std::env::var("CLOUDFS_SECRET").unwrap_or_default(),
            std::env::var("CLOUDFS_HOST").unwrap_or_default(),
        )?;
        config.connect_timeout = Duration::from_secs(read_u64_env(
            "CLOUDFS_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        ));
        config.request_timeout = match read_u64_env("CLOUDFS_REQUEST_TIMEOUT_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Base url of the service; bare host names are served over https.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.client_id.trim().is_empty()
            || self.secret.trim().is_empty()
            || self.host.trim().is_empty()
        {
            return Err(Error::argument("client id, secret and host are required"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("host", &self.host)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {waited:?} waiting for 127.0.0.1:{port}")]
    TimedOut { port: u16, waited: Duration },
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub port: u16,
    pub timeout: Duration,
    pub interval: Duration,
    pub attempt_timeout: Duration,
}

impl ProbeConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_PROBE_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Polls a local HTTP endpoint until it answers anything at all. Any status
/// counts; only connection failures and timeouts keep it waiting.
pub async fn wait_for_port_ready(config: ProbeConfig) -> Result<(), ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(config.attempt_timeout)
        .no_proxy()
        .build()?;
    let url = format!("http://127.0.0.1:{}/", config.port);
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        if answers(&client, &url, config.port).await {
            info!(event = "port_ready", port = config.port, attempts);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ProbeError::TimedOut {
                port: config.port,
                waited: started.elapsed(),
            });
        }
        sleep(config.interval).await;
    }
}

async fn answers(client: &reqwest::Client, url: &str, port: u16) -> bool {
    match client.get(url).send().await {
        Ok(response) => {
            debug!(event = "port_answered", port, status = response.status().as_u16());
            true
        }
        Err(err) => {
            debug!(event = "port_attempt_failed", port, error = %err);
            false
        }
    }
}

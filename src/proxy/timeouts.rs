//! The four timeout tiers of §4.5, layered around a single upstream attempt.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::config::client_config::ClientConfig;
use crate::error::PipelineError;

/// Tracks the per-request global deadline across retries (§4.5
/// `globalTimeout`: "per-request upper bound across retries").
pub struct GlobalDeadline {
    deadline: Instant,
}

impl GlobalDeadline {
    pub fn start(config: &ClientConfig) -> Self {
        Self { deadline: Instant::now() + config.global_timeout }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Race `fut` (obtaining the upstream status line) against `callTimeout`,
/// further bounded by whatever remains of the global deadline.
pub async fn with_call_timeout<F, T, E>(config: &ClientConfig, global: &GlobalDeadline, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
{
    let bound = config.call_timeout.min(global.remaining());
    match timeout(bound, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(PipelineError::UpstreamConnect),
        Err(_) => Err(PipelineError::UpstreamTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_timeout_shorter_than_future_yields_timeout_error() {
        let config = ClientConfig { call_timeout: Duration::from_millis(20), ..ClientConfig::default() };
        let global = GlobalDeadline::start(&config);
        let fut = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<(), ()>(())
        };
        let result = with_call_timeout(&config, &global, fut).await;
        assert_eq!(result.unwrap_err(), PipelineError::UpstreamTimeout);
    }

    #[tokio::test]
    async fn call_completing_before_timeout_succeeds() {
        let config = ClientConfig::default();
        let global = GlobalDeadline::start(&config);
        let fut = async { Ok::<u32, ()>(42) };
        assert_eq!(with_call_timeout(&config, &global, fut).await.unwrap(), 42);
    }

    #[test]
    fn global_deadline_reports_expired_once_elapsed() {
        let config = ClientConfig { global_timeout: Duration::from_millis(1), ..ClientConfig::default() };
        let global = GlobalDeadline::start(&config);
        std::thread::sleep(Duration::from_millis(5));
        assert!(global.expired());
    }
}

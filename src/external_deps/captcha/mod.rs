//! Captcha oracle integrations.
//!
//! These adapters provide a unified interface for third-party image-solving
//! oracles. The recovery flow can remain agnostic of vendor-specific details:
//! it submits a challenge image, polls for the resolved answer, and reports
//! rejected guesses back so the oracle can adapt.

mod twocaptcha;

pub use twocaptcha::TwoCaptchaOracle;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

/// High-level configuration that controls the answer wait loop.
///
/// The wait policy is owned by the caller, not the oracle: the oracle's
/// `poll` never blocks. No bound existed in the observed provider behaviour,
/// so the timeout here is an implementation choice and deliberately
/// configurable.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub poll_interval: Duration,
    pub solve_timeout: Duration,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            solve_timeout: Duration::from_secs(120),
        }
    }
}

/// Opaque reference to one outstanding solving request held by the oracle.
///
/// Owned solely by the workflow invocation that created it; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeHandle(String);

impl ChallengeHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChallengeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-blocking poll outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaPoll {
    Ready(String),
    Pending,
}

/// Common result type returned by captcha oracles.
pub type CaptchaResult<T> = Result<T, CaptchaError>;

/// Shared interface implemented by captcha vendors.
#[async_trait]
pub trait CaptchaOracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit the challenge image; does not block for the answer.
    async fn solve(&self, image: &Url) -> CaptchaResult<ChallengeHandle>;

    /// Non-blocking poll for the resolved answer.
    async fn poll(&self, handle: &ChallengeHandle) -> CaptchaResult<CaptchaPoll>;

    /// Report a previously returned answer as wrong so the oracle can adapt.
    async fn report_incorrect(&self, handle: &ChallengeHandle) -> CaptchaResult<()>;
}

/// Errors surfaced by captcha oracles.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha oracle misconfigured: {0}")]
    Configuration(String),
    #[error("captcha oracle request failed: {0}")]
    Provider(String),
    #[error("captcha solving timed out after {0:?}")]
    Timeout(Duration),
    #[error("captcha error: {0}")]
    Other(String),
}

/// Poll the oracle at a fixed interval until a non-pending answer arrives.
///
/// Bounded by `solve_timeout`; cancellation is the async-native kind: drop
/// the returned future.
pub async fn await_answer(
    oracle: &dyn CaptchaOracle,
    handle: &ChallengeHandle,
    config: &CaptchaConfig,
) -> CaptchaResult<String> {
    let wait = async {
        loop {
            match oracle.poll(handle).await? {
                CaptchaPoll::Ready(answer) => return Ok(answer),
                CaptchaPoll::Pending => sleep(config.poll_interval).await,
            }
        }
    };

    tokio::time::timeout(config.solve_timeout, wait)
        .await
        .map_err(|_| CaptchaError::Timeout(config.solve_timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowOracle {
        polls_until_ready: usize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl CaptchaOracle for SlowOracle {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn solve(&self, _image: &Url) -> CaptchaResult<ChallengeHandle> {
            Ok(ChallengeHandle::new("handle-1"))
        }

        async fn poll(&self, _handle: &ChallengeHandle) -> CaptchaResult<CaptchaPoll> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.polls_until_ready {
                Ok(CaptchaPoll::Ready("XY99".to_string()))
            } else {
                Ok(CaptchaPoll::Pending)
            }
        }

        async fn report_incorrect(&self, _handle: &ChallengeHandle) -> CaptchaResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn await_answer_polls_until_ready() {
        let oracle = SlowOracle {
            polls_until_ready: 3,
            polls: AtomicUsize::new(0),
        };
        let config = CaptchaConfig {
            poll_interval: Duration::from_millis(1),
            solve_timeout: Duration::from_secs(5),
        };
        let handle = ChallengeHandle::new("handle-1");

        let answer = await_answer(&oracle, &handle, &config).await.unwrap();
        assert_eq!(answer, "XY99");
        assert_eq!(oracle.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn await_answer_times_out() {
        let oracle = SlowOracle {
            polls_until_ready: usize::MAX,
            polls: AtomicUsize::new(0),
        };
        let config = CaptchaConfig {
            poll_interval: Duration::from_millis(1),
            solve_timeout: Duration::from_millis(10),
        };
        let handle = ChallengeHandle::new("handle-1");

        let err = await_answer(&oracle, &handle, &config).await.unwrap_err();
        assert!(matches!(err, CaptchaError::Timeout(_)));
    }
}

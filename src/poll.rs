use std::time::Duration;

use log::{debug, info, warn};

use pbvolume_api::{
    constants::{
        DEVICE_RESOLVE_INTERVAL_SECS, DEVICE_RESOLVE_MAX_ATTEMPTS, POLL_INTERVAL_SECS,
        POLL_MAX_ATTEMPTS,
    },
    error::{DriverError, ErrorKind},
};

use crate::cloud::{CloudApi, RequestHandle, RequestStatus};

/// Suspends the calling thread. Abstracted so retry loops can be exercised
/// without real delays.
pub trait Sleep: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-delay, bounded retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Waiting on an asynchronous remote request.
    pub const fn remote_request() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_attempts: POLL_MAX_ATTEMPTS,
        }
    }

    /// Waiting for a freshly attached device to show up.
    pub const fn device_resolution() -> Self {
        Self {
            interval: Duration::from_secs(DEVICE_RESOLVE_INTERVAL_SECS),
            max_attempts: DEVICE_RESOLVE_MAX_ATTEMPTS,
        }
    }
}

/// Blocks until an asynchronous remote request reaches a terminal state.
pub struct PollWaiter<'a> {
    api: &'a dyn CloudApi,
    sleeper: &'a dyn Sleep,
    policy: RetryPolicy,
}

impl<'a> PollWaiter<'a> {
    pub fn new(api: &'a dyn CloudApi, sleeper: &'a dyn Sleep, policy: RetryPolicy) -> Self {
        Self {
            api,
            sleeper,
            policy,
        }
    }

    /// Queries the request until it is done (`Ok`), failed (provision error
    /// with the remote message), or the attempt budget runs out (timeout).
    /// A query that cannot reach the provider uses up one attempt.
    /// The caller is suspended between queries; there is no early abort.
    pub fn wait(&self, handle: &RequestHandle) -> Result<(), DriverError> {
        for attempt in 1..=self.policy.max_attempts {
            match self.api.request_status(handle) {
                Ok(RequestStatus::Done) => {
                    info!("Remote request '{handle}' is done after {attempt} status queries");
                    return Ok(());
                }
                Ok(RequestStatus::Failed { message }) => {
                    return Err(DriverError::provision(message));
                }
                Ok(RequestStatus::Pending(state)) => {
                    debug!(
                        "Remote request '{handle}' is {state} (attempt {attempt}/{})",
                        self.policy.max_attempts
                    );
                }
                // An unreachable status endpoint counts as a pending attempt.
                Err(e) => {
                    warn!("Failed to query status of remote request '{handle}': {e:#}");
                }
            }

            if attempt < self.policy.max_attempts {
                self.sleeper.sleep(self.policy.interval);
            }
        }

        Err(DriverError::new(ErrorKind::Timeout {
            attempts: self.policy.max_attempts,
        }))
    }
}

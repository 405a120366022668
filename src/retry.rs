//! Fixed-delay retry wrapper for network-dependent operations.
//!
//! No exponential backoff: attempts are spaced by a constant delay,
//! which matches how a device on a flaky local network recovers. Each
//! attempt is gated on a cheap reachability probe so the operation's
//! own failures are distinguishable from plain network absence in the
//! logs, even though both consume attempts from the same budget.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Well-known public endpoint used as the default reachability target.
pub const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";

/// Default timeout for a single reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Terminal retry failure: every attempt was used up.
#[derive(Debug, Error)]
#[error("{msg} failed after {attempts} attempts: {last_error}")]
pub struct RetryError {
    /// Caller-configured description of the operation.
    pub msg: String,
    /// Total attempts consumed.
    pub attempts: u32,
    /// Display form of the last failure (operation error, or "no
    /// network connectivity" when the final attempt never ran).
    pub last_error: String,
}

/// Retry configuration shared by callers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Reachability probe target.
    pub probe_addr: String,
    /// Timeout for a single reachability probe.
    pub probe_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(5),
            probe_addr: DEFAULT_PROBE_ADDR.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Probes generic reachability of `addr` up to `retries` times with a
/// fixed `delay` between attempts. Returns true on the first probe
/// that connects.
pub fn check_connectivity(
    addr: &str,
    timeout: Duration,
    retries: u32,
    delay: Duration,
) -> bool {
    for attempt in 1..=retries {
        if probe_once(addr, timeout) {
            return true;
        }
        tracing::debug!(addr, attempt, retries, "reachability probe failed");
        if attempt < retries {
            thread::sleep(delay);
        }
    }
    false
}

/// Runs `operation` under the retry policy.
///
/// Before each attempt the policy's probe target is checked once; an
/// unreachable network consumes the attempt (logged as connectivity
/// loss, not operation failure) and waits out the delay. Once
/// reachable, the operation runs; its first success returns
/// immediately, and its failures are logged and retried until the
/// budget is exhausted.
pub fn with_retry<T, E: fmt::Display>(
    policy: &RetryPolicy,
    error_msg: &str,
    mut operation: impl FnMut() -> Result<T, E>,
) -> Result<T, RetryError> {
    assert!(policy.retries > 0, "retry budget must be at least 1");

    let mut last_error = String::from("no network connectivity");

    for attempt in 1..=policy.retries {
        if !check_connectivity(&policy.probe_addr, policy.probe_timeout, 1, Duration::ZERO) {
            tracing::warn!(
                attempt,
                retries = policy.retries,
                "network unreachable, waiting before next attempt"
            );
            last_error = String::from("no network connectivity");
            if attempt < policy.retries {
                thread::sleep(policy.delay);
            }
            continue;
        }

        match operation() {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "{error_msg} succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(attempt, retries = policy.retries, error = %e, "{error_msg} failed");
                last_error = e.to_string();
                if attempt < policy.retries {
                    thread::sleep(policy.delay);
                }
            }
        }
    }

    Err(RetryError {
        msg: error_msg.to_string(),
        attempts: policy.retries,
        last_error,
    })
}

fn probe_once(addr: &str, timeout: Duration) -> bool {
    let Ok(mut addrs) = addr.to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

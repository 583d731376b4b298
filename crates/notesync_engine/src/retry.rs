//! Bounded retry that gives up quietly.

use crate::config::RetryConfig;
use std::fmt::Display;
use tracing::warn;

/// Runs `op` up to `config.max_attempts` times, sleeping `config.delay`
/// between attempts.
///
/// Returns `None` if every attempt failed. Exhaustion is logged and is never
/// an error for the caller.
pub fn retry_and_continue<R, E, F>(what: &str, config: &RetryConfig, mut op: F) -> Option<R>
where
    E: Display,
    F: FnMut() -> Result<R, E>,
{
    for attempt in 0..config.max_attempts {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match op() {
            Ok(value) => return Some(value),
            Err(e) => warn!(what, attempt = attempt + 1, error = %e, "attempt failed"),
        }
    }

    warn!(what, attempts = config.max_attempts, "giving up");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn succeeds_after_failures() {
        let config = RetryConfig::new(3).with_delay(Duration::from_millis(1));
        let mut calls = 0;
        let result = retry_and_continue("test", &config, || {
            calls += 1;
            if calls < 3 {
                Err("not yet")
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Some(3));
    }

    #[test]
    fn gives_up_without_error() {
        let config = RetryConfig::new(2).with_delay(Duration::ZERO);
        let mut calls = 0;
        let result: Option<()> = retry_and_continue("test", &config, || {
            calls += 1;
            Err("never")
        });
        assert_eq!(result, None);
        assert_eq!(calls, 2);
    }
}

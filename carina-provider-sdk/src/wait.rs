//! Polling until a remote property reaches a terminal state
//!
//! Long-running operations may report completion before the resource has
//! finished applying its settings. Handlers use `StateChangeConf` to re-read
//! the resource until a state property settles.

use std::future::Future;
use std::time::Duration;

/// Upper bound of the exponential backoff between polls
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// First backoff step
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Reasons a wait ends without reaching the target
#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    #[error("{0}")]
    Refresh(E),

    #[error("resource not found after {checks} consecutive checks")]
    NotFound { checks: u32 },

    #[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("timeout while waiting for state to become '{}' (last state: '{}', timeout: {timeout:?})", .target.join(", "), .last_state.as_deref().unwrap_or(""))]
    Timeout {
        last_state: Option<String>,
        target: Vec<String>,
        timeout: Duration,
    },
}

/// Configuration of a state wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// States that mean "keep waiting"
    pub pending: Vec<String>,
    /// States that end the wait successfully
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Sleep before the first refresh
    pub delay: Duration,
    /// Lower bound between refreshes
    pub min_timeout: Duration,
    /// Fixed interval between refreshes; replaces the backoff when non-zero
    pub poll_interval: Duration,
    /// Consecutive "not found" refreshes tolerated
    pub not_found_checks: u32,
    /// Consecutive target hits required
    pub continuous_target_occurrence: u32,
}

impl StateChangeConf {
    pub fn new<P, T>(pending: P, target: T, timeout: Duration) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            not_found_checks: 20,
            continuous_target_occurrence: 1,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences.max(1);
        self
    }

    /// Refresh until the reported state is in `target`
    ///
    /// `refresh` returns `None` when the resource cannot be found, otherwise
    /// the refreshed value with its current state.
    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<T, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>, E>>,
    {
        let mut last_state = None;
        let outcome =
            tokio::time::timeout(self.timeout, self.poll(&mut refresh, &mut last_state)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout {
                last_state,
                target: self.target.clone(),
                timeout: self.timeout,
            }),
        }
    }

    async fn poll<T, E, F, Fut>(
        &self,
        refresh: &mut F,
        last_state: &mut Option<String>,
    ) -> Result<T, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>, E>>,
    {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut not_found = 0u32;
        let mut target_hits = 0u32;

        loop {
            match refresh().await.map_err(WaitError::Refresh)? {
                None => {
                    not_found += 1;
                    target_hits = 0;
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound { checks: not_found });
                    }
                }
                Some((value, state)) => {
                    not_found = 0;
                    *last_state = Some(state.clone());

                    if self.target.contains(&state) {
                        target_hits += 1;
                        if target_hits >= self.continuous_target_occurrence {
                            return Ok(value);
                        }
                    } else if self.pending.contains(&state) {
                        target_hits = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            state,
                            expected: self.target.clone(),
                        });
                    }
                }
            }

            let wait = if self.poll_interval.is_zero() {
                let wait = backoff.max(self.min_timeout);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                wait
            } else {
                self.poll_interval
            };
            log::trace!(
                "Waiting {:?} before next refresh (last state: {:?})",
                wait,
                last_state
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn conf() -> StateChangeConf {
        StateChangeConf::new(
            ["Pending", "Updating"],
            ["Succeeded"],
            Duration::from_secs(5),
        )
        .with_poll_interval(Duration::from_millis(1))
    }

    /// Refresh function replaying the given states, repeating the last one
    fn scripted(
        states: Vec<Option<&'static str>>,
    ) -> impl FnMut() -> std::future::Ready<Result<Option<(u32, String)>, Boom>> {
        let calls = Mutex::new(0usize);
        move || {
            let mut n = calls.lock().unwrap();
            let idx = (*n).min(states.len() - 1);
            *n += 1;
            let call = *n as u32;
            std::future::ready(Ok(states[idx].map(|s| (call, s.to_string()))))
        }
    }

    #[tokio::test]
    async fn pending_then_target_returns_value() {
        let result = conf()
            .wait_for_state(scripted(vec![
                Some("Pending"),
                Some("Updating"),
                Some("Succeeded"),
            ]))
            .await
            .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn unexpected_state_aborts() {
        let err = conf()
            .wait_for_state(scripted(vec![Some("Pending"), Some("Failed")]))
            .await
            .unwrap_err();
        match err {
            WaitError::UnexpectedState { state, expected } => {
                assert_eq!(state, "Failed");
                assert_eq!(expected, vec!["Succeeded".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_is_tolerated_up_to_the_limit() {
        let ok = conf()
            .with_not_found_checks(2)
            .wait_for_state(scripted(vec![None, None, Some("Succeeded")]))
            .await;
        assert!(ok.is_ok());

        let err = conf()
            .with_not_found_checks(2)
            .wait_for_state(scripted(vec![None]))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::NotFound { checks: 3 }));
    }

    #[tokio::test]
    async fn continuous_target_occurrence_requires_consecutive_hits() {
        let result = conf()
            .with_continuous_target_occurrence(2)
            .wait_for_state(scripted(vec![
                Some("Succeeded"),
                Some("Pending"),
                Some("Succeeded"),
                Some("Succeeded"),
            ]))
            .await
            .unwrap();
        assert_eq!(result, 4);
    }

    #[tokio::test]
    async fn refresh_error_is_propagated() {
        let err = conf()
            .wait_for_state(|| std::future::ready(Err::<Option<(u32, String)>, _>(Boom)))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Refresh(Boom)));
    }

    #[tokio::test]
    async fn timeout_reports_last_state() {
        let err = StateChangeConf::new(["Pending"], ["Succeeded"], Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(5))
            .wait_for_state(scripted(vec![Some("Pending")]))
            .await
            .unwrap_err();
        match err {
            WaitError::Timeout { last_state, .. } => {
                assert_eq!(last_state.as_deref(), Some("Pending"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

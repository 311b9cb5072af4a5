//! Wait-until-terminal loop for DPS jobs.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::job::JobStatus;
use crate::util::backoff;

/// How [`Job::wait_for_completion`](crate::Job::wait_for_completion) polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Delay between status requests.
    pub interval: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Consecutive transient failures tolerated before the error is returned.
    pub max_transient_retries: usize,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: None,
            max_transient_retries: 5,
        }
    }
}

impl WaitOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_transient_retries(mut self, retries: usize) -> Self {
        self.max_transient_retries = retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollState {
    Submitted,
    Polling(JobStatus),
    TerminalSuccess(JobStatus),
    TerminalFailure(JobStatus),
    TimedOut,
}

impl PollState {
    fn after(status: JobStatus) -> Self {
        if status.is_success() {
            Self::TerminalSuccess(status)
        } else if status.is_terminal() {
            Self::TerminalFailure(status)
        } else {
            Self::Polling(status)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollOutcome {
    pub(crate) status: JobStatus,
    /// Status requests made, including failed ones.
    pub(crate) polls: usize,
}

/// Calls `poll` until it reports a terminal status.
///
/// `poll` receives the time left before the deadline and must not block
/// longer than that. Never sleeps past the deadline. Non-transient errors
/// end the loop at once.
pub(crate) fn poll_until_terminal<F>(job_id: &str, options: &WaitOptions, mut poll: F) -> Result<PollOutcome>
where
    F: FnMut(Option<Duration>) -> Result<JobStatus>,
{
    let started = Instant::now();
    let deadline = options.timeout.map(|t| started + t);
    let remaining = || deadline.map(|d| d.saturating_duration_since(Instant::now()));
    let timed_out = |polls: usize| {
        debug!(job_id, state = ?PollState::TimedOut, polls, "giving up");
        Error::Timeout {
            job_id: job_id.to_string(),
            elapsed: started.elapsed(),
        }
    };

    let mut state = PollState::Submitted;
    let mut polls = 0usize;
    let mut failures = 0usize;
    let mut retry_sleep = options.interval.min(Duration::from_secs(1));

    loop {
        let left = remaining();
        if left.is_some_and(|r| r.is_zero()) {
            return Err(timed_out(polls));
        }

        polls += 1;
        let wanted = match poll(left) {
            Ok(status) => {
                failures = 0;
                retry_sleep = options.interval.min(Duration::from_secs(1));
                let next = PollState::after(status);
                if next != state {
                    info!(job_id, status = %status, "job status");
                }
                state = next;
                match state {
                    PollState::TerminalSuccess(status) | PollState::TerminalFailure(status) => {
                        return Ok(PollOutcome { status, polls });
                    }
                    _ => options.interval,
                }
            }
            Err(e) if e.is_transient() && remaining().is_some_and(|r| r.is_zero()) => {
                warn!(job_id, error = %e, "status request cut off by the deadline");
                return Err(timed_out(polls));
            }
            Err(e) if e.is_transient() && failures < options.max_transient_retries => {
                failures += 1;
                warn!(job_id, error = %e, attempt = failures, "transient error while polling");
                let wait = retry_sleep;
                retry_sleep = backoff(retry_sleep, options.interval);
                wait
            }
            Err(e) => return Err(e),
        };

        let sleep = match remaining() {
            Some(left) if left.is_zero() => return Err(timed_out(polls)),
            Some(left) => wanted.min(left),
            None => wanted,
        };
        thread::sleep(sleep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn fast() -> WaitOptions {
        WaitOptions::default().with_interval(Duration::from_millis(5))
    }

    fn scripted(statuses: &[JobStatus]) -> impl FnMut(Option<Duration>) -> Result<JobStatus> {
        let mut script: VecDeque<JobStatus> = statuses.iter().copied().collect();
        move |_| {
            let status = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            };
            Ok(status.unwrap_or(JobStatus::Running))
        }
    }

    #[test]
    fn three_polls_to_success() {
        let outcome = poll_until_terminal(
            "j1",
            &fast(),
            scripted(&[JobStatus::Accepted, JobStatus::Running, JobStatus::Succeeded]),
        )
        .unwrap();
        assert_eq!(outcome, PollOutcome { status: JobStatus::Succeeded, polls: 3 });
    }

    #[test]
    fn failure_and_dismissal_are_terminal() {
        for status in [JobStatus::Failed, JobStatus::Dismissed] {
            let outcome =
                poll_until_terminal("j", &fast(), scripted(&[JobStatus::Running, status])).unwrap();
            assert_eq!(outcome.status, status);
            assert_eq!(outcome.polls, 2);
        }
    }

    #[test]
    fn offline_keeps_polling() {
        let outcome = poll_until_terminal(
            "j",
            &fast(),
            scripted(&[JobStatus::Offline, JobStatus::Offline, JobStatus::Deduped]),
        )
        .unwrap();
        assert_eq!(outcome.status, JobStatus::Deduped);
        assert_eq!(outcome.polls, 3);
    }

    #[test]
    fn times_out_without_oversleeping() {
        let options = WaitOptions::default()
            .with_interval(Duration::from_secs(10))
            .with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        let err = poll_until_terminal("j2", &options, scripted(&[JobStatus::Running])).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            Error::Timeout { job_id, elapsed } => {
                assert_eq!(job_id, "j2");
                assert!(elapsed >= Duration::from_millis(50));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transient_errors_are_retried() {
        let mut calls = 0;
        let outcome = poll_until_terminal("j", &fast(), |_| {
            calls += 1;
            match calls {
                1 | 2 => Err(Error::Api {
                    status: 503,
                    url: "u".into(),
                    body: String::new(),
                    message: "unavailable".into(),
                }),
                _ => Ok(JobStatus::Succeeded),
            }
        })
        .unwrap();
        assert_eq!(outcome.polls, 3);
    }

    #[test]
    fn retry_budget_is_bounded() {
        let options = fast().with_max_transient_retries(2);
        let mut calls = 0;
        let err = poll_until_terminal("j", &options, |_| {
            calls += 1;
            Err(Error::Api {
                status: 502,
                url: "u".into(),
                body: String::new(),
                message: "bad gateway".into(),
            })
        })
        .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_errors_stop_immediately() {
        let mut calls = 0;
        let err = poll_until_terminal("j", &fast(), |_| {
            calls += 1;
            Err(Error::Api {
                status: 404,
                url: "u".into(),
                body: String::new(),
                message: "not found".into(),
            })
        })
        .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(calls, 1);
    }

    #[test]
    fn each_poll_is_told_the_time_left() {
        let options = WaitOptions::default()
            .with_interval(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(30));
        let mut seen = Vec::new();
        poll_until_terminal("j", &options, |left| {
            seen.push(left);
            Ok(if seen.len() < 3 { JobStatus::Running } else { JobStatus::Succeeded })
        })
        .unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|l| l.is_some_and(|l| l <= Duration::from_secs(30))));
        assert!(seen[2] < seen[0]);

        let mut unbounded = Vec::new();
        poll_until_terminal("j", &fast(), |left| {
            unbounded.push(left);
            Ok(JobStatus::Succeeded)
        })
        .unwrap();
        assert_eq!(unbounded, [None]);
    }

    #[test]
    fn a_poll_outliving_the_deadline_is_a_timeout() {
        let options = WaitOptions::default()
            .with_interval(Duration::from_millis(5))
            .with_timeout(Duration::from_millis(40))
            .with_max_transient_retries(100);
        let mut calls = 0;
        let err = poll_until_terminal("j3", &options, |left| {
            calls += 1;
            // The request honours its budget and then fails like a timed-out read.
            thread::sleep(left.unwrap_or_default());
            Err(Error::Api {
                status: 504,
                url: "u".into(),
                body: String::new(),
                message: "gateway timeout".into(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref job_id, .. } if job_id == "j3"), "{err:?}");
        assert_eq!(calls, 1);
    }
}

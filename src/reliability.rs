// Copyright 2024 SEM Driver Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The retry-with-reconnect wrapper every typed operation runs under.
//!
//! A call gets `retry_count` immediate retries. Once those are used up,
//! it gets `reconnect_count` reconnect attempts, each followed by
//! exactly one more try of the operation. Retries are not replenished by
//! a reconnect: after the first reconnect, a failing operation goes
//! straight back to "reconnects left?" rather than getting a fresh
//! batch of retries (see DESIGN.md).

use std::time::Duration;

use crate::error::Error;

/// Retry/reconnect knobs, carried in [`crate::session::Config`].
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub retry_count: u32,
    pub reconnect_count: u32,
    pub retry_delay: Duration,
    pub reconnect_delay: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            retry_count: 3,
            reconnect_count: 3,
            retry_delay: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Run `op` against `state` under `policy`, calling `reconnect` whenever
/// the retry budget for this call is exhausted but reconnect attempts
/// remain.
///
/// `state` is threaded through explicitly (rather than captured by the
/// closures) so `op` and `reconnect` never need to hold overlapping
/// borrows of it — both simply reborrow `state` each time they're
/// invoked, which is what lets a method like
/// `Microscope::run_retried` pass `|dev| dev.get_id_once()` and
/// `|dev| dev.reconnect()` side by side.
///
/// `reconnect` reports success/failure but its result does not change
/// the loop's behavior: even a failed reconnect is followed by one more
/// attempt of `op`, since the only thing that ends the loop is running
/// out of reconnect attempts.
pub fn run<S, T>(
    state: &mut S,
    policy: &Policy,
    mut op: impl FnMut(&mut S) -> Result<T, Error>,
    mut reconnect: impl FnMut(&mut S) -> bool,
) -> Result<T, Error> {
    let mut retries_left = policy.retry_count;
    let mut reconnects_left = policy.reconnect_count;

    loop {
        match op(state) {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                log::error!("operation failed: {err}");

                if retries_left > 0 {
                    retries_left -= 1;
                    log::warn!(
                        "retrying ({} of {} retries remaining)",
                        retries_left,
                        policy.retry_count
                    );
                    std::thread::sleep(policy.retry_delay);
                    continue;
                }

                if reconnects_left > 0 {
                    reconnects_left -= 1;
                    log::warn!(
                        "retries exhausted, reconnecting ({} of {} reconnects remaining)",
                        reconnects_left,
                        policy.reconnect_count
                    );
                    if !reconnect(state) {
                        log::warn!("reconnect attempt failed; trying the operation anyway");
                    }
                    continue;
                }

                log::error!(
                    "exhausted {} reconnect attempt(s), {} retr(y/ies) each; giving up",
                    policy.reconnect_count,
                    policy.retry_count
                );
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> Policy {
        Policy {
            retry_count: 2,
            reconnect_count: 2,
            retry_delay: Duration::from_millis(0),
            reconnect_delay: Duration::from_millis(0),
        }
    }

    #[derive(Default)]
    struct Counters {
        calls: u32,
        reconnects: u32,
    }

    #[test]
    fn succeeds_without_any_retry() {
        let mut state = Counters::default();
        let result = run(
            &mut state,
            &fast_policy(),
            |s| {
                s.calls += 1;
                Ok::<_, Error>(42)
            },
            |_| true,
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(state.calls, 1);
    }

    #[test]
    fn non_retryable_errors_propagate_immediately() {
        let mut state = Counters::default();
        let result = run(
            &mut state,
            &fast_policy(),
            |s| {
                s.calls += 1;
                Err::<i32, _>(Error::Value("bad arg".into()))
            },
            |_| true,
        );
        assert!(result.is_err());
        assert_eq!(state.calls, 1);
    }

    #[test]
    fn reconnects_do_not_replenish_retries() {
        // retry_count=2, reconnect_count=2: the call sequence is
        // try, retry, retry, [reconnect], try, [reconnect], try, give up
        // i.e. 1 initial + 2 retries + 2 (one attempt per reconnect) = 5 calls.
        let mut state = Counters::default();
        let result = run(
            &mut state,
            &fast_policy(),
            |s| {
                s.calls += 1;
                Err::<i32, _>(Error::communication("still broken"))
            },
            |s| {
                s.reconnects += 1;
                true
            },
        );
        assert!(result.is_err());
        assert_eq!(state.calls, 5);
        assert_eq!(state.reconnects, 2);
    }

    #[test]
    fn a_later_success_after_reconnect_is_returned() {
        let mut state = Counters::default();
        let result = run(
            &mut state,
            &fast_policy(),
            |s| {
                s.calls += 1;
                if s.calls >= 4 {
                    Ok(7)
                } else {
                    Err(Error::communication("not yet"))
                }
            },
            |_| true,
        );
        assert_eq!(result.unwrap(), 7);
    }
}

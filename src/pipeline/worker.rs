//! Per-worker queue-drain state machine
//!
//! Every pool worker runs the same loop over its input channel:
//!
//! ```text
//! Draining ──item──────────────▶ Draining   (consume, stay)
//! Draining ──timeout, consumed─▶ Exited     (if exit_when_quiet)
//! Draining ──timeout, fresh────▶ Backoff(1) (don't race startup)
//! Backoff(n) ──item────────────▶ Draining
//! Backoff(n<max) ──timeout─────▶ Backoff(n+1), timeout doubles
//! Backoff(max) ──timeout───────▶ Exited
//! any ──disconnect─────────────▶ Exited
//! ```
//!
//! The backoff branch exists so a worker spawned before its queue is
//! populated does not conclude "no work" from one empty poll.
//!
//! Whether a fed worker may trust a quiet timeout depends on its
//! producer. The gather queue is fully populated before any worker
//! spawns, so quiet means done. Reducer input is produced live, and a
//! gatherer may legitimately go silent for a long time while stalled in
//! the memory governor or inside a slow read; a reducer that exited on
//! quiet would drop that gatherer's send path and turn a sanctioned
//! stall into a batch failure. Such consumers use
//! [`DrainPolicy::until_disconnect`], which keeps the fed worker
//! draining until its channel disconnects.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::Result;

/// Drain-loop tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct DrainPolicy {
    /// First idle timeout; doubles on every fresh-queue backoff
    pub initial_timeout: Duration,
    /// Backoff rounds before a never-fed worker gives up
    pub max_retries: u32,
    /// Whether a fed worker may exit on a quiet timeout. `false` keeps
    /// it draining until the channel disconnects, for queues whose
    /// producers can stall arbitrarily long mid-batch.
    pub exit_when_quiet: bool,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_millis(250),
            max_retries: 5,
            exit_when_quiet: true,
        }
    }
}

impl DrainPolicy {
    /// Policy for consumers of live-produced queues: the never-fed
    /// backoff bound still applies, but once fed the worker exits only
    /// on disconnect.
    #[must_use]
    pub fn until_disconnect() -> Self {
        Self {
            exit_when_quiet: false,
            ..Self::default()
        }
    }
}

/// Observable worker state, exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Consuming items
    Draining,
    /// Idle-timeout fired before the first item; the payload counts
    /// completed backoff rounds
    Backoff(u32),
    /// Loop finished
    Exited,
}

/// Drain `rx` to quiescence, applying `handle` to each item.
///
/// Returns the first `handle` error; remaining queue items are left for
/// sibling workers. A disconnected channel exits cleanly.
///
/// # Errors
/// Propagates the first error from `handle`.
pub fn drain_queue<T>(
    rx: &Receiver<T>,
    policy: DrainPolicy,
    mut handle: impl FnMut(T) -> Result<()>,
) -> Result<()> {
    let mut state = DrainState::Draining;
    let mut timeout = policy.initial_timeout;
    let mut consumed = 0u64;

    loop {
        match state {
            DrainState::Exited => return Ok(()),
            DrainState::Draining | DrainState::Backoff(_) => {}
        }
        match rx.recv_timeout(timeout) {
            Ok(item) => {
                consumed += 1;
                state = DrainState::Draining;
                timeout = policy.initial_timeout;
                handle(item)?;
            }
            Err(RecvTimeoutError::Timeout) => {
                state = next_on_timeout(state, consumed, policy);
                if matches!(state, DrainState::Backoff(_)) {
                    timeout *= 2;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                state = DrainState::Exited;
            }
        }
    }
}

/// Timeout transition, factored out so the table above is testable
/// without clock time.
fn next_on_timeout(state: DrainState, consumed: u64, policy: DrainPolicy) -> DrainState {
    match state {
        DrainState::Draining if consumed > 0 && policy.exit_when_quiet => DrainState::Exited,
        DrainState::Draining if consumed > 0 => DrainState::Draining,
        DrainState::Draining => DrainState::Backoff(1),
        DrainState::Backoff(n) if n >= policy.max_retries => DrainState::Exited,
        DrainState::Backoff(n) => DrainState::Backoff(n + 1),
        DrainState::Exited => DrainState::Exited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::thread;

    fn fast_policy() -> DrainPolicy {
        DrainPolicy {
            initial_timeout: Duration::from_millis(5),
            max_retries: 3,
            exit_when_quiet: true,
        }
    }

    fn fast_until_disconnect() -> DrainPolicy {
        DrainPolicy {
            exit_when_quiet: false,
            ..fast_policy()
        }
    }

    #[test]
    fn timeout_transitions_follow_the_table() {
        let quiet_exits = fast_policy();
        // Fresh worker backs off with doubling, bounded
        assert_eq!(
            next_on_timeout(DrainState::Draining, 0, quiet_exits),
            DrainState::Backoff(1)
        );
        assert_eq!(
            next_on_timeout(DrainState::Backoff(1), 0, quiet_exits),
            DrainState::Backoff(2)
        );
        assert_eq!(
            next_on_timeout(DrainState::Backoff(3), 0, quiet_exits),
            DrainState::Exited
        );
        // A fed worker trusts a quiet timeout only when the policy allows
        assert_eq!(
            next_on_timeout(DrainState::Draining, 4, quiet_exits),
            DrainState::Exited
        );
        assert_eq!(
            next_on_timeout(DrainState::Draining, 4, fast_until_disconnect()),
            DrainState::Draining
        );
    }

    #[test]
    fn drains_all_items_then_exits() {
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..10 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        drain_queue(&rx, fast_policy(), |i| {
            seen.push(i);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn never_fed_worker_exits_after_bounded_backoff() {
        let (tx, rx) = crossbeam_channel::unbounded::<u32>();
        // Sender alive the whole time: exit must come from retry exhaustion,
        // not disconnect.
        let result = drain_queue(&rx, fast_policy(), |_| Ok(()));
        drop(tx);
        result.unwrap();
    }

    #[test]
    fn late_population_is_not_missed() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(15));
            for i in 0..3 {
                tx.send(i).unwrap();
            }
        });

        let mut seen = 0;
        drain_queue(&rx, fast_policy(), |_| {
            seen += 1;
            Ok(())
        })
        .unwrap();
        producer.join().unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn fed_worker_rides_out_a_long_producer_pause_under_until_disconnect() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let producer = thread::spawn(move || {
            tx.send(0).unwrap();
            // Far longer than the idle timeout and every backoff round
            // combined; a quiet-exit policy would have given up by now.
            thread::sleep(Duration::from_millis(300));
            tx.send(1).unwrap();
        });

        let mut seen = Vec::new();
        drain_queue(&rx, fast_until_disconnect(), |i| {
            seen.push(i);
            Ok(())
        })
        .unwrap();
        producer.join().unwrap();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn until_disconnect_still_bounds_a_never_fed_worker() {
        let (tx, rx) = crossbeam_channel::unbounded::<u32>();
        let result = drain_queue(&rx, fast_until_disconnect(), |_| Ok(()));
        drop(tx);
        result.unwrap();
    }

    #[test]
    fn handler_error_stops_this_worker_and_leaves_the_rest() {
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let err = drain_queue(&rx, fast_policy(), |i| {
            if i == 2 {
                Err(Error::Other("boom".to_string()))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("boom"));
        // Items after the failure stay queued for siblings
        assert_eq!(rx.len(), 2);
    }
}

// Single-flight coordinator
//
// Collapses concurrent identical loads into one in-flight call and
// broadcasts the shared outcome to every waiter.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// One in-flight load shared by every caller of the same key
struct Call<T> {
    slot: Mutex<Option<Result<T>>>,
    done: Condvar,
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Block until the leader stores an outcome, then share it
    fn wait(&self) -> Result<T> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut slot);
        }
    }

    fn complete(&self, outcome: Result<T>) {
        *self.slot.lock() = Some(outcome);
        self.done.notify_all();
    }
}

/// Duplicate-request suppressor
///
/// For any key, overlapping [`Flight::flight`] calls run the supplied
/// closure at most once; every caller observes the identical outcome.
/// Non-overlapping calls each run their closure fresh; outcomes are not
/// cached.
pub struct Flight<T: Clone> {
    calls: Mutex<HashMap<String, Arc<Call<T>>>>,
}

impl<T: Clone> Flight<T> {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key`, sharing one execution among overlapping callers
    ///
    /// The first caller for a key becomes the leader and runs `f` outside
    /// the table lock; late arrivals park on the call's latch. The table
    /// entry is removed before the latch releases, so a caller arriving
    /// after completion starts a fresh flight. If `f` panics the call is
    /// still completed (with an error) so waiters never hang.
    pub fn flight<F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let existing = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => Some(Arc::clone(call)),
                None => {
                    calls.insert(key.to_string(), Arc::new(Call::new()));
                    None
                }
            }
        };

        if let Some(call) = existing {
            return call.wait();
        }

        let mut guard = CompletionGuard {
            flight: self,
            key,
            armed: true,
        };
        let outcome = f();
        guard.armed = false;
        self.finish(key, outcome.clone());
        outcome
    }

    /// Remove the table entry, then release the latch with the outcome
    fn finish(&self, key: &str, outcome: Result<T>) {
        let call = self.calls.lock().remove(key);
        if let Some(call) = call {
            call.complete(outcome);
        }
    }
}

impl<T: Clone> Default for Flight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes the call with an error if the leader unwinds mid-flight
struct CompletionGuard<'a, T: Clone> {
    flight: &'a Flight<T>,
    key: &'a str,
    armed: bool,
}

impl<T: Clone> Drop for CompletionGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.flight
                .finish(self.key, Err(Error::Internal("load panicked".to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_single_caller() {
        let flight = Flight::new();
        let result = flight.flight("key", || Ok(42u64));
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_concurrent_calls_collapse() {
        let flight = Arc::new(Flight::new());
        let invocations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let invocations = Arc::clone(&invocations);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    flight.flight("key", || {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok("630".to_string())
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok("630".to_string()));
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_is_broadcast() {
        let flight = Arc::new(Flight::<String>::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    flight.flight("key", || {
                        thread::sleep(Duration::from_millis(20));
                        Err(Error::NotFound("key".to_string()))
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                Err(Error::NotFound("key".to_string()))
            );
        }
    }

    #[test]
    fn test_sequential_calls_run_fresh() {
        let flight = Flight::new();
        let invocations = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = flight.flight("key", || {
                Ok(invocations.fetch_add(1, Ordering::SeqCst))
            });
            assert!(result.is_ok());
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_distinct_keys_do_not_share() {
        let flight = Flight::new();
        assert_eq!(flight.flight("a", || Ok(1)), Ok(1));
        assert_eq!(flight.flight("b", || Ok(2)), Ok(2));
    }

    #[test]
    fn test_panicking_leader_releases_waiters() {
        let flight = Arc::new(Flight::<u64>::new());
        let barrier = Arc::new(Barrier::new(2));

        let leader = {
            let flight = Arc::clone(&flight);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let _ = flight.flight("key", || {
                    barrier.wait();
                    thread::sleep(Duration::from_millis(50));
                    panic!("backing source exploded");
                });
            })
        };

        barrier.wait();
        // The leader is now inside the closure; attach to its call.
        let outcome = flight.flight("key", || Ok(7));
        match outcome {
            // Attached while the leader was in flight: shared failure
            Err(Error::Internal(_)) => {}
            // The leader finished unwinding first: a fresh flight ran
            Ok(7) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(leader.join().is_err());
    }
}

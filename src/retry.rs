// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Bounded lock acquisition for row-level conditional updates.
//!
//! Admission decisions and check-ins mutate a row inside a single critical
//! section. Acquiring the row lock is the only suspension point in the engine,
//! so it is bounded: a few timed attempts with a short backoff, then
//! [`EngineError::Contention`] is surfaced to the caller as a retryable error.

use crate::error::EngineError;
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

/// Lock acquisition budget for a single operation.
///
/// Worst case is `attempts * lock_timeout` plus the backoff sleeps; the
/// defaults stay well under 200ms.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// How long one acquisition attempt may wait on the row lock.
    pub lock_timeout: Duration,
    /// Acquisition attempts before giving up. Must be at least 1.
    pub attempts: u32,
    /// Sleep between attempts, scaled linearly by attempt number.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(40),
            attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Acquires `mutex` under `policy`, retrying timed-out attempts.
pub(crate) fn lock_with_retry<'a, T>(
    entity: &'static str,
    mutex: &'a Mutex<T>,
    policy: &RetryPolicy,
) -> Result<MutexGuard<'a, T>, EngineError> {
    debug_assert!(policy.attempts >= 1, "retry policy needs at least one attempt");
    for attempt in 1..=policy.attempts {
        if let Some(guard) = mutex.try_lock_for(policy.lock_timeout) {
            return Ok(guard);
        }
        if attempt < policy.attempts {
            std::thread::sleep(policy.backoff * attempt);
        }
    }
    Err(EngineError::Contention {
        entity,
        attempts: policy.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn tight_policy() -> RetryPolicy {
        RetryPolicy {
            lock_timeout: Duration::from_millis(5),
            attempts: 2,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn uncontended_lock_succeeds() {
        let mutex = Mutex::new(1u32);
        let guard = lock_with_retry("test", &mutex, &RetryPolicy::default()).unwrap();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn held_lock_exhausts_budget() {
        let mutex = Arc::new(Mutex::new(0u32));
        let held = Arc::clone(&mutex);

        let _outer = held.lock();
        let result = thread::spawn({
            let mutex = Arc::clone(&mutex);
            move || lock_with_retry("test", &mutex, &tight_policy()).map(|_| ())
        })
        .join()
        .unwrap();

        assert_eq!(
            result,
            Err(EngineError::Contention {
                entity: "test",
                attempts: 2
            })
        );
        assert!(result.unwrap_err().is_retryable());
    }

    #[test]
    fn lock_released_within_budget_succeeds() {
        let mutex = Arc::new(Mutex::new(0u32));

        let holder = thread::spawn({
            let mutex = Arc::clone(&mutex);
            move || {
                let guard = mutex.lock();
                thread::sleep(Duration::from_millis(10));
                drop(guard);
            }
        });

        // Generous budget: the holder releases after 10ms.
        let policy = RetryPolicy {
            lock_timeout: Duration::from_millis(100),
            attempts: 3,
            backoff: Duration::from_millis(5),
        };
        thread::sleep(Duration::from_millis(2));
        assert!(lock_with_retry("test", &mutex, &policy).is_ok());
        holder.join().unwrap();
    }
}

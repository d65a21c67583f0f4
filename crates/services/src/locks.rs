use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use practice_core::model::ProblemId;

/// One async mutex per problem.
///
/// Holding the guard serializes read-then-append sequences for a single
/// problem; different problems never wait on each other.
#[derive(Clone, Default)]
pub struct ProblemLocks {
    slots: Arc<Mutex<HashMap<ProblemId, Arc<AsyncMutex<()>>>>>,
}

impl ProblemLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `problem_id`.
    pub async fn lock(&self, problem_id: ProblemId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop slots nobody is holding or waiting on.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(problem_id).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

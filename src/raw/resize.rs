use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use seize::{reclaim, Guard};

use super::table::Table;
use super::utils::ExitGuard;
use super::{HashSet, State};

// The status of the resize coordinator.
//
// # State table:
//
//     IDLE               | No migration is scheduled or running.
//     -------------------+--------------------------------------------------------
//     RESIZING           | A migration task has been handed to the executor and
//                        | owns all state transitions.
//     -------------------+--------------------------------------------------------
//     RESIZING | PENDING | Another insert crossed the threshold while the task was
//                        | running. The task re-checks before going idle.
pub(super) const IDLE: u32 = 0;
pub(super) const RESIZING: u32 = 1;
pub(super) const PENDING: u32 = 2;

/// Each migration multiplies the capacity by this factor.
pub(super) const GROWTH_FACTOR: usize = 2;

/// Returns `true` if a set of `len` elements should outgrow `capacity` buckets.
///
/// The set grows once it is half full.
#[inline]
pub(super) fn should_grow(len: usize, capacity: usize) -> bool {
    len >= capacity / 2
}

impl<K, S> HashSet<K, S> {
    /// Returns `true` if a migration is scheduled or running.
    #[inline]
    pub fn is_resizing(&self) -> bool {
        self.resizing.load(Ordering::Acquire) != IDLE
    }

    /// Blocks until no migration is scheduled or running.
    pub fn wait_for_resize(&self) {
        loop {
            let status = self.resizing.load(Ordering::Acquire);
            if status == IDLE {
                return;
            }

            atomic_wait::wait(&*self.resizing, status);
        }
    }

    // Publish a new state, retiring `current`.
    //
    // Only the migration task moves between states, so this never races.
    fn publish(
        &self,
        current: *mut State<K>,
        state: State<K>,
        guard: &impl Guard,
    ) -> *mut State<K> {
        let new = Box::into_raw(Box::new(state));
        let old = self.state.swap(new, Ordering::AcqRel);
        debug_assert!(std::ptr::eq(old, current), "state changed during migration");

        // Safety: `old` was just made unreachable by the swap above, and is only
        // reclaimed once every guard that could have loaded it is dropped.
        unsafe { guard.defer_retire(old, reclaim::boxed::<State<K>>) };

        new
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Schedule a migration, or record that another one is needed if one is already
    /// running.
    pub(super) fn try_resize(self: &Arc<Self>) {
        let mut status = self.resizing.load(Ordering::Relaxed);

        loop {
            if status == IDLE {
                match self.resizing.compare_exchange(
                    IDLE,
                    RESIZING,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(found) => {
                        status = found;
                        continue;
                    }
                }
            }

            // The running task has already been told to re-check.
            if status & PENDING != 0 {
                return;
            }

            match self.resizing.compare_exchange(
                status,
                status | PENDING,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    tracing::trace!("resize already in progress, recorded pending trigger");
                    return;
                }
                Err(found) => status = found,
            }
        }

        let set = Arc::clone(self);
        if let Err(err) = self.executor.execute(Box::new(move || set.run_resize())) {
            tracing::warn!(error = %err, "executor rejected table migration");

            // Growth will be retried by a later insert.
            self.resizing.store(IDLE, Ordering::Release);
            atomic_wait::wake_all(&*self.resizing);
        }
    }

    // The background migration task.
    fn run_resize(&self) {
        let guard = self.collector.enter();

        // Reset the flag if a `Hash` or `Eq` implementation panics. The new table stays
        // published and the next insert resumes the migration.
        let mut finished = ExitGuard::new(false, |finished: &mut bool| {
            if !*finished {
                self.resizing.store(IDLE, Ordering::Release);
                atomic_wait::wake_all(&*self.resizing);
            }
        });

        loop {
            loop {
                let state = self.state(&guard);
                if state.next.is_none() && !should_grow(self.len(), state.table.len()) {
                    break;
                }

                if !self.migrate(&guard) {
                    break;
                }
            }

            if self
                .resizing
                .compare_exchange(RESIZING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }

            // An insert crossed the threshold while we were migrating.
            self.resizing.fetch_and(!PENDING, Ordering::AcqRel);
            tracing::trace!("handling pending resize trigger");
        }

        *finished = true;
        atomic_wait::wake_all(&*self.resizing);
    }

    // Move every element into a table of twice the capacity.
    //
    // Returns `false` if the table cannot grow any further.
    fn migrate(&self, guard: &impl Guard) -> bool {
        let mut current = guard.protect(&self.state, Ordering::Acquire);

        // Safety: The state pointer is never null and is protected by `guard`.
        let state = unsafe { &*current };

        let (table, next) = match &state.next {
            // Resume a migration interrupted by a panic.
            Some(next) => {
                tracing::trace!(capacity = next.len(), "resuming interrupted migration");
                (state.table.clone(), next.clone())
            }

            None => {
                let Some(capacity) = state.table.len().checked_mul(GROWTH_FACTOR) else {
                    tracing::warn!(capacity = state.table.len(), "table capacity overflow");
                    return false;
                };

                let next = Arc::new(Table::new(capacity));
                current = self.publish(
                    current,
                    State {
                        table: state.table.clone(),
                        next: Some(next.clone()),
                    },
                    guard,
                );

                (state.table.clone(), next)
            }
        };

        tracing::debug!(from = table.len(), to = next.len(), "migrating table");

        for i in 0..table.len() {
            let _lock = self.stripe.lock(i);

            // Safety: We hold the lock covering bucket `i`, and therefore every bucket of
            // the new table that its elements map to.
            let old = unsafe { table.bucket(i) };

            // Elements are only removed from the old bucket once hashing and comparing
            // them succeeded, so a panic never loses an element.
            while let Some(key) = old.last() {
                let j = next.index(self.hasher.hash_one(key));
                debug_assert_eq!(self.stripe.slot(i), self.stripe.slot(j));

                // Safety: See above.
                let new = unsafe { next.bucket(j) };

                let present = new.contains(key);
                debug_assert!(!present, "element present in both tables during migration");

                let Some(key) = old.pop() else { break };
                if present {
                    self.count.fetch_sub(1, Ordering::Relaxed);
                } else {
                    new.push(key);
                }
            }
        }

        self.publish(
            current,
            State {
                table: next.clone(),
                next: None,
            },
            guard,
        );

        tracing::debug!(capacity = next.len(), "migration complete");
        true
    }
}

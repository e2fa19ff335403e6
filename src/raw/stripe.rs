use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};

/// The lock is not held.
const UNLOCKED: u32 = 0;

/// The lock is held and no thread is parked on it.
const LOCKED: u32 = 1;

/// The lock is held and one or more threads may be parked on it.
const CONTENDED: u32 = 2;

/// How many times to spin on a held lock before parking.
const SPIN_LIMIT: usize = if cfg!(any(test, debug_assertions)) {
    8
} else {
    100
};

// A futex-based mutual exclusion lock.
//
// # State table:
//
//     UNLOCKED  | The lock is free.
//     ----------+---------------------------------------------------------------
//     LOCKED    | The lock is held by exactly one thread, and no one is parked.
//     ----------+---------------------------------------------------------------
//     CONTENDED | The lock is held by exactly one thread, and other threads may
//               | be parked waiting for it. The holder must wake one on unlock.
pub struct RawLock {
    state: AtomicU32,
}

impl RawLock {
    pub const fn new() -> RawLock {
        RawLock {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    #[inline]
    pub fn lock(&self) {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
    }

    #[cold]
    #[inline(never)]
    fn lock_contended(&self) {
        // Bucket chains are short, so the holder is likely to release soon.
        let mut spun = 0;
        while self.state.load(Ordering::Relaxed) == LOCKED && spun < SPIN_LIMIT {
            hint::spin_loop();
            spun += 1;
        }

        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }

        // Mark the lock as contended before parking, so the holder knows to wake us. We
        // may end up acquiring the lock in the `CONTENDED` state, resulting in a spurious
        // wake-up on unlock, which is harmless.
        while self.state.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            atomic_wait::wait(&self.state, CONTENDED);
        }
    }

    #[cfg(test)]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    // # Safety
    //
    // The lock must be held by the current thread.
    #[inline]
    pub unsafe fn unlock(&self) {
        if self.state.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            atomic_wait::wake_one(&self.state);
        }
    }
}

/// A fixed array of locks guarding the buckets of every table.
///
/// Bucket `i` of any table is guarded by lock `i % width`. Table capacities are always
/// the initial capacity times a power of two, so the width divides every capacity and
/// an element's bucket in the old table and in the new table map to the same lock.
pub struct Stripe {
    locks: Box<[RawLock]>,
}

impl Stripe {
    /// Create a stripe with `width` locks.
    pub fn new(width: usize) -> Stripe {
        assert!(width > 0, "a lock stripe needs at least one lock");

        Stripe {
            locks: (0..width).map(|_| RawLock::new()).collect(),
        }
    }

    /// The number of locks in this stripe.
    #[inline]
    pub fn width(&self) -> usize {
        self.locks.len()
    }

    /// The lock covering bucket `index`.
    #[inline]
    pub fn slot(&self, index: usize) -> usize {
        index % self.locks.len()
    }

    /// Acquire the lock covering bucket `index` of a single table.
    #[inline]
    pub fn lock(&self, index: usize) -> StripeGuard<'_> {
        let slot = self.slot(index);
        self.locks[slot].lock();

        StripeGuard {
            stripe: self,
            first: slot,
            second: None,
        }
    }

    /// Acquire the locks covering bucket `new` of the table being migrated to, and
    /// bucket `old` of the table being migrated from.
    ///
    /// The new-table lock is always acquired first. If both buckets are covered by the
    /// same lock it is only acquired once.
    #[inline]
    pub fn lock_pair(&self, new: usize, old: usize) -> StripeGuard<'_> {
        let (new, old) = (self.slot(new), self.slot(old));
        self.locks[new].lock();

        if new == old {
            return StripeGuard {
                stripe: self,
                first: new,
                second: None,
            };
        }

        self.locks[old].lock();

        StripeGuard {
            stripe: self,
            first: new,
            second: Some(old),
        }
    }
}

/// Proof that one or two stripe locks are held, releasing them on drop.
pub struct StripeGuard<'a> {
    stripe: &'a Stripe,
    first: usize,
    second: Option<usize>,
}

impl Drop for StripeGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: A `StripeGuard` is only created after acquiring its locks.
        unsafe {
            if let Some(second) = self.second {
                self.stripe.locks[second].unlock();
            }

            self.stripe.locks[self.first].unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::UnsafeCell;
    use std::sync::Barrier;
    use std::thread;

    struct Counter(UnsafeCell<usize>);

    // Safety: Only accessed while holding a stripe lock.
    unsafe impl Sync for Counter {}

    #[test]
    fn mutual_exclusion() {
        const THREADS: usize = if cfg!(miri) { 2 } else { 8 };
        const ITERATIONS: usize = if cfg!(miri) { 100 } else { 50_000 };

        let stripe = Stripe::new(4);
        let counter = Counter(UnsafeCell::new(0));
        let barrier = Barrier::new(THREADS);

        thread::scope(|s| {
            for t in 0..THREADS {
                let (stripe, counter, barrier) = (&stripe, &counter, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..ITERATIONS {
                        // Indices 1, 5, 9, ... all map to the same slot.
                        let _guard = if i % 2 == 0 {
                            stripe.lock(1 + 4 * t)
                        } else {
                            stripe.lock_pair(1 + 4 * (t + i), 1)
                        };

                        unsafe { *counter.0.get() += 1 };
                    }
                });
            }
        });

        assert_eq!(counter.0.into_inner(), THREADS * ITERATIONS);
    }

    #[test]
    fn pair_collapses_shared_slot() {
        let stripe = Stripe::new(4);

        {
            let _guard = stripe.lock_pair(6, 2);
            assert!(!stripe.locks[2].try_lock());
        }

        // Released exactly once.
        assert!(stripe.locks[2].try_lock());
        unsafe { stripe.locks[2].unlock() };
    }

    #[test]
    fn pair_takes_both_slots() {
        let stripe = Stripe::new(4);

        {
            let _guard = stripe.lock_pair(3, 1);
            assert!(!stripe.locks[3].try_lock());
            assert!(!stripe.locks[1].try_lock());
            assert!(stripe.locks[0].try_lock());
            unsafe { stripe.locks[0].unlock() };
        }

        for lock in stripe.locks.iter() {
            assert!(lock.try_lock());
            unsafe { lock.unlock() };
        }
    }

    #[test]
    fn slots_wrap() {
        let stripe = Stripe::new(4);
        assert_eq!(stripe.width(), 4);
        assert_eq!(stripe.slot(0), 0);
        assert_eq!(stripe.slot(5), 1);
        assert_eq!(stripe.slot(4 * 8 + 3), 3);
    }
}

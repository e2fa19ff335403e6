mod resize;
mod stripe;
mod table;
mod utils;

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::iter;
use std::marker::PhantomData;
use std::mem;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use seize::{Collector, Guard, LocalGuard};

use self::stripe::{Stripe, StripeGuard};
use self::table::Table;
use self::utils::{CachePadded, ExitGuard};
use crate::Executor;

/// A lock-striped hash set that grows by migrating to a larger table in the background.
///
/// Elements live in chained buckets. Bucket `i` of every table is guarded by the
/// stripe lock `i % width`, where the width is the initial capacity. While a
/// migration is in flight, elements may be in either the old table or the new one,
/// and operations consult both.
pub struct HashSet<K, S> {
    // The current tables, never null.
    state: AtomicPtr<State<K>>,

    // Locks guarding bucket contents.
    stripe: Stripe,

    // The number of elements in the set, only modified while holding a stripe lock.
    count: CachePadded<AtomicUsize>,

    // The status of the resize coordinator, see `resize.rs`.
    resizing: CachePadded<AtomicU32>,

    // Collector for retired states.
    collector: Collector,

    // Runs table migrations.
    executor: Arc<dyn Executor>,

    pub hasher: S,

    _owns: PhantomData<State<K>>,
}

// Safety: Elements are moved into the set from arbitrary threads and shared
// references to them are handed out to arbitrary threads, which requires both
// `Send` and `Sync`. The raw state pointer is only dereferenced under a guard.
unsafe impl<K: Send + Sync, S: Send> Send for HashSet<K, S> {}
unsafe impl<K: Send + Sync, S: Sync> Sync for HashSet<K, S> {}

/// A snapshot of the set's tables.
///
/// A state is never mutated after being published. Moving between states swaps the
/// whole allocation and retires the previous one.
struct State<K> {
    // The table elements are read from.
    table: Arc<Table<K>>,

    // The table being migrated to, if a migration is in progress.
    next: Option<Arc<Table<K>>>,
}

impl<K> State<K> {
    // Every table that may hold elements.
    #[inline]
    fn tables(&self) -> impl Iterator<Item = &Table<K>> {
        iter::once(&*self.table).chain(self.next.as_deref())
    }

    // The capacity this state is growing towards.
    #[inline]
    fn target_capacity(&self) -> usize {
        self.next.as_ref().unwrap_or(&self.table).len()
    }
}

impl<K, S> HashSet<K, S> {
    /// Creates a set with `capacity` initial buckets.
    pub fn new(
        capacity: NonZeroUsize,
        hasher: S,
        collector: Collector,
        executor: Arc<dyn Executor>,
    ) -> HashSet<K, S> {
        let capacity = capacity.get();
        let state = Box::new(State {
            table: Arc::new(Table::new(capacity)),
            next: None,
        });

        HashSet {
            state: AtomicPtr::new(Box::into_raw(state)),
            stripe: Stripe::new(capacity),
            count: CachePadded::new(AtomicUsize::new(0)),
            resizing: CachePadded::new(AtomicU32::new(resize::IDLE)),
            collector,
            executor,
            hasher,
            _owns: PhantomData,
        }
    }

    /// Returns a guard for this set's collector.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Returns a reference to the collector.
    #[inline]
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Returns the number of elements in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the number of buckets in the table elements are currently read from.
    #[inline]
    pub fn capacity(&self, guard: &impl Guard) -> usize {
        self.state(guard).table.len()
    }

    /// Returns the current state.
    #[inline]
    fn state<'g>(&self, guard: &'g impl Guard) -> &'g State<K> {
        let state = guard.protect(&self.state, Ordering::Acquire);

        // Safety: The state pointer is never null, and retired states are not reclaimed
        // while `guard` is active.
        unsafe { &*state }
    }

    // Acquire the stripe lock covering `hash` and return the state it is valid for.
    //
    // The state may change between loading it and acquiring the lock, so the load is
    // repeated after locking. The state cannot move past a migration of our bucket
    // while we hold its lock.
    fn lock<'s, 'g>(
        &'s self,
        hash: u64,
        guard: &'g impl Guard,
    ) -> (&'g State<K>, StripeGuard<'s>) {
        loop {
            let state = self.state(guard);
            let old = state.table.index(hash);

            let lock = match &state.next {
                None => self.stripe.lock(old),
                // The width divides both capacities, so the two slots always
                // collapse into one lock here.
                Some(next) => self.stripe.lock_pair(next.index(hash), old),
            };

            // The pointer cannot be reused while `guard` protects `state`.
            if std::ptr::eq(self.state.load(Ordering::Acquire), state) {
                return (state, lock);
            }
        }
    }

    /// Removes every element from the set.
    pub fn clear(&self, guard: &impl Guard) {
        for slot in 0..self.stripe.width() {
            let mut removed = Vec::new();

            {
                let _lock = self.stripe.lock(slot);
                let state = self.state(guard);

                for table in state.tables() {
                    for i in (slot..table.len()).step_by(self.stripe.width()) {
                        // Safety: We hold the lock covering bucket `i`.
                        let bucket = unsafe { table.bucket(i) };
                        if !bucket.is_empty() {
                            self.count.fetch_sub(bucket.len(), Ordering::Relaxed);
                            removed.push(mem::take(bucket));
                        }
                    }
                }
            }

            // Drop elements outside of the lock.
            drop(removed);
        }
    }

    /// Retains only the elements for which `f` returns `true`.
    pub fn retain<F>(&self, mut f: F, guard: &impl Guard)
    where
        F: FnMut(&K) -> bool,
    {
        for slot in 0..self.stripe.width() {
            let _lock = self.stripe.lock(slot);
            let state = self.state(guard);

            // Keep the count in sync even if `f` panics.
            let mut removed = ExitGuard::new(0, |removed: &mut usize| {
                self.count.fetch_sub(*removed, Ordering::Relaxed);
            });

            for table in state.tables() {
                for i in (slot..table.len()).step_by(self.stripe.width()) {
                    // Safety: We hold the lock covering bucket `i`.
                    let bucket = unsafe { table.bucket(i) };
                    bucket.retain(|key| {
                        let keep = f(key);
                        if !keep {
                            *removed += 1;
                        }
                        keep
                    });
                }
            }
        }
    }

    /// Calls `f` on every element until it returns an error.
    ///
    /// Elements are visited one stripe slot at a time while holding its lock.
    pub fn try_for_each<F, E>(&self, mut f: F, guard: &impl Guard) -> Result<(), E>
    where
        F: FnMut(&K) -> Result<(), E>,
    {
        for slot in 0..self.stripe.width() {
            let _lock = self.stripe.lock(slot);
            let state = self.state(guard);

            for table in state.tables() {
                for i in (slot..table.len()).step_by(self.stripe.width()) {
                    // Safety: We hold the lock covering bucket `i`.
                    for key in unsafe { table.bucket(i) }.iter() {
                        f(key)?;
                    }
                }
            }
        }

        Ok(())
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `true` if the set contains the element.
    pub fn contains<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let (state, _lock) = self.lock(hash, guard);

        state.tables().any(|table| {
            // Safety: We hold the lock covering this element in every table.
            let bucket = unsafe { table.bucket(table.index(hash)) };
            bucket.iter().any(|k| k.borrow() == key)
        })
    }

    /// Removes the element, returning `true` if it was present.
    pub fn remove<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);

        let (old, new) = {
            let (state, _lock) = self.lock(hash, guard);

            // Safety: We hold the lock covering this element in every table.
            let old = unsafe { take(state.table.bucket(state.table.index(hash)), key) };
            let new = match &state.next {
                Some(next) => unsafe { take(next.bucket(next.index(hash)), key) },
                None => None,
            };

            if old.is_some() || new.is_some() {
                self.count.fetch_sub(1, Ordering::Relaxed);
            }

            (old, new)
        };

        old.is_some() || new.is_some()
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Adds an element to the set, returning `true` if it was not already present.
    ///
    /// May schedule a background migration once the set is half full.
    pub fn add(self: &Arc<Self>, key: K, guard: &impl Guard) -> bool {
        let hash = self.hasher.hash_one(&key);

        let (state, len) = {
            let (state, _lock) = self.lock(hash, guard);

            // Safety: We hold the lock covering this element in every table.
            let old = unsafe { state.table.bucket(state.table.index(hash)) };
            if old.contains(&key) {
                return false;
            }

            match &state.next {
                None => old.push(key),
                Some(next) => {
                    // Safety: As above.
                    let new = unsafe { next.bucket(next.index(hash)) };
                    if new.contains(&key) {
                        return false;
                    }

                    // Insert into the new table only, the old bucket may already
                    // have been migrated.
                    new.push(key);
                }
            }

            (state, self.count.fetch_add(1, Ordering::Relaxed) + 1)
        };

        // A migration left half-done by a panic is resumed by the next insert.
        if resize::should_grow(len, state.target_capacity())
            || (state.next.is_some() && !self.is_resizing())
        {
            self.try_resize();
        }

        true
    }
}

impl<K, S> Drop for HashSet<K, S> {
    fn drop(&mut self) {
        // Safety: We have unique access to the set, so the current state is unreachable
        // by anyone else. Retired states are owned by the collector, which reclaims them
        // when it is dropped.
        unsafe { drop(Box::from_raw(*self.state.get_mut())) };
    }
}

// Remove the element equal to `key` from a bucket.
#[inline]
fn take<K, Q>(bucket: &mut Vec<K>, key: &Q) -> Option<K>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    let i = bucket.iter().position(|k| k.borrow() == key)?;
    Some(bucket.swap_remove(i))
}

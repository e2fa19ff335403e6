use crate::executor::{Executor, Worker};
use crate::raw;
use crate::Error;
use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::convert::Infallible;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// The initial capacity of a set created with [`HashSet::new`].
const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(16) {
    Some(capacity) => capacity,
    None => panic!("default capacity must be positive"),
};

/// A concurrent hash set with lock striping and background resizing.
///
/// Elements are stored in chained buckets guarded by a fixed stripe of locks, one per
/// bucket of the initial table. Once the set is half full, inserts hand a migration to
/// the set's [`Executor`], which moves every element into a table of twice the capacity
/// while other threads keep reading and writing. See the [crate-level
/// documentation](crate) for details.
pub struct HashSet<K, S = RandomState> {
    raw: Arc<raw::HashSet<K, S>>,
}

/// A builder for a [`HashSet`].
///
/// # Examples
///
/// ```rust
/// use striped_set::{HashSet, Inline};
/// use seize::Collector;
/// use std::collections::hash_map::RandomState;
///
/// let set: HashSet<i32> = HashSet::builder()
///     // Set the initial capacity.
///     .capacity(64)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Run migrations on the inserting thread.
///     .executor(Inline)
///     // Set a custom garbage collector.
///     .collector(Collector::new().batch_size(128))
///     // Construct the hash set.
///     .build()
///     .unwrap();
/// ```
pub struct HashSetBuilder<K, S = RandomState> {
    hasher: S,
    capacity: usize,
    collector: Collector,
    executor: Option<Arc<dyn Executor>>,
    _k: PhantomData<K>,
}

impl<K> HashSetBuilder<K> {
    /// Set the hash builder used to hash elements.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashSets to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> HashSetBuilder<K, S> {
        HashSetBuilder {
            hasher,
            capacity: self.capacity,
            collector: self.collector,
            executor: self.executor,
            _k: PhantomData,
        }
    }
}

impl<K, S> HashSetBuilder<K, S> {
    /// Set the initial capacity of the set.
    ///
    /// The capacity is the number of buckets in the initial table, and also the number
    /// of locks guarding the set for its entire lifetime. It must be positive.
    pub fn capacity(self, capacity: usize) -> HashSetBuilder<K, S> {
        HashSetBuilder { capacity, ..self }
    }

    /// Set the [`Executor`] that runs background migrations.
    ///
    /// Defaults to the process-wide [`Worker::global`].
    pub fn executor(self, executor: impl Executor + 'static) -> HashSetBuilder<K, S> {
        HashSetBuilder {
            executor: Some(Arc::new(executor)),
            ..self
        }
    }

    /// Set the [`seize::Collector`] used to reclaim retired tables.
    pub fn collector(self, collector: Collector) -> HashSetBuilder<K, S> {
        HashSetBuilder { collector, ..self }
    }

    /// Construct a [`HashSet`] from the builder, using the configured options.
    ///
    /// Returns [`Error::ZeroCapacity`] if the capacity is zero.
    pub fn build(self) -> Result<HashSet<K, S>, Error> {
        let capacity = NonZeroUsize::new(self.capacity).ok_or(Error::ZeroCapacity)?;
        Ok(self.build_nonzero(capacity))
    }

    // Build with a capacity that is known to be valid.
    fn build_nonzero(self, capacity: NonZeroUsize) -> HashSet<K, S> {
        let executor = self
            .executor
            .unwrap_or_else(|| Worker::global() as Arc<dyn Executor>);

        HashSet {
            raw: Arc::new(raw::HashSet::new(
                capacity,
                self.hasher,
                self.collector,
                executor,
            )),
        }
    }
}

impl<K, S> fmt::Debug for HashSetBuilder<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashSetBuilder")
            .field("capacity", &self.capacity)
            .field("collector", &self.collector)
            .finish()
    }
}

impl<K> HashSet<K> {
    /// Creates an empty `HashSet` with the default capacity of 16.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    /// let set: HashSet<&str> = HashSet::new();
    /// assert_eq!(set.capacity(), 16);
    /// ```
    pub fn new() -> HashSet<K> {
        HashSet::builder().build_nonzero(DEFAULT_CAPACITY)
    }

    /// Creates an empty `HashSet` with the specified initial capacity.
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::{Error, HashSet};
    ///
    /// let set: HashSet<&str> = HashSet::with_capacity(10).unwrap();
    /// assert_eq!(set.capacity(), 10);
    ///
    /// assert!(matches!(HashSet::<&str>::with_capacity(0), Err(Error::ZeroCapacity)));
    /// ```
    pub fn with_capacity(capacity: usize) -> Result<HashSet<K>, Error> {
        HashSet::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Returns a builder for a `HashSet`.
    ///
    /// The builder can be used for more complex configuration, such as using
    /// a custom [`Executor`] or [`Collector`].
    pub fn builder() -> HashSetBuilder<K> {
        HashSetBuilder {
            capacity: DEFAULT_CAPACITY.get(),
            hasher: RandomState::default(),
            collector: Collector::new(),
            executor: None,
            _k: PhantomData,
        }
    }
}

impl<K, S> Default for HashSet<K, S>
where
    S: Default,
{
    fn default() -> Self {
        HashSet::with_hasher(S::default())
    }
}

impl<K, S> HashSet<K, S> {
    /// Creates an empty `HashSet` with the default capacity, which will use the given
    /// hash builder to hash elements.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashSets to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let s = RandomState::new();
    /// let set = HashSet::with_hasher(s);
    /// set.add(1);
    /// ```
    pub fn with_hasher(hash_builder: S) -> HashSet<K, S> {
        HashSet::<K>::builder()
            .hasher(hash_builder)
            .build_nonzero(DEFAULT_CAPACITY)
    }

    /// Creates an empty `HashSet` with the specified initial capacity, using
    /// `hash_builder` to hash the elements.
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let s = RandomState::new();
    /// let set = HashSet::with_capacity_and_hasher(10, s).unwrap();
    /// set.add(1);
    /// ```
    pub fn with_capacity_and_hasher(
        capacity: usize,
        hash_builder: S,
    ) -> Result<HashSet<K, S>, Error> {
        HashSet::<K>::builder()
            .capacity(capacity)
            .hasher(hash_builder)
            .build()
    }

    /// Returns a pinned reference to the set.
    ///
    /// The returned reference manages a guard internally, amortizing its cost over
    /// many operations. Holding on to it delays the reclamation of retired tables.
    #[inline]
    pub fn pin(&self) -> HashSetRef<'_, K, S, LocalGuard<'_>> {
        HashSetRef {
            guard: self.raw.guard(),
            set: self,
        }
    }

    /// Returns a pinned reference to the set.
    ///
    /// Unlike [`HashSet::pin`], the returned reference implements `Send` and `Sync`,
    /// allowing it to be held across `.await` points in work-stealing schedulers.
    #[inline]
    pub fn pin_owned(&self) -> HashSetRef<'_, K, S, OwnedGuard<'_>> {
        HashSetRef {
            guard: self.raw.collector().enter_owned(),
            set: self,
        }
    }

    /// Returns the number of elements in the set.
    ///
    /// The count is exact once concurrent operations have completed.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::new();
    ///
    /// set.add(1);
    /// set.add(2);
    /// assert!(set.len() == 2);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the set is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::new();
    /// assert!(set.is_empty());
    /// set.add("a");
    /// assert!(!set.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets in the table elements are currently read from.
    ///
    /// The capacity doubles every time a migration completes, and never shrinks.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::{HashSet, Inline};
    ///
    /// let set = HashSet::builder().capacity(4).executor(Inline).build().unwrap();
    /// set.add(0);
    /// set.add(1);
    /// assert_eq!(set.capacity(), 8);
    /// ```
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity(&self.raw.guard())
    }

    /// Returns `true` if a background migration is scheduled or running.
    #[inline]
    pub fn is_resizing(&self) -> bool {
        self.raw.is_resizing()
    }

    /// Blocks the current thread until no background migration is scheduled or
    /// running.
    ///
    /// Elements added concurrently may trigger another migration as soon as this
    /// returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::with_capacity(4).unwrap();
    /// for i in 0..8 {
    ///     set.add(i);
    ///     set.wait_for_resize();
    /// }
    /// assert_eq!(set.capacity(), 32);
    /// ```
    #[inline]
    pub fn wait_for_resize(&self) {
        self.raw.wait_for_resize()
    }

    /// Clears the set, removing all elements.
    ///
    /// The set is cleared one stripe at a time, so elements added concurrently may
    /// survive.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::new();
    ///
    /// set.add(1);
    /// set.clear();
    /// assert!(set.is_empty());
    /// ```
    #[inline]
    pub fn clear(&self) {
        self.raw.clear(&self.raw.guard())
    }

    /// Retains only the elements specified by the predicate.
    ///
    /// In other words, remove all elements `e` for which `f(&e)` returns `false`.
    /// The elements are visited in unspecified order.
    ///
    /// The predicate is called while holding a stripe lock, and must not access
    /// the set.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set: HashSet<i32> = (0..8).collect();
    /// set.retain(|&v| v % 2 == 0);
    /// assert_eq!(set.len(), 4);
    /// assert_eq!(set.contains(&1), false);
    /// assert_eq!(set.contains(&2), true);
    /// ```
    #[inline]
    pub fn retain<F>(&self, f: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.raw.retain(f, &self.raw.guard())
    }

    /// Calls a closure on every element of the set, in unspecified order.
    ///
    /// Elements are visited one stripe at a time while holding its lock, so every
    /// element present for the whole call is visited exactly once. The closure must
    /// not access the set.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::from([1, 2, 3]);
    ///
    /// let mut sum = 0;
    /// set.for_each(|x| sum += x);
    /// assert_eq!(sum, 6);
    /// ```
    #[inline]
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K),
    {
        let result = self.try_for_each(|key| {
            f(key);
            Ok::<_, Infallible>(())
        });

        if let Err(never) = result {
            match never {}
        }
    }

    /// Calls a fallible closure on every element of the set, stopping at the first
    /// error.
    ///
    /// See [`HashSet::for_each`] for details.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::from([1, 2, 3]);
    /// let found = set.try_for_each(|&x| if x == 2 { Err(x) } else { Ok(()) });
    /// assert_eq!(found, Err(2));
    /// ```
    #[inline]
    pub fn try_for_each<F, E>(&self, f: F) -> Result<(), E>
    where
        F: FnMut(&K) -> Result<(), E>,
    {
        self.raw.try_for_each(f, &self.raw.guard())
    }

    /// Returns a copy of every element in the set.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::from([1, 2, 3]);
    /// let mut elements = set.to_vec();
    /// elements.sort();
    /// assert_eq!(elements, [1, 2, 3]);
    /// ```
    pub fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut elements = Vec::with_capacity(self.len());
        self.for_each(|key| elements.push(key.clone()));
        elements
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `true` if the set contains the specified element.
    ///
    /// The element may be any borrowed form of the set's element type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the element type.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::new();
    /// set.add(1);
    /// assert_eq!(set.contains(&1), true);
    /// assert_eq!(set.contains(&2), false);
    /// ```
    #[inline]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.contains(key, &self.raw.guard())
    }

    /// Removes an element from the set, returning `true` if it was present.
    ///
    /// The element is dropped after the set's locks are released.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::new();
    /// set.add(1);
    /// assert_eq!(set.remove(&1), true);
    /// assert_eq!(set.remove(&1), false);
    /// ```
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.remove(key, &self.raw.guard())
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Adds an element to the set.
    ///
    /// If the set did not have this element present, `true` is returned.
    ///
    /// If the set did have this element present, `false` is returned and the
    /// element is not updated.
    ///
    /// Once the set is half full, this schedules a background migration to a table
    /// of twice the capacity. The call does not wait for the migration, unless the
    /// set's executor runs it inline.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_set::HashSet;
    ///
    /// let set = HashSet::new();
    /// assert_eq!(set.add(37), true);
    /// assert_eq!(set.is_empty(), false);
    ///
    /// assert_eq!(set.add(37), false);
    /// assert_eq!(set.len(), 1);
    /// ```
    #[inline]
    pub fn add(&self, key: K) -> bool {
        self.raw.add(key, &self.raw.guard())
    }
}

impl<K, S> fmt::Debug for HashSet<K, S>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        self.for_each(|key| {
            set.entry(key);
        });
        set.finish()
    }
}

impl<K, S> Extend<K> for &HashSet<K, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    fn extend<T: IntoIterator<Item = K>>(&mut self, iter: T) {
        let set = self.pin();
        for key in iter {
            set.add(key);
        }
    }
}

impl<'a, K, S> Extend<&'a K> for &HashSet<K, S>
where
    K: Copy + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    fn extend<T: IntoIterator<Item = &'a K>>(&mut self, iter: T) {
        self.extend(iter.into_iter().copied());
    }
}

impl<K, const N: usize> From<[K; N]> for HashSet<K, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    fn from(arr: [K; N]) -> Self {
        HashSet::from_iter(arr)
    }
}

impl<K, S> FromIterator<K> for HashSet<K, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn from_iter<T: IntoIterator<Item = K>>(iter: T) -> Self {
        let iter = iter.into_iter();

        // Size the table so the elements fit without crossing the growth threshold.
        let (lower, _) = iter.size_hint();
        let capacity = NonZeroUsize::new(lower.saturating_mul(2))
            .map_or(DEFAULT_CAPACITY, |capacity| capacity.max(DEFAULT_CAPACITY));

        let set = HashSet::<K>::builder()
            .hasher(S::default())
            .build_nonzero(capacity);

        let mut target = &set;
        target.extend(iter);
        set
    }
}

/// A pinned reference to a [`HashSet`].
///
/// This type is created with [`HashSet::pin`] and holds a reclamation guard for as
/// long as it lives, avoiding the cost of entering one for every operation.
pub struct HashSetRef<'set, K, S, G> {
    guard: G,
    set: &'set HashSet<K, S>,
}

impl<'set, K, S, G> HashSetRef<'set, K, S, G>
where
    G: Guard,
{
    /// Returns a reference to the inner [`HashSet`].
    #[inline]
    pub fn set(&self) -> &'set HashSet<K, S> {
        self.set
    }

    /// Returns the number of elements in the set.
    ///
    /// See [`HashSet::len`] for details.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.raw.len()
    }

    /// Returns `true` if the set is empty. Otherwise returns `false`.
    ///
    /// See [`HashSet::is_empty`] for details.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets in the table elements are currently read from.
    ///
    /// See [`HashSet::capacity`] for details.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.set.raw.capacity(&self.guard)
    }

    /// Clears the set, removing all elements.
    ///
    /// See [`HashSet::clear`] for details.
    #[inline]
    pub fn clear(&self) {
        self.set.raw.clear(&self.guard)
    }

    /// Retains only the elements specified by the predicate.
    ///
    /// See [`HashSet::retain`] for details.
    #[inline]
    pub fn retain<F>(&self, f: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.set.raw.retain(f, &self.guard)
    }

    /// Calls a fallible closure on every element of the set.
    ///
    /// See [`HashSet::try_for_each`] for details.
    #[inline]
    pub fn try_for_each<F, E>(&self, f: F) -> Result<(), E>
    where
        F: FnMut(&K) -> Result<(), E>,
    {
        self.set.raw.try_for_each(f, &self.guard)
    }
}

impl<'set, K, S, G> HashSetRef<'set, K, S, G>
where
    K: Hash + Eq,
    S: BuildHasher,
    G: Guard,
{
    /// Returns `true` if the set contains the specified element.
    ///
    /// See [`HashSet::contains`] for details.
    #[inline]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.set.raw.contains(key, &self.guard)
    }

    /// Removes an element from the set, returning `true` if it was present.
    ///
    /// See [`HashSet::remove`] for details.
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.set.raw.remove(key, &self.guard)
    }
}

impl<'set, K, S, G> HashSetRef<'set, K, S, G>
where
    K: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Send + Sync + 'static,
    G: Guard,
{
    /// Adds an element to the set.
    ///
    /// See [`HashSet::add`] for details.
    #[inline]
    pub fn add(&self, key: K) -> bool {
        self.set.raw.add(key, &self.guard)
    }
}

impl<K, S, G> fmt::Debug for HashSetRef<'_, K, S, G>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.set, f)
    }
}

use std::cell::UnsafeCell;

/// A collision chain of elements that hash to the same slot.
struct Bucket<K>(UnsafeCell<Vec<K>>);

/// A fixed-capacity array of buckets.
///
/// The table performs no synchronization of its own. Every bucket is guarded by the
/// stripe lock covering its index, see [`Stripe`](super::stripe::Stripe).
pub struct Table<K> {
    buckets: Box<[Bucket<K>]>,
}

// Safety: Bucket contents are only accessed while holding the covering stripe lock,
// so sharing a table across threads is equivalent to sharing a `Mutex<Vec<K>>`.
unsafe impl<K: Send> Send for Table<K> {}
unsafe impl<K: Send + Sync> Sync for Table<K> {}

impl<K> Table<K> {
    /// Allocate a table with `len` empty buckets.
    pub fn new(len: usize) -> Table<K> {
        assert!(len > 0, "tables must have at least one bucket");

        Table {
            buckets: (0..len).map(|_| Bucket(UnsafeCell::new(Vec::new()))).collect(),
        }
    }

    /// The number of buckets in this table.
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the bucket index for the given hash.
    #[inline]
    pub fn index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Returns a mutable reference to the bucket at the given index.
    ///
    /// # Safety
    ///
    /// The stripe lock covering `index` must be held for the lifetime of the
    /// returned reference, and the index must be in bounds.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bucket(&self, index: usize) -> &mut Vec<K> {
        debug_assert!(index < self.buckets.len());

        // Safety: Guaranteed by caller.
        unsafe { &mut *self.buckets.get_unchecked(index).0.get() }
    }
}

impl<K> Table<K> {
    // Elements across every bucket. Only meaningful with exclusive access.
    #[cfg(test)]
    fn count(&mut self) -> usize {
        self.buckets.iter_mut().map(|b| b.0.get_mut().len()).sum()
    }
}

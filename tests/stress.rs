// adapted from: https://github.com/jonhoo/flurry/tree/main/tests/jdk

use striped_set::HashSet;
use rand::prelude::*;

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

mod common;
use common::{threads, with_set};

#[test]
fn contains_stress() {
    const ITERATIONS: usize = if cfg!(miri) { 1 } else { 64 };
    const ENTRIES: usize = if cfg!(miri) { 64 } else { 1 << 10 };
    const ROUNDS: usize = if cfg!(miri) { 1 } else { 32 };

    with_set(|set| {
        let set = set();
        let mut content = [0; ENTRIES];

        {
            let set = set.pin();
            for k in 0..ENTRIES {
                set.add(k);
                content[k] = k;
            }
        }

        for _ in 0..ITERATIONS {
            let threads = threads().min(8);
            let barrier = Barrier::new(threads);
            thread::scope(|s| {
                for _ in 0..threads {
                    s.spawn(|| {
                        barrier.wait();
                        let set = set.pin();
                        for i in 0..ENTRIES * ROUNDS {
                            let key = content[i % content.len()];
                            assert!(set.contains(&key));
                        }
                    });
                }
            });
        }
    });
}

#[test]
fn add_stress() {
    const ITERATIONS: usize = if cfg!(miri) { 1 } else { 16 };
    const ENTRIES: usize = if cfg!(miri) { 64 } else { 1 << 12 };

    #[derive(Hash, PartialEq, Eq, Clone, Copy)]
    struct Key {
        _data: usize,
    }

    impl Key {
        pub fn new() -> Self {
            let mut rng = rand::thread_rng();
            Self { _data: rng.gen() }
        }
    }

    with_set(|set| {
        for _ in 0..ITERATIONS {
            let set = set();
            let threads = threads().min(8);
            let barrier = Barrier::new(threads);
            thread::scope(|s| {
                for _ in 0..threads {
                    s.spawn(|| {
                        barrier.wait();
                        for _ in 0..ENTRIES {
                            let key = Key::new();
                            set.add(key);
                            assert!(set.contains(&key));
                        }
                    });
                }
            });
        }
    });
}

// Threads adding disjoint ranges lose nothing, however many resizes they cross.
#[test]
fn disjoint_ranges() {
    const ITERATIONS: usize = if cfg!(miri) { 1 } else { 16 };
    const CHUNK: usize = if cfg!(miri) { 48 } else { 1 << 13 };

    with_set(|set| {
        for _ in 0..ITERATIONS {
            let set = set();
            let threads = threads();
            let barrier = Barrier::new(threads);

            thread::scope(|s| {
                for t in 0..threads {
                    let (set, barrier) = (&set, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        for i in (CHUNK * t)..(CHUNK * (t + 1)) {
                            assert!(set.add(i));
                        }
                    });
                }
            });

            assert_eq!(set.len(), CHUNK * threads);
            for i in 0..CHUNK * threads {
                assert!(set.contains(&i));
            }

            set.wait_for_resize();
            assert!(set.capacity() > CHUNK * threads);
        }
    });
}

// Exactly one of many threads racing to remove an element succeeds.
#[test]
fn remove_race() {
    const ROUNDS: usize = if cfg!(miri) { 4 } else { 1 << 10 };
    const KEYS: usize = 64;

    with_set(|set| {
        let set = set();
        let threads = threads().clamp(2, 8);

        for round in 0..ROUNDS {
            let base = round * KEYS;
            for i in base..base + KEYS {
                set.add(i);
            }

            let removed: Vec<AtomicUsize> = (0..KEYS).map(|_| AtomicUsize::new(0)).collect();
            let barrier = Barrier::new(threads);
            thread::scope(|s| {
                for _ in 0..threads {
                    s.spawn(|| {
                        barrier.wait();
                        for i in 0..KEYS {
                            if set.remove(&(base + i)) {
                                removed[i].fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    });
                }
            });

            for count in removed {
                assert_eq!(count.into_inner(), 1);
            }
            assert!(set.is_empty());
        }
    });
}

// Threads racing to add the same elements add each exactly once.
#[test]
fn add_race() {
    const ITERATIONS: usize = if cfg!(miri) { 1 } else { 32 };
    const KEYS: usize = if cfg!(miri) { 32 } else { 1 << 12 };

    with_set(|set| {
        for _ in 0..ITERATIONS {
            let set = set();
            let threads = threads().clamp(2, 8);
            let added = AtomicUsize::new(0);
            let barrier = Barrier::new(threads);

            thread::scope(|s| {
                for _ in 0..threads {
                    s.spawn(|| {
                        barrier.wait();
                        for i in 0..KEYS {
                            if set.add(i) {
                                added.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    });
                }
            });

            assert_eq!(added.into_inner(), KEYS);
            assert_eq!(set.len(), KEYS);
        }
    });
}

#[test]
fn mixed_stress() {
    const ITERATIONS: usize = if cfg!(miri) { 1 } else { 16 };
    const CHUNK: usize = if cfg!(miri) { 48 } else { 1 << 12 };

    let run = |barrier: &Barrier, t: usize, set: &HashSet<usize>, threads: usize| {
        barrier.wait();

        let (start, end) = (CHUNK * t, CHUNK * (t + 1));

        for i in start..end {
            assert_eq!(set.pin().add(i), true);
        }

        for i in start..end {
            assert!(set.pin().contains(&i));
        }

        for i in start..end {
            assert_eq!(set.pin().add(i), false);
        }

        for i in start..end {
            assert_eq!(set.pin().remove(&i), true);
        }

        for i in start..end {
            assert!(!set.pin().contains(&i));
        }

        for i in start..end {
            assert_eq!(set.pin().add(i), true);
        }

        for i in start..end {
            assert!(set.pin().contains(&i));
        }

        set.for_each(|&k| assert!(k < CHUNK * threads));
    };

    with_set(|set| {
        for _ in 0..ITERATIONS {
            let set = set();
            let threads = threads().min(8);
            let barrier = Barrier::new(threads);

            thread::scope(|s| {
                for t in 0..threads {
                    let set = &set;
                    let barrier = &barrier;

                    s.spawn(move || run(barrier, t, set, threads));
                }
            });

            let v: Vec<_> = (0..CHUNK * threads).collect();
            let mut got = set.to_vec();
            got.sort();
            assert_eq!(v, got);
        }
    });
}

const SIZE: usize = if cfg!(miri) { 12 } else { 50_000 };

// there must be more things absent than present!
const ABSENT_SIZE: usize = if cfg!(miri) { 1 << 5 } else { 1 << 17 };
const ABSENT_MASK: usize = ABSENT_SIZE - 1;

fn t1<K>(set: &HashSet<K>, keys: &[K], expect: usize)
where
    K: Sync + Send + Clone + Hash + Ord,
{
    let mut sum = 0;
    let iters = 4;
    let set = set.pin();
    for _ in 0..iters {
        for key in keys {
            if set.contains(key) {
                sum += 1;
            }
        }
    }
    assert_eq!(sum, expect * iters);
}

fn t2<K>(set: &HashSet<K>, keys: &[K], expect: usize)
where
    K: Sync + Send + Copy + Hash + Ord,
{
    let mut sum = 0;
    let set = set.pin();
    for key in keys {
        if set.remove(key) {
            sum += 1;
        }
    }
    assert_eq!(sum, expect);
}

fn t3<K>(set: &HashSet<K>, keys: &[K], expect: usize)
where
    K: Sync + Send + Copy + Hash + Ord + 'static,
{
    let mut sum = 0;
    let set = set.pin();
    for key in keys {
        if set.add(*key) {
            sum += 1;
        }
    }
    assert_eq!(sum, expect);
}

fn t5<K>(set: &HashSet<K>, keys: &[K], expect: usize)
where
    K: Sync + Send + Copy + Hash + Ord,
{
    let mut sum = 0;
    let set = set.pin();
    let mut i = keys.len() as isize - 2;
    while i >= 0 {
        if set.remove(&keys[i as usize]) {
            sum += 1;
        }
        i -= 2;
    }
    assert_eq!(sum, expect);
}

fn t6<K>(set: &HashSet<K>, keys1: &[K], keys2: &[K], expect: usize)
where
    K: Sync + Send + Clone + Hash + Ord,
{
    let mut sum = 0;
    let set = set.pin();
    for i in 0..expect {
        if set.contains(&keys1[i]) {
            sum += 1;
        }
        if set.contains(&keys2[i & ABSENT_MASK]) {
            sum += 1;
        }
    }
    assert_eq!(sum, expect);
}

fn t7<K>(set: &HashSet<K>, k1: &[K], k2: &[K])
where
    K: Sync + Send + Copy + Hash + Ord,
{
    let mut sum = 0;
    let set = set.pin();
    for i in 0..k1.len() {
        if set.contains(&k1[i]) {
            sum += 1;
        }
        if set.contains(&k2[i]) {
            sum += 1;
        }
    }
    assert_eq!(sum, k1.len());
}

fn ittest<K>(set: &HashSet<K>, expect: usize)
where
    K: Sync + Send + Copy + Hash + Eq,
{
    let mut sum = 0;
    set.for_each(|_| sum += 1);
    assert_eq!(sum, expect);
}

#[test]
fn everything() {
    let mut rng = rand::thread_rng();

    with_set(|set| {
        let set = set();
        let mut keys: Vec<_> = (0..ABSENT_SIZE + SIZE).collect();
        keys.shuffle(&mut rng);
        let absent_keys = &keys[0..ABSENT_SIZE];
        let keys = &keys[ABSENT_SIZE..];

        // add (absent)
        t3(&set, keys, SIZE);
        // add (present)
        t3(&set, keys, 0);
        // contains (present & absent)
        t7(&set, keys, absent_keys);
        // contains
        t6(&set, keys, absent_keys, SIZE);
        // contains (present)
        t1(&set, keys, SIZE);
        // contains (absent)
        t1(&set, absent_keys, 0);
        // remove (absent)
        t2(&set, absent_keys, 0);
        // remove (present)
        t5(&set, keys, SIZE / 2);
        // add (half present)
        t3(&set, keys, SIZE / 2);
        // for_each (present)
        ittest(&set, SIZE);
    });
}

#![allow(dead_code)]

use striped_set::{HashSet, Inline, Worker};

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

// Run the test on different configurations of a `HashSet`.
pub fn with_set<K>(test: impl FnMut(&dyn Fn() -> HashSet<K>)) {
    with_set_and_hasher::<K, RandomState>(test)
}

// Run the test on different configurations of a `HashSet` with the given hasher.
pub fn with_set_and_hasher<K, S>(mut test: impl FnMut(&dyn Fn() -> HashSet<K, S>))
where
    S: BuildHasher + Default,
{
    // Inline migrations, so every resize completes before the triggering insert returns.
    if !cfg!(striped_stress) {
        test(
            &(|| {
                HashSet::builder()
                    .hasher(S::default())
                    .capacity(4)
                    .executor(Inline)
                    .build()
                    .unwrap()
            }),
        );
    }

    // A single lock and the shared background worker, so every operation contends with
    // every migration.
    test(
        &(|| {
            HashSet::builder()
                .hasher(S::default())
                .capacity(1)
                .build()
                .unwrap()
        }),
    );

    // A dedicated worker with a wider stripe.
    test(
        &(|| {
            HashSet::builder()
                .hasher(S::default())
                .capacity(16)
                .executor(Worker::new("striped-set-test"))
                .build()
                .unwrap()
        }),
    );
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two()
    }
}

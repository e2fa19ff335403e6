//! A concurrent hash set that grows without stopping the world.
//!
//! [`HashSet`] stores its elements in chained buckets protected by a fixed stripe of
//! locks, one lock per bucket of the initial table. Operations on different stripes
//! never contend, and every operation on a single element is linearizable.
//!
//! Once the set is half full, the insert that crossed the threshold schedules a
//! migration to a table of twice the capacity and returns immediately. The migration
//! runs on the set's [`Executor`] and moves elements one bucket at a time, while other
//! threads keep adding, removing and looking up elements in both tables.
//!
//! # Usage
//!
//! ```
//! use striped_set::HashSet;
//!
//! let set = HashSet::new();
//!
//! std::thread::scope(|s| {
//!     for t in 0..4 {
//!         let set = &set;
//!         s.spawn(move || {
//!             for i in 0..1000 {
//!                 set.add(t * 1000 + i);
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(set.len(), 4000);
//! assert!(set.contains(&1234));
//! ```
//!
//! Every operation enters a [`seize`] guard so that retired tables are reclaimed safely.
//! Use [`HashSet::pin`] to amortize the guard over many operations:
//!
//! ```
//! use striped_set::HashSet;
//!
//! let set = HashSet::new();
//! let pinned = set.pin();
//! for i in 0..100 {
//!     pinned.add(i);
//! }
//! assert!(pinned.remove(&42));
//! assert_eq!(pinned.len(), 99);
//! ```
//!
//! # Resizing
//!
//! Migrations run on the process-wide [`Worker`] by default. Pass a different
//! [`Executor`] to [`HashSetBuilder::executor`] to control where they run, such as
//! [`Inline`], which completes every migration before the triggering insert returns.
//! [`HashSet::wait_for_resize`] blocks until the set is quiescent.
//!
//! ```
//! use striped_set::{HashSet, Inline};
//!
//! let set = HashSet::builder().capacity(4).executor(Inline).build().unwrap();
//! for i in 0..8 {
//!     set.add(i);
//! }
//! assert_eq!(set.capacity(), 32);
//! ```
//!
//! The capacity never shrinks.

mod error;
mod executor;
mod raw;
mod set;

#[cfg(feature = "serde")]
mod serde_impls;

pub use error::Error;
pub use executor::{Executor, Inline, Task, Worker};
pub use seize::Guard;
pub use set::{HashSet, HashSetBuilder, HashSetRef};

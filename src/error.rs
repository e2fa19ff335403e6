use std::io;

/// Errors returned when constructing a [`HashSet`](crate::HashSet) or scheduling
/// background work.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The set was configured with an initial capacity of zero.
    #[error("initial capacity must be positive")]
    ZeroCapacity,

    /// The executor refused to run a task.
    #[error("executor rejected the task: {0}")]
    Rejected(&'static str),

    /// The background worker thread could not be spawned.
    #[error("failed to spawn the background worker")]
    Spawn(#[source] io::Error),
}

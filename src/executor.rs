use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::Error;

/// A unit of background work, such as a table migration.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A facility that runs background tasks on behalf of a [`HashSet`](crate::HashSet).
///
/// Resizing a set moves its elements to a larger table in a background task. The set
/// hands that task to its executor and never manages threads itself, so the executor's
/// lifecycle is entirely up to the caller. Executors are expected to be long-lived; a
/// set submits at most one task per resize.
///
/// # Examples
///
/// ```
/// use striped_set::{Error, Executor, HashSet, Task};
///
/// // Run every migration on a fresh thread.
/// struct Detached;
///
/// impl Executor for Detached {
///     fn execute(&self, task: Task) -> Result<(), Error> {
///         std::thread::Builder::new()
///             .spawn(task)
///             .map(drop)
///             .map_err(Error::Spawn)
///     }
/// }
///
/// let set = HashSet::<u64>::builder().executor(Detached).build().unwrap();
/// set.add(1);
/// ```
pub trait Executor: Send + Sync {
    /// Schedules `task` to run at some point in the future.
    ///
    /// Returns an error if the task was not accepted, in which case it is dropped
    /// without running.
    fn execute(&self, task: Task) -> Result<(), Error>;
}

impl<E> Executor for Arc<E>
where
    E: Executor + ?Sized,
{
    fn execute(&self, task: Task) -> Result<(), Error> {
        (**self).execute(task)
    }
}

/// An executor that runs every task to completion on the calling thread.
///
/// With this executor a resize completes before the operation that triggered it
/// returns, which makes growth deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) -> Result<(), Error> {
        task();
        Ok(())
    }
}

/// An executor backed by a single, long-lived background thread.
///
/// Tasks run one at a time in submission order. The thread is spawned on the first
/// submission and exits once the worker is dropped and its queue has drained. A task
/// that panics is logged and does not take the thread down with it.
pub struct Worker {
    name: String,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    spawned: AtomicBool,
}

impl Worker {
    /// Creates a worker whose thread will carry the given name.
    pub fn new(name: impl Into<String>) -> Worker {
        let (sender, receiver) = crossbeam_channel::unbounded();

        Worker {
            name: name.into(),
            sender,
            receiver,
            spawned: AtomicBool::new(false),
        }
    }

    /// Returns the process-wide worker used by sets that were not given an executor.
    pub fn global() -> Arc<Worker> {
        static GLOBAL: OnceLock<Arc<Worker>> = OnceLock::new();

        GLOBAL
            .get_or_init(|| Arc::new(Worker::new("striped-set-worker")))
            .clone()
    }

    /// Returns the name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    // Spawn the worker thread if it is not already running.
    //
    // Tasks sent before the thread starts wait in the channel.
    fn spawn(&self) -> Result<(), Error> {
        if self.spawned.load(Ordering::Acquire)
            || self
                .spawned
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return Ok(());
        }

        let receiver = self.receiver.clone();
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run(&name, receiver));

        if let Err(err) = spawned {
            // Let the next submission try again.
            self.spawned.store(false, Ordering::Release);
            return Err(Error::Spawn(err));
        }

        Ok(())
    }
}

impl Executor for Worker {
    fn execute(&self, task: Task) -> Result<(), Error> {
        self.spawn()?;

        self.sender
            .send(task)
            .map_err(|_| Error::Rejected("worker has shut down"))
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("queued", &self.sender.len())
            .finish()
    }
}

// The worker loop, exits once every sender is gone.
fn run(name: &str, receiver: Receiver<Task>) {
    for task in receiver {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(worker = name, "background task panicked");
        }
    }

    tracing::trace!(worker = name, "worker queue closed");
}

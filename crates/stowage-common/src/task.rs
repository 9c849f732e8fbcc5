//! Thin wrapper for spawning session tasks.

use std::future::Future;

use tokio::task::JoinHandle;

/// Spawns a new asynchronous task
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}

//! Executor and timer primitives.
//!
//! The orchestrator is single-threaded cooperative: every spawned task runs
//! on the same thread as the caller and is only ever suspended at `await`
//! points. All spawns and delays in this crate go through these functions.

use std::{future::Future, time::Duration};

/// Spawns the provided [`Future`] on the current thread.
///
/// # Panics
///
/// If called outside of a `LocalSet` context.
#[inline]
pub fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    drop(tokio::task::spawn_local(fut));
}

/// Resolves after the provided [`Duration`].
#[inline]
pub async fn delay_for(delay: Duration) {
    tokio::time::sleep(delay).await;
}

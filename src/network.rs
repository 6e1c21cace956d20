//! Network reachability supervision.
//!
//! The actual probe (host online/offline primitives plus a race of HEAD
//! requests against well-known reachability endpoints) is an external
//! collaborator behind [`NetworkStatus`]; this module only bounds it with a
//! timeout and hands out change subscriptions.

use std::{rc::Rc, time::Duration};

use futures::{
    future::{self, Either, LocalBoxFuture},
    stream::LocalBoxStream,
};

use crate::platform;

/// Timeout of the reachability probe on the first recovery attempt.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Timeout of the reachability probe on retries.
pub const PROBE_RETRY_TIMEOUT: Duration = Duration::from_millis(2900);

/// Provider of network reachability information.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait NetworkStatus {
    /// Resolves with the current online state, taking at most the provided
    /// timeout to decide.
    fn is_online(&self, timeout: Duration) -> LocalBoxFuture<'static, bool>;

    /// Returns a [`Stream`] of online state transitions.
    ///
    /// Dropping the [`Stream`] unsubscribes.
    ///
    /// [`Stream`]: futures::Stream
    fn on_change(&self) -> LocalBoxStream<'static, bool>;
}

/// Supervisor answering "am I online right now?" within a bounded time.
///
/// A probe that fails to answer within its own timeout is treated as
/// offline.
pub struct NetworkSupervisor {
    /// Underlying reachability provider.
    status: Rc<dyn NetworkStatus>,
}

impl NetworkSupervisor {
    /// Creates a new [`NetworkSupervisor`] over the provided provider.
    #[inline]
    #[must_use]
    pub fn new(status: Rc<dyn NetworkStatus>) -> Self {
        Self { status }
    }

    /// Resolves with the current online state within the provided timeout.
    pub async fn is_online(&self, timeout: Duration) -> bool {
        let probe = self.status.is_online(timeout);
        let deadline = Box::pin(platform::delay_for(timeout));
        match future::select(probe, deadline).await {
            Either::Left((online, _)) => online,
            Either::Right(((), _)) => {
                log::warn!(
                    "network probe missed its {}ms deadline, assuming offline",
                    timeout.as_millis(),
                );
                false
            }
        }
    }

    /// Returns a [`Stream`] of online state transitions.
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    #[must_use]
    pub fn on_change(&self) -> LocalBoxStream<'static, bool> {
        self.status.on_change()
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    struct StalledStatus;

    impl NetworkStatus for StalledStatus {
        fn is_online(&self, _: Duration) -> LocalBoxFuture<'static, bool> {
            Box::pin(future::pending())
        }

        fn on_change(&self) -> LocalBoxStream<'static, bool> {
            Box::pin(stream::pending())
        }
    }

    struct InstantStatus(bool);

    impl NetworkStatus for InstantStatus {
        fn is_online(&self, _: Duration) -> LocalBoxFuture<'static, bool> {
            Box::pin(future::ready(self.0))
        }

        fn on_change(&self) -> LocalBoxStream<'static, bool> {
            Box::pin(stream::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_probe_is_offline() {
        let supervisor = NetworkSupervisor::new(Rc::new(StalledStatus));
        assert!(!supervisor.is_online(PROBE_TIMEOUT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_probe_answer_is_passed_through() {
        let supervisor = NetworkSupervisor::new(Rc::new(InstantStatus(true)));
        assert!(supervisor.is_online(PROBE_TIMEOUT).await);

        let supervisor = NetworkSupervisor::new(Rc::new(InstantStatus(false)));
        assert!(!supervisor.is_online(PROBE_TIMEOUT).await);
    }
}

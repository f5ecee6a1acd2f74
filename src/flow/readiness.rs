//! Conflated readiness signal.

use tokio::sync::Notify;

/// Single-slot, overwrite-on-send notification.
///
/// Transports call [`signal_ready`](Self::signal_ready) from their `on_ready`
/// callback; a sending task parks in [`await_ready`](Self::await_ready) while
/// the transport reports no capacity. Any number of signals between two waits
/// collapse into one wakeup, and a signal with no waiter is remembered until
/// the next wait.
#[derive(Debug, Default)]
pub struct Readiness {
    notify: Notify,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the peer may accept more data. Never blocks.
    pub fn signal_ready(&self) {
        self.notify.notify_one();
    }

    /// Wait until at least one signal arrived since the previous wait returned.
    pub async fn await_ready(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn pending_signal_returns_immediately() {
        let readiness = Readiness::new();
        readiness.signal_ready();

        let mut wait = task::spawn(readiness.await_ready());
        assert_ready!(wait.poll());
    }

    #[test]
    fn wait_without_signal_suspends_until_signalled() {
        let readiness = Readiness::new();

        let mut wait = task::spawn(readiness.await_ready());
        assert_pending!(wait.poll());

        readiness.signal_ready();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn repeated_signals_conflate_into_one_wakeup() {
        let readiness = Readiness::new();
        readiness.signal_ready();
        readiness.signal_ready();
        readiness.signal_ready();

        let mut first = task::spawn(readiness.await_ready());
        assert_ready!(first.poll());

        let mut second = task::spawn(readiness.await_ready());
        assert_pending!(second.poll());
    }
}

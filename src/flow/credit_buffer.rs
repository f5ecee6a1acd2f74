//! Credit-bounded hand-off between a callback source and an async consumer.
//!
//! The transport delivers messages from callbacks that must not block, while
//! the consumer pulls them from async code. This module keeps the two apart
//! with a small shared store and an explicit credit ledger:
//!
//! ```text
//! transport callback ──offer()──► [ queue ] ──next()──► consumer
//!        ▲                                      │
//!        └──────────── request_more() ◄─────────┘  (one credit per hand-off)
//! ```
//!
//! For capacity K the ledger keeps `buffered + outstanding == K` while the
//! source is open: the source starts with K credits, each offer converts a
//! credit into a buffered item, and each hand-off converts a buffered item
//! back into a credit only after the consumer holds it. No item can arrive
//! without a credit, so memory stays bounded by K.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::Stream;
use log::{debug, trace};
use tokio::sync::Notify;

use crate::error::Status;

const LOG_TARGET: &str = "nagare::flow";

type RequestMore = Box<dyn Fn() + Send + Sync>;
type OnTerminalCancel = Box<dyn FnOnce() + Send>;

/// Create a credit-bounded buffer of `capacity` items.
///
/// The source starts with `capacity` credits; granting those initial credits
/// to the transport is the caller's job. After that, `request_more` is
/// invoked once per item handed to the consumer. `on_terminal_cancel` runs
/// at most once, when the consumer gives up before the source finished.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn credit_buffer<T>(
    capacity: usize,
    request_more: impl Fn() + Send + Sync + 'static,
    on_terminal_cancel: impl FnOnce() + Send + 'static,
) -> (CreditSender<T>, CreditReceiver<T>) {
    assert!(capacity >= 1, "credit buffer capacity must be at least 1");

    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            outstanding: capacity,
            capacity,
            terminal: None,
            cancelled: false,
            on_terminal_cancel: Some(Box::new(on_terminal_cancel)),
        }),
        notify: Notify::new(),
        request_more: Box::new(request_more),
    });

    (
        CreditSender {
            shared: Arc::clone(&shared),
        },
        CreditReceiver {
            shared,
            finished: false,
        },
    )
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    request_more: RequestMore,
}

struct State<T> {
    queue: VecDeque<T>,
    /// Credits granted to the source and not yet used.
    outstanding: usize,
    capacity: usize,
    /// `Some(Ok)` after a clean finish, `Some(Err)` after a failure.
    terminal: Option<Result<(), Status>>,
    cancelled: bool,
    on_terminal_cancel: Option<OnTerminalCancel>,
}

impl<T> State<T> {
    fn check_ledger(&self) {
        debug_assert!(
            self.queue.len() + self.outstanding <= self.capacity,
            "credit ledger overflow: buffered={} outstanding={} capacity={}",
            self.queue.len(),
            self.outstanding,
            self.capacity
        );
    }
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Producer half, owned by the transport listener. Never suspends.
pub struct CreditSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> CreditSender<T> {
    /// Hand an item delivered by the transport to the buffer.
    ///
    /// Items offered after the consumer cancelled are discarded.
    ///
    /// # Panics
    ///
    /// Panics when no credit is outstanding: the transport delivered more
    /// than it was granted, which is a broken flow-control integration.
    pub fn offer(&self, item: T) {
        let mut state = self.shared.lock();
        if state.cancelled {
            trace!(target: LOG_TARGET, "Discarding item offered after cancellation");
            return;
        }
        if state.terminal.is_some() {
            debug!(target: LOG_TARGET, "Discarding item offered after close");
            return;
        }
        assert!(
            state.outstanding > 0,
            "transport delivered a message without outstanding credit (capacity {})",
            state.capacity
        );
        state.outstanding -= 1;
        state.queue.push_back(item);
        state.check_ledger();
        trace!(
            target: LOG_TARGET,
            "Offered item: buffered={} outstanding={}",
            state.queue.len(),
            state.outstanding
        );
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Finish the source. Buffered items are still delivered before the
    /// consumer observes the outcome. Only the first close counts.
    pub fn close(&self, outcome: Result<(), Status>) {
        let mut state = self.shared.lock();
        if state.terminal.is_some() || state.cancelled {
            return;
        }
        state.terminal = Some(outcome);
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Whether the consumer has given up.
    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }
}

impl<T> Drop for CreditSender<T> {
    fn drop(&mut self) {
        // A source that disappears without closing must not strand the consumer.
        self.close(Err(Status::cancelled("message source dropped")));
    }
}

/// Consumer half: a single-pass pull sequence.
///
/// Dropping an unfinished receiver cancels it.
pub struct CreditReceiver<T> {
    shared: Arc<Shared<T>>,
    finished: bool,
}

impl<T> CreditReceiver<T> {
    /// Pull the next item.
    ///
    /// Returns `Some(Ok(item))` for each delivered item in FIFO order, then
    /// `Some(Err(status))` once if the source failed, then `None`.
    pub async fn next(&mut self) -> Option<Result<T, Status>> {
        loop {
            if self.finished {
                return None;
            }
            {
                let mut state = self.shared.lock();
                if let Some(item) = state.queue.pop_front() {
                    let replenish = state.terminal.is_none() && !state.cancelled;
                    if replenish {
                        state.outstanding += 1;
                        state.check_ledger();
                    }
                    drop(state);
                    if replenish {
                        (self.shared.request_more)();
                    }
                    return Some(Ok(item));
                }
                if state.cancelled {
                    self.finished = true;
                    return Some(Err(Status::cancelled("receiver cancelled")));
                }
                if let Some(outcome) = state.terminal.clone() {
                    self.finished = true;
                    return match outcome {
                        Ok(()) => None,
                        Err(status) => Some(Err(status)),
                    };
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Cancel the consumer side. Idempotent.
    ///
    /// Buffered items are dropped, further offers are discarded, and the
    /// terminal-cancel callback runs if the source had not finished yet.
    pub fn cancel(&mut self) {
        let callback = {
            let mut state = self.shared.lock();
            if state.cancelled {
                return;
            }
            let source_open = state.terminal.is_none();
            state.cancelled = true;
            state.queue.clear();
            let callback = state.on_terminal_cancel.take();
            if source_open { callback } else { None }
        };
        self.finished = true;
        if let Some(callback) = callback {
            debug!(target: LOG_TARGET, "Consumer cancelled before source finished");
            callback();
        }
    }

    /// Current `(buffered, outstanding)` credit ledger.
    pub fn ledger(&self) -> (usize, usize) {
        let state = self.shared.lock();
        (state.queue.len(), state.outstanding)
    }

    /// Adapt into a `Stream` of results.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Status>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut rx| async move {
            rx.next().await.map(|item| (item, rx))
        })
    }
}

impl<T> Drop for CreditReceiver<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    fn counting_buffer<T>(
        capacity: usize,
    ) -> (
        CreditSender<T>,
        CreditReceiver<T>,
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
    ) {
        let requested = Arc::new(AtomicUsize::new(0));
        let cancels = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&requested);
        let c = Arc::clone(&cancels);
        let (tx, rx) = credit_buffer(
            capacity,
            move || {
                r.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        (tx, rx, requested, cancels)
    }

    #[tokio::test]
    async fn items_arrive_in_order_then_end() {
        let (tx, mut rx, _, _) = counting_buffer(3);
        tx.offer(1);
        tx.offer(2);
        tx.offer(3);
        tx.close(Ok(()));

        assert_eq!(rx.next().await.unwrap().unwrap(), 1);
        assert_eq!(rx.next().await.unwrap().unwrap(), 2);
        assert_eq!(rx.next().await.unwrap().unwrap(), 3);
        assert!(rx.next().await.is_none());
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn credit_is_replenished_only_after_hand_off() {
        let (tx, mut rx, requested, _) = counting_buffer(2);
        tx.offer("a");
        tx.offer("b");
        assert_eq!(requested.load(Ordering::SeqCst), 0);
        assert_eq!(rx.ledger(), (2, 0));

        assert_eq!(rx.next().await.unwrap().unwrap(), "a");
        assert_eq!(requested.load(Ordering::SeqCst), 1);
        assert_eq!(rx.ledger(), (1, 1));
    }

    #[test]
    #[should_panic(expected = "without outstanding credit")]
    fn offer_beyond_credit_panics() {
        let (tx, _rx, _, _) = counting_buffer(1);
        tx.offer(1);
        tx.offer(2);
    }

    #[test]
    fn next_suspends_until_offer() {
        let (tx, mut rx, _, _) = counting_buffer::<u32>(1);

        let mut pull = task::spawn(rx.next());
        assert_pending!(pull.poll());

        tx.offer(7);
        assert!(pull.is_woken());
        let item = assert_ready!(pull.poll());
        assert_eq!(item.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn failure_is_reported_after_buffered_items() {
        let (tx, mut rx, _, _) = counting_buffer(2);
        tx.offer(1);
        tx.close(Err(Status::unavailable("peer went away")));

        assert_eq!(rx.next().await.unwrap().unwrap(), 1);
        let err = rx.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn first_close_wins() {
        let (tx, mut rx, _, _) = counting_buffer::<u8>(1);
        tx.close(Err(Status::internal("first")));
        tx.close(Ok(()));

        let err = rx.next().await.unwrap().unwrap_err();
        assert_eq!(err.message(), "first");
    }

    #[test]
    fn cancel_runs_terminal_callback_once_and_discards_offers() {
        let (tx, mut rx, requested, cancels) = counting_buffer(1);
        tx.offer(1);

        rx.cancel();
        rx.cancel();
        drop(rx);

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert!(tx.is_cancelled());
        // No credit left, but offers after cancellation are discarded rather
        // than treated as violations.
        tx.offer(2);
        tx.offer(3);
        assert_eq!(requested.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_after_source_finished_skips_callback() {
        let (tx, mut rx, _, cancels) = counting_buffer::<u8>(1);
        tx.close(Ok(()));
        rx.cancel();
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_sender_fails_consumer() {
        let (tx, mut rx, _, _) = counting_buffer::<u8>(1);
        drop(tx);
        let err = rx.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn into_stream_yields_items() {
        use futures::StreamExt;

        let (tx, rx, _, _) = counting_buffer(2);
        tx.offer(10);
        tx.offer(20);
        tx.close(Ok(()));

        let items: Vec<_> = rx.into_stream().map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![10, 20]);
    }

    /// Drive a credit-respecting producer against a slow consumer for several
    /// capacities and check the ledger never exceeds capacity and order holds.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ledger_stays_bounded_under_concurrent_delivery() {
        for capacity in [1usize, 2, 3, 8] {
            const TOTAL: usize = 200;
            let credits = Arc::new(tokio::sync::Semaphore::new(0));
            let grant = Arc::clone(&credits);
            let (tx, mut rx) = credit_buffer::<usize>(capacity, move || grant.add_permits(1), || {});
            credits.add_permits(capacity);

            let producer = tokio::spawn(async move {
                for i in 0..TOTAL {
                    let permit = credits.acquire().await.unwrap();
                    permit.forget();
                    tx.offer(i);
                }
                tx.close(Ok(()));
            });

            let mut expected = 0;
            while let Some(item) = rx.next().await {
                let (buffered, outstanding) = rx.ledger();
                assert!(
                    buffered + outstanding <= capacity,
                    "ledger {buffered}+{outstanding} exceeds {capacity}"
                );
                assert_eq!(item.unwrap(), expected);
                expected += 1;
                if expected % 7 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
            assert_eq!(expected, TOTAL);
            producer.await.unwrap();
        }
    }
}

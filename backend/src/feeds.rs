//! Broadcast feeds for chain events.
//!
//! Each feed keeps a registry of per-subscriber bounded senders. Publishing
//! never waits: a subscriber whose queue is full misses that value (counted
//! on its [Subscription::missed]), and a subscriber whose receiver is gone
//! is pruned.

use crate::metrics::BackendMetrics;
use meridian_types::{ChainEvent, Log, NewTxsEvent, RemovedLogsEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};

trait Registry: Send + Sync {
    fn remove(&self, id: u64) -> bool;

    fn contains(&self, id: u64) -> bool;
}

struct Slot<T> {
    sender: mpsc::Sender<T>,
    missed: Arc<AtomicU64>,
}

struct Subscribers<T> {
    name: &'static str,
    senders: Mutex<HashMap<u64, Slot<T>>>,
}

impl<T> Subscribers<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Slot<T>>> {
        match self.senders.lock() {
            Ok(senders) => senders,
            Err(poisoned) => {
                tracing::warn!(feed = self.name, "feed registry lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl<T: Send> Registry for Subscribers<T> {
    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn contains(&self, id: u64) -> bool {
        self.lock().contains_key(&id)
    }
}

/// Handle returned by [Feed::subscribe]. Dropping it unsubscribes.
///
/// Values already queued on the subscriber's receiver stay readable after
/// unsubscribing; the receiver then reports the channel as closed.
#[must_use = "dropping the subscription unsubscribes"]
pub struct Subscription {
    id: u64,
    feed: &'static str,
    registry: Weak<dyn Registry>,
    missed: Arc<AtomicU64>,
    cancelled: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn feed(&self) -> &'static str {
        self.feed
    }

    /// Values skipped because this subscriber's queue was full. A consumer
    /// that sees this grow knows its stream has gaps.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Whether the feed still delivers to this subscriber. Turns false after
    /// unsubscribing or once the feed pruned a closed receiver.
    pub fn is_active(&self) -> bool {
        !self.cancelled
            && self
                .registry
                .upgrade()
                .is_some_and(|registry| registry.contains(self.id))
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                tracing::debug!(feed = self.feed, subscriber = self.id, "unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct Feed<T> {
    subscribers: Arc<Subscribers<T>>,
    next_id: AtomicU64,
    metrics: Arc<BackendMetrics>,
}

impl<T: Clone + Send + 'static> Feed<T> {
    pub fn new(name: &'static str, metrics: Arc<BackendMetrics>) -> Self {
        Self {
            subscribers: Arc::new(Subscribers {
                name,
                senders: Mutex::new(HashMap::new()),
            }),
            next_id: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn name(&self) -> &'static str {
        self.subscribers.name
    }

    pub fn subscribe(&self, sender: mpsc::Sender<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let missed = Arc::new(AtomicU64::new(0));
        self.subscribers.lock().insert(
            id,
            Slot {
                sender,
                missed: Arc::clone(&missed),
            },
        );
        tracing::debug!(feed = self.name(), subscriber = id, "subscribed");
        let registry: Arc<dyn Registry> = self.subscribers.clone();
        Subscription {
            id,
            feed: self.name(),
            registry: Arc::downgrade(&registry),
            missed,
            cancelled: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `value` to every subscriber without waiting. Returns how many
    /// subscribers received it.
    pub fn send(&self, value: T) -> usize {
        // Snapshot so subscribers can register or leave while we deliver.
        let targets: Vec<(u64, mpsc::Sender<T>, Arc<AtomicU64>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, slot)| (*id, slot.sender.clone(), Arc::clone(&slot.missed)))
            .collect();

        let mut delivered = 0;
        for (id, sender, missed) in targets {
            match sender.try_send(value.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let missed = missed.fetch_add(1, Ordering::Relaxed) + 1;
                    self.metrics.inc_feed_dropped_full();
                    tracing::warn!(
                        feed = self.name(),
                        subscriber = id,
                        missed,
                        "subscriber queue full; dropping value"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    if self.subscribers.remove(id) {
                        self.metrics.inc_feed_pruned_closed();
                        tracing::debug!(
                            feed = self.name(),
                            subscriber = id,
                            "pruned closed subscriber"
                        );
                    }
                }
            }
        }
        self.metrics.add_feed_delivered(delivered as u64);
        delivered
    }
}

/// The four feeds exposed to subscribers.
pub struct EventFeeds {
    chain_head: Feed<ChainEvent>,
    logs: Feed<Vec<Log>>,
    removed_logs: Feed<RemovedLogsEvent>,
    new_txs: Feed<NewTxsEvent>,
    buffer: usize,
}

impl EventFeeds {
    pub fn new(buffer: usize, metrics: Arc<BackendMetrics>) -> Self {
        Self {
            chain_head: Feed::new("chain_head", Arc::clone(&metrics)),
            logs: Feed::new("logs", Arc::clone(&metrics)),
            removed_logs: Feed::new("removed_logs", Arc::clone(&metrics)),
            new_txs: Feed::new("new_txs", metrics),
            buffer,
        }
    }

    /// A channel sized with the configured subscriber buffer.
    pub fn channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.buffer)
    }

    pub fn subscribe_chain_event(&self, sender: mpsc::Sender<ChainEvent>) -> Subscription {
        self.chain_head.subscribe(sender)
    }

    pub fn subscribe_logs_event(&self, sender: mpsc::Sender<Vec<Log>>) -> Subscription {
        self.logs.subscribe(sender)
    }

    pub fn subscribe_removed_logs_event(
        &self,
        sender: mpsc::Sender<RemovedLogsEvent>,
    ) -> Subscription {
        self.removed_logs.subscribe(sender)
    }

    pub fn subscribe_new_txs_event(&self, sender: mpsc::Sender<NewTxsEvent>) -> Subscription {
        self.new_txs.subscribe(sender)
    }

    pub fn publish_chain_event(&self, event: ChainEvent) -> usize {
        self.chain_head.send(event)
    }

    /// Empty batches are not published.
    pub fn publish_logs(&self, logs: Vec<Log>) -> usize {
        if logs.is_empty() {
            return 0;
        }
        self.logs.send(logs)
    }

    pub fn publish_removed_logs(&self, event: RemovedLogsEvent) -> usize {
        if event.logs.is_empty() {
            return 0;
        }
        self.removed_logs.send(event)
    }

    pub fn publish_new_txs(&self, event: NewTxsEvent) -> usize {
        self.new_txs.send(event)
    }

    /// Publish a committed block: its logs first, then the new head.
    pub fn publish_block(&self, event: ChainEvent) {
        self.publish_logs(event.logs.clone());
        self.publish_chain_event(event);
    }

    pub fn chain_head(&self) -> &Feed<ChainEvent> {
        &self.chain_head
    }

    pub fn logs(&self) -> &Feed<Vec<Log>> {
        &self.logs
    }

    pub fn removed_logs(&self) -> &Feed<RemovedLogsEvent> {
        &self.removed_logs
    }

    pub fn new_txs(&self) -> &Feed<NewTxsEvent> {
        &self.new_txs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{Block, PendingTransaction, B256, Bytes};
    use std::sync::atomic::AtomicBool;

    fn feed() -> (Feed<u64>, Arc<BackendMetrics>) {
        let metrics = Arc::new(BackendMetrics::default());
        (Feed::new("test", Arc::clone(&metrics)), metrics)
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_in_order() {
        let (feed, _) = feed();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let _a = feed.subscribe(tx_a);
        let _b = feed.subscribe(tx_b);

        for value in 0..3 {
            assert_eq!(feed.send(value), 2);
        }
        for rx in [&mut rx_a, &mut rx_b] {
            for expected in 0..3 {
                assert_eq!(rx.recv().await, Some(expected));
            }
        }
    }

    #[tokio::test]
    async fn unsubscribed_receiver_keeps_buffered_values() {
        let (feed, _) = feed();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let sub_a = feed.subscribe(tx_a);
        let _sub_b = feed.subscribe(tx_b);

        feed.send(1);
        assert!(sub_a.is_active());
        sub_a.unsubscribe();
        assert_eq!(feed.send(2), 1);

        assert_eq!(rx_a.recv().await, Some(1));
        assert_eq!(rx_a.recv().await, None);
        assert_eq!(rx_b.recv().await, Some(1));
        assert_eq!(rx_b.recv().await, Some(2));
    }

    #[tokio::test]
    async fn dropping_handle_unsubscribes() {
        let (feed, _) = feed();
        let (tx, _rx) = mpsc::channel(1);
        {
            let _sub = feed.subscribe(tx);
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(feed.send(1), 0);
    }

    #[tokio::test]
    async fn full_subscriber_misses_value_without_blocking_others() {
        let (feed, metrics) = feed();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = feed.subscribe(slow_tx);
        let fast = feed.subscribe(fast_tx);

        assert_eq!(feed.send(1), 2);
        assert_eq!(feed.send(2), 1);
        assert_eq!(feed.send(3), 1);
        assert!(slow.is_active());
        assert_eq!(slow.missed(), 2);
        assert_eq!(fast.missed(), 0);

        assert_eq!(slow_rx.recv().await, Some(1));
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(fast_rx.recv().await, Some(1));
        assert_eq!(fast_rx.recv().await, Some(2));
        assert_eq!(fast_rx.recv().await, Some(3));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.feed_dropped_full, 2);
        assert_eq!(snapshot.feed_delivered, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stable_subscriber_sees_every_value_while_others_churn() {
        const VALUES: u64 = 10_000;
        let (feed, _) = feed();
        let feed = Arc::new(feed);
        let (tx, mut rx) = mpsc::channel(VALUES as usize);
        let stable = feed.subscribe(tx);
        let done = Arc::new(AtomicBool::new(false));

        let churn = {
            let feed = Arc::clone(&feed);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut cycles = 0u64;
                loop {
                    let (tx, _rx) = mpsc::channel(1);
                    let sub = feed.subscribe(tx);
                    if cycles % 2 == 0 {
                        sub.unsubscribe();
                    } else {
                        drop(sub);
                    }
                    cycles += 1;
                    if done.load(Ordering::Relaxed) {
                        break cycles;
                    }
                }
            })
        };

        let producer = {
            let feed = Arc::clone(&feed);
            tokio::task::spawn_blocking(move || {
                for value in 0..VALUES {
                    feed.send(value);
                }
            })
        };
        producer.await.unwrap();
        done.store(true, Ordering::Relaxed);
        assert!(churn.join().unwrap() > 0);

        for expected in 0..VALUES {
            assert_eq!(rx.recv().await, Some(expected));
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(stable.missed(), 0);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn discarded_subscription_closes_its_receiver() {
        let (feed, _) = feed();
        let (tx, mut rx) = mpsc::channel(1);
        drop(feed.subscribe(tx));
        assert_eq!(feed.send(1), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn closed_receiver_is_pruned() {
        let (feed, metrics) = feed();
        let (tx, rx) = mpsc::channel(4);
        let sub = feed.subscribe(tx);
        drop(rx);

        assert_eq!(feed.send(1), 0);
        assert_eq!(feed.subscriber_count(), 0);
        assert!(!sub.is_active());
        assert_eq!(metrics.snapshot().feed_pruned_closed, 1);
    }

    #[tokio::test]
    async fn handle_outliving_feed_is_harmless() {
        let (feed, _) = feed();
        let (tx, _rx) = mpsc::channel(1);
        let sub = feed.subscribe(tx);
        drop(feed);
        assert!(!sub.is_active());
        drop(sub);
    }

    #[tokio::test]
    async fn event_feeds_are_independent() {
        let feeds = EventFeeds::new(4, Arc::new(BackendMetrics::default()));
        let (head_tx, mut head_rx) = feeds.channel();
        let (logs_tx, mut logs_rx) = feeds.channel();
        let (txs_tx, mut txs_rx) = feeds.channel();
        let _head = feeds.subscribe_chain_event(head_tx);
        let logs_sub = feeds.subscribe_logs_event(logs_tx);
        let _txs = feeds.subscribe_new_txs_event(txs_tx);

        logs_sub.unsubscribe();
        let block = Block {
            number: 1,
            hash: B256::repeat_byte(1),
            ..Default::default()
        };
        feeds.publish_block(ChainEvent::new(block, vec![Log::default()]));
        feeds.publish_new_txs(NewTxsEvent {
            txs: vec![PendingTransaction {
                hash: B256::repeat_byte(2),
                raw: Bytes::from_static(b"tx"),
            }],
        });

        assert_eq!(head_rx.recv().await.unwrap().block.number, 1);
        assert_eq!(logs_rx.recv().await, None);
        assert_eq!(txs_rx.recv().await.unwrap().txs.len(), 1);
    }

    #[test]
    fn empty_log_batches_are_skipped() {
        let feeds = EventFeeds::new(4, Arc::new(BackendMetrics::default()));
        let (tx, mut rx) = feeds.channel();
        let _sub = feeds.subscribe_logs_event(tx);
        assert_eq!(feeds.publish_logs(vec![]), 0);
        assert_eq!(feeds.publish_removed_logs(RemovedLogsEvent::default()), 0);
        assert!(rx.try_recv().is_err());
    }
}

//! SubscriberRegistry - identifier ごとの購読者
//!
//! - 通知は登録順（BTreeMap のキー = 登録連番）
//! - `release()` で明示的に外れる。drop されただけの購読は次の通知で掃除
//! - 空になった identifier のエントリは消す

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::domain::{Identifier, StatusEvent};

type Senders = HashMap<Identifier, BTreeMap<u64, UnboundedSender<StatusEvent>>>;

#[derive(Default)]
struct Inner {
    senders: RwLock<Senders>,
    next_key: AtomicU64,
}

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Inner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, id: &Identifier) -> Subscription {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .senders
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .insert(key, tx);
        tracing::debug!(id = %id, key, "subscriber registered");
        Subscription {
            id: id.clone(),
            key,
            rx,
            registry: self.clone(),
        }
    }

    /// Deliver `event` to every live subscriber of `id`; returns how many got it.
    pub async fn notify(&self, id: &Identifier, event: StatusEvent) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;
        {
            let senders = self.inner.senders.read().await;
            let Some(set) = senders.get(id) else {
                return 0;
            };
            for (key, tx) in set {
                match tx.send(event) {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(*key),
                }
            }
        }

        if !closed.is_empty() {
            let mut senders = self.inner.senders.write().await;
            if let Some(set) = senders.get_mut(id) {
                for key in &closed {
                    set.remove(key);
                }
                if set.is_empty() {
                    senders.remove(id);
                }
            }
        }

        tracing::debug!(id = %id, delivered, pruned = closed.len(), status = ?event.status, "notified subscribers");
        delivered
    }

    pub async fn count(&self, id: &Identifier) -> usize {
        self.inner
            .senders
            .read()
            .await
            .get(id)
            .map_or(0, BTreeMap::len)
    }

    pub async fn total(&self) -> usize {
        self.inner
            .senders
            .read()
            .await
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    async fn remove(&self, id: &Identifier, key: u64) {
        let mut senders = self.inner.senders.write().await;
        if let Some(set) = senders.get_mut(id) {
            set.remove(&key);
            if set.is_empty() {
                senders.remove(id);
            }
        }
    }
}

/// A live observer on one identifier.
pub struct Subscription {
    id: Identifier,
    key: u64,
    rx: UnboundedReceiver<StatusEvent>,
    registry: SubscriberRegistry,
}

impl Subscription {
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Next terminal event; `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for callers that only want to peek.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Unregister (observer disconnect).
    pub async fn release(self) {
        self.registry.remove(&self.id, self.key).await;
        tracing::debug!(id = %self.id, key = self.key, "subscriber released");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> Identifier {
        Identifier::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_event_once() {
        let registry = SubscriberRegistry::new();
        let mut a = registry.subscribe(&id("ST002")).await;
        let mut b = registry.subscribe(&id("ST002")).await;
        let mut other = registry.subscribe(&id("ST003")).await;

        assert_eq!(registry.notify(&id("ST002"), StatusEvent::complete()).await, 2);

        assert_eq!(a.recv().await, Some(StatusEvent::complete()));
        assert_eq!(b.recv().await, Some(StatusEvent::complete()));
        assert_eq!(a.try_recv(), None);
        assert_eq!(other.try_recv(), None);
    }

    #[tokio::test]
    async fn release_prunes_empty_sets() {
        let registry = SubscriberRegistry::new();
        let a = registry.subscribe(&id("ST001")).await;
        let b = registry.subscribe(&id("ST001")).await;
        assert_eq!(registry.count(&id("ST001")).await, 2);

        a.release().await;
        assert_eq!(registry.count(&id("ST001")).await, 1);
        b.release().await;
        assert_eq!(registry.total().await, 0);
        assert_eq!(registry.notify(&id("ST001"), StatusEvent::error()).await, 0);
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned_on_notify() {
        let registry = SubscriberRegistry::new();
        let dropped = registry.subscribe(&id("ST001")).await;
        let mut kept = registry.subscribe(&id("ST001")).await;
        drop(dropped);

        assert_eq!(registry.notify(&id("ST001"), StatusEvent::error()).await, 1);
        assert_eq!(registry.count(&id("ST001")).await, 1);
        assert_eq!(kept.recv().await, Some(StatusEvent::error()));
    }
}

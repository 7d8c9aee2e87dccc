//! Prefix-keyed change notifications.
//!
//! Every committed set/delete is published to every subscription whose
//! prefix matches the item's key. Channels are bounded: a full channel
//! blocks the publisher. That is a deliberate limitation carried over from
//! the source design, not an oversight — a slow subscriber throttles
//! writers rather than unbounded memory growth silently piling up behind it.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use crate::item::Item;

/// Opaque handle returned by [Subscriptions::subscribe], used to
/// unsubscribe one specific channel without tearing down the whole prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

struct Subscription {
    channels: Vec<(ChannelId, SyncSender<Item>)>,
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    by_prefix: HashMap<String, Subscription>,
    next_id: u64,
}

impl Subscriptions {
    pub(crate) fn new() -> Subscriptions {
        Subscriptions { by_prefix: HashMap::new(), next_id: 0 }
    }

    pub(crate) fn subscribe(&mut self, prefix: impl Into<String>, capacity: usize) -> (ChannelId, Receiver<Item>) {
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        let (tx, rx) = sync_channel(capacity.max(1));
        self.by_prefix
            .entry(prefix.into())
            .or_insert_with(|| Subscription { channels: Vec::new() })
            .channels
            .push((id, tx));
        (id, rx)
    }

    /// `channel = None` drops every channel subscribed under `prefix`;
    /// `Some(id)` drops only that one. Receivers still holding their end
    /// simply observe the channel close (`recv` returns `Err`).
    pub(crate) fn unsubscribe(&mut self, prefix: &str, channel: Option<ChannelId>) {
        match channel {
            None => {
                self.by_prefix.remove(prefix);
            }
            Some(id) => {
                if let Some(sub) = self.by_prefix.get_mut(prefix) {
                    sub.channels.retain(|(cid, _)| *cid != id);
                    if sub.channels.is_empty() {
                        self.by_prefix.remove(prefix);
                    }
                }
            }
        }
    }

    /// Publishes to every subscription whose prefix matches `item.key`.
    /// A closed receiver (subscriber dropped) is pruned opportunistically.
    pub(crate) fn publish(&mut self, item: &Item) {
        for (prefix, sub) in self.by_prefix.iter_mut() {
            if !item.key.starts_with(prefix.as_str()) {
                continue;
            }
            sub.channels.retain(|(_, ch)| ch.send(item.clone()).is_ok());
        }
    }
}

//! Channel registry.
//!
//! Maps channel ids to live channels so other parts of the server can
//! address a peer by id.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         ChannelPool          │
//! │  ┌────────────────────────┐  │
//! │  │ "a1" → Arc<Channel>    │  │
//! │  │ "b7" → Arc<Channel>    │  │
//! │  │ "c3" → Arc<Channel>    │  │
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```
//!
//! The pool only stores references. Removing a channel does not close it and
//! closing a channel does not remove it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::Channel;

// ============================================================================
// ChannelPool
// ============================================================================

/// Concurrent id → channel map.
///
/// # Example
///
/// ```ignore
/// let pool = ChannelPool::new();
/// pool.add(Arc::clone(&channel));
///
/// if let Some(channel) = pool.get("a1") {
///     channel.push(payload).await?;
/// }
///
/// pool.del(channel.id());
/// ```
#[derive(Debug, Default)]
pub struct ChannelPool {
    channels: RwLock<FxHashMap<String, Arc<Channel>>>,
}

// ============================================================================
// ChannelPool - Constructor
// ============================================================================

impl ChannelPool {
    /// Creates an empty pool.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool sized for `capacity` channels.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
        }
    }
}

// ============================================================================
// ChannelPool - Public API
// ============================================================================

impl ChannelPool {
    /// Registers `channel` under its id, replacing any previous entry.
    pub fn add(&self, channel: Arc<Channel>) {
        let id = channel.id().to_owned();
        if id.is_empty() {
            warn!("Registering channel with empty id");
        }

        let replaced = self.channels.write().insert(id.clone(), channel);
        debug!(channel_id = %id, replaced = replaced.is_some(), "Channel added to pool");
    }

    /// Removes the entry for `id`, if any. The channel is left open.
    pub fn del(&self, id: &str) {
        if self.channels.write().remove(id).is_some() {
            debug!(channel_id = %id, "Channel removed from pool");
        }
    }

    /// Returns the channel registered under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.read().get(id).cloned()
    }

    /// Returns a snapshot of all registered channels, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Channel>> {
        self.channels.read().values().cloned().collect()
    }

    /// Returns `true` if a channel is registered under `id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.channels.read().contains_key(id)
    }

    /// Returns the number of registered channels.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Returns `true` if no channels are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Removes and returns every registered channel. None of them are closed.
    pub fn drain(&self) -> Vec<Arc<Channel>> {
        let drained: Vec<_> = self.channels.write().drain().map(|(_, c)| c).collect();
        debug!(count = drained.len(), "Channel pool drained");
        drained
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use tokio::io::{DuplexStream, duplex};

    use crate::channel::ChannelConfig;
    use crate::conn::FramedConn;

    fn channel(id: &str) -> (Arc<Channel>, DuplexStream) {
        let (local, remote) = duplex(1024);
        let channel = Channel::new(id, Box::new(FramedConn::new(local)), ChannelConfig::default())
            .expect("channel");
        (channel, remote)
    }

    #[tokio::test]
    async fn test_add_get_del() {
        let pool = ChannelPool::new();
        let (a, _ra) = channel("a");

        pool.add(Arc::clone(&a));
        assert!(pool.contains("a"));
        assert_eq!(pool.len(), 1);

        let got = pool.get("a").expect("registered");
        assert!(Arc::ptr_eq(&got, &a));

        pool.del("a");
        assert!(pool.get("a").is_none());
        assert!(pool.is_empty());
        assert!(!a.is_closed());

        // Deleting an unknown id is a no-op.
        pool.del("missing");
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let pool = ChannelPool::with_capacity(4);
        let (first, _r1) = channel("dup");
        let (second, _r2) = channel("dup");

        pool.add(Arc::clone(&first));
        pool.add(Arc::clone(&second));

        assert_eq!(pool.len(), 1);
        assert!(Arc::ptr_eq(&pool.get("dup").expect("registered"), &second));
    }

    #[tokio::test]
    async fn test_empty_id_is_stored() {
        let pool = ChannelPool::new();
        let (anon, _r) = channel("");

        pool.add(anon);
        assert!(pool.contains(""));
    }

    #[tokio::test]
    async fn test_concurrent_add_del_snapshot() {
        let pool = Arc::new(ChannelPool::new());
        let mut streams = Vec::new();
        let mut tasks = Vec::new();

        for i in 0..32 {
            let (ch, remote) = channel(&format!("ch-{i}"));
            streams.push(remote);

            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                pool.add(Arc::clone(&ch));
                let _ = pool.all();
                if i % 2 == 0 {
                    pool.del(ch.id());
                }
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        let snapshot = pool.all();
        assert_eq!(snapshot.len(), 16);

        let ids: HashSet<_> = snapshot.iter().map(|c| c.id().to_owned()).collect();
        assert_eq!(ids.len(), snapshot.len());
        assert!(ids.iter().all(|id| {
            let n: u32 = id.trim_start_matches("ch-").parse().expect("index");
            n % 2 == 1
        }));
    }

    #[tokio::test]
    async fn test_drain_leaves_channels_open() {
        let pool = ChannelPool::new();
        let (a, _ra) = channel("a");
        let (b, _rb) = channel("b");
        pool.add(a);
        pool.add(b);

        let drained = pool.drain();
        assert_eq!(drained.len(), 2);
        assert!(pool.is_empty());
        assert!(drained.iter().all(|c| !c.is_closed()));
    }
}

//! Per-connection channel actors and the channel registry.
//!
//! # Architecture
//!
//! ```text
//!  push() ─┐                      ┌──────────── Channel ─────────────┐
//!  push() ─┼─► bounded queue ───► │ writer task ──► write half ──────┼──► peer
//!  push() ─┘   (backpressure)     │                                  │
//!                                 │ read_loop ◄──── read half ◄──────┼─── peer
//!                                 └──────┬───────────────────────────┘
//!                                        │ data frames (bounded in-flight)
//!                                        ▼
//!                                 MessageListener::receive(agent, payload)
//! ```
//!
//! A [`Channel`] owns one [`Conn`](crate::conn::Conn). Its writer task is
//! started at construction and lives until [`Channel::close`]; the read loop
//! is driven by whoever owns the connection. [`ChannelPool`] is a plain
//! concurrent registry and never manages channel lifecycle.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Timeouts and queue sizes |
//! | `core` | The channel actor |
//! | `pool` | Concurrent id → channel registry |

// ============================================================================
// Submodules
// ============================================================================

/// Channel configuration.
pub mod config;

/// Channel actor: writer task, read loop, push, close.
pub mod core;

/// Concurrent registry of live channels.
pub mod pool;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::config::ChannelConfig;
pub use self::core::Channel;
pub use self::pool::ChannelPool;

// ============================================================================
// Capabilities
// ============================================================================

/// Minimal addressable endpoint: something with an id that accepts pushes.
///
/// Higher-level session and broadcast logic addresses peers through this.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> &str;

    /// Queues `payload` for delivery to the peer.
    async fn push(&self, payload: Bytes) -> Result<()>;
}

/// Receives inbound data payloads dispatched by [`Channel::read_loop`].
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// Handles one payload. `source` is the channel it arrived on and the
    /// natural reply target.
    async fn receive(&self, source: Arc<dyn Agent>, payload: Bytes);
}

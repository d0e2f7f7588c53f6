//! End-to-end tests over real loopback sockets.
//!
//! A server accepts one connection, wraps it in a [`Channel`], registers it
//! in a [`ChannelPool`] and echoes every payload back through the pool.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use comet_gateway::{
    Agent, Channel, ChannelConfig, ChannelPool, Conn, Error, Frame, FrameRead, FrameWrite,
    FramedConn, MessageListener, OpCode, Role, Transport, WsConn,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Helpers
// ============================================================================

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("comet_gateway=debug")),
            )
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}

/// Replies to the sender through the pool lookup, not the source handle.
struct PoolEcho {
    pool: Arc<ChannelPool>,
}

#[async_trait]
impl MessageListener for PoolEcho {
    async fn receive(&self, source: Arc<dyn Agent>, payload: Bytes) {
        if let Some(channel) = self.pool.get(source.id()) {
            let _ = channel.push(payload).await;
        }
    }
}

/// Serves exactly one connection; resolves with the read loop outcome.
fn serve_one(
    listener: TcpListener,
    pool: Arc<ChannelPool>,
    websocket: bool,
) -> JoinHandle<comet_gateway::Result<()>> {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let conn: Box<dyn Conn> = if websocket {
            Box::new(WsConn::accept(stream).await?)
        } else {
            Box::new(FramedConn::new(stream))
        };

        let channel = Channel::with_generated_id(conn, ChannelConfig::default())?;
        pool.add(Arc::clone(&channel));

        let echo = Arc::new(PoolEcho {
            pool: Arc::clone(&pool),
        });
        let result = channel.read_loop(echo).await;

        pool.del(channel.id());
        let _ = channel.shutdown().await;
        result
    })
}

async fn echo_round_trips(client: &mut dyn Conn) -> Result<()> {
    for i in 0..10u8 {
        let payload = vec![i; usize::from(i) + 1];
        client.write_frame(Frame::binary(payload.clone())).await?;
        client.flush().await?;

        let reply = timeout(Duration::from_secs(5), client.read_frame()).await??;
        assert_eq!(reply, Frame::binary(payload));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_framed_echo_over_tcp() -> Result<()> {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let pool = Arc::new(ChannelPool::new());
    let server = serve_one(listener, Arc::clone(&pool), false);

    let mut client = FramedConn::connect(addr).await?;
    assert_eq!(client.transport(), Transport::Framed);
    echo_round_trips(&mut client).await?;
    assert_eq!(pool.len(), 1);

    client.write_frame(Frame::close()).await?;
    let outcome = timeout(Duration::from_secs(5), server).await??;
    assert!(matches!(outcome, Err(Error::RemoteClose { .. })));
    assert!(pool.is_empty());

    let eof = timeout(Duration::from_secs(5), client.read_frame()).await?;
    assert!(matches!(eof, Err(Error::ConnectionClosed)));
    Ok(())
}

#[tokio::test]
async fn test_websocket_echo_over_tcp() -> Result<()> {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let pool = Arc::new(ChannelPool::new());
    let server = serve_one(listener, Arc::clone(&pool), true);

    let mut client = WsConn::connect(format!("ws://{addr}/")).await?;
    assert_eq!(client.transport(), Transport::WebSocket(Role::Client));
    echo_round_trips(&mut client).await?;

    client.write_frame(Frame::ping()).await?;
    let pong = timeout(Duration::from_secs(5), client.read_frame()).await??;
    assert_eq!(pong.opcode(), OpCode::Pong);

    // Next frame must be the echo, not a second Pong.
    client.write_frame(Frame::binary("after-ping")).await?;
    let next = timeout(Duration::from_secs(5), client.read_frame()).await??;
    assert_eq!(next, Frame::binary("after-ping"));

    client.write_frame(Frame::close()).await?;
    let outcome = timeout(Duration::from_secs(5), server).await??;
    assert!(matches!(outcome, Err(Error::RemoteClose { .. })));
    assert!(pool.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_server_push_reaches_client() -> Result<()> {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let accept: JoinHandle<comet_gateway::Result<Arc<Channel>>> = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        Channel::new("pushed", Box::new(FramedConn::new(stream)), ChannelConfig::default())
    });

    let mut client = FramedConn::connect(addr).await?;
    let channel = accept.await??;

    for i in 0..20u32 {
        channel.push(Bytes::from(i.to_be_bytes().to_vec())).await?;
    }
    channel.shutdown().await?;

    for i in 0..20u32 {
        let frame = client.read_frame().await?;
        assert_eq!(frame.opcode(), OpCode::Binary);
        assert_eq!(frame.payload().map(|p| p.to_vec()), Some(i.to_be_bytes().to_vec()));
    }
    assert!(matches!(client.read_frame().await, Err(Error::ConnectionClosed)));
    Ok(())
}

//! Connection runner: open, write one request, read one reply, close.
//! Every outbound exchange runs under a watchdog; when it fires the socket is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use wordlink_core::wire::{self, FrameDecodeError, FrameEncodeError, Reply, Request};
use wordlink_core::{Command, PeerAddress, TransportEvent};

use crate::context::TransportContext;

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("connect to {peer}: {source}")]
    Connect {
        peer: PeerAddress,
        source: std::io::Error,
    },
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("watchdog fired")]
    Timeout,
    #[error("peer closed mid-frame")]
    Closed,
    #[error("decode: {0}")]
    Decode(#[from] FrameDecodeError),
    #[error("encode: {0}")]
    Encode(#[from] FrameEncodeError),
}

/// One request/reply exchange with a peer.
pub trait Link: Send + Sync + 'static {
    fn exchange(
        &self,
        peer: &PeerAddress,
        request: &Request,
        watchdog: Duration,
    ) -> impl Future<Output = Result<Reply, ConnError>> + Send;
}

/// Exchanges over TCP; the peer address is `host:port`.
pub struct TcpLink {
    ctx: Arc<TransportContext>,
}

impl TcpLink {
    pub fn new(ctx: Arc<TransportContext>) -> Self {
        Self { ctx }
    }

    /// Open a socket and write the version + command header.
    async fn connect(&self, peer: &PeerAddress, cmd: Command) -> Result<TcpStream, ConnError> {
        tracing::debug!("connecting to {peer} to send {cmd}");
        self.ctx.adapter.cancel_discovery();
        let attempt = async {
            let mut stream = TcpStream::connect(peer.as_str()).await?;
            stream.set_nodelay(true)?;
            stream.write_all(&wire::encode_header(cmd)).await?;
            Ok::<_, std::io::Error>(stream)
        };
        match attempt.await {
            Ok(stream) => Ok(stream),
            Err(source) => {
                let errors = self.ctx.record_error();
                tracing::warn!("connect to {peer} failed ({errors} errors so far): {source}");
                self.ctx.post(TransportEvent::ConnectFailed {
                    peer: peer.clone(),
                    errors,
                });
                Err(ConnError::Connect {
                    peer: peer.clone(),
                    source,
                })
            }
        }
    }
}

impl Link for TcpLink {
    async fn exchange(
        &self,
        peer: &PeerAddress,
        request: &Request,
        watchdog: Duration,
    ) -> Result<Reply, ConnError> {
        let body = wire::encode_request_body(request)?;
        let cmd = request.command();
        let run = async {
            let mut stream = self.connect(peer, cmd).await?;
            stream.write_all(&body).await?;
            stream.flush().await?;
            read_reply(&mut stream, cmd).await
        };
        match tokio::time::timeout(watchdog, run).await {
            Ok(result) => result,
            Err(_) => {
                let errors = self.ctx.record_error();
                tracing::warn!("{cmd} to {peer}: no reply within {watchdog:?} ({errors} errors so far)");
                Err(ConnError::Timeout)
            }
        }
    }
}

/// Read the single reply frame to a request of kind `request`.
pub async fn read_reply<R>(reader: &mut R, request: Command) -> Result<Reply, ConnError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(2);
    loop {
        match wire::decode_reply(request, &buf) {
            Ok((reply, _)) => return Ok(reply),
            Err(FrameDecodeError::NeedMore) => {}
            Err(e) => return Err(e.into()),
        }
        let mut byte = [0u8; 1];
        if reader.read(&mut byte).await? == 0 {
            return Err(ConnError::Closed);
        }
        buf.push(byte[0]);
    }
}

/// Read a request body after the header. The whole body must arrive or the request is dropped.
pub async fn read_request_body<R>(reader: &mut R, cmd: Command) -> Result<Request, ConnError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match wire::decode_request_body(cmd, &buf) {
            Ok((request, _)) => return Ok(request),
            Err(FrameDecodeError::NeedMore) => {}
            Err(e) => return Err(e.into()),
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(ConnError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Write the reply frame and close our side.
pub async fn write_reply<W>(writer: &mut W, reply: &Reply) -> Result<(), ConnError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&wire::encode_reply(reply)).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

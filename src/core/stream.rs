//! The user-facing stream API.
//!
//! This module provides the `Stream` struct: message-oriented `send`/`recv`
//! plus `AsyncRead` and `AsyncWrite` for a familiar byte-stream interface over
//! the reliable connection.
//!
//! 面向用户的流 API。
//!
//! 此模块提供 `Stream` 结构体：面向消息的 `send`/`recv`，以及 `AsyncRead` 和
//! `AsyncWrite`，为可靠连接提供熟悉的字节流接口。

use crate::core::endpoint::{ConnectionStatus, StreamCommand};
use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio::sync::{oneshot, watch};

type Reserve = Pin<
    Box<dyn Future<Output = std::result::Result<OwnedPermit<StreamCommand>, mpsc::error::SendError<()>>> + Send>,
>;

/// A reliable, ordered connection to one peer.
///
/// Messages written with `send` arrive at the peer as one `recv` each. The
/// `AsyncWrite` side splits writes into messages of at most
/// `max_payload_size` bytes, and `AsyncRead` concatenates what arrives.
///
/// 到一个对端的可靠、有序连接。
///
/// 通过 `send` 写入的每条消息在对端对应一次 `recv`。`AsyncWrite` 将写入拆分为
/// 不超过 `max_payload_size` 字节的消息，`AsyncRead` 则将到达的数据拼接起来。
pub struct Stream {
    /// Sends commands to the `Endpoint` task.
    tx_to_endpoint: mpsc::Sender<StreamCommand>,
    /// Receives ordered, reliable data from the `Endpoint` task.
    rx_from_endpoint: mpsc::Receiver<Vec<Bytes>>,
    status: watch::Receiver<ConnectionStatus>,
    remote_addr: SocketAddr,
    max_payload_size: usize,
    /// Received messages waiting to be read by the user.
    read_buffer: VecDeque<Bytes>,
    /// An in-progress wait for room in the command channel. Only reached
    /// through `&mut self`; the mutex keeps `Stream` `Sync`.
    reserve: Mutex<Option<Reserve>>,
    /// An in-progress graceful shutdown.
    shutdown: Option<oneshot::Receiver<Result<()>>>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("remote_addr", &self.remote_addr)
            .field("status", &*self.status.borrow())
            .field("buffered", &self.read_buffer.len())
            .finish()
    }
}

impl Stream {
    pub(crate) fn new(
        tx_to_endpoint: mpsc::Sender<StreamCommand>,
        rx_from_endpoint: mpsc::Receiver<Vec<Bytes>>,
        status: watch::Receiver<ConnectionStatus>,
        remote_addr: SocketAddr,
        max_payload_size: usize,
    ) -> Self {
        Self {
            tx_to_endpoint,
            rx_from_endpoint,
            status,
            remote_addr,
            max_payload_size: max_payload_size.max(1),
            read_buffer: VecDeque::new(),
            reserve: Mutex::new(None),
            shutdown: None,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// The latest status published by the endpoint.
    /// 端点最近发布的状态。
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Checks if the connection is closed or its endpoint task has ended.
    pub fn is_closed(&self) -> bool {
        self.status().is_closed() || self.tx_to_endpoint.is_closed()
    }

    /// Waits until the handshake completes. Fails if the connection closes
    /// first, e.g. because the SYN was never answered.
    ///
    /// 等待握手完成。如果连接先关闭（例如SYN始终没有得到应答）则失败。
    pub async fn wait_established(&self) -> Result<()> {
        let mut status = self.status.clone();
        let current = *status
            .wait_for(|status| *status != ConnectionStatus::Connecting)
            .await
            .map_err(|_| Error::ChannelClosed)?;
        match current.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Sends one message. Waits for the handshake and for room in the send
    /// queue; returns once the message is queued, not once it is acknowledged.
    ///
    /// 发送一条消息。等待握手完成以及发送队列中的空间；消息进入队列后即返回，
    /// 而不是在被确认之后。
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        if payload.len() > self.max_payload_size {
            return Err(Error::MessageTooLarge);
        }
        self.wait_established().await?;

        let (reply, response) = oneshot::channel();
        self.tx_to_endpoint
            .send(StreamCommand::Send {
                payload,
                reply: Some(reply),
            })
            .await
            .map_err(|_| self.closed_error())?;
        response.await.map_err(|_| self.closed_error())?
    }

    /// Receives the next message, or `None` once the connection is closed and
    /// everything delivered has been read.
    ///
    /// 接收下一条消息；当连接已关闭且所有已交付的数据都被读取后返回 `None`。
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            if let Some(message) = self.read_buffer.pop_front() {
                return Some(message);
            }
            let batch = self.rx_from_endpoint.recv().await?;
            self.read_buffer.extend(batch);
        }
    }

    /// Closes after everything queued so far has been acknowledged.
    ///
    /// 在目前已排队的所有内容都被确认后关闭。
    pub async fn finish(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.tx_to_endpoint
            .send(StreamCommand::Finish { reply: Some(reply) })
            .await
            .map_err(|_| self.closed_error())?;
        response.await.map_err(|_| self.closed_error())?
    }

    /// Closes immediately. Unacknowledged data is discarded.
    ///
    /// 立即关闭，未确认的数据将被丢弃。
    pub async fn close(&self) {
        // An endpoint that is already gone is closed anyway.
        let _ = self.tx_to_endpoint.send(StreamCommand::Close).await;
    }

    fn closed_error(&self) -> Error {
        self.status().error().unwrap_or(Error::ChannelClosed)
    }

    /// Waits for room for one command.
    fn poll_permit(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<OwnedPermit<StreamCommand>>> {
        let tx = &self.tx_to_endpoint;
        let slot = match self.reserve.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let reserve = slot.get_or_insert_with(|| Box::pin(tx.clone().reserve_owned()));
        let result = ready!(reserve.as_mut().poll(cx));
        *slot = None;
        Poll::Ready(result.map_err(|_| std::io::ErrorKind::BrokenPipe.into()))
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if let Some(e) = self.status().error() {
            return Poll::Ready(Err(e.into()));
        }

        let permit = ready!(self.poll_permit(cx))?;
        let len = buf.len().min(self.max_payload_size);
        permit.send(StreamCommand::Send {
            payload: Bytes::copy_from_slice(&buf[..len]),
            reply: None,
        });
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// Requests a graceful finish and waits for it.
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.shutdown.is_none() {
            if self.status().is_closed() {
                return Poll::Ready(Ok(()));
            }
            let permit = ready!(self.poll_permit(cx))?;
            let (reply, response) = oneshot::channel();
            permit.send(StreamCommand::Finish { reply: Some(reply) });
            self.shutdown = Some(response);
        }

        let Some(response) = self.shutdown.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(Pin::new(response).poll(cx));
        self.shutdown = None;
        match result {
            Ok(Ok(())) => Poll::Ready(Ok(())),
            Ok(Err(e)) => Poll::Ready(Err(e.into())),
            // The endpoint ended without answering; it is closed either way.
            Err(_) => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            // Serve leftover data from previous messages first.
            while let Some(chunk) = this.read_buffer.front_mut() {
                let len = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..len]);
                chunk.advance(len);
                if chunk.is_empty() {
                    this.read_buffer.pop_front();
                }
                if buf.remaining() == 0 {
                    return Poll::Ready(Ok(()));
                }
            }
            if !buf.filled().is_empty() {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx_from_endpoint.poll_recv(cx)) {
                Some(batch) => this.read_buffer.extend(batch),
                // Channel closed: end of stream.
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

//! Traits for abstracting over datagram socket implementations.
use crate::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// An asynchronous datagram socket.
///
/// The protocol only needs to send and receive whole datagrams, so anything
/// with UDP-like semantics can carry it. Tests use this to put lossy or
/// in-memory links under a `QuicSocket`.
///
/// 异步数据报套接字。
///
/// 协议只需要收发完整的数据报，因此任何具有类UDP语义的实现都可以承载它。
/// 测试借此在 `QuicSocket` 之下放置有损或内存链路。
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    /// Sends one datagram to the given address.
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize>;

    /// Receives a single datagram.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Returns the local address that this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        UdpSocket::send_to(self, buf, target).await.map_err(Into::into)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await.map_err(Into::into)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        UdpSocket::local_addr(self).map_err(Into::into)
    }
}

/// A datagram socket that can be created by binding to a local address.
///
/// 可通过绑定本地地址创建的数据报套接字。
#[async_trait]
pub trait BindableDatagramSocket: DatagramSocket + Sized {
    /// Binds a new socket to the given address.
    /// 将新套接字绑定到给定地址。
    async fn bind(addr: SocketAddr) -> Result<Self>;
}

#[async_trait]
impl BindableDatagramSocket for UdpSocket {
    async fn bind(addr: SocketAddr) -> Result<Self> {
        UdpSocket::bind(addr).await.map_err(Into::into)
    }
}

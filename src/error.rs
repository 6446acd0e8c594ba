//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::packet::PacketError;
use thiserror::Error;

/// The primary error type for the QUIC-style transport.
/// QUIC 风格传输协议的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O error occurred. A missing route surfaces here.
    /// 发生了底层的I/O错误。路由不可达也在此处体现。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred during address parsing.
    /// 地址解析期间发生错误。
    #[error("Address parsing error: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    /// A received packet was invalid and could not be decoded.
    /// 接收到的包无效，无法解码。
    #[error("Invalid packet received: {0}")]
    InvalidPacket(#[from] PacketError),

    /// The connection has been closed locally.
    /// 连接已在本地关闭。
    #[error("Connection closed")]
    ConnectionClosed,

    /// The handshake or the retransmission timer gave up.
    /// 握手或重传定时器已放弃。
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Data was submitted before any connection attempt was made.
    /// 在任何连接尝试之前提交了数据。
    #[error("Connection not established")]
    NotConnected,

    /// The handshake has not completed yet; the caller should wait.
    /// 握手尚未完成，调用方应等待。
    #[error("Handshake still in progress")]
    HandshakeInProgress,

    /// A connection to this peer already exists on the socket.
    /// 该套接字上已存在到此对端的连接。
    #[error("A connection to this peer already exists")]
    ConnectionExists,

    /// The send queue is at capacity. Retry after acknowledgments arrive.
    /// 发送队列已满。请在收到确认后重试。
    #[error("Send queue is full")]
    SendQueueFull,

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("Internal channel is broken")]
    ChannelClosed,

    /// The provided message is larger than the configured `max_payload_size`.
    /// 提供的消息大于配置的 `max_payload_size`。
    #[error("the message is too large to be sent")]
    MessageTooLarge,
}

impl Error {
    /// Whether the operation may succeed if retried later.
    /// 稍后重试时操作是否可能成功。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::SendQueueFull | Error::HandshakeInProgress | Error::Io(_)
        )
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::Io(e) => e,
            Error::AddressParse(e) => std::io::Error::new(ErrorKind::InvalidInput, e),
            Error::InvalidPacket(e) => std::io::Error::new(ErrorKind::InvalidData, e),
            Error::ConnectionClosed => ErrorKind::ConnectionReset.into(),
            Error::ConnectionTimeout => ErrorKind::TimedOut.into(),
            Error::NotConnected => ErrorKind::NotConnected.into(),
            Error::HandshakeInProgress => ErrorKind::WouldBlock.into(),
            Error::ConnectionExists => ErrorKind::AddrInUse.into(),
            Error::SendQueueFull => ErrorKind::WouldBlock.into(),
            Error::ChannelClosed => ErrorKind::BrokenPipe.into(),
            Error::MessageTooLarge => ErrorKind::InvalidInput.into(),
        }
    }
}

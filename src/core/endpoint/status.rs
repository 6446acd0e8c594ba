//! The connection status published by an endpoint task.

use crate::{core::connection::CloseReason, error::Error};
use std::fmt;

/// What a `Stream` can observe about its connection.
///
/// `Stream` 能够观察到的连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The handshake has not completed.
    /// 握手尚未完成。
    Connecting,
    Established,
    Closed(CloseReason),
}

impl ConnectionStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionStatus::Closed(_))
    }

    /// The error an operation on a closed connection reports.
    /// 对已关闭连接执行操作时报告的错误。
    pub fn error(&self) -> Option<Error> {
        match self {
            ConnectionStatus::Closed(reason) if reason.is_timeout() => Some(Error::ConnectionTimeout),
            ConnectionStatus::Closed(_) => Some(Error::ConnectionClosed),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Established => f.write_str("established"),
            ConnectionStatus::Closed(reason) => write!(f, "closed ({reason:?})"),
        }
    }
}

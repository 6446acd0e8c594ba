//! Commands understood by the socket actor and the sender task.

use crate::{config::Config, core::stream::Stream, error::Result};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Commands sent to the `SocketActor`.
///
/// 发送给 `SocketActor` 的命令。
#[derive(Debug)]
pub enum SocketActorCommand {
    /// Open a connection to `remote_addr`. The stream is returned at once;
    /// the handshake runs in the background.
    /// 打开到 `remote_addr` 的连接。流会立即返回，握手在后台进行。
    Connect {
        remote_addr: SocketAddr,
        config: Config,
        response_tx: oneshot::Sender<Result<Stream>>,
    },
    /// Sent by an endpoint task when it ends. Only removes the entry if it
    /// still belongs to `conn_id`.
    /// 由端点任务在结束时发送。仅当条目仍属于 `conn_id` 时才会移除。
    RemoveConnection { remote_addr: SocketAddr, conn_id: u64 },
}

/// One encoded datagram for the sender task.
///
/// 交给发送任务的一个已编码数据报。
#[derive(Debug, Clone)]
pub struct SendCommand {
    pub remote_addr: SocketAddr,
    pub datagram: Bytes,
}

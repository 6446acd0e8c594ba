//! The endpoint of a connection: the task that owns one `Connection`.
//!
//! An `Endpoint` is the only place a connection's state is touched. Network
//! packets, stream commands and timer expiries all arrive as messages on its
//! channels and are handled one at a time, so a timer never interleaves with
//! packet or application processing.
//!
//! 连接的端点：拥有一个 `Connection` 的任务。
//!
//! `Endpoint` 是唯一会修改连接状态的地方。网络包、流命令与定时器到期都以消息的
//! 形式到达其通道，并逐一处理，因此定时器永远不会与包处理或应用处理交错执行。

mod command;
mod event_loop;
mod status;


pub use command::StreamCommand;
pub use status::ConnectionStatus;

use crate::{
    config::Config,
    core::{
        connection::{Connection, Role},
        stream::Stream,
    },
    error::Result,
    packet::Packet,
    socket::{SendCommand, SocketActorCommand},
    timer::{TimerFired, TimerScheduler},
};
use bytes::Bytes;
use std::{collections::VecDeque, net::SocketAddr};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tracing::trace;

/// The channels an endpoint shares with the socket layer.
///
/// 端点与套接字层共享的通道。
#[derive(Debug)]
pub struct EndpointChannels {
    /// Decoded packets routed to this connection.
    /// 路由到此连接的已解码包。
    pub packet_rx: mpsc::Receiver<Packet>,
    /// Outgoing datagrams for the sender task.
    /// 发往发送任务的外发数据报。
    pub send_tx: mpsc::Sender<SendCommand>,
    /// Lets the endpoint deregister itself when it exits.
    /// 让端点在退出时注销自身。
    pub socket_tx: mpsc::Sender<SocketActorCommand>,
}

/// Removes the connection from the socket's table when the endpoint task
/// ends, however it ends.
///
/// 无论端点任务以何种方式结束，都将连接从套接字的连接表中移除。
struct ConnectionCleaner {
    remote_addr: SocketAddr,
    conn_id: u64,
    socket_tx: mpsc::Sender<SocketActorCommand>,
}

impl Drop for ConnectionCleaner {
    fn drop(&mut self) {
        // Best effort; a closed actor has nothing left to clean.
        if let Err(e) = self.socket_tx.try_send(SocketActorCommand::RemoveConnection {
            remote_addr: self.remote_addr,
            conn_id: self.conn_id,
        }) {
            trace!(cid = self.conn_id, "failed to send remove command during drop: {}", e);
        }
    }
}

/// A message waiting for room in the send queue or for the handshake.
#[derive(Debug)]
struct PendingSend {
    payload: Bytes,
    reply: Option<oneshot::Sender<Result<()>>>,
}

/// Represents one end of a connection and drives it from a tokio task.
///
/// 代表连接的一端，并在一个 tokio 任务中驱动它。
pub struct Endpoint {
    connection: Connection,
    remote_addr: SocketAddr,

    scheduler: TimerScheduler,
    timer_rx: mpsc::Receiver<TimerFired>,
    packet_rx: mpsc::Receiver<Packet>,
    command_rx: mpsc::Receiver<StreamCommand>,
    /// False once every `Stream` handle is gone.
    commands_open: bool,
    to_stream: Option<mpsc::Sender<Vec<Bytes>>>,
    send_tx: mpsc::Sender<SendCommand>,
    socket_tx: mpsc::Sender<SocketActorCommand>,
    status_tx: watch::Sender<ConnectionStatus>,

    backlog: VecDeque<PendingSend>,
    finishing: bool,
    finish_waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Endpoint {
    /// Creates the endpoint of an outbound connection. The SYN goes out when
    /// `run` starts.
    ///
    /// 创建出站连接的端点。`run` 启动时发送SYN。
    pub fn new_client(
        config: Config,
        conn_id: u64,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        channels: EndpointChannels,
    ) -> (Self, Stream) {
        Self::new(Role::Client, config, conn_id, local_addr, remote_addr, channels)
    }

    /// Creates the endpoint of an inbound connection. The caller queues the
    /// peer's SYN on `channels.packet_rx` before spawning it.
    ///
    /// 创建入站连接的端点。调用方在派生任务之前将对端的SYN放入 `channels.packet_rx`。
    pub fn new_server(
        config: Config,
        conn_id: u64,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        channels: EndpointChannels,
    ) -> (Self, Stream) {
        Self::new(Role::Server, config, conn_id, local_addr, remote_addr, channels)
    }

    fn new(
        role: Role,
        config: Config,
        conn_id: u64,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        channels: EndpointChannels,
    ) -> (Self, Stream) {
        let capacity = config.connection.stream_channel_capacity.max(1);
        let max_payload_size = config.connection.max_payload_size;
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (to_stream, from_endpoint) = mpsc::channel(capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (scheduler, timer_rx) = TimerScheduler::new(capacity);

        let connection = Connection::new(role, conn_id, config, Instant::now())
            .with_ports(local_addr.port(), remote_addr.port());

        let endpoint = Self {
            connection,
            remote_addr,
            scheduler,
            timer_rx,
            packet_rx: channels.packet_rx,
            command_rx,
            commands_open: true,
            to_stream: Some(to_stream),
            send_tx: channels.send_tx,
            socket_tx: channels.socket_tx,
            status_tx,
            backlog: VecDeque::new(),
            finishing: false,
            finish_waiters: Vec::new(),
        };
        let stream = Stream::new(
            command_tx,
            from_endpoint,
            status_rx,
            remote_addr,
            max_payload_size,
        );
        (endpoint, stream)
    }

    pub fn conn_id(&self) -> u64 {
        self.connection.conn_id()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

//! The user-facing socket API: `QuicSocket` and `Listener`.

use super::{
    actor::{ConnectionTable, SocketActor},
    sender::sender_task,
    BindableDatagramSocket, DatagramSocket, SocketActorCommand,
};
use crate::{
    config::Config,
    core::stream::Stream,
    error::{Error, Result},
};
use dashmap::DashMap;
use std::{marker::PhantomData, net::SocketAddr, sync::Arc};
use tokio::{
    net::UdpSocket,
    sync::{mpsc, oneshot},
};
use tracing::info;

/// Capacity of the actor's command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 128;
/// Capacity of the sender task's queue, shared by every connection.
const SEND_CHANNEL_CAPACITY: usize = 1024;
/// Connections accepted but not yet taken by `Listener::accept`.
const ACCEPT_BACKLOG: usize = 128;

/// A listener for incoming connections.
///
/// 传入连接的监听器。
#[derive(Debug)]
pub struct Listener {
    pub(crate) accept_rx: mpsc::Receiver<(Stream, SocketAddr)>,
}

impl Listener {
    /// Waits for a new incoming connection. The returned stream may still be
    /// completing its handshake; `Stream::wait_established` waits for it.
    ///
    /// 等待一个新的传入连接。返回的流可能仍在完成握手；可用
    /// `Stream::wait_established` 等待。
    pub async fn accept(&mut self) -> Result<(Stream, SocketAddr)> {
        self.accept_rx.recv().await.ok_or(Error::ChannelClosed)
    }
}

/// A handle to the socket actor. Cloning it is cheap; every clone drives
/// the same socket.
///
/// socket actor 的句柄。克隆开销很小，所有克隆都驱动同一个套接字。
pub struct QuicSocket<S: DatagramSocket = UdpSocket> {
    command_tx: mpsc::Sender<SocketActorCommand>,
    connections: ConnectionTable,
    local_addr: SocketAddr,
    config: Arc<Config>,
    _marker: PhantomData<S>,
}

impl<S: DatagramSocket> Clone for QuicSocket<S> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            connections: self.connections.clone(),
            local_addr: self.local_addr,
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S: BindableDatagramSocket> QuicSocket<S> {
    /// Binds a new socket to the given address with the default configuration.
    ///
    /// 使用默认配置将新套接字绑定到给定地址。
    pub async fn bind(addr: SocketAddr) -> Result<(Self, Listener)> {
        Self::bind_with_config(addr, Config::default()).await
    }

    /// Binds a new socket; `config` applies to every accepted connection and
    /// is the default for outbound ones.
    ///
    /// 绑定新套接字；`config` 应用于所有接受的连接，并作为出站连接的默认配置。
    pub async fn bind_with_config(addr: SocketAddr, config: Config) -> Result<(Self, Listener)> {
        let socket = S::bind(addr).await?;
        Self::from_socket(socket, config)
    }
}

impl<S: DatagramSocket> QuicSocket<S> {
    /// Starts the actor and the sender task on an existing socket.
    ///
    /// 在现有套接字上启动 actor 和发送任务。
    pub fn from_socket(socket: S, config: Config) -> Result<(Self, Listener)> {
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let config = Arc::new(config);
        let connections: ConnectionTable = Arc::new(DashMap::new());

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (send_tx, send_rx) = mpsc::channel(SEND_CHANNEL_CAPACITY);
        let (accept_tx, accept_rx) = mpsc::channel(ACCEPT_BACKLOG);

        tokio::spawn(sender_task(socket.clone(), send_rx));

        let actor = SocketActor {
            socket,
            local_addr,
            connections: connections.clone(),
            config: config.clone(),
            send_tx,
            accept_tx,
            command_rx,
            command_tx: command_tx.downgrade(),
        };
        info!(addr = %local_addr, "socket actor created and running");
        tokio::spawn(actor.run());

        let handle = Self {
            command_tx,
            connections,
            local_addr,
            config,
            _marker: PhantomData,
        };
        Ok((handle, Listener { accept_rx }))
    }

    /// Opens a connection to `remote_addr` with the socket's configuration.
    /// Returns as soon as the SYN is scheduled; the handshake finishes in the
    /// background.
    ///
    /// 使用套接字的配置打开到 `remote_addr` 的连接。SYN 调度后立即返回，握手在
    /// 后台完成。
    pub async fn connect(&self, remote_addr: SocketAddr) -> Result<Stream> {
        self.connect_with_config(remote_addr, Config::clone(&self.config))
            .await
    }

    /// Opens a connection with its own configuration.
    ///
    /// 使用独立配置打开连接。
    pub async fn connect_with_config(&self, remote_addr: SocketAddr, config: Config) -> Result<Stream> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SocketActorCommand::Connect {
            remote_addr,
            config,
            response_tx,
        };
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| Error::ChannelClosed)?;
        response_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections the socket currently routes packets to.
    /// 套接字当前为之路由包的连接数。
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

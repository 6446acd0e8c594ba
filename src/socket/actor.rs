//! The `SocketActor`: owns the receive side of the socket and the table of
//! live connections.
//!
//! `SocketActor`：拥有套接字的接收端以及活动连接表。

use super::{DatagramSocket, SendCommand, SocketActorCommand};
use crate::{
    config::Config,
    core::{
        endpoint::{Endpoint, EndpointChannels},
        stream::Stream,
    },
    error::{Error, Result},
    packet::{Body, Packet},
};
use bytes::Bytes;
use dashmap::DashMap;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, trace, warn};

/// Largest datagram the actor will read.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Metadata associated with each connection managed by a `QuicSocket`.
///
/// 与每个由 `QuicSocket` 管理的连接相关联的元数据。
#[derive(Debug)]
pub(crate) struct ConnectionMeta {
    pub(crate) conn_id: u64,
    /// The channel sender to the connection's `Endpoint` task.
    /// 到连接 `Endpoint` 任务的通道发送端。
    pub(crate) sender: mpsc::Sender<Packet>,
}

pub(crate) type ConnectionTable = Arc<DashMap<SocketAddr, ConnectionMeta>>;

/// The actor that reads the socket and routes packets to endpoint tasks by
/// remote address.
///
/// 读取套接字并按远程地址将包路由到端点任务的 actor。
pub(crate) struct SocketActor<S: DatagramSocket> {
    pub(crate) socket: Arc<S>,
    pub(crate) local_addr: SocketAddr,
    pub(crate) connections: ConnectionTable,
    pub(crate) config: Arc<Config>,
    pub(crate) send_tx: mpsc::Sender<SendCommand>,
    pub(crate) accept_tx: mpsc::Sender<(Stream, SocketAddr)>,
    pub(crate) command_rx: mpsc::Receiver<SocketActorCommand>,
    /// Handed to endpoints in upgraded form. The actor itself never keeps the
    /// channel open, so it stops once every `QuicSocket` handle and every
    /// endpoint is gone.
    ///
    /// 以升级后的形式交给端点。actor 自身不保持通道打开，因此当所有
    /// `QuicSocket` 句柄与端点都消失后它就会停止。
    pub(crate) command_tx: mpsc::WeakSender<SocketActorCommand>,
}

impl<S: DatagramSocket> SocketActor<S> {
    /// Runs the actor's main event loop.
    ///
    /// 运行 actor 的主事件循环。
    pub(crate) async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_actor_command(command),
                    None => {
                        info!(addr = %self.local_addr, "all socket handles and endpoints dropped, socket actor stopping");
                        break;
                    }
                },
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, remote_addr)) => {
                        let datagram = Bytes::copy_from_slice(&buf[..len]);
                        self.handle_datagram(datagram, remote_addr);
                    }
                    Err(e) => {
                        // e.g. ICMP port unreachable surfaced by the OS.
                        debug!(error = %e, "socket receive failed");
                    }
                },
            }
        }
    }

    fn handle_actor_command(&mut self, command: SocketActorCommand) {
        match command {
            SocketActorCommand::Connect {
                remote_addr,
                config,
                response_tx,
            } => self.handle_connect(remote_addr, config, response_tx),
            SocketActorCommand::RemoveConnection {
                remote_addr,
                conn_id,
            } => {
                if self
                    .connections
                    .remove_if(&remote_addr, |_, meta| meta.conn_id == conn_id)
                    .is_some()
                {
                    info!(addr = %remote_addr, cid = conn_id, "connection removed");
                } else {
                    debug!(addr = %remote_addr, cid = conn_id, "connection already replaced or removed");
                }
            }
        }
    }

    fn handle_connect(
        &mut self,
        remote_addr: SocketAddr,
        config: Config,
        response_tx: oneshot::Sender<Result<Stream>>,
    ) {
        if self.connections.contains_key(&remote_addr) {
            let _ = response_tx.send(Err(Error::ConnectionExists));
            return;
        }

        let conn_id = loop {
            let id: u64 = rand::random();
            if id != 0 {
                break id;
            }
        };
        let (packet_tx, packet_rx) = mpsc::channel(config.connection.stream_channel_capacity.max(1));
        let Some(channels) = self.channels(packet_rx) else {
            let _ = response_tx.send(Err(Error::ChannelClosed));
            return;
        };
        let (endpoint, stream) =
            Endpoint::new_client(config, conn_id, self.local_addr, remote_addr, channels);
        self.connections.insert(
            remote_addr,
            ConnectionMeta {
                conn_id,
                sender: packet_tx,
            },
        );

        info!(addr = %remote_addr, cid = conn_id, "spawning endpoint task for outbound connection");
        tokio::spawn(endpoint.run());
        let _ = response_tx.send(Ok(stream));
    }

    fn handle_datagram(&mut self, datagram: Bytes, remote_addr: SocketAddr) {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(addr = %remote_addr, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        // Clone the sender out so no map guard is held while routing.
        let existing = self
            .connections
            .get(&remote_addr)
            .map(|meta| (meta.conn_id, meta.sender.clone()));

        match existing {
            Some((conn_id, _))
                if matches!(packet.body, Body::Syn)
                    && packet.header.connection_id != conn_id =>
            {
                // The peer restarted with a fresh connection id.
                info!(
                    addr = %remote_addr,
                    old_cid = conn_id,
                    new_cid = packet.header.connection_id,
                    "replacing connection on new SYN"
                );
                self.connections.remove(&remote_addr);
                self.accept(packet, remote_addr);
            }
            Some((conn_id, sender)) => {
                trace!(addr = %remote_addr, cid = conn_id, "routing packet to endpoint");
                // Never wait on one endpoint: a full channel loses the packet
                // and the peer retransmits it.
                match sender.try_send(packet) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!(addr = %remote_addr, cid = conn_id, "endpoint busy, dropping packet");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(addr = %remote_addr, cid = conn_id, "endpoint gone, removing connection");
                        self.connections
                            .remove_if(&remote_addr, |_, meta| meta.conn_id == conn_id);
                    }
                }
            }
            None if matches!(packet.body, Body::Syn) => self.accept(packet, remote_addr),
            None => {
                debug!(
                    addr = %remote_addr,
                    cid = packet.header.connection_id,
                    "ignoring packet from unknown peer"
                );
            }
        }
    }

    /// Creates the server side of a connection from its first SYN.
    fn accept(&mut self, syn: Packet, remote_addr: SocketAddr) {
        if syn.header.version != self.config.protocol_version {
            warn!(
                addr = %remote_addr,
                version = syn.header.version,
                "rejecting SYN with unsupported protocol version"
            );
            return;
        }
        let permit = match self.accept_tx.try_reserve() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(addr = %remote_addr, "accept queue full or listener dropped, ignoring SYN");
                return;
            }
        };

        let conn_id = syn.header.connection_id;
        let config = Config::clone(&self.config);
        let (packet_tx, packet_rx) = mpsc::channel(config.connection.stream_channel_capacity.max(1));
        if packet_tx.try_send(syn).is_err() {
            warn!(addr = %remote_addr, cid = conn_id, "failed to queue SYN for new endpoint");
            return;
        }
        let Some(channels) = self.channels(packet_rx) else {
            debug!(addr = %remote_addr, cid = conn_id, "socket shutting down, ignoring SYN");
            return;
        };
        let (endpoint, stream) =
            Endpoint::new_server(config, conn_id, self.local_addr, remote_addr, channels);
        self.connections.insert(
            remote_addr,
            ConnectionMeta {
                conn_id,
                sender: packet_tx,
            },
        );

        info!(addr = %remote_addr, cid = conn_id, "spawning endpoint task for inbound connection");
        tokio::spawn(endpoint.run());
        permit.send((stream, remote_addr));
    }

    /// `None` once nothing holds the command channel open any more.
    fn channels(&self, packet_rx: mpsc::Receiver<Packet>) -> Option<EndpointChannels> {
        Some(EndpointChannels {
            packet_rx,
            send_tx: self.send_tx.clone(),
            socket_tx: self.command_tx.upgrade()?,
        })
    }
}

//! The endpoint's main loop and the follow-up work after every event.

use super::{ConnectionCleaner, ConnectionStatus, Endpoint, PendingSend, StreamCommand};
use crate::{
    core::connection::{ConnectionState, Role},
    error::{Error, Result},
    socket::SendCommand,
};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, error, info, trace, warn};

impl Endpoint {
    /// Runs the endpoint until its connection is closed.
    ///
    /// 运行端点直到其连接关闭。
    pub async fn run(mut self) {
        let _cleaner = ConnectionCleaner {
            remote_addr: self.remote_addr,
            conn_id: self.connection.conn_id(),
            socket_tx: self.socket_tx.clone(),
        };

        if self.connection.role() == Role::Client {
            if let Err(e) = self.connection.connect(Instant::now()) {
                warn!(cid = self.connection.conn_id(), error = %e, "connect failed");
            }
        }
        self.after_event().await;

        while !self.connection.is_closed() {
            trace!(
                cid = self.connection.conn_id(),
                state = %self.connection.state(),
                "endpoint waiting for events"
            );
            tokio::select! {
                biased;

                // 1. Packets from the network.
                packet = self.packet_rx.recv() => match packet {
                    Some(packet) => {
                        let now = Instant::now();
                        self.connection.handle_packet(packet, now);
                        // Drain what else is queued so one wakeup handles a burst.
                        while let Ok(packet) = self.packet_rx.try_recv() {
                            self.connection.handle_packet(packet, now);
                        }
                    }
                    None => {
                        debug!(cid = self.connection.conn_id(), "socket closed, closing connection");
                        self.connection.close();
                    }
                },

                // 2. Timer expiries.
                Some(fired) = self.timer_rx.recv() => {
                    self.connection.handle_timer_event(fired, Instant::now());
                }

                // 3. Commands from the stream, only while earlier sends are not
                // waiting for room.
                command = self.command_rx.recv(), if self.commands_open && self.backlog.is_empty() => {
                    match command {
                        Some(command) => self.handle_command(command, Instant::now()),
                        None => {
                            debug!(cid = self.connection.conn_id(), "stream dropped, finishing");
                            self.commands_open = false;
                            self.begin_finish(None);
                        }
                    }
                }
            }

            self.after_event().await;
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: StreamCommand, now: Instant) {
        match command {
            StreamCommand::Send { payload, reply } => {
                let pending = PendingSend { payload, reply };
                if self.backlog.is_empty() {
                    if let Some(pending) = self.submit(pending, now) {
                        self.backlog.push_back(pending);
                    }
                } else {
                    self.backlog.push_back(pending);
                }
            }
            StreamCommand::Finish { reply } => self.begin_finish(reply),
            StreamCommand::Close => {
                info!(cid = self.connection.conn_id(), "stream requested close");
                self.connection.close();
            }
        }
    }

    /// Hands one message to the connection. Returns it back if it has to wait
    /// for the handshake or for room in the send queue.
    fn submit(&mut self, pending: PendingSend, now: Instant) -> Option<PendingSend> {
        let result = match self.connection.send(pending.payload.clone(), now) {
            Ok(_) => Ok(()),
            Err(Error::SendQueueFull | Error::HandshakeInProgress) => return Some(pending),
            Err(e) => Err(e),
        };
        match pending.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    debug!(cid = self.connection.conn_id(), error = %e, "unacknowledged write dropped");
                }
            }
        }
        None
    }

    fn begin_finish(&mut self, reply: Option<oneshot::Sender<Result<()>>>) {
        self.finishing = true;
        if let Some(reply) = reply {
            self.finish_waiters.push(reply);
        }
    }

    /// Everything that follows an event: feed waiting sends, complete a
    /// graceful finish, flush packets and data, re-sync timers and publish
    /// the status.
    async fn after_event(&mut self) {
        let now = Instant::now();
        while let Some(pending) = self.backlog.pop_front() {
            if let Some(pending) = self.submit(pending, now) {
                self.backlog.push_front(pending);
                break;
            }
        }

        if self.finishing
            && self.backlog.is_empty()
            && self.connection.state() == ConnectionState::Established
            && self.connection.is_drained()
        {
            info!(cid = self.connection.conn_id(), "all data acknowledged, closing");
            self.connection.close();
            self.publish_status();
            for waiter in self.finish_waiters.drain(..) {
                let _ = waiter.send(Ok(()));
            }
        }

        self.flush_transmit().await;
        self.deliver().await;
        self.scheduler.sync(self.connection.timers());
        self.publish_status();
    }

    async fn flush_transmit(&mut self) {
        while let Some(packet) = self.connection.poll_transmit() {
            let datagram = match packet.encode() {
                Ok(datagram) => datagram,
                Err(e) => {
                    error!(cid = self.connection.conn_id(), error = %e, "failed to encode packet");
                    continue;
                }
            };
            let command = SendCommand {
                remote_addr: self.remote_addr,
                datagram,
            };
            if self.send_tx.send(command).await.is_err() {
                debug!(cid = self.connection.conn_id(), "sender task gone, closing connection");
                self.connection.close();
                break;
            }
        }
    }

    async fn deliver(&mut self) {
        let data: Vec<_> = std::iter::from_fn(|| self.connection.poll_delivered()).collect();
        if data.is_empty() {
            return;
        }
        if let Some(tx) = self.to_stream.as_ref() {
            trace!(cid = self.connection.conn_id(), count = data.len(), "delivering data to stream");
            if tx.send(data).await.is_err() {
                trace!(cid = self.connection.conn_id(), "stream receiver dropped");
                self.to_stream = None;
            }
        }
    }

    fn status(&self) -> ConnectionStatus {
        match (self.connection.close_reason(), self.connection.state()) {
            (Some(reason), _) => ConnectionStatus::Closed(reason),
            (None, ConnectionState::Established) => ConnectionStatus::Established,
            (None, _) => ConnectionStatus::Connecting,
        }
    }

    fn publish_status(&self) {
        let status = self.status();
        let cid = self.connection.conn_id();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            debug!(cid, from = %current, to = %status, "connection status changed");
            *current = status;
            true
        });
    }

    /// Releases everything the endpoint holds once the connection is closed.
    fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.publish_status();

        let timed_out = self
            .connection
            .close_reason()
            .is_some_and(|reason| reason.is_timeout());
        for waiter in self.finish_waiters.drain(..) {
            let _ = waiter.send(Err(if timed_out {
                Error::ConnectionTimeout
            } else {
                Error::ConnectionClosed
            }));
        }
        for pending in self.backlog.drain(..) {
            if let Some(reply) = pending.reply {
                let _ = reply.send(Err(Error::ConnectionClosed));
            }
        }

        // Dropping the sender ends the stream's reads.
        self.to_stream = None;
        info!(
            cid = self.connection.conn_id(),
            addr = %self.remote_addr,
            stats = ?self.connection.stats(),
            "endpoint task finished"
        );
    }
}

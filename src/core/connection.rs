//! The sans-IO connection engine.
//! 无IO的连接引擎。
//!
//! `Connection` owns everything one connection needs: both queues, the RTT
//! estimator, the congestion controller and the four timer deadlines. It never
//! touches a socket or a clock. Callers feed it packets, application data,
//! timer expiries and the current time, then drain `poll_transmit` and
//! `poll_delivered`. Every input runs to completion before the next one, so
//! ACK processing always finishes before the send attempt it triggers.

mod ack;
mod handshake;
mod recovery;
pub mod state;
mod transmit;

pub use state::{CaState, CloseReason, ConnectionState, ConnectionStats, Role};

use crate::{
    config::Config,
    congestion::{CongestionControl, Cubic},
    core::reliability::{RecvQueue, RttEstimator, SendQueue},
    error::{Error, Result},
    packet::{Body, Packet},
    timer::{TimerFired, TimerKind, TimerTable},
};
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// The most recent packet seen from the peer, by transmission sequence.
/// Echoed in the ACK header so the peer can match an RTT sample.
#[derive(Debug, Clone, Copy)]
struct LastReceived {
    offset: u32,
    sequence: u32,
    arrival: Instant,
}

/// One end of a connection.
///
/// 连接的一端。
#[derive(Debug)]
pub struct Connection {
    role: Role,
    state: ConnectionState,
    ca_state: CaState,
    config: Config,
    conn_id: u64,
    source_port: u16,
    dest_port: u16,

    send_queue: SendQueue,
    recv_queue: RecvQueue,
    rtt: RttEstimator,
    congestion: Box<dyn CongestionControl>,
    timers: TimerTable,

    outbox: VecDeque<Packet>,
    delivered: VecDeque<Bytes>,
    /// Set while `try_send` runs.
    /// `try_send` 运行期间置位。
    sending: bool,

    received_first_ack: bool,
    highest_rcv: Option<u32>,
    last_rcv: Option<LastReceived>,
    /// Lowest NACKed offset of the latest ACK; a higher value starts a new
    /// loss episode.
    first_nack: Option<u32>,
    tlp_out: u32,
    rto_retransmits: u32,
    handshake_retransmits: u32,
    /// Head entries resent by the last RTO, kept for spurious-timeout undo.
    rto_resent: u32,
    /// Server only: the client has proven it received the SYN_REPLY.
    syn_acked: bool,
    cookie: u32,
    close_reason: Option<CloseReason>,
    stats: ConnectionStats,
}

impl Connection {
    /// Creates a connection in `Closed`. A client passes a fresh id; a server
    /// passes the id carried by the peer's SYN.
    ///
    /// 创建一个处于 `Closed` 状态的连接。客户端传入新的ID；服务端传入对端SYN中携带的ID。
    pub fn new(role: Role, conn_id: u64, config: Config, now: Instant) -> Self {
        let congestion: Box<dyn CongestionControl> =
            Box::new(Cubic::new(config.congestion_control.clone(), now));
        Self {
            role,
            state: ConnectionState::Closed,
            ca_state: CaState::Open,
            conn_id,
            source_port: 0,
            dest_port: 0,
            send_queue: SendQueue::new(config.connection.send_queue_capacity),
            recv_queue: RecvQueue::new(0, config.connection.recv_queue_capacity),
            rtt: RttEstimator::new(&config.reliability),
            congestion,
            timers: TimerTable::new(),
            outbox: VecDeque::new(),
            delivered: VecDeque::new(),
            sending: false,
            received_first_ack: false,
            highest_rcv: None,
            last_rcv: None,
            first_nack: None,
            tlp_out: 0,
            rto_retransmits: 0,
            handshake_retransmits: 0,
            rto_resent: 0,
            syn_acked: false,
            cookie: 0,
            close_reason: None,
            stats: ConnectionStats::default(),
            config,
        }
    }

    /// Sets the ports written into every outgoing header.
    /// 设置写入每个外发包头的端口。
    pub fn with_ports(mut self, source_port: u16, dest_port: u16) -> Self {
        self.source_port = source_port;
        self.dest_port = dest_port;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn ca_state(&self) -> CaState {
        self.ca_state
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// Closed after having been opened, as opposed to not yet opened.
    /// 已打开后又关闭（区别于尚未打开）。
    pub fn is_closed(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    pub fn send_queue(&self) -> &SendQueue {
        &self.send_queue
    }

    pub fn recv_queue(&self) -> &RecvQueue {
        &self.recv_queue
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn congestion_window(&self) -> u32 {
        self.congestion.congestion_window()
    }

    pub fn slow_start_threshold(&self) -> u32 {
        self.congestion.slow_start_threshold()
    }

    pub fn tlp_out(&self) -> u32 {
        self.tlp_out
    }

    pub fn rto_retransmits(&self) -> u32 {
        self.rto_retransmits
    }

    pub fn handshake_retransmits(&self) -> u32 {
        self.handshake_retransmits
    }

    pub fn highest_rcv(&self) -> Option<u32> {
        self.highest_rcv
    }

    pub fn rcv_next(&self) -> u32 {
        self.recv_queue.rcv_next()
    }

    /// Free slots in the send queue.
    /// 发送队列中的空闲槽位。
    pub fn send_capacity(&self) -> usize {
        self.send_queue.free_slots()
    }

    /// Nothing left to send or to be acknowledged.
    /// 没有待发送或待确认的内容。
    pub fn is_drained(&self) -> bool {
        self.send_queue.is_empty()
    }

    pub fn max_payload_size(&self) -> usize {
        self.config.connection.max_payload_size
    }

    /// Queues application data. Fails fast when the connection cannot take it;
    /// nothing is queued on error.
    ///
    /// 将应用数据加入队列。连接无法接收时立即失败；出错时不会排入任何数据。
    pub fn send(&mut self, payload: Bytes, now: Instant) -> Result<u32> {
        match self.state {
            ConnectionState::Closed => return Err(self.closed_error()),
            ConnectionState::SynSent => return Err(Error::HandshakeInProgress),
            ConnectionState::Established => {}
        }
        if payload.len() > self.config.connection.max_payload_size {
            return Err(Error::MessageTooLarge);
        }

        let offset = self.send_queue.enqueue(Body::Data(payload))?;
        self.try_send(now);
        Ok(offset)
    }

    /// Processes one decoded packet from the peer. Packets that do not fit the
    /// current state are dropped without touching any state.
    ///
    /// 处理一个来自对端的已解码包。与当前状态不符的包将被丢弃，不改变任何状态。
    pub fn handle_packet(&mut self, packet: Packet, now: Instant) {
        self.stats.packets_received += 1;
        let header = packet.header;

        if header.version != self.config.protocol_version {
            warn!(
                cid = self.conn_id,
                version = header.version,
                "dropping packet with unexpected protocol version"
            );
            self.stats.dropped += 1;
            return;
        }
        if header.connection_id != self.conn_id {
            warn!(
                cid = self.conn_id,
                received = header.connection_id,
                "dropping packet with mismatched connection id"
            );
            self.stats.dropped += 1;
            return;
        }

        trace!(
            cid = self.conn_id,
            state = %self.state,
            packet_type = %header.packet_type,
            offset = header.offset,
            sequence = header.sequence,
            "packet received"
        );

        match (self.state, packet.body) {
            (ConnectionState::Closed, Body::Syn) if self.role == Role::Server && !self.is_closed() => {
                self.on_syn(&header, now)
            }
            (ConnectionState::SynSent, Body::SynReply(frame)) => {
                self.on_syn_reply(&header, frame, now)
            }
            (ConnectionState::Established, Body::Data(payload)) => {
                self.on_data(&header, payload, now)
            }
            (ConnectionState::Established, Body::Ack(frames)) => self.on_ack(&header, frames, now),
            (ConnectionState::Established, Body::Syn) if self.role == Role::Server => {
                self.on_duplicate_syn(now)
            }
            (ConnectionState::Established, Body::SynReply(_)) if self.role == Role::Client => {
                debug!(cid = self.conn_id, "duplicate SYN_REPLY, re-acknowledging");
                self.possibly_send_ack(true, now);
            }
            (state, body) => {
                debug!(
                    cid = self.conn_id,
                    %state,
                    packet_type = %body.packet_type(),
                    "dropping packet not expected in this state"
                );
                self.stats.dropped += 1;
            }
        }
    }

    /// Runs the expiry handler of `kind`. The timer is disarmed first.
    ///
    /// 运行 `kind` 的到期处理函数，先解除该定时器。
    pub fn handle_timer(&mut self, kind: TimerKind, now: Instant) {
        self.timers.clear(kind);
        trace!(cid = self.conn_id, timer = %kind, state = %self.state, "timer expired");
        match (kind, self.state) {
            (TimerKind::HandshakeLoss, ConnectionState::SynSent) => self.on_handshake_timeout(now),
            (TimerKind::HandshakeLoss, ConnectionState::Established) => self.on_loss_timeout(now),
            (TimerKind::RtoTlp, ConnectionState::Established) => self.on_rto_tlp_timeout(now),
            (TimerKind::DelayedAck, ConnectionState::Established) => self.send_ack(now),
            (TimerKind::EarlyRetransmit, ConnectionState::Established) => {
                self.on_early_retransmit_timeout(now)
            }
            _ => trace!(cid = self.conn_id, timer = %kind, "timer ignored in this state"),
        }
    }

    /// Handles a timer message. Messages from a superseded arming are
    /// ignored. Returns whether the handler ran.
    ///
    /// 处理一条定时器消息。来自已被取代的设置的消息将被忽略。返回处理函数是否运行。
    pub fn handle_timer_event(&mut self, fired: TimerFired, now: Instant) -> bool {
        if !self.timers.is_current(fired) {
            trace!(cid = self.conn_id, timer = %fired.kind, "stale timer message ignored");
            return false;
        }
        self.handle_timer(fired.kind, now);
        true
    }

    /// Runs every timer whose deadline is at or before `now`.
    /// 运行所有截止时间不晚于 `now` 的定时器。
    pub fn handle_timeouts(&mut self, now: Instant) {
        for kind in self.timers.expire(now) {
            self.handle_timer(kind, now);
        }
    }

    pub fn next_timeout(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// The next packet to put on the wire.
    /// 下一个要发送到线路上的包。
    pub fn poll_transmit(&mut self) -> Option<Packet> {
        self.outbox.pop_front()
    }

    /// The next in-order payload for the application.
    /// 下一个交给应用的有序载荷。
    pub fn poll_delivered(&mut self) -> Option<Bytes> {
        self.delivered.pop_front()
    }

    /// Cancels all timers, discards both queues and moves to `Closed`.
    ///
    /// 取消所有定时器，丢弃两个队列并进入 `Closed`。
    pub fn close(&mut self) {
        self.close_with(CloseReason::Local);
    }

    fn close_with(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        self.timers.clear_all();
        self.send_queue.clear();
        self.recv_queue.clear();
        self.outbox.clear();
        self.state = ConnectionState::Closed;
        self.close_reason = Some(reason);
        info!(cid = self.conn_id, ?reason, "connection closed");
    }

    fn closed_error(&self) -> Error {
        match self.close_reason {
            None => Error::NotConnected,
            Some(reason) if reason.is_timeout() => Error::ConnectionTimeout,
            Some(_) => Error::ConnectionClosed,
        }
    }

    /// Records `header` as the latest arrival if it carries a newer sequence.
    fn note_arrival(&mut self, offset: u32, sequence: u32, now: Instant) {
        self.highest_rcv = Some(self.highest_rcv.map_or(offset, |h| h.max(offset)));
        if self.last_rcv.is_none_or(|last| sequence >= last.sequence) {
            self.last_rcv = Some(LastReceived {
                offset,
                sequence,
                arrival: now,
            });
        }
    }
}

#![deny(clippy::expect_used, clippy::unwrap_used)]

//! A reliable, congestion-controlled transport over UDP.
//! 基于UDP的可靠、带拥塞控制的传输协议库。
//!
//! A `QuicSocket` multiplexes connections over one datagram socket. Each
//! connection performs a SYN / SYN_REPLY handshake, then carries ordered
//! messages with ACK/NACK-based loss recovery and CUBIC congestion control.

pub mod config;
pub mod error;
pub mod packet;
pub mod socket;
pub mod timer;

pub mod congestion;
pub mod core;

pub use crate::config::Config;
pub use crate::core::connection::{CloseReason, ConnectionStats};
pub use crate::core::endpoint::ConnectionStatus;
pub use crate::core::stream::Stream;
pub use crate::error::{Error, Result};
pub use crate::socket::{BindableDatagramSocket, DatagramSocket, Listener, QuicSocket};

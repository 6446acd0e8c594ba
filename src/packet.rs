//! The packet module: wire header, ACK trailer frames, checksum and the
//! datagram codec.
//! packet 模块：线上包头、ACK尾部帧、校验和以及数据报编解码。

pub mod checksum;
pub mod codec;
pub mod frame;
pub mod header;
pub mod tag;

pub use codec::{Packet, PacketError};
pub use frame::{AckFrames, Body, SynReplyFrame};
pub use header::Header;
pub use tag::{FrameTag, PacketType};

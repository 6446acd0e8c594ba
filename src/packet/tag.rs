//! 定义协议的包类型与尾部帧标签。
//! Defines the packet types and trailer frame tags of the protocol.

use std::fmt;

/// The type of a packet, carried in the last 32-bit word of the header.
/// 包类型，位于包头的最后一个32位字中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    /// Application data. 应用数据。
    Data = 10,
    /// Connection request. 连接请求。
    Syn = 13,
    /// Connection reply carrying a cookie and an ACK for the SYN.
    /// 携带cookie和SYN确认的连接应答。
    SynReply = 14,
    /// Acknowledgment, optionally with NACK frames.
    /// 确认包，可附带NACK帧。
    Ack = 15,
}

impl PacketType {
    /// 从一个32位值尝试转换成 `PacketType`。
    /// Tries to convert a 32-bit value into a `PacketType`.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            10 => Some(PacketType::Data),
            13 => Some(PacketType::Syn),
            14 => Some(PacketType::SynReply),
            15 => Some(PacketType::Ack),
            _ => None,
        }
    }

    /// Handshake packets carry the connection-id flag.
    /// 握手包携带连接ID标志位。
    pub fn is_handshake(&self) -> bool {
        matches!(self, PacketType::Syn | PacketType::SynReply)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketType::Data => "DATA",
            PacketType::Syn => "SYN",
            PacketType::SynReply => "SYN_REPLY",
            PacketType::Ack => "ACK",
        };
        write!(f, "{}", s)
    }
}

/// Tags of the `{tag, value}` frames that trail ACK and SYN_REPLY packets.
/// ACK与SYN_REPLY包尾部 `{tag, value}` 帧的标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameTag {
    Ack = 15,
    Nack = 16,
    Delta = 17,
    /// Terminates the trailer. Carries no value.
    /// 终止尾部，不携带值。
    End = 99,
}

impl FrameTag {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            15 => Some(FrameTag::Ack),
            16 => Some(FrameTag::Nack),
            17 => Some(FrameTag::Delta),
            99 => Some(FrameTag::End),
            _ => None,
        }
    }
}

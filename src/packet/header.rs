//! 定义协议包头。
//! Defines the protocol header.
//!
//! Layout (network byte order, 33 bytes):
//! `source_port:16, dest_port:16, length:16, checksum:16, flags:8,
//! connection_id:64, version:32, offset:32, sequence:32, type:32`.

use super::{codec::PacketError, tag::PacketType};
use bytes::{Buf, BufMut};

pub const HEADER_SIZE: usize = 33;

/// Byte position of the checksum field inside the header.
/// 校验和字段在包头中的字节位置。
pub const CHECKSUM_POSITION: usize = 6;

/// Bits of the `flags` byte.
/// `flags` 字节中的各个位。
pub mod flags {
    pub const VERSION: u8 = 0x01;
    pub const RESERVED: u8 = 0x02;
    pub const DIVERSIFICATION: u8 = 0x04;
    /// Set on handshake packets.
    /// 握手包设置此位。
    pub const CONNECTION_ID: u8 = 0x08;
    pub const PACKET_NUMBER_MASK: u8 = 0x30;
    pub const MULTIPATH: u8 = 0x40;
}

/// The fixed header in front of every packet. `length` and `checksum` are
/// derived by the codec and are not stored here.
///
/// 每个包前面的固定包头。`length` 和 `checksum` 由编解码器生成，不在此保存。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub source_port: u16,
    pub dest_port: u16,
    pub flags: u8,
    pub connection_id: u64,
    pub version: u32,
    /// Position of the packet in the sender's packet stream.
    /// 包在发送方包流中的位置。
    pub offset: u32,
    /// Transmission number, fresh for every (re)transmission.
    /// 传输编号，每次（重）传输都会更新。
    pub sequence: u32,
    pub packet_type: PacketType,
}

impl Header {
    /// Whether the connection-id flag bit is set.
    /// 是否设置了连接ID标志位。
    pub fn has_connection_id(&self) -> bool {
        self.flags & flags::CONNECTION_ID != 0
    }

    /// Encodes the header with the given total length and a zero checksum.
    /// 使用给定的总长度和零校验和编码包头。
    pub fn encode<B: BufMut>(&self, buf: &mut B, length: u16) {
        buf.put_u16(self.source_port);
        buf.put_u16(self.dest_port);
        buf.put_u16(length);
        buf.put_u16(0);
        buf.put_u8(self.flags);
        buf.put_u64(self.connection_id);
        buf.put_u32(self.version);
        buf.put_u32(self.offset);
        buf.put_u32(self.sequence);
        buf.put_u32(self.packet_type as u32);
    }

    /// Decodes a header, returning it with the declared length and checksum.
    /// 解码包头，并返回声明的长度和校验和。
    pub fn decode<B: Buf>(buf: &mut B) -> Result<(Self, u16, u16), PacketError> {
        if buf.remaining() < HEADER_SIZE {
            return Err(PacketError::Truncated);
        }
        let source_port = buf.get_u16();
        let dest_port = buf.get_u16();
        let length = buf.get_u16();
        let checksum = buf.get_u16();
        let flags = buf.get_u8();
        let connection_id = buf.get_u64();
        let version = buf.get_u32();
        let offset = buf.get_u32();
        let sequence = buf.get_u32();
        let raw_type = buf.get_u32();
        let packet_type = PacketType::from_u32(raw_type).ok_or(PacketError::UnknownType(raw_type))?;

        Ok((
            Header {
                source_port,
                dest_port,
                flags,
                connection_id,
                version,
                offset,
                sequence,
                packet_type,
            },
            length,
            checksum,
        ))
    }
}

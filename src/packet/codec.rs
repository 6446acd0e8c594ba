//! Encoding and decoding of whole datagrams.
//! 整个数据报的编码与解码。

use super::{
    checksum,
    frame::Body,
    header::{CHECKSUM_POSITION, HEADER_SIZE, Header},
};
use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Reasons a datagram is rejected by the decoder. All of them lead to the
/// packet being dropped without touching connection state.
///
/// 解码器拒绝数据报的原因。它们都会导致包被丢弃，且不影响连接状态。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram shorter than the header")]
    Truncated,
    #[error("length field says {declared} bytes but the datagram has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: received {received:#06x}, computed {computed:#06x}")]
    BadChecksum { received: u16, computed: u16 },
    #[error("unknown packet type {0}")]
    UnknownType(u32),
    #[error("malformed trailer: {0}")]
    MalformedTrailer(&'static str),
    #[error("packet of {0} bytes does not fit the 16-bit length field")]
    TooLarge(usize),
}

/// A decoded packet: header plus typed body.
/// 已解码的包：包头加类型化的包体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub body: Body,
}

impl Packet {
    /// Builds a packet, forcing the header type to agree with the body.
    /// 构建一个包，并使包头类型与包体保持一致。
    pub fn new(mut header: Header, body: Body) -> Self {
        header.packet_type = body.packet_type();
        Self { header, body }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body.encoded_len()
    }

    /// Serializes the packet, filling in the length and checksum fields.
    /// 序列化包，并填写长度与校验和字段。
    pub fn encode(&self) -> Result<Bytes, PacketError> {
        let total = self.encoded_len();
        let length = u16::try_from(total).map_err(|_| PacketError::TooLarge(total))?;

        let mut buf = BytesMut::with_capacity(total);
        self.header.encode(&mut buf, length);
        self.body.encode(&mut buf);

        let sum = checksum::compute(&buf, CHECKSUM_POSITION);
        buf[CHECKSUM_POSITION..CHECKSUM_POSITION + 2].copy_from_slice(&sum.to_be_bytes());
        Ok(buf.freeze())
    }

    /// Parses one datagram. The length field must match the datagram size and
    /// a non-zero checksum must verify.
    ///
    /// 解析一个数据报。长度字段必须与数据报大小一致，非零校验和必须通过验证。
    pub fn decode(datagram: Bytes) -> Result<Self, PacketError> {
        if datagram.len() < HEADER_SIZE {
            return Err(PacketError::Truncated);
        }

        let mut cursor = &datagram[..HEADER_SIZE];
        let (header, length, received) = Header::decode(&mut cursor)?;

        if usize::from(length) != datagram.len() {
            return Err(PacketError::LengthMismatch {
                declared: usize::from(length),
                actual: datagram.len(),
            });
        }

        if !checksum::verify(&datagram, CHECKSUM_POSITION, received) {
            return Err(PacketError::BadChecksum {
                received,
                computed: checksum::compute(&datagram, CHECKSUM_POSITION),
            });
        }

        let body = Body::decode(header.packet_type, datagram.slice(HEADER_SIZE..))?;
        Ok(Packet { header, body })
    }
}

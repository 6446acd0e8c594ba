//! Packet bodies: DATA payloads and the `{tag, value}` trailer frames of
//! ACK and SYN_REPLY packets.
//!
//! 包体：DATA载荷以及ACK与SYN_REPLY包的 `{tag, value}` 尾部帧。

use super::{
    codec::PacketError,
    tag::{FrameTag, PacketType},
};
use bytes::{Buf, BufMut, Bytes};

/// The trailer of an ACK packet.
///
/// On the wire the header's `type = ACK` word doubles as the ACK frame tag, so
/// the trailer starts with the ACK value, followed by the mandatory DELTA frame,
/// any NACK frames and the END sentinel.
///
/// ACK包的尾部。线上包头的 `type = ACK` 同时充当ACK帧的标签，因此尾部以
/// ACK值开始，随后是必需的DELTA帧、若干NACK帧以及END哨兵。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrames {
    /// Highest offset the receiver has seen.
    /// 接收方见过的最高偏移量。
    pub highest_offset: u32,
    /// Time the receiver held the acknowledged packet, in milliseconds.
    /// 接收方持有被确认包的时间（毫秒）。
    pub delay_ms: u32,
    /// Missing offsets below `highest_offset`, ascending.
    /// `highest_offset` 以下缺失的偏移量，升序排列。
    pub nacks: Vec<u32>,
}

impl AckFrames {
    pub fn encoded_len(&self) -> usize {
        4 + 8 + self.nacks.len() * 8 + 4
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.highest_offset);
        buf.put_u32(FrameTag::Delta as u32);
        buf.put_u32(self.delay_ms);
        for nack in &self.nacks {
            buf.put_u32(FrameTag::Nack as u32);
            buf.put_u32(*nack);
        }
        buf.put_u32(FrameTag::End as u32);
    }

    /// Decodes the whole trailer. Anything after END is rejected.
    /// 解码整个尾部。END之后的任何内容都会被拒绝。
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, PacketError> {
        let highest_offset = read_u32(buf)?;

        if read_tag(buf)? != FrameTag::Delta {
            return Err(PacketError::MalformedTrailer("DELTA frame must follow ACK"));
        }
        let delay_ms = read_u32(buf)?;

        let mut nacks = Vec::new();
        loop {
            match read_tag(buf)? {
                FrameTag::Nack => nacks.push(read_u32(buf)?),
                FrameTag::End => break,
                FrameTag::Ack | FrameTag::Delta => {
                    return Err(PacketError::MalformedTrailer("unexpected frame in ACK trailer"));
                }
            }
        }

        if buf.has_remaining() {
            return Err(PacketError::MalformedTrailer("bytes after END frame"));
        }

        Ok(Self {
            highest_offset,
            delay_ms,
            nacks,
        })
    }
}

/// The body of a SYN_REPLY: the server cookie and an ACK frame for the SYN.
/// SYN_REPLY 的包体：服务器cookie与针对SYN的ACK帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub cookie: u32,
    pub acked_offset: u32,
}

impl SynReplyFrame {
    pub const ENCODED_LEN: usize = 12;

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.cookie);
        buf.put_u32(FrameTag::Ack as u32);
        buf.put_u32(self.acked_offset);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, PacketError> {
        let cookie = read_u32(buf)?;
        if read_tag(buf)? != FrameTag::Ack {
            return Err(PacketError::MalformedTrailer("SYN_REPLY must carry an ACK frame"));
        }
        let acked_offset = read_u32(buf)?;
        if buf.has_remaining() {
            return Err(PacketError::MalformedTrailer("bytes after SYN_REPLY ACK frame"));
        }
        Ok(Self {
            cookie,
            acked_offset,
        })
    }
}

/// Everything after the header. The variant determines the header's type.
/// 包头之后的全部内容。变体决定包头的类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Data(Bytes),
    Syn,
    SynReply(SynReplyFrame),
    Ack(AckFrames),
}

impl Body {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Body::Data(_) => PacketType::Data,
            Body::Syn => PacketType::Syn,
            Body::SynReply(_) => PacketType::SynReply,
            Body::Ack(_) => PacketType::Ack,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Body::Data(payload) => payload.len(),
            Body::Syn => 0,
            Body::SynReply(_) => SynReplyFrame::ENCODED_LEN,
            Body::Ack(frames) => frames.encoded_len(),
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Body::Data(payload) => buf.put_slice(payload),
            Body::Syn => {}
            Body::SynReply(frame) => frame.encode(buf),
            Body::Ack(frames) => frames.encode(buf),
        }
    }

    /// Decodes the body for a packet of the given type. `rest` must hold
    /// exactly the bytes after the header.
    /// 按给定类型解码包体。`rest` 必须恰好包含包头之后的字节。
    pub fn decode(packet_type: PacketType, mut rest: Bytes) -> Result<Self, PacketError> {
        match packet_type {
            PacketType::Data => Ok(Body::Data(rest)),
            PacketType::Syn if rest.is_empty() => Ok(Body::Syn),
            PacketType::Syn => Err(PacketError::MalformedTrailer("SYN carries no body")),
            PacketType::SynReply => SynReplyFrame::decode(&mut rest).map(Body::SynReply),
            PacketType::Ack => AckFrames::decode(&mut rest).map(Body::Ack),
        }
    }
}

fn read_u32<B: Buf>(buf: &mut B) -> Result<u32, PacketError> {
    if buf.remaining() < 4 {
        return Err(PacketError::MalformedTrailer("truncated frame"));
    }
    Ok(buf.get_u32())
}

fn read_tag<B: Buf>(buf: &mut B) -> Result<FrameTag, PacketError> {
    let raw = read_u32(buf)?;
    FrameTag::from_u32(raw).ok_or(PacketError::MalformedTrailer("unknown frame tag"))
}

//! Internet checksum over a pseudo-header and the packet bytes.
//! 基于伪首部和包字节的互联网校验和。
//!
//! The same 16-bit one's-complement sum UDP uses. The pseudo-header holds the
//! protocol number and the packet length; addresses are left out because the
//! enclosing UDP datagram already covers them.

/// Protocol number mixed into the pseudo-header (experimental range).
/// 混入伪首部的协议号（实验范围）。
pub const PROTOCOL_NUMBER: u8 = 253;

fn add_words(mut sum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Computes the checksum of `packet`, treating the two bytes at
/// `checksum_position` as zero. A result of zero is transmitted as `0xFFFF`
/// so that zero can keep meaning "not computed".
///
/// 计算 `packet` 的校验和，`checksum_position` 处的两个字节按零处理。
/// 结果为零时以 `0xFFFF` 发送，使零仍表示“未计算”。
pub fn compute(packet: &[u8], checksum_position: usize) -> u16 {
    let length = packet.len() as u16;
    let pseudo = [0, PROTOCOL_NUMBER, (length >> 8) as u8, length as u8];
    let mut sum = add_words(0, &pseudo);

    let split = checksum_position.min(packet.len());
    sum = add_words(sum, &packet[..split]);
    let resume = (checksum_position + 2).min(packet.len());
    sum = add_words(sum, &packet[resume..]);

    match !fold(sum) {
        0 => 0xFFFF,
        value => value,
    }
}

/// Checks a received checksum. Zero is accepted as "not computed".
/// 校验收到的校验和。零被视为“未计算”并接受。
pub fn verify(packet: &[u8], checksum_position: usize, received: u16) -> bool {
    received == 0 || compute(packet, checksum_position) == received
}

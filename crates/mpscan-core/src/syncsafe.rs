//! 同步安全整数 (synchsafe integer).
//!
//! 标签头部的长度字段每字节只使用低 7 位, 最高位恒为 0,
//! 以免长度字段本身形成 MPEG 帧同步码.

/// 解码 4 字节同步安全整数
///
/// 任一字节最高位为 1 时返回 `None`, 说明这不是合法的同步安全整数.
pub fn decode(bytes: [u8; 4]) -> Option<u32> {
    if bytes.iter().any(|&b| b & 0x80 != 0) {
        return None;
    }
    Some(
        u32::from(bytes[0]) << 21
            | u32::from(bytes[1]) << 14
            | u32::from(bytes[2]) << 7
            | u32::from(bytes[3]),
    )
}

/// 编码为 4 字节同步安全整数 (最大 2^28 - 1)
pub fn encode(value: u32) -> Option<[u8; 4]> {
    if value >= 1 << 28 {
        return None;
    }
    Some([
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ])
}

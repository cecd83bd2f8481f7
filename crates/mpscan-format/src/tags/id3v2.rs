//! ID3v2 标签头.
//!
//! ```text
//! "ID3" 主版本(1) 修订号(1) 标志(1) 长度(4, 同步安全)  [标签体]  ["3DI" 尾部 10 字节]
//! ```
//! 尾部只在 v2.4 且标志位 0x10 置位时存在.

use bytes::Bytes;
use mpscan_core::syncsafe;

use super::{TagInfo, TagKind, TagRange, TagReader};

/// 标签头长度
pub const HEADER_LEN: usize = 10;

/// 尾部长度
pub const FOOTER_LEN: usize = 10;

pub const SIGNATURE: &[u8; 3] = b"ID3";

/// 尾部签名
pub const FOOTER_SIGNATURE: &[u8; 3] = b"3DI";

/// 标志位: 非同步
pub const FLAG_UNSYNCHRONISATION: u8 = 0x80;
/// 标志位: 扩展头
pub const FLAG_EXTENDED_HEADER: u8 = 0x40;
/// 标志位: 实验性
pub const FLAG_EXPERIMENTAL: u8 = 0x20;
/// 标志位: 带尾部 (仅 v2.4)
pub const FLAG_FOOTER: u8 = 0x10;

/// 前导 10 字节解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub major: u8,
    pub revision: u8,
    pub flags: u8,
    pub body_size: u32,
}

impl Preamble {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..3] != SIGNATURE {
            return None;
        }
        let major = bytes[3];
        let revision = bytes[4];
        if !(2..=4).contains(&major) || revision == 0xFF {
            return None;
        }
        let body_size = syncsafe::decode([bytes[6], bytes[7], bytes[8], bytes[9]])?;
        Some(Self {
            major,
            revision,
            flags: bytes[5],
            body_size,
        })
    }

    pub fn has_footer(&self) -> bool {
        self.major == 4 && self.flags & FLAG_FOOTER != 0
    }

    /// 标签总长度 (头 + 标签体 + 可能的尾部)
    pub fn total_len(&self) -> usize {
        let footer = if self.has_footer() { FOOTER_LEN } else { 0 };
        HEADER_LEN + self.body_size as usize + footer
    }
}

/// ID3v2 读取器
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionedHeaderReader;

impl TagReader for VersionedHeaderReader {
    fn kind(&self) -> TagKind {
        TagKind::VersionedHeader
    }

    fn signature(&self) -> &'static [u8] {
        SIGNATURE
    }

    fn preamble_len(&self) -> usize {
        HEADER_LEN
    }

    fn measure(&self, preamble: &[u8]) -> Option<usize> {
        Preamble::parse(preamble).map(|p| p.total_len())
    }

    fn decode(&self, offset: u64, data: Bytes, keep_payload: bool) -> Option<TagRange> {
        let preamble = Preamble::parse(&data)?;
        let len = preamble.total_len();
        if data.len() < len {
            return None;
        }
        let footer = &data[len - self.footer_len(&data)..len];
        let payload = keep_payload.then(|| data.slice(..len));
        range(offset, &preamble, footer, payload)
    }

    fn footer_len(&self, preamble: &[u8]) -> usize {
        match Preamble::parse(preamble) {
            Some(p) if p.has_footer() => FOOTER_LEN,
            _ => 0,
        }
    }

    fn decode_sparse(&self, offset: u64, preamble: &[u8], footer: &[u8]) -> Option<TagRange> {
        let preamble = Preamble::parse(preamble)?;
        range(offset, &preamble, footer, None)
    }
}

fn range(
    offset: u64,
    preamble: &Preamble,
    footer: &[u8],
    payload: Option<Bytes>,
) -> Option<TagRange> {
    if preamble.has_footer() && footer.get(..3) != Some(&FOOTER_SIGNATURE[..]) {
        return None;
    }
    Some(TagRange {
        kind: TagKind::VersionedHeader,
        start: offset,
        end: offset + preamble.total_len() as u64,
        info: TagInfo::VersionedHeader {
            major: preamble.major,
            revision: preamble.revision,
            flags: preamble.flags,
            body_size: preamble.body_size,
            has_footer: preamble.has_footer(),
        },
        payload,
    })
}

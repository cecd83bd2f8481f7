//! ID3v1 尾部标签 (固定 128 字节).
//!
//! ```text
//! "TAG" 标题(30) 艺术家(30) 专辑(30) 年份(4) 注释(30) 流派(1)
//! ```
//! v1.1 把注释第 29 字节置 0, 第 30 字节存放音轨号.

use bytes::Bytes;

use super::{TagInfo, TagKind, TagRange, TagReader};

/// 标签长度
pub const TAG_LEN: usize = 128;

pub const SIGNATURE: &[u8; 3] = b"TAG";

/// ID3v1 读取器
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyTrailerReader;

impl TagReader for LegacyTrailerReader {
    fn kind(&self) -> TagKind {
        TagKind::LegacyTrailer
    }

    fn signature(&self) -> &'static [u8] {
        SIGNATURE
    }

    fn preamble_len(&self) -> usize {
        TAG_LEN
    }

    fn measure(&self, preamble: &[u8]) -> Option<usize> {
        // 不足 128 字节或 "TAG+" 扩展块均不作为 v1 标签
        if preamble.len() < TAG_LEN || &preamble[..3] != SIGNATURE || preamble[3] == b'+' {
            return None;
        }
        Some(TAG_LEN)
    }

    fn decode(&self, offset: u64, data: Bytes, keep_payload: bool) -> Option<TagRange> {
        self.measure(&data)?;
        let track = (data[125] == 0 && data[126] != 0).then_some(data[126]);
        Some(TagRange {
            kind: TagKind::LegacyTrailer,
            start: offset,
            end: offset + TAG_LEN as u64,
            info: TagInfo::LegacyTrailer {
                track,
                genre: data[127],
            },
            payload: keep_payload.then(|| data.slice(..TAG_LEN)),
        })
    }

    fn decode_sparse(&self, offset: u64, preamble: &[u8], _footer: &[u8]) -> Option<TagRange> {
        self.decode(offset, Bytes::copy_from_slice(preamble), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer() -> Vec<u8> {
        let mut v = vec![0u8; TAG_LEN];
        v[..3].copy_from_slice(SIGNATURE);
        v[3..8].copy_from_slice(b"Title");
        v[127] = 17;
        v
    }

    #[test]
    fn test_v1() {
        let mut data = trailer();
        data[125] = b'x';
        data[126] = 3;
        let range = LegacyTrailerReader.decode(1000, Bytes::from(data), false).unwrap();
        assert_eq!((range.start, range.end), (1000, 1128));
        assert_eq!(range.info, TagInfo::LegacyTrailer { track: None, genre: 17 });
    }

    #[test]
    fn test_v1_1_音轨号() {
        let mut data = trailer();
        data[126] = 7;
        let range = LegacyTrailerReader.decode(0, Bytes::from(data), true).unwrap();
        assert_eq!(range.info, TagInfo::LegacyTrailer { track: Some(7), genre: 17 });
        assert_eq!(range.payload.unwrap().len(), TAG_LEN);
    }

    #[test]
    fn test_不足128字节() {
        let data = trailer();
        assert_eq!(LegacyTrailerReader.measure(&data[..100]), None);
    }

    #[test]
    fn test_扩展块不识别() {
        let mut data = trailer();
        data[3] = b'+';
        assert_eq!(LegacyTrailerReader.measure(&data), None);
    }
}

//! 标签结构读取.
//!
//! 只定位标签并读取结构信息 (版本/标志/长度), 字段内容的解码交给外部组件.
//! 每种标签实现 [`TagReader`], 扫描器在命中签名后依次调用
//! [`TagReader::measure`] 与 [`TagReader::decode`].

use bytes::Bytes;
use serde::Serialize;

pub mod id3v1;
pub mod id3v2;

pub use id3v1::LegacyTrailerReader;
pub use id3v2::VersionedHeaderReader;

/// 标签种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagKind {
    /// 文件末尾固定 128 字节的旧式标签 (ID3v1)
    LegacyTrailer,
    /// 文件开头的变长版本化标签 (ID3v2)
    VersionedHeader,
}

/// 标签结构信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TagInfo {
    VersionedHeader {
        major: u8,
        revision: u8,
        flags: u8,
        /// 标签体长度 (不含 10 字节头与尾部)
        body_size: u32,
        has_footer: bool,
    },
    LegacyTrailer {
        /// ID3v1.1: 注释字段第 29 字节为 0, 第 30 字节为音轨号
        track: Option<u8>,
        genre: u8,
    },
}

/// 标签在流中的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRange {
    pub kind: TagKind,
    /// 起始偏移 (含)
    pub start: u64,
    /// 结束偏移 (不含)
    pub end: u64,
    pub info: TagInfo,
    /// 原始字节, 仅在扫描选项要求保留时填充
    #[serde(skip)]
    pub payload: Option<Bytes>,
}

impl TagRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// 标签读取器
pub trait TagReader: Send + Sync {
    fn kind(&self) -> TagKind;

    /// 标签起始签名
    fn signature(&self) -> &'static [u8];

    /// 判定标签长度所需的最少字节数 (含签名)
    fn preamble_len(&self) -> usize;

    /// 根据前导字节给出标签总长度
    ///
    /// 返回 `None` 表示此处不是该类标签.
    fn measure(&self, preamble: &[u8]) -> Option<usize>;

    /// 解析完整标签字节
    ///
    /// `data` 长度等于 [`measure`](TagReader::measure) 给出的长度.
    fn decode(&self, offset: u64, data: Bytes, keep_payload: bool) -> Option<TagRange>;

    /// 结构校验需要的末尾字节数
    fn footer_len(&self, _preamble: &[u8]) -> usize {
        0
    }

    /// 只凭前导与末尾字节解析标签, 中间的标签体已被跳过
    ///
    /// `footer` 长度等于 [`footer_len`](TagReader::footer_len) 给出的长度.
    fn decode_sparse(&self, offset: u64, preamble: &[u8], footer: &[u8]) -> Option<TagRange>;
}

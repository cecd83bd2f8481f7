//! 扫描选项.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainOptions, DEFAULT_SEED_LEN};
use crate::io::DEFAULT_CHUNK_SIZE;
use crate::observer::ScanObserver;

/// 扫描选项
///
/// 可从 JSON 等配置反序列化, 缺省字段取默认值.
#[derive(Clone, Deserialize, Serialize)]
pub struct ScanOptions {
    /// 识别文件头部的版本化标签 (ID3v2)
    #[serde(default = "default_true")]
    pub header_tag: bool,
    /// 识别尾部标签 (ID3v1)
    #[serde(default = "default_true")]
    pub trailer_tag: bool,
    /// 识别 MPEG 音频帧
    #[serde(default = "default_true")]
    pub frames: bool,
    /// 快速模式: 确认音频参数后跳过剩余帧
    #[serde(default)]
    pub quick: bool,
    /// 已找到头部标签时不再识别尾部标签
    #[serde(default)]
    pub trailer_only_without_header: bool,
    /// 找到第一个头部标签后不再识别头部标签
    #[serde(default)]
    pub stop_after_first_header_tag: bool,
    /// 已知的流总长度, 快速模式下免去读到末尾
    #[serde(default)]
    pub stream_size: Option<u64>,
    /// 在标签范围中保留原始字节
    #[serde(default)]
    pub keep_payload: bool,
    /// 每次从游标取出的块大小
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 帧链间隙桥接上限 (字节)
    #[serde(default)]
    pub max_gap: Option<u64>,
    /// 诊断观察者, 不参与序列化
    #[serde(skip)]
    pub observer: Option<Arc<dyn ScanObserver>>,
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            header_tag: true,
            trailer_tag: true,
            frames: true,
            quick: false,
            trailer_only_without_header: false,
            stop_after_first_header_tag: false,
            stream_size: None,
            keep_payload: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_gap: None,
            observer: None,
        }
    }
}

impl ScanOptions {
    /// 快速模式的默认选项
    pub fn quick() -> Self {
        Self {
            quick: true,
            ..Self::default()
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            max_seed_len: DEFAULT_SEED_LEN,
            max_gap: self.max_gap,
        }
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("header_tag", &self.header_tag)
            .field("trailer_tag", &self.trailer_tag)
            .field("frames", &self.frames)
            .field("quick", &self.quick)
            .field("trailer_only_without_header", &self.trailer_only_without_header)
            .field("stop_after_first_header_tag", &self.stop_after_first_header_tag)
            .field("stream_size", &self.stream_size)
            .field("keep_payload", &self.keep_payload)
            .field("chunk_size", &self.chunk_size)
            .field("max_gap", &self.max_gap)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

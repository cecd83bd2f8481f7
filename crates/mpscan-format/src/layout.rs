//! 扫描产出的原始布局.

use serde::Serialize;

use crate::mpeg::{RawFrameHeader, SubHeader};
use crate::tags::{TagKind, TagRange};

/// 带子头检测结果的首帧候选
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubHeaderFrame {
    pub header: RawFrameHeader,
    /// 窗口内出现了子头标签但字段解析失败时为 `None`
    pub sub_header: Option<SubHeader>,
}

/// 一次扫描的原始布局
///
/// 扫描期间只追加, 扫描结束后只读.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Layout {
    /// 全部候选帧头 (按偏移升序, 含误报)
    pub frameheaders: Vec<RawFrameHeader>,
    /// 帧头后出现子头标签的帧
    pub headframes: Vec<SubHeaderFrame>,
    pub tags: Vec<TagRange>,
    /// 流总长度
    pub size: u64,
    /// 快速模式提前停止了帧扫描
    pub quick: bool,
}

impl Layout {
    /// 第一个指定种类的标签
    pub fn first_tag(&self, kind: TagKind) -> Option<&TagRange> {
        self.tags.iter().find(|t| t.kind == kind)
    }

    /// 最后一个指定种类的标签
    pub fn last_tag(&self, kind: TagKind) -> Option<&TagRange> {
        self.tags.iter().rev().find(|t| t.kind == kind)
    }

    /// 第一个成功解析出子头的帧
    pub fn sub_header(&self) -> Option<(&RawFrameHeader, &SubHeader)> {
        self.headframes
            .iter()
            .find_map(|f| f.sub_header.as_ref().map(|s| (&f.header, s)))
    }
}

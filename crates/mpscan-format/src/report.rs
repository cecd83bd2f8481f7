//! 由冻结布局推导扫描报告.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::chain::{ChainOptions, ChainResolver};
use crate::layout::Layout;
use crate::mpeg::header::{self, FrameHeader};
use crate::mpeg::{RawFrameHeader, SubHeader};
use crate::tags::{TagKind, TagRange};

/// 比特率模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BitrateMode {
    /// 全部帧比特率相同 (bps)
    Constant { bit_rate: u32 },
    /// 按出现次数加权的平均比特率 (bps, 截断取整)
    Variable { average: u32 },
}

impl BitrateMode {
    pub fn bit_rate(&self) -> u32 {
        match *self {
            Self::Constant { bit_rate } => bit_rate,
            Self::Variable { average } => average,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }
}

/// 子头声明与实测值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declaration {
    /// 子头所在帧的偏移
    pub offset: u64,
    pub sub_header: SubHeader,
    /// 实测帧数 (快速模式下未完整扫描时为 `None`)
    pub measured_frames: Option<u64>,
    /// 实测音频字节数
    pub measured_bytes: u64,
}

/// 声明与实测不一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    FrameCount { declared: u32, measured: u64 },
    ByteCount { declared: u32, measured: u64 },
}

/// 扫描报告
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// 流总长度
    pub size: u64,
    /// 帧扫描是否被快速模式提前终止
    pub quick: bool,
    /// 选出的帧链
    #[serde(skip)]
    pub chain: Vec<RawFrameHeader>,
    pub frame_count: usize,
    /// 帧链首帧的格式
    pub first_frame: Option<FrameHeader>,
    pub bitrate: Option<BitrateMode>,
    /// 实测时长 (秒)
    pub duration_measured: f64,
    /// 子头声明的时长 (秒)
    pub duration_declared: Option<f64>,
    /// 音频起止 (首帧起始, 末帧结束)
    pub audio_start: Option<u64>,
    pub audio_end: Option<u64>,
    pub tags: Vec<TagRange>,
    pub has_header_tag: bool,
    /// 存在结束于流末尾的尾部标签
    pub has_trailer: bool,
    pub declaration: Option<Declaration>,
    pub discrepancies: Vec<Discrepancy>,
}

impl Report {
    pub fn has_audio(&self) -> bool {
        !self.chain.is_empty()
    }
}

/// 结果汇总器
#[derive(Debug, Clone, Default)]
pub struct ResultAssembler {
    resolver: ChainResolver,
}

impl ResultAssembler {
    pub fn new(options: ChainOptions) -> Self {
        Self {
            resolver: ChainResolver::new(options),
        }
    }

    /// 汇总冻结的布局
    pub fn assemble(&self, layout: &Layout) -> Report {
        let chain = self.resolver.resolve(&layout.frameheaders);
        let first_frame = chain.first().map(header::expand);
        let bitrate = classify_bitrate(&chain);

        let audio_start = chain.first().map(|h| h.offset);
        let audio_end = chain.last().map(|last| {
            if layout.quick {
                // 未扫描的部分视为同一音频流, 延伸到尾部标签或流末尾
                layout
                    .tags
                    .iter()
                    .filter(|t| t.start >= last.end())
                    .map(|t| t.start)
                    .min()
                    .unwrap_or(layout.size)
            } else {
                last.end()
            }
        });
        let audio_bytes = match (audio_start, audio_end) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        };

        let duration_measured = if layout.quick {
            match bitrate {
                Some(mode) if mode.bit_rate() > 0 => {
                    audio_bytes as f64 * 8.0 / f64::from(mode.bit_rate())
                }
                _ => 0.0,
            }
        } else {
            chain.iter().map(|h| header::expand(h).duration).sum()
        };

        let declaration = find_declaration(layout, &chain).map(|(frame, sub_header)| {
            Declaration {
                offset: frame.offset,
                sub_header: sub_header.clone(),
                measured_frames: (!layout.quick).then_some(chain.len() as u64),
                measured_bytes: audio_bytes,
            }
        });

        let duration_declared = declaration.as_ref().and_then(|d| {
            let frames = d.sub_header.frames?;
            let format = first_frame.as_ref()?;
            (format.sample_rate > 0).then(|| {
                f64::from(frames) * f64::from(format.samples) / f64::from(format.sample_rate)
            })
        });

        let discrepancies = declaration
            .as_ref()
            .map(|d| cross_check(d, &chain))
            .unwrap_or_default();

        let has_header_tag = layout.first_tag(TagKind::VersionedHeader).is_some();
        let has_trailer = layout
            .last_tag(TagKind::LegacyTrailer)
            .is_some_and(|t| t.end == layout.size);

        Report {
            size: layout.size,
            quick: layout.quick,
            frame_count: chain.len(),
            chain,
            first_frame,
            bitrate,
            duration_measured,
            duration_declared,
            audio_start,
            audio_end,
            tags: layout.tags.clone(),
            has_header_tag,
            has_trailer,
            declaration,
            discrepancies,
        }
    }
}

/// 比特率分类: 只有一种比特率为 CBR, 否则取加权平均
fn classify_bitrate(chain: &[RawFrameHeader]) -> Option<BitrateMode> {
    if chain.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
    for h in chain {
        *counts.entry(header::expand(h).bit_rate).or_default() += 1;
    }
    if counts.len() == 1 {
        let (&bit_rate, _) = counts.iter().next()?;
        return Some(BitrateMode::Constant { bit_rate });
    }
    let total: u64 = counts.values().sum();
    let weighted: u64 = counts.iter().map(|(&rate, &n)| u64::from(rate) * n).sum();
    Some(BitrateMode::Variable {
        average: (weighted / total) as u32,
    })
}

/// 取帧链中第一个带子头的帧
fn find_declaration<'a>(
    layout: &'a Layout,
    chain: &[RawFrameHeader],
) -> Option<(&'a RawFrameHeader, &'a SubHeader)> {
    layout.headframes.iter().find_map(|f| {
        let sub = f.sub_header.as_ref()?;
        chain
            .binary_search_by_key(&f.header.offset, |h| h.offset)
            .ok()
            .map(|_| (&f.header, sub))
    })
}

/// 声明值与实测值对照
///
/// 声明是否计入子头所在帧本身因编码器而异, 帧数允许相差 1,
/// 字节数允许相差子头帧的长度.
fn cross_check(declaration: &Declaration, chain: &[RawFrameHeader]) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    if let (Some(declared), Some(measured)) =
        (declaration.sub_header.frames, declaration.measured_frames)
    {
        if u64::from(declared).abs_diff(measured) > 1 {
            out.push(Discrepancy::FrameCount { declared, measured });
        }
    }
    if let Some(declared) = declaration.sub_header.bytes {
        let tolerance = chain
            .iter()
            .find(|h| h.offset == declaration.offset)
            .map_or(0, |h| u64::from(h.size));
        let measured = declaration.measured_bytes;
        if u64::from(declared).abs_diff(measured) > tolerance {
            out.push(Discrepancy::ByteCount { declared, measured });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SubHeaderFrame;
    use crate::mpeg::SubHeaderKind;
    use crate::mpeg::header::decode;

    const FRONT: u16 = 0xFFFB;
    /// 128kbps 44100Hz
    const BACK_128: u16 = 0x9000;
    /// 192kbps 44100Hz
    const BACK_192: u16 = 0xB000;

    fn frames(start: u64, backs: &[u16]) -> Vec<RawFrameHeader> {
        let mut offset = start;
        backs
            .iter()
            .map(|&back| {
                let h = decode(FRONT, back, offset).unwrap();
                offset = h.end();
                h
            })
            .collect()
    }

    fn sub_header(frames: u32, bytes: u32) -> SubHeader {
        SubHeader {
            kind: SubHeaderKind::Xing,
            frames: Some(frames),
            bytes: Some(bytes),
            toc: None,
            quality: None,
            vbri: None,
            lame: None,
        }
    }

    #[test]
    fn test_空布局() {
        let report = ResultAssembler::default().assemble(&Layout::default());
        assert_eq!(report.frame_count, 0);
        assert_eq!(report.bitrate, None);
        assert_eq!(report.duration_measured, 0.0);
        assert!(!report.has_audio());
        assert!(report.discrepancies.is_empty());
    }

    #[test]
    fn test_cbr() {
        let chain = frames(0, &[BACK_128; 30]);
        let layout = Layout {
            size: chain.last().unwrap().end(),
            frameheaders: chain,
            ..Layout::default()
        };
        let report = ResultAssembler::default().assemble(&layout);
        assert_eq!(report.bitrate, Some(BitrateMode::Constant { bit_rate: 128_000 }));
        let expected = 30.0 * 1152.0 / 44100.0;
        assert!((report.duration_measured - expected).abs() < 1e-9);
    }

    #[test]
    fn test_vbr_加权平均() {
        // 3 帧 128k + 1 帧 192k => (3*128000 + 192000) / 4 = 144000
        let chain = frames(0, &[BACK_128, BACK_128, BACK_192, BACK_128]);
        let layout = Layout {
            frameheaders: chain,
            ..Layout::default()
        };
        let report = ResultAssembler::default().assemble(&layout);
        assert_eq!(report.bitrate, Some(BitrateMode::Variable { average: 144_000 }));
        assert!(!report.bitrate.unwrap().is_constant());
    }

    #[test]
    fn test_声明差一帧不算不一致() {
        let chain = frames(0, &[BACK_128; 11]);
        let bytes = (chain.last().unwrap().end() - chain[0].end()) as u32;
        let layout = Layout {
            headframes: vec![SubHeaderFrame {
                header: chain[0],
                sub_header: Some(sub_header(10, bytes)),
            }],
            frameheaders: chain,
            ..Layout::default()
        };
        let report = ResultAssembler::default().assemble(&layout);
        let declaration = report.declaration.unwrap();
        assert_eq!(declaration.measured_frames, Some(11));
        assert!(report.discrepancies.is_empty());
        let declared = report.duration_declared.unwrap();
        assert!((declared - 10.0 * 1152.0 / 44100.0).abs() < 1e-9);
    }

    #[test]
    fn test_声明不一致() {
        let chain = frames(0, &[BACK_128; 11]);
        let layout = Layout {
            headframes: vec![SubHeaderFrame {
                header: chain[0],
                sub_header: Some(sub_header(500, 1_000_000)),
            }],
            frameheaders: chain,
            ..Layout::default()
        };
        let report = ResultAssembler::default().assemble(&layout);
        assert_eq!(report.discrepancies.len(), 2);
        assert_eq!(
            report.discrepancies[0],
            Discrepancy::FrameCount {
                declared: 500,
                measured: 11
            }
        );
    }

    #[test]
    fn test_快速模式按字节估算() {
        let chain = frames(100, &[BACK_128; 50]);
        let size = 100 + 417 * 1000;
        let layout = Layout {
            frameheaders: chain,
            size,
            quick: true,
            ..Layout::default()
        };
        let report = ResultAssembler::default().assemble(&layout);
        assert_eq!(report.audio_end, Some(size));
        let expected = (417.0 * 1000.0) * 8.0 / 128_000.0;
        assert!((report.duration_measured - expected).abs() < 1e-9);
    }

    #[test]
    fn test_尾部标签须在流末尾() {
        let layout = Layout {
            size: 1000,
            tags: vec![TagRange {
                kind: TagKind::LegacyTrailer,
                start: 500,
                end: 628,
                info: crate::tags::TagInfo::LegacyTrailer {
                    track: None,
                    genre: 0,
                },
                payload: None,
            }],
            ..Layout::default()
        };
        let report = ResultAssembler::default().assemble(&layout);
        assert!(!report.has_trailer);
        assert_eq!(report.tags.len(), 1);
    }
}

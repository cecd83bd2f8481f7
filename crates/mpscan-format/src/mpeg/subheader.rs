//! 内嵌 VBR 子头解析 (Xing/Info 与 VBRI).
//!
//! 编码器通常在第一帧的负载中写入一个声明块, 给出整条流的帧数/字节数与
//! 可选的定位表:
//! ```text
//! Xing/Info: 标签(4) 标志(4) [帧数(4)] [字节数(4)] [TOC(100)] [质量(4)] [LAME 扩展(36)]
//! VBRI:      标签(4) 版本(2) 延迟(2) 质量(2) 字节数(4) 帧数(4)
//!            表项数(2) 缩放(2) 表项长度(2) 每项帧数(2) TOC(表项数 * 表项长度)
//! ```
//! "Info" 是 LAME 为 CBR 流写入的同构变体.

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use super::header::HEADER_LEN;

/// 默认搜索窗口: 帧头之后 40 字节内
pub const DEFAULT_SEARCH_WINDOW: usize = 40;

/// Xing TOC 长度
const XING_TOC_LEN: usize = 100;

/// LAME 扩展块长度
const LAME_EXT_LEN: usize = 36;

/// VBRI 固定字段长度 (含标签)
const VBRI_FIXED_LEN: usize = 26;

/// gapless 延迟/填充合理上限 (样本)
const MAX_GAPLESS_SAMPLES: u16 = 2880;

bitflags! {
    /// Xing 头中的可选字段标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XingFlags: u32 {
        const FRAMES = 0x0001;
        const BYTES = 0x0002;
        const TOC = 0x0004;
        const QUALITY = 0x0008;
    }
}

/// 子头种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubHeaderKind {
    /// "Xing": VBR 流
    Xing,
    /// "Info": LAME 写给 CBR 流的同构块
    Info,
    /// "VBRI": Fraunhofer 编码器
    Vbri,
}

/// LAME 扩展信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LameExtension {
    /// 编码器版本字符串 (如 "LAME3.100", "Lavc58.91")
    pub encoder: String,
    /// 信息标签版本
    pub revision: u8,
    /// VBR 方法
    pub vbr_method: u8,
    /// 低通滤波频率 (Hz), 0 表示未知
    pub lowpass: u32,
    /// 编码器延迟 (样本)
    pub encoder_delay: u16,
    /// 尾部填充 (样本)
    pub encoder_padding: u16,
}

/// VBRI 特有字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VbriFields {
    pub version: u16,
    pub delay: u16,
    pub toc_scale: u16,
    pub toc_entry_size: u16,
    pub toc_frames_per_entry: u16,
}

/// 子头声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubHeader {
    pub kind: SubHeaderKind,
    /// 声明的帧数
    pub frames: Option<u32>,
    /// 声明的字节数
    pub bytes: Option<u32>,
    /// 定位表 (Xing 为 100 个百分比位置, VBRI 为按缩放还原后的每段字节数)
    pub toc: Option<Vec<u32>>,
    /// 质量指示
    pub quality: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vbri: Option<VbriFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lame: Option<LameExtension>,
}

/// 在帧头之后的窗口内查找子头
///
/// `frame` 从帧头第一个字节开始. 找到并解析成功时返回子头与
/// 紧随子头之后的字节偏移 (相对 `frame` 起点).
pub fn scan_for_sub_header(frame: &[u8], window: usize) -> Option<(SubHeader, usize)> {
    let last_start = (HEADER_LEN + window).saturating_sub(4);
    let mut pos = HEADER_LEN;
    while pos <= last_start && pos + 4 <= frame.len() {
        let parsed = match &frame[pos..pos + 4] {
            b"Xing" => parse_xing(frame, pos, SubHeaderKind::Xing),
            b"Info" => parse_xing(frame, pos, SubHeaderKind::Info),
            b"VBRI" => parse_vbri(frame, pos),
            _ => None,
        };
        if parsed.is_some() {
            return parsed;
        }
        pos += 1;
    }
    None
}

/// 帧头之后的窗口内是否出现已知子头标签
pub fn has_sub_header_tag(frame: &[u8], window: usize) -> bool {
    let end = (HEADER_LEN + window).min(frame.len());
    if end <= HEADER_LEN {
        return false;
    }
    frame[HEADER_LEN..end]
        .windows(4)
        .any(|w| w == b"Xing" || w == b"Info" || w == b"VBRI")
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4).map(BigEndian::read_u32)
}

fn parse_xing(frame: &[u8], tag_pos: usize, kind: SubHeaderKind) -> Option<(SubHeader, usize)> {
    let flags = XingFlags::from_bits_truncate(read_u32(frame, tag_pos + 4)?);
    let mut pos = tag_pos + 8;

    let frames = if flags.contains(XingFlags::FRAMES) {
        let v = read_u32(frame, pos)?;
        pos += 4;
        Some(v)
    } else {
        None
    };
    let bytes = if flags.contains(XingFlags::BYTES) {
        let v = read_u32(frame, pos)?;
        pos += 4;
        Some(v)
    } else {
        None
    };
    let toc = if flags.contains(XingFlags::TOC) {
        let table = frame.get(pos..pos + XING_TOC_LEN)?;
        pos += XING_TOC_LEN;
        Some(table.iter().map(|&b| u32::from(b)).collect())
    } else {
        None
    };
    let quality = if flags.contains(XingFlags::QUALITY) {
        let v = read_u32(frame, pos)?;
        pos += 4;
        Some(v)
    } else {
        None
    };

    let lame = frame
        .get(pos..pos + LAME_EXT_LEN)
        .and_then(parse_lame_extension);
    if lame.is_some() {
        pos += LAME_EXT_LEN;
    }

    Some((
        SubHeader {
            kind,
            frames,
            bytes,
            toc,
            quality,
            vbri: None,
            lame,
        },
        pos,
    ))
}

/// 解析 Xing 可选字段之后的 LAME 扩展
///
/// 布局: [0..9] 编码器字符串, [9] 版本(高4位)/VBR方法(低4位), [10] 低通/100,
/// [11..21] 回放增益等, [21..24] 延迟(12 bit)/填充(12 bit).
fn parse_lame_extension(ext: &[u8]) -> Option<LameExtension> {
    if !ext[..4].iter().all(u8::is_ascii_alphanumeric) {
        return None;
    }
    let d = &ext[21..24];
    let encoder_delay = (u16::from(d[0]) << 4) | (u16::from(d[1]) >> 4);
    let encoder_padding = ((u16::from(d[1]) & 0x0F) << 8) | u16::from(d[2]);
    if encoder_delay > MAX_GAPLESS_SAMPLES || encoder_padding > MAX_GAPLESS_SAMPLES {
        return None;
    }
    let encoder = String::from_utf8_lossy(&ext[..9])
        .trim_end_matches(['\0', ' '])
        .to_string();
    Some(LameExtension {
        encoder,
        revision: ext[9] >> 4,
        vbr_method: ext[9] & 0x0F,
        lowpass: u32::from(ext[10]) * 100,
        encoder_delay,
        encoder_padding,
    })
}

fn parse_vbri(frame: &[u8], tag_pos: usize) -> Option<(SubHeader, usize)> {
    let fixed = frame.get(tag_pos..tag_pos + VBRI_FIXED_LEN)?;
    let version = BigEndian::read_u16(&fixed[4..6]);
    let delay = BigEndian::read_u16(&fixed[6..8]);
    let quality = BigEndian::read_u16(&fixed[8..10]);
    let bytes = BigEndian::read_u32(&fixed[10..14]);
    let frames = BigEndian::read_u32(&fixed[14..18]);
    let entries = BigEndian::read_u16(&fixed[18..20]);
    let toc_scale = BigEndian::read_u16(&fixed[20..22]);
    let toc_entry_size = BigEndian::read_u16(&fixed[22..24]);
    let toc_frames_per_entry = BigEndian::read_u16(&fixed[24..26]);
    if !(1..=4).contains(&toc_entry_size) {
        return None;
    }

    let mut pos = tag_pos + VBRI_FIXED_LEN;
    let toc_len = usize::from(entries) * usize::from(toc_entry_size);
    // 定位表被截断时只保留声明字段
    let toc = frame.get(pos..pos + toc_len).map(|table| {
        table
            .chunks_exact(usize::from(toc_entry_size))
            .map(|e| {
                let scaled = BigEndian::read_uint(e, e.len()) * u64::from(toc_scale);
                u32::try_from(scaled).unwrap_or(u32::MAX)
            })
            .collect::<Vec<_>>()
    });
    if toc.is_some() {
        pos += toc_len;
    }

    Some((
        SubHeader {
            kind: SubHeaderKind::Vbri,
            frames: Some(frames),
            bytes: Some(bytes),
            toc,
            quality: Some(u32::from(quality)),
            vbri: Some(VbriFields {
                version,
                delay,
                toc_scale,
                toc_entry_size,
                toc_frames_per_entry,
            }),
            lame: None,
        },
        pos,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造一个 417 字节帧, 在偏移 36 处写入 Xing 块
    fn xing_frame(tag: &[u8; 4], flags: u32, frames: u32, bytes: u32) -> Vec<u8> {
        let mut f = vec![0u8; 417];
        f[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        let mut p = 36;
        f[p..p + 4].copy_from_slice(tag);
        f[p + 4..p + 8].copy_from_slice(&flags.to_be_bytes());
        p += 8;
        if flags & 1 != 0 {
            f[p..p + 4].copy_from_slice(&frames.to_be_bytes());
            p += 4;
        }
        if flags & 2 != 0 {
            f[p..p + 4].copy_from_slice(&bytes.to_be_bytes());
            p += 4;
        }
        if flags & 4 != 0 {
            for i in 0..100 {
                f[p + i] = (i * 2) as u8;
            }
            p += 100;
        }
        if flags & 8 != 0 {
            f[p..p + 4].copy_from_slice(&57u32.to_be_bytes());
            p += 4;
        }
        // LAME 扩展: delay = 576, padding = 1200
        f[p..p + 9].copy_from_slice(b"LAME3.100");
        f[p + 9] = 0x13;
        f[p + 10] = 195;
        let delay: u32 = 576;
        let padding: u32 = 1200;
        let packed = delay << 12 | padding;
        f[p + 21] = (packed >> 16) as u8;
        f[p + 22] = (packed >> 8) as u8;
        f[p + 23] = packed as u8;
        f
    }

    #[test]
    fn test_xing_全部字段() {
        let frame = xing_frame(b"Xing", 0x0F, 1000, 400_000);
        let (sub, end) = scan_for_sub_header(&frame, DEFAULT_SEARCH_WINDOW).unwrap();
        assert_eq!(sub.kind, SubHeaderKind::Xing);
        assert_eq!(sub.frames, Some(1000));
        assert_eq!(sub.bytes, Some(400_000));
        assert_eq!(sub.quality, Some(57));
        let toc = sub.toc.unwrap();
        assert_eq!(toc.len(), 100);
        assert_eq!(toc[10], 20);
        let lame = sub.lame.unwrap();
        assert_eq!(lame.encoder, "LAME3.100");
        assert_eq!(lame.revision, 1);
        assert_eq!(lame.vbr_method, 3);
        assert_eq!(lame.lowpass, 19500);
        assert_eq!(lame.encoder_delay, 576);
        assert_eq!(lame.encoder_padding, 1200);
        assert_eq!(end, 36 + 8 + 4 + 4 + 100 + 4 + 36);
    }

    #[test]
    fn test_info_仅帧数() {
        let frame = xing_frame(b"Info", 0x01, 321, 0);
        let (sub, _) = scan_for_sub_header(&frame, DEFAULT_SEARCH_WINDOW).unwrap();
        assert_eq!(sub.kind, SubHeaderKind::Info);
        assert_eq!(sub.frames, Some(321));
        assert_eq!(sub.bytes, None);
        assert_eq!(sub.toc, None);
    }

    #[test]
    fn test_vbri() {
        let mut f = vec![0u8; 417];
        f[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        let p = 36;
        f[p..p + 4].copy_from_slice(b"VBRI");
        f[p + 4..p + 6].copy_from_slice(&1u16.to_be_bytes());
        f[p + 6..p + 8].copy_from_slice(&1104u16.to_be_bytes());
        f[p + 8..p + 10].copy_from_slice(&75u16.to_be_bytes());
        f[p + 10..p + 14].copy_from_slice(&123_456u32.to_be_bytes());
        f[p + 14..p + 18].copy_from_slice(&789u32.to_be_bytes());
        f[p + 18..p + 20].copy_from_slice(&3u16.to_be_bytes());
        f[p + 20..p + 22].copy_from_slice(&2u16.to_be_bytes());
        f[p + 22..p + 24].copy_from_slice(&2u16.to_be_bytes());
        f[p + 24..p + 26].copy_from_slice(&10u16.to_be_bytes());
        for (i, v) in [100u16, 200, 300].iter().enumerate() {
            f[p + 26 + i * 2..p + 28 + i * 2].copy_from_slice(&v.to_be_bytes());
        }
        let (sub, end) = scan_for_sub_header(&f, DEFAULT_SEARCH_WINDOW).unwrap();
        assert_eq!(sub.kind, SubHeaderKind::Vbri);
        assert_eq!(sub.frames, Some(789));
        assert_eq!(sub.bytes, Some(123_456));
        assert_eq!(sub.toc, Some(vec![200, 400, 600]));
        assert_eq!(sub.vbri.unwrap().delay, 1104);
        assert_eq!(end, p + 26 + 6);
    }

    #[test]
    fn test_窗口外不识别() {
        let mut f = vec![0u8; 417];
        f[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        f[60..64].copy_from_slice(b"Xing");
        assert!(scan_for_sub_header(&f, DEFAULT_SEARCH_WINDOW).is_none());
        assert!(!has_sub_header_tag(&f, DEFAULT_SEARCH_WINDOW));
    }

    #[test]
    fn test_截断的xing无效() {
        let frame = xing_frame(b"Xing", 0x0F, 1000, 400_000);
        assert!(scan_for_sub_header(&frame[..60], DEFAULT_SEARCH_WINDOW).is_none());
        assert!(has_sub_header_tag(&frame[..60], DEFAULT_SEARCH_WINDOW));
    }
}

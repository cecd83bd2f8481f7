//! MPEG 音频帧头编解码.
//!
//! 帧头结构 (32 位, 前 16 位记为 front, 后 16 位记为 back):
//! ```text
//! AAAA AAAA  AAAB BCCD  EEEE FFGH  IIJJ KLMM
//! A = 同步位 (11 bit, 全1)   B = MPEG 版本    C = 层
//! D = CRC 保护 (0 表示有)    E = 比特率索引    F = 采样率索引
//! G = 填充位                H = 私有位        I = 声道模式
//! J = 模式扩展              K = 版权         L = 原始/复制
//! M = 强调
//! ```
//!
//! [`decode`] 只做校验与帧长计算, 产出 [`RawFrameHeader`];
//! [`expand`] 通过查表把原始位域展开为 [`FrameHeader`].

use std::fmt;

use serde::Serialize;

/// 帧头长度 (字节)
pub const HEADER_LEN: usize = 4;

/// 同步字节 (帧头首字节)
pub const SYNC_BYTE: u8 = 0xFF;

/// 比特率表 (kbps), 索引 0 = free, 15 = bad, 两者均视为无效
const BITRATE_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATE_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const BITRATE_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATE_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
/// MPEG-2/2.5 Layer II 与 Layer III 共用
const BITRATE_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

/// 采样率表, 按版本索引 (0 = 2.5, 2 = 2, 3 = 1)
const SAMPLE_RATES: [[u32; 3]; 4] = [
    [11025, 12000, 8000],
    [0, 0, 0],
    [22050, 24000, 16000],
    [44100, 48000, 32000],
];

/// MPEG 音频版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MpegVersion {
    /// MPEG-1
    V1,
    /// MPEG-2
    V2,
    /// MPEG-2.5
    V25,
}

impl MpegVersion {
    fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::V25),
            2 => Some(Self::V2),
            3 => Some(Self::V1),
            _ => None,
        }
    }
}

impl fmt::Display for MpegVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "MPEG-1"),
            Self::V2 => write!(f, "MPEG-2"),
            Self::V25 => write!(f, "MPEG-2.5"),
        }
    }
}

/// MPEG 音频层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Layer {
    /// Layer I
    L1,
    /// Layer II
    L2,
    /// Layer III
    L3,
}

impl Layer {
    fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::L3),
            2 => Some(Self::L2),
            3 => Some(Self::L1),
            _ => None,
        }
    }

    /// 填充单元长度 (字节)
    fn slot_size(self) -> u32 {
        match self {
            Self::L1 => 4,
            Self::L2 | Self::L3 => 1,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L1 => write!(f, "Layer I"),
            Self::L2 => write!(f, "Layer II"),
            Self::L3 => write!(f, "Layer III"),
        }
    }
}

/// 声道模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => Self::Stereo,
            1 => Self::JointStereo,
            2 => Self::DualChannel,
            _ => Self::Mono,
        }
    }

    /// 声道数
    pub fn channels(self) -> u8 {
        if self == Self::Mono { 1 } else { 2 }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stereo => write!(f, "stereo"),
            Self::JointStereo => write!(f, "joint stereo"),
            Self::DualChannel => write!(f, "dual channel"),
            Self::Mono => write!(f, "mono"),
        }
    }
}

/// 联合立体声的模式扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModeExtension {
    /// Layer I/II: 强度立体声覆盖的子带范围 (含两端)
    Bands { from: u8, to: u8 },
    /// Layer III: 强度立体声 / M-S 立体声开关
    Layer3 { intensity: bool, mid_side: bool },
}

/// 原始帧头
///
/// 仅在同步位与各字段取值校验通过后创建, 创建后不可变. 按 `offset` 自然排序.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RawFrameHeader {
    /// 帧起始绝对位置
    pub offset: u64,
    /// 帧头前 16 位
    pub front: u16,
    /// 帧头后 16 位
    pub back: u16,
    /// 帧总字节数 (含帧头)
    pub size: u32,
}

impl RawFrameHeader {
    /// 版本索引 (0 = 2.5, 2 = 2, 3 = 1)
    pub fn version_index(&self) -> u8 {
        ((self.front >> 3) & 0x03) as u8
    }

    /// 层索引 (1 = III, 2 = II, 3 = I)
    pub fn layer_index(&self) -> u8 {
        ((self.front >> 1) & 0x03) as u8
    }

    /// 是否带 CRC 校验
    pub fn is_protected(&self) -> bool {
        self.front & 0x01 == 0
    }

    pub fn bitrate_index(&self) -> u8 {
        (self.back >> 12) as u8
    }

    pub fn sample_rate_index(&self) -> u8 {
        ((self.back >> 10) & 0x03) as u8
    }

    pub fn is_padded(&self) -> bool {
        (self.back >> 9) & 0x01 == 1
    }

    pub fn private_bit(&self) -> bool {
        (self.back >> 8) & 0x01 == 1
    }

    pub fn mode_index(&self) -> u8 {
        ((self.back >> 6) & 0x03) as u8
    }

    pub fn mode_extension_index(&self) -> u8 {
        ((self.back >> 4) & 0x03) as u8
    }

    pub fn is_copyrighted(&self) -> bool {
        (self.back >> 3) & 0x01 == 1
    }

    pub fn is_original(&self) -> bool {
        (self.back >> 2) & 0x01 == 1
    }

    pub fn emphasis_index(&self) -> u8 {
        (self.back & 0x03) as u8
    }

    /// 紧随本帧之后的下一帧应当出现的位置
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }

    /// 版本与层是否一致
    pub fn same_format(&self, other: &RawFrameHeader) -> bool {
        self.version_index() == other.version_index() && self.layer_index() == other.layer_index()
    }

    /// 还原 4 字节帧头
    pub fn to_bytes(&self) -> [u8; 4] {
        let f = self.front.to_be_bytes();
        let b = self.back.to_be_bytes();
        [f[0], f[1], b[0], b[1]]
    }
}

/// 展开后的帧头
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameHeader {
    pub offset: u64,
    pub size: u32,
    pub version: MpegVersion,
    pub layer: Layer,
    pub channel_mode: ChannelMode,
    pub channels: u8,
    /// 仅联合立体声时有意义
    pub mode_extension: Option<ModeExtension>,
    /// 比特率 (bps)
    pub bit_rate: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 每帧采样数
    pub samples: u32,
    /// 单帧时长 (秒)
    pub duration: f64,
    pub padding: bool,
    pub protected: bool,
    pub private: bool,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: u8,
}

fn bitrate_kbps(version: MpegVersion, layer: Layer, index: u8) -> u32 {
    let table = match (version, layer) {
        (MpegVersion::V1, Layer::L1) => &BITRATE_V1_L1,
        (MpegVersion::V1, Layer::L2) => &BITRATE_V1_L2,
        (MpegVersion::V1, Layer::L3) => &BITRATE_V1_L3,
        (_, Layer::L1) => &BITRATE_V2_L1,
        (_, _) => &BITRATE_V2_L23,
    };
    table.get(index as usize).copied().unwrap_or(0)
}

fn samples_per_frame(version: MpegVersion, layer: Layer) -> u32 {
    match (version, layer) {
        (_, Layer::L1) => 384,
        (_, Layer::L2) => 1152,
        (MpegVersion::V1, Layer::L3) => 1152,
        (_, Layer::L3) => 576,
    }
}

/// 校验并解码帧头
///
/// 同步位、版本、层、比特率索引 (free/bad)、采样率索引任一无效时返回 `None`,
/// 调用方应把这 4 字节视为非帧头并前进一个字节.
///
/// 帧长 = `每帧采样数 / 8 * 比特率 / 采样率` (整数截断, 运算顺序固定) + 填充.
pub fn decode(front: u16, back: u16, offset: u64) -> Option<RawFrameHeader> {
    if front & 0xFFE0 != 0xFFE0 {
        return None;
    }
    let version = MpegVersion::from_index(((front >> 3) & 0x03) as u8)?;
    let layer = Layer::from_index(((front >> 1) & 0x03) as u8)?;

    let bitrate_index = (back >> 12) as u8;
    if bitrate_index == 0 || bitrate_index == 15 {
        return None;
    }
    let sample_rate_index = ((back >> 10) & 0x03) as usize;
    if sample_rate_index == 3 {
        return None;
    }

    let bit_rate = u64::from(bitrate_kbps(version, layer, bitrate_index)) * 1000;
    let sample_rate = u64::from(SAMPLE_RATES[((front >> 3) & 0x03) as usize][sample_rate_index]);
    let samples = u64::from(samples_per_frame(version, layer));
    let padding = if (back >> 9) & 0x01 == 1 {
        u64::from(layer.slot_size())
    } else {
        0
    };
    let size = samples / 8 * bit_rate / sample_rate + padding;

    Some(RawFrameHeader {
        offset,
        front,
        back,
        size: u32::try_from(size).ok()?,
    })
}

/// 从字节切片开头解码帧头, 不足 4 字节时返回 `None`
pub fn decode_bytes(bytes: &[u8], offset: u64) -> Option<RawFrameHeader> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let front = u16::from_be_bytes([bytes[0], bytes[1]]);
    let back = u16::from_be_bytes([bytes[2], bytes[3]]);
    decode(front, back, offset)
}

/// 展开原始帧头
///
/// 输入必须来自 [`decode`]; 对同一输入结果恒定.
pub fn expand(raw: &RawFrameHeader) -> FrameHeader {
    // decode 已排除保留值, 这里的回退分支不会命中
    let version = MpegVersion::from_index(raw.version_index()).unwrap_or(MpegVersion::V1);
    let layer = Layer::from_index(raw.layer_index()).unwrap_or(Layer::L3);
    let channel_mode = ChannelMode::from_index(raw.mode_index());
    let bit_rate = bitrate_kbps(version, layer, raw.bitrate_index()) * 1000;
    let sample_rate = SAMPLE_RATES[raw.version_index() as usize]
        .get(raw.sample_rate_index() as usize)
        .copied()
        .unwrap_or(0);
    let samples = samples_per_frame(version, layer);
    let duration = if sample_rate > 0 {
        f64::from(samples) / f64::from(sample_rate)
    } else {
        0.0
    };

    let mode_extension = if channel_mode == ChannelMode::JointStereo {
        let ext = raw.mode_extension_index();
        Some(match layer {
            Layer::L3 => ModeExtension::Layer3 {
                intensity: ext & 0x01 != 0,
                mid_side: ext & 0x02 != 0,
            },
            Layer::L1 | Layer::L2 => ModeExtension::Bands {
                from: 4 * (ext + 1),
                to: 31,
            },
        })
    } else {
        None
    };

    FrameHeader {
        offset: raw.offset,
        size: raw.size,
        version,
        layer,
        channel_mode,
        channels: channel_mode.channels(),
        mode_extension,
        bit_rate,
        sample_rate,
        samples,
        duration,
        padding: raw.is_padded(),
        protected: raw.is_protected(),
        private: raw.private_bit(),
        copyright: raw.is_copyrighted(),
        original: raw.is_original(),
        emphasis: raw.emphasis_index(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1 Layer III, 无 CRC
    const FRONT_V1_L3: u16 = 0xFFFB;

    fn back(bitrate_idx: u16, sr_idx: u16, padding: bool, mode: u16) -> u16 {
        bitrate_idx << 12 | sr_idx << 10 | u16::from(padding) << 9 | mode << 6
    }

    #[test]
    fn test_帧长_mpeg1_layer3_128kbps_44100() {
        let raw = decode(FRONT_V1_L3, back(9, 0, false, 0), 0).unwrap();
        assert_eq!(raw.size, 417);
        let padded = decode(FRONT_V1_L3, back(9, 0, true, 0), 0).unwrap();
        assert_eq!(padded.size, 418);
    }

    #[test]
    fn test_帧长_mpeg1_layer3_320kbps_48000() {
        let raw = decode(FRONT_V1_L3, back(14, 1, false, 0), 0).unwrap();
        assert_eq!(raw.size, 960);
    }

    #[test]
    fn test_帧长_layer1_填充单元为4字节() {
        // MPEG-1 Layer I (层索引 3), 384kbps (索引 12), 48000Hz
        let front = 0xFFE0 | 3 << 3 | 3 << 1 | 1;
        let raw = decode(front, back(12, 1, false, 0), 0).unwrap();
        // 48 * 384000 / 48000 = 384
        assert_eq!(raw.size, 384);
        let padded = decode(front, back(12, 1, true, 0), 0).unwrap();
        assert_eq!(padded.size, 388);
    }

    #[test]
    fn test_帧长_mpeg2_layer3() {
        // MPEG-2 Layer III, 64kbps (索引 8), 22050Hz: 72 * 64000 / 22050 = 208
        let front = 0xFFE0 | 2 << 3 | 1 << 1 | 1;
        let raw = decode(front, back(8, 0, false, 3), 0).unwrap();
        assert_eq!(raw.size, 208);
        let fh = expand(&raw);
        assert_eq!(fh.version, MpegVersion::V2);
        assert_eq!(fh.samples, 576);
        assert_eq!(fh.channels, 1);
    }

    #[test]
    fn test_无效帧头() {
        assert!(decode(0x0000, 0x0000, 0).is_none());
        assert!(decode(0x1234, 0x5678, 0).is_none());
        // 保留版本
        assert!(decode(0xFFE0 | 1 << 3 | 1 << 1 | 1, back(9, 0, false, 0), 0).is_none());
        // 保留层
        assert!(decode(0xFFE0 | 3 << 3 | 1, back(9, 0, false, 0), 0).is_none());
        // free / bad 比特率
        assert!(decode(FRONT_V1_L3, back(0, 0, false, 0), 0).is_none());
        assert!(decode(FRONT_V1_L3, back(15, 0, false, 0), 0).is_none());
        // 保留采样率
        assert!(decode(FRONT_V1_L3, back(9, 3, false, 0), 0).is_none());
    }

    #[test]
    fn test_展开字段() {
        let raw = decode(FRONT_V1_L3, back(9, 0, false, 1) | 0x2 << 4 | 0x4, 100).unwrap();
        let fh = expand(&raw);
        assert_eq!(fh.offset, 100);
        assert_eq!(fh.version, MpegVersion::V1);
        assert_eq!(fh.layer, Layer::L3);
        assert_eq!(fh.bit_rate, 128_000);
        assert_eq!(fh.sample_rate, 44100);
        assert_eq!(fh.samples, 1152);
        assert_eq!(fh.channel_mode, ChannelMode::JointStereo);
        assert_eq!(
            fh.mode_extension,
            Some(ModeExtension::Layer3 {
                intensity: false,
                mid_side: true
            })
        );
        assert!(fh.original);
        assert!(!fh.protected);
        assert!((fh.duration - 1152.0 / 44100.0).abs() < 1e-12);
    }

    #[test]
    fn test_非联合立体声无模式扩展() {
        let raw = decode(FRONT_V1_L3, back(9, 0, false, 0) | 0x3 << 4, 0).unwrap();
        assert_eq!(expand(&raw).mode_extension, None);
    }

    #[test]
    fn test_解码与展开确定性() {
        for b in [back(9, 0, false, 0), back(5, 2, true, 3), back(14, 1, false, 1)] {
            let a = decode(FRONT_V1_L3, b, 7).unwrap();
            let c = decode_bytes(&a.to_bytes(), 7).unwrap();
            assert_eq!(a, c);
            assert_eq!(expand(&a), expand(&c));
        }
    }

    #[test]
    fn test_字节不足() {
        assert!(decode_bytes(&[0xFF, 0xFB, 0x90], 0).is_none());
    }
}

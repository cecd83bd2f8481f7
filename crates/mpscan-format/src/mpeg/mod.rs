//! MPEG 音频帧层: 帧头编解码与内嵌 VBR 子头.

pub mod header;
pub mod subheader;

pub use header::{
    ChannelMode, FrameHeader, HEADER_LEN, Layer, ModeExtension, MpegVersion, RawFrameHeader,
};
pub use subheader::{LameExtension, SubHeader, SubHeaderKind, VbriFields, XingFlags};

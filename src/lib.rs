//! # mpscan
//!
//! MP3 结构扫描: 在字节流中定位头部标签 (ID3v2)、尾部标签 (ID3v1) 与 MPEG 音频帧,
//! 从混有误报的候选帧头中选出真实帧链, 并推导比特率模式与时长.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use mpscan::format::ScanOptions;
//!
//! let report = mpscan::scan_file("song.mp3", ScanOptions::default()).unwrap();
//! println!("帧数: {}, 时长: {:.2}s", report.frame_count, report.duration_measured);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `mpscan-core` | 错误类型与同步安全整数 |
//! | `mpscan-format` | 字节游标、帧头编解码、扫描器、帧链与报告 |

use std::path::Path;

use bytes::Bytes;

/// 错误类型与共用工具
pub use mpscan_core as core;

/// 扫描器与报告
pub use mpscan_format as format;

pub mod logging;

pub use mpscan_core::{ScanError, ScanResult};
pub use mpscan_format::{Layout, Report, ScanOptions};

/// 获取 mpscan 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 扫描文件
///
/// 未指定 `stream_size` 时使用文件长度.
pub fn scan_file(path: impl AsRef<Path>, mut options: ScanOptions) -> ScanResult<Report> {
    let cursor = format::ByteCursor::open(path)?;
    if options.stream_size.is_none() {
        options.stream_size = cursor.size_hint();
    }
    format::scan(cursor, options)
}

/// 扫描内存中的数据
pub fn scan_bytes(data: impl Into<Bytes>, options: ScanOptions) -> ScanResult<Report> {
    format::scan(format::ByteCursor::from_bytes(data), options)
}

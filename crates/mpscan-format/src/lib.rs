//! # mpscan-format
//!
//! MP3 流式结构扫描库: 定位头部/尾部标签与 MPEG 音频帧, 选出真实帧链并汇总报告.
//!
//! 数据单向流动: 字节源 → [`ByteCursor`] → [`StreamScanner`] (产出 [`Layout`])
//! → [`ChainResolver`] → [`ResultAssembler`] (产出 [`Report`]).

pub mod chain;
pub mod io;
pub mod layout;
pub mod mpeg;
pub mod observer;
pub mod options;
pub mod report;
pub mod scanner;
pub mod tags;

use mpscan_core::ScanResult;

// 重导出常用类型
pub use chain::{ChainOptions, ChainResolver};
pub use io::{ByteCursor, ByteSource, ChannelSource, MemorySource, PushHandle, ReaderSource};
pub use layout::{Layout, SubHeaderFrame};
pub use observer::{LogObserver, ScanEvent, ScanObserver};
pub use options::ScanOptions;
pub use report::{BitrateMode, Declaration, Discrepancy, Report, ResultAssembler};
pub use scanner::StreamScanner;
pub use tags::{TagInfo, TagKind, TagRange, TagReader};

/// 扫描并汇总一个游标上的流
///
/// 游标在返回前关闭.
pub fn scan(mut cursor: ByteCursor, options: ScanOptions) -> ScanResult<Report> {
    let assembler = ResultAssembler::new(options.chain_options());
    let layout = StreamScanner::new(options).scan(&mut cursor);
    cursor.close();
    Ok(assembler.assemble(&layout?))
}

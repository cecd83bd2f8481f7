//! 扫描诊断观察者.
//!
//! 扫描器只在调用方通过 [`ScanOptions`](crate::ScanOptions) 传入观察者时
//! 上报事件, 观察者不能影响扫描结果.

use log::{debug, trace};

use crate::mpeg::{RawFrameHeader, SubHeader};
use crate::tags::{TagKind, TagRange};

/// 扫描事件
#[derive(Debug)]
pub enum ScanEvent<'a> {
    /// 取到一个新块
    Chunk { offset: u64, len: usize },
    /// 块尾不足前瞻长度, 退回等待下一块
    TailDeferred { offset: u64, len: usize },
    TagFound(&'a TagRange),
    /// 命中签名但结构校验失败
    TagRejected { kind: TagKind, offset: u64 },
    Frame(&'a RawFrameHeader),
    SubHeader {
        offset: u64,
        sub_header: &'a SubHeader,
    },
    /// 遇到音频帧, 不再识别头部标签
    HeaderTagScanStopped { offset: u64 },
    /// 快速模式停止帧扫描
    QuickStop { offset: u64, frames: usize },
    Finished { size: u64 },
}

/// 扫描观察者
pub trait ScanObserver: Send + Sync {
    fn on_event(&self, event: &ScanEvent<'_>);
}

/// 把事件转发到 `log` 的观察者
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn on_event(&self, event: &ScanEvent<'_>) {
        match event {
            ScanEvent::Chunk { offset, len } => trace!("扫描: 取块 offset={offset}, len={len}"),
            ScanEvent::TailDeferred { offset, len } => {
                trace!("扫描: 块尾退回 offset={offset}, len={len}")
            }
            ScanEvent::TagFound(tag) => debug!(
                "扫描: 发现标签 {:?} [{}, {})",
                tag.kind, tag.start, tag.end
            ),
            ScanEvent::TagRejected { kind, offset } => {
                debug!("扫描: {kind:?} 签名校验失败, offset={offset}")
            }
            ScanEvent::Frame(h) => trace!("扫描: 帧 offset={}, size={}", h.offset, h.size),
            ScanEvent::SubHeader { offset, sub_header } => debug!(
                "扫描: 子头 {:?} offset={offset}, 帧数={:?}, 字节数={:?}",
                sub_header.kind, sub_header.frames, sub_header.bytes
            ),
            ScanEvent::HeaderTagScanStopped { offset } => {
                debug!("扫描: 音频起始于 {offset}, 停止识别头部标签")
            }
            ScanEvent::QuickStop { offset, frames } => {
                debug!("扫描: 快速模式在 {offset} 停止, 已确认 {frames} 帧")
            }
            ScanEvent::Finished { size } => debug!("扫描: 完成, 总长度={size}"),
        }
    }
}

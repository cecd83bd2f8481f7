//! 流式结构扫描器.
//!
//! 按块从 [`ByteCursor`] 拉取数据, 在每个字节位置按优先级识别三类签名:
//! 1. "ID3" 版本化头部标签
//! 2. 0xFF 帧同步字节
//! 3. "TAG" 尾部标签
//!
//! 命中并校验通过的区域整体跳过; 校验失败只前进一个字节.

use bytes::{Bytes, BytesMut};
use mpscan_core::ScanResult;

use crate::chain::ChainResolver;
use crate::io::ByteCursor;
use crate::layout::{Layout, SubHeaderFrame};
use crate::mpeg::header::{self, HEADER_LEN, SYNC_BYTE};
use crate::mpeg::subheader::{self, DEFAULT_SEARCH_WINDOW};
use crate::observer::ScanEvent;
use crate::options::ScanOptions;
use crate::tags::id3v1::TAG_LEN;
use crate::tags::{LegacyTrailerReader, TagKind, TagRange, TagReader, VersionedHeaderReader};

/// 块尾最少前瞻字节数, 不足时退回并与下一块合并
pub const MIN_LOOKAHEAD: usize = 200;

/// 快速模式每隔多少帧检查一次
pub const QUICK_CHECK_INTERVAL: usize = 50;

/// 快速模式要求的最短帧链
pub const QUICK_MIN_CHAIN: usize = 10;

/// 最小块大小
const MIN_CHUNK_SIZE: usize = 1024;

/// 单个位置的处理结果
enum Step {
    /// 在当前块内前进若干字节
    Advance(usize),
    /// 当前块已放弃, 游标已定位到下一个待扫描位置
    Refetch,
}

/// 一次扫描的可变状态
struct ScanState {
    header_tag: bool,
    trailer_tag: bool,
    frames: bool,
    layout: Layout,
    /// 最近一帧末尾至多 128 字节及其起始偏移
    frame_tail: Option<(u64, Bytes)>,
}

impl ScanState {
    fn header_tag_found(&self) -> bool {
        self.layout.first_tag(TagKind::VersionedHeader).is_some()
    }
}

/// 流式结构扫描器
#[derive(Debug, Clone, Default)]
pub struct StreamScanner {
    options: ScanOptions,
}

impl StreamScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    fn emit(&self, event: ScanEvent<'_>) {
        if let Some(observer) = &self.options.observer {
            observer.on_event(&event);
        }
    }

    fn chunk_size(&self) -> usize {
        self.options.chunk_size.max(MIN_CHUNK_SIZE)
    }

    /// 扫描整个流, 返回冻结的布局
    ///
    /// 只有字节源错误会中止扫描.
    pub fn scan(&self, cursor: &mut ByteCursor) -> ScanResult<Layout> {
        let mut state = ScanState {
            header_tag: self.options.header_tag,
            trailer_tag: self.options.trailer_tag,
            frames: self.options.frames,
            layout: Layout::default(),
            frame_tail: None,
        };
        let chunk_size = self.chunk_size();

        'chunks: loop {
            if !state.frames && !state.header_tag {
                return self.finish_without_frames(cursor, state);
            }
            let base = cursor.position();
            let chunk = cursor.read(chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            let exhausted = chunk.len() < chunk_size;
            self.emit(ScanEvent::Chunk {
                offset: base,
                len: chunk.len(),
            });

            let mut i = 0;
            while i < chunk.len() {
                let rest = chunk.len() - i;
                if rest < MIN_LOOKAHEAD && !exhausted {
                    self.emit(ScanEvent::TailDeferred {
                        offset: base + i as u64,
                        len: rest,
                    });
                    cursor.push_back(chunk.slice(i..));
                    continue 'chunks;
                }

                let window = &chunk[i..];
                let step = if state.header_tag && window.starts_with(VersionedHeaderReader.signature())
                {
                    self.try_tag(&VersionedHeaderReader, &mut state, cursor, &chunk, i, base)?
                } else if state.frames && window[0] == SYNC_BYTE {
                    let step = self.try_frame(&mut state, cursor, &chunk, i, base)?;
                    if self.quick_stop_due(&state) {
                        if let Step::Advance(n) = step {
                            if i + n < chunk.len() {
                                cursor.push_back(chunk.slice(i + n..));
                            }
                        }
                        state.frames = false;
                        state.layout.quick = true;
                        self.emit(ScanEvent::QuickStop {
                            offset: cursor.position(),
                            frames: state.layout.frameheaders.len(),
                        });
                        continue 'chunks;
                    }
                    step
                } else if state.trailer_tag && window.starts_with(LegacyTrailerReader.signature()) {
                    self.try_tag(&LegacyTrailerReader, &mut state, cursor, &chunk, i, base)?
                } else {
                    Step::Advance(1)
                };

                match step {
                    Step::Advance(n) => i += n,
                    Step::Refetch => continue 'chunks,
                }
            }
        }

        state.layout.size = cursor.position();
        if state.trailer_tag {
            self.trailer_in_last_frame(&mut state);
        }
        self.emit(ScanEvent::Finished {
            size: state.layout.size,
        });
        Ok(state.layout)
    }

    fn known_size(&self, cursor: &ByteCursor) -> Option<u64> {
        self.options.stream_size.or_else(|| cursor.size_hint())
    }

    /// 尝试在 `chunk[i..]` 处读取一个标签
    fn try_tag(
        &self,
        reader: &dyn TagReader,
        state: &mut ScanState,
        cursor: &mut ByteCursor,
        chunk: &Bytes,
        i: usize,
        base: u64,
    ) -> ScanResult<Step> {
        let offset = base + i as u64;
        let rest = &chunk[i..];
        let keep = self.options.keep_payload;
        let measured = rest
            .get(..reader.preamble_len())
            .and_then(|preamble| reader.measure(preamble));
        let Some(total) = measured else {
            self.reject(reader.kind(), offset);
            return Ok(Step::Advance(1));
        };

        if total <= rest.len() {
            return Ok(match reader.decode(offset, chunk.slice(i..i + total), keep) {
                Some(tag) => {
                    self.record_tag(state, tag);
                    Step::Advance(total)
                }
                None => {
                    self.reject(reader.kind(), offset);
                    Step::Advance(1)
                }
            });
        }

        if self
            .known_size(cursor)
            .is_some_and(|size| offset + total as u64 > size)
        {
            self.reject(reader.kind(), offset);
            return Ok(Step::Advance(1));
        }

        // 标签跨越当前块
        cursor.push_back(chunk.slice(i..));
        if keep {
            let data = cursor.read(total)?;
            let decoded = if data.len() == total {
                reader.decode(offset, data.clone(), keep)
            } else {
                None
            };
            match decoded {
                Some(tag) => self.record_tag(state, tag),
                None => {
                    self.reject(reader.kind(), offset);
                    cursor.push_back(data.slice(1..));
                }
            }
            return Ok(Step::Refetch);
        }

        // 不保留原始字节: 只读前导与末尾, 跳过标签体
        let preamble = cursor.read(reader.preamble_len())?;
        let footer_len = reader.footer_len(&preamble);
        let body = total.saturating_sub(preamble.len() + footer_len) as u64;
        let skipped = cursor.skip(body)?;
        let footer = cursor.read(footer_len)?;
        let decoded = if skipped == body && footer.len() == footer_len {
            reader.decode_sparse(offset, &preamble, &footer)
        } else {
            None
        };
        match decoded {
            Some(tag) => self.record_tag(state, tag),
            // 标签体已跳过, 从声明的末尾继续
            None => self.reject(reader.kind(), offset),
        }
        Ok(Step::Refetch)
    }

    fn reject(&self, kind: TagKind, offset: u64) {
        self.emit(ScanEvent::TagRejected { kind, offset });
    }

    fn record_tag(&self, state: &mut ScanState, tag: TagRange) {
        self.emit(ScanEvent::TagFound(&tag));
        if tag.kind == TagKind::VersionedHeader {
            if self.options.stop_after_first_header_tag {
                state.header_tag = false;
            }
            if self.options.trailer_only_without_header {
                state.trailer_tag = false;
            }
        }
        state.layout.tags.push(tag);
    }

    /// 尝试在 `chunk[i..]` 处解码一个帧
    fn try_frame(
        &self,
        state: &mut ScanState,
        cursor: &mut ByteCursor,
        chunk: &Bytes,
        i: usize,
        base: u64,
    ) -> ScanResult<Step> {
        let offset = base + i as u64;
        let Some(raw) = header::decode_bytes(&chunk[i..], offset) else {
            return Ok(Step::Advance(1));
        };
        let size = raw.size as usize;
        // 游标已退回到 offset, 之后只能经游标读取
        let mut rewound = false;

        if state.header_tag {
            let confirmed = state.header_tag_found()
                || match chunk.get(i + size..i + size + HEADER_LEN) {
                    Some(next) => header::decode_bytes(next, raw.end()).is_some(),
                    None => {
                        cursor.push_back(chunk.slice(i..));
                        rewound = true;
                        let ahead = cursor.read(size + HEADER_LEN)?;
                        let next = ahead
                            .get(size..)
                            .and_then(|next| header::decode_bytes(next, raw.end()));
                        cursor.push_back(ahead);
                        next.is_some()
                    }
                };
            if !confirmed {
                // 孤立的候选帧: 记录后只前进一个字节, 头部标签仍可识别
                self.emit(ScanEvent::Frame(&raw));
                state.layout.frameheaders.push(raw);
                return Ok(if rewound {
                    cursor.skip(1)?;
                    Step::Refetch
                } else {
                    Step::Advance(1)
                });
            }
            state.header_tag = false;
            self.emit(ScanEvent::HeaderTagScanStopped { offset });
        }

        let fits = !rewound && i + size <= chunk.len();
        if !fits && !rewound {
            cursor.push_back(chunk.slice(i..));
        }
        let (frame, step) = if fits {
            (chunk.slice(i..i + size), Step::Advance(size))
        } else {
            (cursor.read(size)?, Step::Refetch)
        };
        if state.trailer_tag {
            let start = frame.len().saturating_sub(TAG_LEN);
            state.frame_tail = Some((offset + start as u64, frame.slice(start..)));
        }

        let window_end = (i + HEADER_LEN + DEFAULT_SEARCH_WINDOW).min(chunk.len());
        if subheader::has_sub_header_tag(&chunk[i..window_end], DEFAULT_SEARCH_WINDOW) {
            let sub_header =
                subheader::scan_for_sub_header(&frame, DEFAULT_SEARCH_WINDOW).map(|(s, _)| s);
            if let Some(sub_header) = &sub_header {
                self.emit(ScanEvent::SubHeader { offset, sub_header });
            }
            state
                .layout
                .headframes
                .push(SubHeaderFrame { header: raw, sub_header });
        }

        self.emit(ScanEvent::Frame(&raw));
        state.layout.frameheaders.push(raw);
        Ok(step)
    }

    /// 流末尾的尾部标签落在最后一帧的声明长度内时, 按最后 128 字节补查
    fn trailer_in_last_frame(&self, state: &mut ScanState) {
        let size = state.layout.size;
        let Some((start, tail)) = state.frame_tail.take() else {
            return;
        };
        if tail.len() != TAG_LEN
            || start + TAG_LEN as u64 != size
            || !tail.starts_with(LegacyTrailerReader.signature())
            || state.layout.last_tag(TagKind::LegacyTrailer).is_some_and(|t| t.end == size)
        {
            return;
        }
        match LegacyTrailerReader.decode(start, tail, self.options.keep_payload) {
            Some(tag) => self.record_tag(state, tag),
            None => self.reject(TagKind::LegacyTrailer, start),
        }
    }

    /// 快速模式: 已见到子头声明, 或已有足够长的帧链
    fn quick_stop_due(&self, state: &ScanState) -> bool {
        let frames = &state.layout.frameheaders;
        if !self.options.quick || frames.is_empty() || frames.len() % QUICK_CHECK_INTERVAL != 0 {
            return false;
        }
        if state.layout.sub_header().is_some() {
            return true;
        }
        let resolver = ChainResolver::new(self.options.chain_options());
        resolver.longest_seed_frames(frames) >= QUICK_MIN_CHAIN
    }

    /// 帧与头部标签都不再识别: 只定位尾部标签并确定流长度
    fn finish_without_frames(
        &self,
        cursor: &mut ByteCursor,
        mut state: ScanState,
    ) -> ScanResult<Layout> {
        if state.trailer_tag {
            let (tail_offset, tail) = self.drain_keeping_tail(cursor)?;
            state.layout.size = cursor.position();
            if tail.len() == TAG_LEN {
                if tail.starts_with(LegacyTrailerReader.signature()) {
                    match LegacyTrailerReader.decode(tail_offset, tail, self.options.keep_payload) {
                        Some(tag) => self.record_tag(&mut state, tag),
                        None => self.reject(TagKind::LegacyTrailer, tail_offset),
                    }
                }
            } else {
                // 最后一帧已读到流末尾
                self.trailer_in_last_frame(&mut state);
            }
        } else if let Some(size) = self.options.stream_size {
            state.layout.size = size.max(cursor.position());
            cursor.close();
        } else {
            state.layout.size = cursor.consume_to_end()?;
        }
        self.emit(ScanEvent::Finished {
            size: state.layout.size,
        });
        Ok(state.layout)
    }

    /// 读到流末尾, 只保留最后 128 字节
    fn drain_keeping_tail(&self, cursor: &mut ByteCursor) -> ScanResult<(u64, Bytes)> {
        let mut tail = Bytes::new();
        loop {
            let chunk = cursor.read(self.chunk_size())?;
            if chunk.is_empty() {
                break;
            }
            tail = if chunk.len() >= TAG_LEN {
                chunk.slice(chunk.len() - TAG_LEN..)
            } else {
                let mut joined = BytesMut::with_capacity(tail.len() + chunk.len());
                joined.extend_from_slice(&tail);
                joined.extend_from_slice(&chunk);
                let start = joined.len().saturating_sub(TAG_LEN);
                joined.freeze().slice(start..)
            };
        }
        let tail_offset = cursor.position() - tail.len() as u64;
        Ok((tail_offset, tail))
    }
}

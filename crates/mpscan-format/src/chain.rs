//! 帧链解析.
//!
//! 扫描得到的候选帧头中混有误报 (负载里恰好满足同步校验的字节).
//! 真实编码器产出的帧首尾相接, 而误报几乎不会连续成链, 因此:
//! 1. 在有限前缀内贪心构建首尾相接的链, 取跳数最多者作为种子;
//! 2. 从种子首帧出发在完整列表上重放, 补回前缀之外的真实帧, 同时丢弃孤立误报.

use std::borrow::Cow;

use crate::mpeg::RawFrameHeader;

/// 前缀探测步长
pub const PROBE_STEP: usize = 50;

/// 前缀探测上限
pub const PROBE_LIMIT: usize = 500;

/// 种子链的默认最大长度
pub const DEFAULT_SEED_LEN: usize = 20;

/// 帧链解析参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOptions {
    /// 种子链最大长度 (帧数)
    pub max_seed_len: usize,
    /// 间隙桥接允许的最大字节数, `None` 表示不设上限
    pub max_gap: Option<u64>,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            max_seed_len: DEFAULT_SEED_LEN,
            max_gap: None,
        }
    }
}

/// 种子链
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    /// 首帧在候选列表中的下标
    pub start: usize,
    /// 跳数 (帧数 - 1)
    pub hops: usize,
}

/// 帧链解析器
#[derive(Debug, Clone, Default)]
pub struct ChainResolver {
    options: ChainOptions,
}

impl ChainResolver {
    pub fn new(options: ChainOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// 从候选帧头中选出真实音频帧链
    ///
    /// 找不到至少两帧相接的链时返回空列表.
    pub fn resolve(&self, candidates: &[RawFrameHeader]) -> Vec<RawFrameHeader> {
        let headers = sorted(candidates);
        match self.best_chain(&headers) {
            Some(seed) => self.replay(&headers, seed.start),
            None => Vec::new(),
        }
    }

    /// 在逐步扩大的前缀内寻找跳数最多的种子链
    ///
    /// `headers` 须按偏移升序.
    pub fn best_chain(&self, headers: &[RawFrameHeader]) -> Option<Seed> {
        let limit = headers.len().min(PROBE_LIMIT);
        let mut prefix = limit.min(PROBE_STEP);
        while prefix > 0 {
            if let Some(seed) = self.seed_in_prefix(&headers[..prefix]) {
                return Some(seed);
            }
            if prefix == limit {
                break;
            }
            prefix = (prefix + PROBE_STEP).min(limit);
        }
        None
    }

    /// 种子链的帧数, 没有种子时为 0
    pub fn longest_seed_frames(&self, headers: &[RawFrameHeader]) -> usize {
        self.best_chain(headers).map_or(0, |seed| seed.hops + 1)
    }

    fn seed_in_prefix(&self, prefix: &[RawFrameHeader]) -> Option<Seed> {
        let mut claimed = vec![false; prefix.len()];
        let mut best: Option<Seed> = None;

        for start in 0..prefix.len() {
            if claimed[start] {
                continue;
            }
            claimed[start] = true;
            let mut current = start;
            let mut hops = 0;
            while hops + 1 < self.options.max_seed_len {
                let expected = prefix[current].end();
                let Some(next) = find_offset(prefix, current + 1, expected) else {
                    break;
                };
                claimed[next] = true;
                current = next;
                hops += 1;
            }
            if hops > 0 && best.is_none_or(|b| hops > b.hops) {
                best = Some(Seed { start, hops });
            }
        }
        best
    }

    fn replay(&self, headers: &[RawFrameHeader], start: usize) -> Vec<RawFrameHeader> {
        let mut chain = vec![headers[start]];
        let mut prev = headers[start];
        let mut i = start + 1;

        while i < headers.len() {
            let expected = prev.end();
            if let Some(j) = find_offset(headers, i, expected) {
                prev = headers[j];
                chain.push(prev);
                i = j + 1;
                continue;
            }

            let next = headers[i];
            i += 1;
            if next.offset < expected {
                // 落在上一帧负载内的误报
                continue;
            }
            let gap = next.offset - expected;
            let within_cap = self.options.max_gap.is_none_or(|cap| gap <= cap);
            if next.same_format(&prev) && within_cap {
                chain.push(next);
                prev = next;
            }
        }
        chain
    }
}

/// 在 `headers[from..]` 中二分查找偏移恰为 `offset` 的帧头
fn find_offset(headers: &[RawFrameHeader], from: usize, offset: u64) -> Option<usize> {
    let tail = headers.get(from..)?;
    tail.binary_search_by_key(&offset, |h| h.offset)
        .ok()
        .map(|j| from + j)
}

fn sorted(candidates: &[RawFrameHeader]) -> Cow<'_, [RawFrameHeader]> {
    if candidates.is_sorted_by_key(|h| h.offset) {
        Cow::Borrowed(candidates)
    } else {
        let mut owned = candidates.to_vec();
        owned.sort_by_key(|h| h.offset);
        Cow::Owned(owned)
    }
}

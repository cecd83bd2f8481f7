//! I/O 抽象层.
//!
//! 字节源 ([`ByteSource`]) 以数据块为单位向外提供数据, 可以是文件、内存或
//! 由其他线程/异步任务推送的网络流. [`ByteCursor`] 在字节源之上提供按需拉取的
//! 缓冲读取接口: 绝对位置跟踪、有限预读、标记搜索、前向跳过以及回推
//! (push back) 已读字节, 供需要回溯的试探性解析使用.
//!
//! 字节源尚未给出数据时, 游标的读取操作会阻塞等待, 直到下一块数据到达或源结束.
//! 字节的顺序与内容严格保持源的投递顺序.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use mpscan_core::{ScanError, ScanResult};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// 默认数据块大小 (32 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// 字节源 trait
///
/// 实现此 trait 以支持不同的数据来源. 每次调用返回下一块数据,
/// `Ok(None)` 表示数据已全部投递完毕.
pub trait ByteSource: Send {
    /// 拉取下一块数据
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;

    /// 数据总长度 (如果可知)
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// 关闭字节源, 释放文件句柄/连接等资源
    fn close(&mut self) {}
}

/// 内存字节源
///
/// 按固定块大小切分已有数据, 主要用于测试分块边界行为.
pub struct MemorySource {
    data: Bytes,
    pos: usize,
    chunk_size: usize,
}

impl MemorySource {
    /// 从已有数据创建, 使用默认块大小
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_chunk_size(data, DEFAULT_CHUNK_SIZE)
    }

    /// 从已有数据创建, 指定块大小 (最小为 1)
    pub fn with_chunk_size(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl ByteSource for MemorySource {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// 基于 [`Read`] 的字节源 (文件、管道等)
pub struct ReaderSource<R: Read + Send> {
    /// `None` 表示已关闭
    reader: Option<R>,
    chunk_size: usize,
    size: Option<u64>,
}

impl<R: Read + Send> ReaderSource<R> {
    /// 包装任意 reader
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            chunk_size: chunk_size.max(1),
            size: None,
        }
    }

    /// 指定数据总长度
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl ReaderSource<File> {
    /// 打开文件 (只读), 文件大小作为长度提示
    pub fn open(path: impl AsRef<Path>) -> ScanResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata().ok().map(|m| m.len());
        let mut source = Self::new(file, DEFAULT_CHUNK_SIZE);
        source.size = size;
        Ok(source)
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(Bytes::from(buf)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn size_hint(&self) -> Option<u64> {
        self.size
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

/// 推送式字节源的生产者端
///
/// 通道容量有限: 消费者尚未取走数据时, 推送会等待 (背压).
/// 丢弃 `PushHandle` 即表示数据已全部投递.
pub struct PushHandle {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl PushHandle {
    /// 异步推送一块数据
    ///
    /// 消费者已关闭时返回 [`ScanError::Cancelled`].
    pub async fn push(&self, chunk: Bytes) -> ScanResult<()> {
        self.tx.send(Ok(chunk)).await.map_err(|_| ScanError::Cancelled)
    }

    /// 同步推送一块数据 (不可在异步上下文中调用)
    pub fn blocking_push(&self, chunk: Bytes) -> ScanResult<()> {
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| ScanError::Cancelled)
    }

    /// 报告源故障, 消费者下一次拉取时会收到该错误
    pub async fn fail(self, err: io::Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// 消费者是否已关闭
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 推送式字节源的消费者端
///
/// `next_chunk` 通过阻塞接收等待生产者, 必须在同步上下文中调用
/// (异步程序中请放入 `spawn_blocking`).
pub struct ChannelSource {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    size: Option<u64>,
}

impl ChannelSource {
    /// 指定数据总长度
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl ByteSource for ChannelSource {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self.rx.blocking_recv() {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<u64> {
        self.size
    }

    fn close(&mut self) {
        self.rx.close();
    }
}

/// 创建推送式字节源, `capacity` 为通道中最多积压的数据块数
pub fn channel_source(capacity: usize) -> (PushHandle, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PushHandle { tx }, ChannelSource { rx, size: None })
}

/// 在当前 tokio 运行时中启动任务, 把异步 reader 的数据推送进字节源
///
/// 返回的任务在消费者关闭后提前结束, 结果为已推送的字节数.
pub fn spawn_async_reader<R>(
    mut reader: R,
    chunk_size: usize,
    capacity: usize,
) -> (ChannelSource, tokio::task::JoinHandle<io::Result<u64>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (handle, source) = channel_source(capacity);
    let chunk_size = chunk_size.max(1);
    let task = tokio::spawn(async move {
        let mut total = 0u64;
        loop {
            let mut buf = BytesMut::zeroed(chunk_size);
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let kind = e.kind();
                    let msg = e.to_string();
                    handle.fail(e).await;
                    return Err(io::Error::new(kind, msg));
                }
            };
            if n == 0 {
                return Ok(total);
            }
            buf.truncate(n);
            if handle.push(buf.freeze()).await.is_err() {
                return Ok(total);
            }
            total += n as u64;
        }
    });
    (source, task)
}

/// 字节游标
///
/// 在字节源之上维护一个未消费数据块队列 (缓冲窗口), 对外提供按需拉取的读取接口.
/// 绝对位置 [`position`](Self::position) 只随读取/跳过前进, 随回推后退.
pub struct ByteCursor {
    /// 底层字节源
    source: Box<dyn ByteSource>,
    /// 尚未消费的数据块
    window: VecDeque<Bytes>,
    /// 窗口中的总字节数
    buffered: usize,
    /// 窗口首字节的绝对位置
    position: u64,
    /// 字节源是否已结束
    source_done: bool,
}

impl ByteCursor {
    /// 从字节源创建游标
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            window: VecDeque::new(),
            buffered: 0,
            position: 0,
            source_done: false,
        }
    }

    /// 从内存数据创建游标
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(Box::new(MemorySource::new(data)))
    }

    /// 从文件路径打开游标
    pub fn open(path: impl AsRef<Path>) -> ScanResult<Self> {
        Ok(Self::new(Box::new(ReaderSource::open(path)?)))
    }

    /// 当前绝对位置
    pub fn position(&self) -> u64 {
        self.position
    }

    /// 缓冲窗口中的字节数
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// 字节源报告的数据总长度
    pub fn size_hint(&self) -> Option<u64> {
        self.source.size_hint()
    }

    /// 字节源已结束且缓冲窗口为空
    pub fn is_eof(&self) -> bool {
        self.source_done && self.buffered == 0
    }

    /// 从字节源拉取一块数据, 源已结束时返回 false
    fn fill(&mut self) -> ScanResult<bool> {
        while !self.source_done {
            match self.source.next_chunk()? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => {
                    self.buffered += chunk.len();
                    self.window.push_back(chunk);
                    return Ok(true);
                }
                None => self.source_done = true,
            }
        }
        Ok(false)
    }

    /// 从窗口头部取出至多 `n` 字节
    fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buffered);
        if n == 0 {
            return Bytes::new();
        }
        let front_len = self.window.front().map_or(0, Bytes::len);
        let out = if front_len > n {
            match self.window.front_mut() {
                Some(front) => front.split_to(n),
                None => Bytes::new(),
            }
        } else if front_len == n {
            self.window.pop_front().unwrap_or_default()
        } else {
            let mut out = BytesMut::with_capacity(n);
            while out.len() < n {
                let Some(mut chunk) = self.window.pop_front() else {
                    break;
                };
                let need = n - out.len();
                if chunk.len() > need {
                    out.extend_from_slice(&chunk.split_to(need));
                    self.window.push_front(chunk);
                } else {
                    out.extend_from_slice(&chunk);
                }
            }
            out.freeze()
        };
        self.buffered -= out.len();
        self.position += out.len() as u64;
        out
    }

    /// 丢弃窗口头部 `n` 字节 (n 不超过已缓冲量)
    fn discard(&mut self, n: usize) {
        let mut left = n.min(self.buffered);
        self.buffered -= left;
        self.position += left as u64;
        while left > 0 {
            let Some(front) = self.window.front_mut() else {
                break;
            };
            if front.len() > left {
                let _ = front.split_to(left);
                left = 0;
            } else {
                left -= front.len();
                self.window.pop_front();
            }
        }
    }

    /// 将整个窗口合并为一个连续块
    fn coalesce(&mut self) -> Bytes {
        if self.window.len() > 1 {
            let mut joined = BytesMut::with_capacity(self.buffered);
            for chunk in self.window.drain(..) {
                joined.extend_from_slice(&chunk);
            }
            self.window.push_back(joined.freeze());
        }
        self.window.front().cloned().unwrap_or_default()
    }

    /// 读取至多 `n` 字节
    ///
    /// 缓冲不足且源未结束时阻塞等待更多数据; 源结束时返回剩余部分 (可能为空).
    pub fn read(&mut self, n: usize) -> ScanResult<Bytes> {
        while self.buffered < n {
            if !self.fill()? {
                break;
            }
        }
        Ok(self.take(n))
    }

    /// 跳过 `n` 字节, 返回实际跳过的字节数 (源提前结束时可能更少)
    pub fn skip(&mut self, n: u64) -> ScanResult<u64> {
        let mut left = n;
        loop {
            let step = left.min(self.buffered as u64) as usize;
            self.discard(step);
            left -= step as u64;
            if left == 0 || !self.fill()? {
                break;
            }
        }
        Ok(n - left)
    }

    /// 把已读出的字节放回游标前端, 位置随之后退
    pub fn push_back(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.position -= bytes.len() as u64;
        self.buffered += bytes.len();
        self.window.push_front(bytes);
    }

    /// 搜索标记的首次出现
    ///
    /// 找到时丢弃标记之前的所有字节并返回标记的绝对位置 (标记本身保留在游标前端);
    /// 源耗尽仍未找到时丢弃全部数据并返回 `None`.
    pub fn scan_for_marker(&mut self, marker: &[u8]) -> ScanResult<Option<u64>> {
        if marker.is_empty() {
            return Err(ScanError::InvalidArgument("搜索标记不能为空".into()));
        }
        loop {
            let joined = self.coalesce();
            if let Some(idx) = find_marker(&joined, marker) {
                self.discard(idx);
                return Ok(Some(self.position));
            }
            // 保留可能跨块的标记前缀
            let keep = (marker.len() - 1).min(joined.len());
            self.discard(joined.len() - keep);
            if !self.fill()? {
                self.discard(self.buffered);
                return Ok(None);
            }
        }
    }

    /// 丢弃剩余全部数据, 返回流的总长度
    pub fn consume_to_end(&mut self) -> ScanResult<u64> {
        loop {
            self.discard(self.buffered);
            if !self.fill()? {
                return Ok(self.position);
            }
        }
    }

    /// 关闭底层字节源并清空窗口
    pub fn close(&mut self) {
        self.window.clear();
        self.buffered = 0;
        self.source_done = true;
        self.source.close();
    }
}

impl Drop for ByteCursor {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// 在 `haystack` 中查找 `marker` 的首个位置
pub(crate) fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.len() > haystack.len() {
        return None;
    }
    haystack.windows(marker.len()).position(|w| w == marker)
}

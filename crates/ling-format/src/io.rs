//! I/O 抽象层.
//!
//! 对标 FFmpeg 的 `AVIOContext`, 为解封装器提供统一的读取接口,
//! 支持文件与内存后端.
//!
//! 读取经过一个 2 的幂容量的环形缓冲 (最小 64 KiB), 按 8 KiB 块
//! 从后端取数. 已读过的数据保留在环内形成回退窗口, 页面同步与
//! CRC 失败后的重扫描通过 `seek_buffered` 在窗口内回退, 不触发
//! 后端 seek. `ensure_seek_back` 可显式扩大窗口 (如扩到一个完整
//! Ogg 页面的大小).

use std::io::{self, Read, Seek};

use ling_core::{LingError, LingResult};

/// 环形缓冲最小容量
const MIN_BUFFER_LEN: usize = 64 * 1024;

/// 单次从后端取数的块大小
const FETCH_LEN: usize = 8 * 1024;

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的数据来源 (文件、内存、网络等).
pub trait IoBackend: Send {
    /// 读取数据到缓冲区
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
}

/// I/O 上下文
///
/// 封装底层 I/O 操作, 为解封装器提供带回退窗口的读取接口.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 环形缓冲 (容量为 2 的幂)
    ring: Vec<u8>,
    /// 缓冲数据末端的绝对位置
    head: u64,
    /// 以 head 结尾的有效缓冲字节数
    filled: u64,
    /// 当前逻辑读取位置 (head - filled ≤ pos ≤ head)
    pos: u64,
}

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(mut backend: Box<dyn IoBackend>) -> Self {
        let head = backend.position().unwrap_or(0);
        Self {
            inner: backend,
            ring: vec![0u8; MIN_BUFFER_LEN],
            head,
            filled: 0,
            pos: head,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: &str) -> LingResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    #[inline]
    fn mask(&self) -> u64 {
        self.ring.len() as u64 - 1
    }

    /// 从后端取一块数据进环, 返回取到的字节数 (0 表示 EOF)
    fn fetch(&mut self) -> LingResult<usize> {
        let unread = (self.head - self.pos) as usize;
        let room = self.ring.len() - unread;
        let chunk = FETCH_LEN.min(room);
        if chunk == 0 {
            // 未读数据占满整个环, 属于内部使用错误
            return Err(LingError::Internal("I/O 环形缓冲耗尽".into()));
        }

        let idx = (self.head & self.mask()) as usize;
        let contiguous = self.ring.len() - idx;
        let n = self.inner.read(&mut self.ring[idx..idx + chunk.min(contiguous)])?;
        self.head += n as u64;
        self.filled = (self.filled + n as u64).min(self.ring.len() as u64);
        Ok(n)
    }

    // ========================
    // 读取方法
    // ========================

    /// 读取指定字节数
    pub fn read_exact(&mut self, buf: &mut [u8]) -> LingResult<()> {
        let mut total = 0usize;
        while total < buf.len() {
            if self.pos < self.head {
                let idx = (self.pos & self.mask()) as usize;
                let avail = (self.head - self.pos) as usize;
                let contiguous = self.ring.len() - idx;
                let n = (buf.len() - total).min(avail).min(contiguous);
                buf[total..total + n].copy_from_slice(&self.ring[idx..idx + n]);
                self.pos += n as u64;
                total += n;
            } else if self.fetch()? == 0 {
                return Err(LingError::Eof);
            }
        }
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> LingResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// 读取 u16 小端
    pub fn read_u16_le(&mut self) -> LingResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// 读取 u32 小端
    pub fn read_u32_le(&mut self) -> LingResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// 读取 u64 小端
    pub fn read_u64_le(&mut self) -> LingResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// 读取 4 字节标签 (FourCC)
    pub fn read_tag(&mut self) -> LingResult<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> LingResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 跳过指定字节数 (通过读取丢弃, 保留回退窗口)
    pub fn skip(&mut self, mut count: usize) -> LingResult<()> {
        let mut scratch = [0u8; 512];
        while count > 0 {
            let n = count.min(scratch.len());
            self.read_exact(&mut scratch[..n])?;
            count -= n;
        }
        Ok(())
    }

    // ========================
    // 定位方法
    // ========================

    /// 获取当前逻辑位置
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// 定位 (seek)
    ///
    /// 目标落在回退窗口内时仅移动逻辑位置; 否则执行后端 seek
    /// 并丢弃缓冲.
    pub fn seek(&mut self, target: io::SeekFrom) -> LingResult<u64> {
        let absolute = match target {
            io::SeekFrom::Start(offset) => offset,
            io::SeekFrom::Current(delta) => {
                let pos = self.pos as i64 + delta;
                if pos < 0 {
                    return Err(LingError::InvalidArgument("seek 位置不能为负".into()));
                }
                pos as u64
            }
            io::SeekFrom::End(delta) => {
                let size = self.size().ok_or_else(|| {
                    LingError::InvalidArgument("后端大小未知, 无法从末尾 seek".into())
                })?;
                let pos = size as i64 + delta;
                if pos < 0 {
                    return Err(LingError::InvalidArgument("seek 位置不能为负".into()));
                }
                pos as u64
            }
        };

        if absolute >= self.head - self.filled && absolute <= self.head {
            self.pos = absolute;
            return Ok(absolute);
        }

        self.inner.seek(io::SeekFrom::Start(absolute))?;
        self.head = absolute;
        self.filled = 0;
        self.pos = absolute;
        Ok(absolute)
    }

    /// 在回退窗口内定位到绝对位置
    ///
    /// 目标超出窗口时返回参数错误, 不触发后端 seek.
    pub fn seek_buffered(&mut self, absolute: u64) -> LingResult<u64> {
        if absolute < self.head - self.filled || absolute > self.head {
            return Err(LingError::InvalidArgument(format!(
                "seek_buffered 超出窗口: 目标={}, 窗口=[{}, {}]",
                absolute,
                self.head - self.filled,
                self.head,
            )));
        }
        self.pos = absolute;
        Ok(absolute)
    }

    /// 确保回退窗口至少可容纳 `len` 字节
    ///
    /// 容量向上取整到 2 的幂; 已缓冲数据原样保留.
    pub fn ensure_seek_back(&mut self, len: usize) {
        let need = (len + FETCH_LEN).next_power_of_two().max(MIN_BUFFER_LEN);
        if need <= self.ring.len() {
            return;
        }

        let mut ring = vec![0u8; need];
        let new_mask = need as u64 - 1;
        let start = self.head - self.filled;
        for offset in 0..self.filled {
            let abs = start + offset;
            ring[(abs & new_mask) as usize] = self.ring[(abs & self.mask()) as usize];
        }
        self.ring = ring;
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
    /// 是否声明可 seek (测试非可寻址路径用)
    seekable: bool,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            seekable: true,
        }
    }

    /// 创建声明为不可 seek 的内存后端
    pub fn from_data_unseekable(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            seekable: false,
        }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        if !self.seekable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "后端不支持 seek",
            ));
        }
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }
}

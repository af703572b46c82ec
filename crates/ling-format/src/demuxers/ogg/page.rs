//! Ogg 页面读取: 同步、头部校验、段表解析与 CRC 验证.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (必须为 0)
//! Header type:     1 byte (continuation=0x01, first=0x02, last=0x04,
//!                  高 5 位保留, 必须为 0)
//! Granule pos:     8 bytes (little-endian, 编解码器定义)
//! Serial number:   4 bytes (标识逻辑流)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes (多项式 0x04C11DB7, 本字段按 0 参与计算)
//! Num segments:    1 byte
//! Segment table:   N bytes (lacing 值)
//! Page body:       sum(lacing) bytes
//! ```
//!
//! 段表中任何 < 255 的 lacing 值终止一个 packet; 末尾连续的 255
//! 留下跨页的 packet 尾巴.

use log::warn;

use ling_core::crc::update_crc32_ogg;
use ling_core::{LingError, LingResult};

use crate::io::IoContext;

/// Ogg 同步字 (capture pattern)
pub(crate) const OGG_SYNC: [u8; 4] = *b"OggS";

/// 页面体的最大长度 (255 × 255)
pub(crate) const OGG_BODY_MAX: usize = 65025;

/// 整页的最大长度 (27 字节头 + 255 段表 + 页面体)
pub(crate) const OGG_PAGE_MAX_SIZE: usize = 27 + 255 + OGG_BODY_MAX;

/// 页面缓冲按 8 KiB 粒度增长
const BODY_GROW_STEP: usize = 8 * 1024;

/// 头部标志位
const FLAG_CONTINUATION: u8 = 0x01;
const FLAG_FIRST: u8 = 0x02;
const FLAG_LAST: u8 = 0x04;
const FLAG_RESERVED: u8 = 0xF8;

/// 表示"本页无 granule"的绝对粒度位置
pub(crate) const ABSGP_NONE: u64 = u64::MAX;

/// 已解析的页面头
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OggPageHeader {
    /// 头部标志
    pub(crate) flags: u8,
    /// 绝对粒度位置 (ABSGP_NONE 表示无)
    pub(crate) absgp: u64,
    /// 逻辑流序列号
    pub(crate) serial: u32,
    /// 页面序号
    pub(crate) sequence: u32,
    /// 段数
    pub(crate) num_segments: u8,
}

impl OggPageHeader {
    /// 是否为前页 packet 的延续
    pub(crate) fn is_continuation(&self) -> bool {
        self.flags & FLAG_CONTINUATION != 0
    }

    /// 是否为逻辑流起始页 (BOS)
    pub(crate) fn is_first(&self) -> bool {
        self.flags & FLAG_FIRST != 0
    }

    /// 是否为逻辑流结束页 (EOS)
    pub(crate) fn is_last(&self) -> bool {
        self.flags & FLAG_LAST != 0
    }
}

/// Ogg 页面读取器
///
/// 每次读取一页, 页面体与 packet 边界保留在内部缓冲中供取用.
pub(crate) struct OggPageReader {
    /// 当前页头
    header: OggPageHeader,
    /// 本页完整 packet 的长度表
    packet_lens: Vec<usize>,
    /// 页尾未完结 packet 的长度
    partial_len: usize,
    /// 页面体缓冲 (按 8 KiB 粒度增长)
    body: Vec<u8>,
    /// 页面体有效长度
    body_len: usize,
    /// 当前页在字节流中的起始位置
    start_pos: u64,
}

impl OggPageReader {
    pub(crate) fn new() -> Self {
        Self {
            header: OggPageHeader::default(),
            packet_lens: Vec::new(),
            partial_len: 0,
            body: Vec::new(),
            body_len: 0,
            start_pos: 0,
        }
    }

    /// 当前页头
    pub(crate) fn header(&self) -> &OggPageHeader {
        &self.header
    }

    /// 当前页起始字节位置
    pub(crate) fn start_pos(&self) -> u64 {
        self.start_pos
    }

    /// 本页完整 packet 的切片序列
    pub(crate) fn packets(&self) -> impl Iterator<Item = &[u8]> {
        let mut offset = 0usize;
        self.packet_lens.iter().map(move |&len| {
            let slice = &self.body[offset..offset + len];
            offset += len;
            slice
        })
    }

    /// 本页完整 packet 的数量
    pub(crate) fn packet_count(&self) -> usize {
        self.packet_lens.len()
    }

    /// 页尾未完结的 packet 片段
    pub(crate) fn partial(&self) -> &[u8] {
        let start = self.body_len - self.partial_len;
        &self.body[start..self.body_len]
    }

    /// 逐字节扫描同步字, 返回同步字起始位置
    fn sync_page(&mut self, io: &mut IoContext) -> LingResult<u64> {
        let mut window = [0u8; 4];
        io.read_exact(&mut window)?;
        loop {
            if window == OGG_SYNC {
                return Ok(io.position() - 4);
            }
            window = [window[1], window[2], window[3], io.read_u8()?];
        }
    }

    /// 尝试读取一页
    ///
    /// 头部非法返回数据错误 (调用方重新同步); CRC 不符时回退到
    /// 同步点之后并返回 `CrcMismatch`, 下次调用从那里重新扫描.
    pub(crate) fn try_read_page(&mut self, io: &mut IoContext) -> LingResult<()> {
        let sync_pos = self.sync_page(io)?;

        // 27 字节定长头 (含同步字), CRC 字段按 0 参与校验
        let mut header = [0u8; 27];
        header[0..4].copy_from_slice(&OGG_SYNC);
        io.read_exact(&mut header[4..])?;

        let version = header[4];
        if version != 0 {
            return Err(LingError::InvalidData(format!(
                "不支持的 Ogg 版本: {version}",
            )));
        }
        let flags = header[5];
        if flags & FLAG_RESERVED != 0 {
            return Err(LingError::InvalidData(format!(
                "Ogg 页面保留标志位非零: 0x{flags:02X}",
            )));
        }

        let absgp = u64::from_le_bytes(header[6..14].try_into().unwrap());
        let serial = u32::from_le_bytes(header[14..18].try_into().unwrap());
        let sequence = u32::from_le_bytes(header[18..22].try_into().unwrap());
        let crc = u32::from_le_bytes(header[22..26].try_into().unwrap());
        let num_segments = header[26];

        let mut segments = [0u8; 255];
        let segments = &mut segments[..usize::from(num_segments)];
        io.read_exact(segments)?;

        // 段表 → packet 边界
        self.packet_lens.clear();
        self.partial_len = 0;
        let mut current = 0usize;
        let mut body_len = 0usize;
        for &lacing in segments.iter() {
            current += usize::from(lacing);
            body_len += usize::from(lacing);
            if lacing < 255 {
                self.packet_lens.push(current);
                current = 0;
            }
        }
        self.partial_len = current;
        debug_assert!(body_len <= OGG_BODY_MAX);

        // 页面体, 缓冲按 8 KiB 粒度增长
        if self.body.len() < body_len {
            self.body.resize(body_len.next_multiple_of(BODY_GROW_STEP), 0);
        }
        io.read_exact(&mut self.body[..body_len])?;
        self.body_len = body_len;

        // CRC 覆盖 CRC 字段清零的头 + 段表 + 页面体
        let mut crc_header = header;
        crc_header[22..26].fill(0);
        let mut calc = update_crc32_ogg(0, &crc_header);
        calc = update_crc32_ogg(calc, segments);
        calc = update_crc32_ogg(calc, &self.body[..body_len]);
        if calc != crc {
            // 回退到同步点之后, 下次调用从那里重新扫描
            io.seek_buffered(sync_pos + 4)?;
            return Err(LingError::CrcMismatch);
        }

        self.header = OggPageHeader {
            flags,
            absgp,
            serial,
            sequence,
            num_segments,
        };
        self.start_pos = sync_pos;
        Ok(())
    }

    /// 读取下一个有效页面, 吸收 CRC 失败并重新同步
    pub(crate) fn next_page(&mut self, io: &mut IoContext) -> LingResult<()> {
        loop {
            match self.try_read_page(io) {
                Ok(()) => return Ok(()),
                Err(LingError::CrcMismatch) => {
                    warn!("Ogg: 页面 CRC 校验失败, 重新同步");
                }
                Err(LingError::InvalidData(msg)) => {
                    warn!("Ogg: 页面头非法 ({msg}), 重新同步");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryBackend;
    use ling_core::crc::crc32_ogg;

    /// 构建一个 Ogg 页面 (含正确的 CRC)
    pub(crate) fn build_page(
        flags: u8,
        absgp: u64,
        serial: u32,
        sequence: u32,
        segments: &[u8],
        body: &[u8],
    ) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(&OGG_SYNC);
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&absgp.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        let crc_offset = page.len();
        page.extend_from_slice(&0u32.to_le_bytes());
        page.push(segments.len() as u8);
        page.extend_from_slice(segments);
        page.extend_from_slice(body);

        let crc = crc32_ogg(&page);
        page[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
        page
    }

    fn make_io(data: Vec<u8>) -> IoContext {
        IoContext::new(Box::new(MemoryBackend::from_data(data)))
    }

    #[test]
    fn test_单页单packet() {
        let body = b"hello";
        let data = build_page(FLAG_FIRST, 0, 0x1234, 0, &[5], body);
        let mut io = make_io(data);
        let mut reader = OggPageReader::new();
        reader.try_read_page(&mut io).unwrap();

        assert!(reader.header().is_first());
        assert_eq!(reader.header().serial, 0x1234);
        assert_eq!(reader.packet_count(), 1);
        assert_eq!(reader.packets().next().unwrap(), body);
        assert!(reader.partial().is_empty());
    }

    #[test]
    fn test_段表packet边界() {
        // [100, 50, 255, 200]: 三个完整 packet (100, 50, 455)
        let mut body = vec![0u8; 100 + 50 + 255 + 200];
        for (i, b) in body.iter_mut().enumerate() {
            *b = i as u8;
        }
        let data = build_page(0, 0, 1, 0, &[100, 50, 255, 200], &body);
        let mut io = make_io(data);
        let mut reader = OggPageReader::new();
        reader.try_read_page(&mut io).unwrap();

        let lens: Vec<usize> = reader.packets().map(|p| p.len()).collect();
        assert_eq!(lens, vec![100, 50, 455]);
        assert!(reader.partial().is_empty());

        // 以 255 结尾 → 尾部留下未完结片段
        let body2 = vec![7u8; 100 + 255];
        let data2 = build_page(0, 0, 1, 0, &[100, 255], &body2);
        let mut io2 = make_io(data2);
        reader.try_read_page(&mut io2).unwrap();
        assert_eq!(reader.packet_count(), 1);
        assert_eq!(reader.partial().len(), 255);
    }

    #[test]
    fn test_crc_失败后重新同步() {
        let good = build_page(0, 1024, 9, 1, &[5], b"world");
        let mut bad = build_page(0, 512, 9, 0, &[5], b"hello");
        // 翻转页面体中的一个字节
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        let mut data = bad;
        data.extend_from_slice(&good);
        let mut io = make_io(data);
        let mut reader = OggPageReader::new();

        // 第一次: CRC 不符
        assert!(matches!(
            reader.try_read_page(&mut io),
            Err(LingError::CrcMismatch)
        ));
        // 第二次: 跳过坏页, 读到好页
        reader.try_read_page(&mut io).unwrap();
        assert_eq!(reader.header().sequence, 1);
        assert_eq!(reader.packets().next().unwrap(), b"world");
    }

    #[test]
    fn test_垃圾前缀重新同步() {
        let mut data = vec![0xA5u8; 1000];
        data.extend_from_slice(b"Ogg");
        data.extend_from_slice(&build_page(0, 0, 3, 0, &[3], b"abc"));
        let mut io = make_io(data);
        let mut reader = OggPageReader::new();
        reader.next_page(&mut io).unwrap();
        assert_eq!(reader.header().serial, 3);
    }

    #[test]
    fn test_保留标志位拒绝() {
        let page = build_page(0x80, 0, 1, 0, &[3], b"abc");
        let mut io = make_io(page);
        let mut reader = OggPageReader::new();
        assert!(matches!(
            reader.try_read_page(&mut io),
            Err(LingError::InvalidData(_))
        ));
    }

    #[test]
    fn test_eof传播() {
        let mut io = make_io(vec![b'O', b'g', b'g']);
        let mut reader = OggPageReader::new();
        assert!(matches!(
            reader.try_read_page(&mut io),
            Err(LingError::Eof)
        ));
    }
}

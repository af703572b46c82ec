//! Ogg 逻辑流: packet 重组、时间戳分配与无缝播放裁剪.
//!
//! 每条逻辑流维护:
//! - 完整 packet 的 FIFO 队列
//! - 跨页 packet 的累积缓冲 (按 8 KiB 增长, 上限 8 MiB)
//! - 页面序号单调性检查 (乱序/缺页丢弃残包并告警)
//! - 起始/结束边界: 起始边界在首个带 granule 的页面就地推算
//!   (编码器前导延迟), 结束边界由物理层扫描回填 (总帧数)
//!
//! 时间戳分配: 页尾时间戳由 absgp 换算, 对本页新入队的 packet
//! 自尾向前逐包减去时长. 开启 gapless 时, 前导延迟映射为头部
//! packet 的 `trim_start`, 超出总帧数的尾部映射为 `trim_end`.

use std::collections::VecDeque;

use bytes::Bytes;
use log::{debug, warn};

use ling_codec::Packet;
use ling_core::{LingError, LingResult, Rational};

use super::mapper::{CodecMapper, MappedPacket};
use super::page::{ABSGP_NONE, OggPageHeader, OggPageReader};

/// 残包缓冲的增长粒度
const PARTIAL_GROW_STEP: usize = 8 * 1024;

/// 残包缓冲的硬上限
const PARTIAL_MAX: usize = 8 * 1024 * 1024;

/// 流边界 (起始或结束)
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bound {
    /// 边界落定时的页面序号
    pub(crate) seq: u32,
    /// 边界时间戳: 起始边界为首采样时间, 结束边界为总帧数
    pub(crate) ts: u64,
    /// 起始边界的前导延迟 (编码器 priming 采样数)
    pub(crate) delay: u32,
}

/// 一条 Ogg 逻辑流
pub(crate) struct LogicalStream {
    /// 逻辑流序列号
    pub(crate) serial: u32,
    /// 对应的流索引
    pub(crate) stream_index: usize,
    /// 绑定的编解码器 mapper
    pub(crate) mapper: CodecMapper,
    /// 流时间基
    time_base: Rational,
    /// 是否启用无缝播放裁剪
    gapless: bool,
    /// 完整 packet 队列
    packets: VecDeque<Packet>,
    /// 跨页残包缓冲
    partial: Vec<u8>,
    /// 上一页序号
    prev_seq: Option<u32>,
    /// 自流起始累计的码流包时长 (起始边界探测用)
    cum_dur: u64,
    /// 起始边界
    pub(crate) start_bound: Option<Bound>,
    /// 结束边界 (物理层扫描回填)
    pub(crate) end_bound: Option<Bound>,
    /// 是否已见 EOS 页
    pub(crate) ended: bool,
    /// 占位 mapper 的告警只发一次
    warned_unsupported: bool,
}

impl LogicalStream {
    pub(crate) fn new(
        serial: u32,
        stream_index: usize,
        mapper: CodecMapper,
        time_base: Rational,
        gapless: bool,
    ) -> Self {
        Self {
            serial,
            stream_index,
            mapper,
            time_base,
            gapless,
            packets: VecDeque::new(),
            partial: Vec::new(),
            prev_seq: None,
            cum_dur: 0,
            start_bound: None,
            end_bound: None,
            ended: false,
            warned_unsupported: false,
        }
    }

    /// 取出一个排队的 packet
    pub(crate) fn pop_packet(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// 查看队首 packet
    pub(crate) fn peek_packet(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// 队列中的 packet 数
    pub(crate) fn queued(&self) -> usize {
        self.packets.len()
    }

    /// seek 后重置运行态 (保留边界与头包信息)
    pub(crate) fn reset(&mut self) {
        self.packets.clear();
        self.partial.clear();
        self.prev_seq = None;
        self.ended = false;
        self.mapper.reset();
    }

    /// 向残包缓冲追加数据, 按 8 KiB 粒度扩容, 超过上限报错
    fn push_partial(&mut self, chunk: &[u8]) -> LingResult<()> {
        let need = self.partial.len() + chunk.len();
        if need > PARTIAL_MAX {
            self.partial.clear();
            return Err(LingError::InvalidData(format!(
                "Ogg 跨页 packet 超过 {PARTIAL_MAX} 字节上限",
            )));
        }
        if need > self.partial.capacity() {
            let target = need.next_multiple_of(PARTIAL_GROW_STEP);
            self.partial.reserve_exact(target - self.partial.len());
        }
        self.partial.extend_from_slice(chunk);
        Ok(())
    }

    /// 处理属于本流的一个页面
    pub(crate) fn on_page(&mut self, reader: &OggPageReader) -> LingResult<()> {
        let header = *reader.header();
        debug_assert_eq!(header.serial, self.serial);

        // 页面序号必须逐一递增; 乱序或缺页丢弃残包
        if let Some(prev) = self.prev_seq
            && header.sequence != prev.wrapping_add(1)
        {
            warn!(
                "Ogg: 流 #{} 页面序号断裂 ({} → {}), 丢弃 {} 字节残包",
                self.stream_index,
                prev,
                header.sequence,
                self.partial.len(),
            );
            self.partial.clear();
        }
        self.prev_seq = Some(header.sequence);

        // continuation 标志与残包状态必须匹配
        let mut skip_first = false;
        if header.is_continuation() {
            if self.partial.is_empty() {
                // 无头续包: 丢弃首个 packet (或无完整 packet 时丢弃整页尾巴)
                skip_first = true;
                debug!("Ogg: 流 #{} 遇到无头续包, 丢弃起始片段", self.stream_index);
            }
        } else if !self.partial.is_empty() {
            warn!(
                "Ogg: 流 #{} 非延续页面但持有 {} 字节残包, 丢弃",
                self.stream_index,
                self.partial.len(),
            );
            self.partial.clear();
        }

        // 组装完整 packet
        let new_start = self.packets.len();
        for (i, chunk) in reader.packets().enumerate() {
            if i == 0 && skip_first {
                continue;
            }
            let data = if self.partial.is_empty() {
                Bytes::copy_from_slice(chunk)
            } else {
                self.push_partial(chunk)?;
                Bytes::from(std::mem::take(&mut self.partial))
            };
            self.accept_packet(data)?;
        }

        // 缓冲页尾残片
        let tail = reader.partial();
        if !tail.is_empty() {
            if skip_first && reader.packet_count() == 0 {
                // 整页都是无头续包的一部分, 丢弃
            } else {
                self.push_partial(tail)?;
            }
        }

        // 时间戳: 自页尾向前分配本页新入队的 packet
        if header.absgp != ABSGP_NONE {
            self.assign_timestamps(&header, new_start);
        }

        if header.is_last() {
            self.ended = true;
            debug!("Ogg: 流 #{} (serial={}) 结束", self.stream_index, self.serial);
        }

        Ok(())
    }

    /// 分类并入队一个完整 packet
    fn accept_packet(&mut self, data: Bytes) -> LingResult<()> {
        let kind = match self.mapper.map_packet(&data) {
            Ok(kind) => kind,
            Err(LingError::Unsupported(msg)) => {
                if !self.warned_unsupported {
                    warn!("Ogg: 流 #{} 不支持: {msg}", self.stream_index);
                    self.warned_unsupported = true;
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let dur = match kind {
            MappedPacket::StreamData { dur } => {
                self.cum_dur += dur;
                dur
            }
            // 头包入队供解码器消费, 不占时间轴
            MappedPacket::Setup | MappedPacket::SideData => 0,
            MappedPacket::Unknown => {
                debug!("Ogg: 流 #{} 丢弃无法归类的 packet", self.stream_index);
                return Ok(());
            }
        };

        let mut pkt = Packet::from_data(data);
        pkt.stream_index = self.stream_index;
        pkt.duration = dur as i64;
        pkt.time_base = self.time_base;
        self.packets.push_back(pkt);
        Ok(())
    }

    /// 自页尾时间戳向前为 [new_start..] 的 packet 分配 ts 与裁剪量
    fn assign_timestamps(&mut self, header: &OggPageHeader, new_start: usize) {
        let page_end_raw = self.mapper.absgp_to_ts(header.absgp);

        // 起始边界: 首个带 granule 的页面上, 比较累计解码时长与
        // granule 的差得到前导延迟或非零起始时间
        if self.start_bound.is_none() {
            let decoded = self.cum_dur;
            let delay = decoded.saturating_sub(page_end_raw);
            let start_ts = page_end_raw.saturating_sub(decoded);
            self.start_bound = Some(Bound {
                seq: header.sequence,
                ts: start_ts,
                delay: delay.min(u32::MAX as u64) as u32,
            });
            if delay > 0 {
                debug!(
                    "Ogg: 流 #{} 前导延迟 {} 采样",
                    self.stream_index, delay,
                );
            }
        }

        let delay = u64::from(self.start_bound.map(|b| b.delay).unwrap_or(0));
        let total = self.end_bound.map(|b| b.ts);

        // gapless 下 ts 为呈现时间轴 (0 = 首个可闻采样);
        // 关闭时时间轴包含前导延迟, 页尾 = granule + delay
        let page_end = if self.gapless {
            page_end_raw as i64
        } else {
            (page_end_raw + delay) as i64
        };

        let mut running = page_end;
        for idx in (new_start..self.packets.len()).rev() {
            let pkt = &mut self.packets[idx];
            running -= pkt.duration;
            let raw_ts = running;

            if self.gapless {
                let dur = pkt.duration as u64;
                // 前导延迟区间映射为 trim_start
                let trim_start = (-raw_ts).clamp(0, pkt.duration) as u64;
                // 超出总帧数的尾部映射为 trim_end
                let trim_end = match total {
                    Some(total) => {
                        let end = raw_ts + pkt.duration;
                        (end - total.min(i64::MAX as u64) as i64)
                            .clamp(0, (dur - trim_start) as i64) as u64
                    }
                    None => 0,
                };
                pkt.trim_start = trim_start as u32;
                pkt.trim_end = trim_end as u32;
                pkt.pts = raw_ts.max(0);
            } else {
                pkt.pts = raw_ts.max(0);
            }
            pkt.dts = pkt.pts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demuxers::ogg::page::tests::build_page;
    use crate::io::{IoContext, MemoryBackend};

    fn vorbis_ident() -> Vec<u8> {
        let mut v = Vec::new();
        v.push(0x01);
        v.extend_from_slice(b"vorbis");
        v.extend_from_slice(&0u32.to_le_bytes());
        v.push(2);
        v.extend_from_slice(&44100u32.to_le_bytes());
        v.extend_from_slice(&[0u8; 12]);
        v.push(0xB8);
        v.push(1);
        v
    }

    fn make_stream() -> LogicalStream {
        let mapper = CodecMapper::detect(&vorbis_ident()).unwrap();
        LogicalStream::new(7, 0, mapper, Rational::sample_rate_base(44100), false)
    }

    fn read_one_page(data: Vec<u8>) -> OggPageReader {
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut reader = OggPageReader::new();
        reader.try_read_page(&mut io).unwrap();
        reader
    }

    #[test]
    fn test_跨页packet重组() {
        let mut stream = make_stream();

        // 第一页: 300 字节 packet 的前 255 字节
        let body1 = vec![0x00u8; 255];
        let page1 = read_one_page(build_page(0, ABSGP_NONE, 7, 0, &[255], &body1));
        stream.on_page(&page1).unwrap();
        assert_eq!(stream.queued(), 0);

        // 第二页 (continuation): 余下 45 字节
        let body2 = vec![0x00u8; 45];
        let page2 = read_one_page(build_page(0x01, 512, 7, 1, &[45], &body2));
        stream.on_page(&page2).unwrap();
        assert_eq!(stream.queued(), 1);
        assert_eq!(stream.pop_packet().unwrap().data.len(), 300);
    }

    #[test]
    fn test_页面序号断裂丢弃残包() {
        let mut stream = make_stream();

        let page1 = read_one_page(build_page(0, ABSGP_NONE, 7, 0, &[255], &vec![0u8; 255]));
        stream.on_page(&page1).unwrap();

        // 序号跳到 5: 残包应被丢弃, 无头续包片段也被丢弃
        let page2 = read_one_page(build_page(0x01, 512, 7, 5, &[45], &vec![0u8; 45]));
        stream.on_page(&page2).unwrap();
        assert_eq!(stream.queued(), 0);
    }

    #[test]
    fn test_非延续页面丢弃遗留残包() {
        let mut stream = make_stream();

        let page1 = read_one_page(build_page(0, ABSGP_NONE, 7, 0, &[255], &vec![0u8; 255]));
        stream.on_page(&page1).unwrap();

        // 下一页未标记 continuation → 残包丢弃, 本页 packet 正常入队
        let page2 = read_one_page(build_page(0, 256, 7, 1, &[2], &[0x00, 0x42]));
        stream.on_page(&page2).unwrap();
        assert_eq!(stream.queued(), 1);
        assert_eq!(stream.pop_packet().unwrap().data.len(), 2);
    }

    #[test]
    fn test_时间戳自页尾回推() {
        let mut stream = make_stream();

        // 三个音频包 (无法解析 setup, 时长为 0); 手动演示回推:
        // 时长解析器缺失时 dur=0, ts 均等于页尾
        let body = vec![0x00u8, 0x00, 0x00];
        let page = read_one_page(build_page(0, 3000, 7, 0, &[1, 1, 1], &body));
        stream.on_page(&page).unwrap();
        assert_eq!(stream.queued(), 3);
        while let Some(pkt) = stream.pop_packet() {
            assert_eq!(pkt.pts, 3000);
        }
    }

    #[test]
    fn test_残包上限() {
        let mut stream = make_stream();

        // 9 MiB 的连续续延页超出 8 MiB 上限
        let mut result = Ok(());
        for seq in 0..150u32 {
            let flags = if seq == 0 { 0 } else { 0x01 };
            let body = vec![0u8; 255 * 255];
            let segments = vec![255u8; 255];
            let page = read_one_page(build_page(flags, ABSGP_NONE, 7, seq, &segments, &body));
            result = stream.on_page(&page);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(LingError::InvalidData(_))));
    }
}

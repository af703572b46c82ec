//! Ogg 容器解封装器.
//!
//! 物理流由若干逻辑流复用而成; 所有 BOS 页位于数据页之前.
//! 本模块负责:
//! - 打开: BOS 发现、编解码器识别、头包收集与时长扫描
//! - 读取: 页面路由到逻辑流, 排空各流的 packet 队列
//! - 链式流检测: 数据阶段再次出现 BOS 页报告 `ResetRequired`
//! - seek: 字节区间二分探测页面时间范围, 再前滚到目标 packet

mod logical;
mod mapper;
mod page;

use log::{debug, warn};
use std::io::SeekFrom;

use ling_codec::Packet;
use ling_core::{LingError, LingResult, Rational, SampleFormat, SeekErrorKind};

use crate::demuxer::{Demuxer, FormatOptions, SeekMode, SeekedTo};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};
use crate::stream::{AudioStreamParams, Stream, StreamParams};

use self::logical::{Bound, LogicalStream};
use self::mapper::CodecMapper;
use self::page::{ABSGP_NONE, OGG_PAGE_MAX_SIZE, OGG_SYNC, OggPageReader};

/// 打开阶段等待头包齐备的页面数上限
const HEADER_PAGE_LIMIT: usize = 64;

/// Ogg 解封装器
pub struct OggDemuxer {
    options: FormatOptions,
    /// 流信息列表
    streams: Vec<Stream>,
    /// 逻辑流列表 (与 streams 一一对应)
    logical: Vec<LogicalStream>,
    page_reader: OggPageReader,
    /// 是否已到达 EOF
    eof: bool,
    /// 数据区起始字节位置 (首个非 BOS 页)
    data_start: u64,
    /// 容器时长 (秒)
    duration_sec: Option<f64>,
    /// 默认流的 seek 索引: (granule 时间戳, 页面起始字节)
    seek_index: Vec<(u64, u64)>,
}

impl OggDemuxer {
    /// 创建 Ogg 解封装器实例 (工厂函数)
    pub fn create(options: FormatOptions) -> LingResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            options,
            streams: Vec::new(),
            logical: Vec::new(),
            page_reader: OggPageReader::new(),
            eof: false,
            data_start: 0,
            duration_sec: None,
            seek_index: Vec::new(),
        }))
    }

    /// 处理一个 BOS 页, 识别编解码器并建流
    fn handle_bos_page(&mut self) {
        let serial = self.page_reader.header().serial;
        if self.find_logical(serial).is_some() {
            return;
        }
        let Some(first_packet) = self.page_reader.packets().next() else {
            return;
        };

        let Some(codec_mapper) = CodecMapper::detect(first_packet) else {
            debug!("Ogg: serial={serial} 的 BOS 包无法识别, 跳过该逻辑流");
            return;
        };

        let stream_index = self.streams.len();
        let codec_id = codec_mapper.codec_id();
        let sample_rate = codec_mapper.sample_rate();
        let time_base = match sample_rate {
            Some(rate) => Rational::sample_rate_base(rate),
            None => Rational::new(1, 48000),
        };

        let (params, extra_data) = match &codec_mapper {
            CodecMapper::Vorbis(v) => (
                StreamParams::Audio(AudioStreamParams {
                    sample_rate: v.sample_rate,
                    channel_layout: v.channel_layout(),
                    sample_format: SampleFormat::F32p,
                    bit_rate: 0,
                }),
                v.ident_data.clone(),
            ),
            _ => (StreamParams::Other, first_packet.to_vec()),
        };

        debug!("Ogg: 发现流 #{stream_index}: {codec_id} (serial={serial})");

        self.streams.push(Stream {
            index: stream_index,
            codec_id,
            time_base,
            duration: -1,
            start_time: 0,
            nb_frames: 0,
            extra_data,
            params,
            metadata: Vec::new(),
        });
        self.logical.push(LogicalStream::new(
            serial,
            stream_index,
            codec_mapper,
            time_base,
            self.options.enable_gapless,
        ));
    }

    fn find_logical(&self, serial: u32) -> Option<usize> {
        self.logical.iter().position(|s| s.serial == serial)
    }

    /// 将当前页路由到所属逻辑流
    fn route_page(&mut self) -> LingResult<()> {
        let serial = self.page_reader.header().serial;
        match self.find_logical(serial) {
            Some(idx) => self.logical[idx].on_page(&self.page_reader),
            None => {
                debug!("Ogg: 丢弃未知 serial={serial} 的页面");
                Ok(())
            }
        }
    }

    /// 从各逻辑流队列取出一个 packet
    fn pop_queued(&mut self) -> Option<Packet> {
        self.logical.iter_mut().find_map(|s| s.pop_packet())
    }

    /// 所有 Vorbis 流的头包是否齐备
    fn headers_ready(&self) -> bool {
        self.logical.iter().all(|s| match &s.mapper {
            CodecMapper::Vorbis(v) => v.is_ready(),
            _ => true,
        })
    }

    /// 把 mapper 收集到的元数据回填流信息
    fn sync_stream_metadata(&mut self) {
        for ls in &self.logical {
            if let CodecMapper::Vorbis(v) = &ls.mapper
                && !v.comments.is_empty()
            {
                self.streams[ls.stream_index].metadata = v.comments.clone();
            }
        }
    }

    /// 扫描后续页面, 回填结束边界、流时长与 seek 索引
    ///
    /// 仅在可寻址输入上执行; 扫描完成后回到原位置.
    fn scan_bounds(&mut self, io: &mut IoContext) -> LingResult<()> {
        let resume = io.position();
        let mut last_granule: Vec<Option<(u32, u64)>> = vec![None; self.logical.len()];

        // seek 索引以默认流 (首个 Vorbis 流) 为目标
        let index_target = self.logical.iter().find_map(|s| match &s.mapper {
            CodecMapper::Vorbis(v) => Some((s.serial, v.sample_rate)),
            _ => None,
        });
        let index_step = index_target
            .map(|(_, rate)| u64::from(self.options.seek_index_fill_rate) * u64::from(rate))
            .unwrap_or(0);
        let mut next_index_ts = index_step;

        loop {
            match self.page_reader.next_page(io) {
                Ok(()) => {
                    let header = *self.page_reader.header();
                    if header.absgp == ABSGP_NONE {
                        continue;
                    }
                    let Some(idx) = self.find_logical(header.serial) else {
                        continue;
                    };
                    let ts = self.logical[idx].mapper.absgp_to_ts(header.absgp);
                    let entry = &mut last_granule[idx];
                    if entry.map(|(_, prev)| ts > prev).unwrap_or(true) {
                        *entry = Some((header.sequence, ts));
                    }

                    if self.options.prebuild_seek_index
                        && let Some((serial, _)) = index_target
                        && header.serial == serial
                        && ts >= next_index_ts
                    {
                        self.seek_index.push((ts, self.page_reader.start_pos()));
                        next_index_ts = ts + index_step;
                    }
                }
                Err(LingError::Eof) => break,
                Err(e) => {
                    debug!("Ogg: 时长扫描中断: {e}");
                    break;
                }
            }
        }

        io.seek(SeekFrom::Start(resume))?;

        let mut best_sec = None::<f64>;
        for (idx, granule) in last_granule.iter().enumerate() {
            let Some((seq, ts)) = *granule else { continue };
            self.logical[idx].end_bound = Some(Bound { seq, ts, delay: 0 });
            let stream = &mut self.streams[self.logical[idx].stream_index];
            stream.duration = ts as i64;
            stream.nb_frames = ts;
            if stream.time_base.is_valid() && stream.time_base.den > 0 {
                let sec = ts as f64 * stream.time_base.to_f64();
                best_sec = Some(best_sec.map_or(sec, |v: f64| v.max(sec)));
            }
        }
        self.duration_sec = best_sec;
        Ok(())
    }

    /// 把页尾 granule 换算为与 packet pts 同一坐标系的时间戳
    fn page_ts_coord(&self, logical_idx: usize, raw_ts: u64) -> i64 {
        let delay = self.logical[logical_idx]
            .start_bound
            .map(|b| u64::from(b.delay))
            .unwrap_or(0);
        if self.options.enable_gapless {
            raw_ts as i64
        } else {
            (raw_ts + delay) as i64
        }
    }

    /// 二分探测: 定位 mid 之后目标流下一个带 granule 的页面,
    /// 返回 (页面起始位置, 页起始时间戳, 页尾时间戳)
    fn probe_page_after(
        &mut self,
        io: &mut IoContext,
        mid: u64,
        logical_idx: usize,
    ) -> LingResult<Option<(u64, i64, i64)>> {
        io.seek(SeekFrom::Start(mid))?;
        let serial = self.logical[logical_idx].serial;
        loop {
            match self.page_reader.next_page(io) {
                Ok(()) => {
                    let header = *self.page_reader.header();
                    if header.serial != serial || header.absgp == ABSGP_NONE {
                        continue;
                    }
                    let page_end = self
                        .page_ts_coord(logical_idx, self.logical[logical_idx].mapper.absgp_to_ts(header.absgp));
                    let page_dur = match &self.logical[logical_idx].mapper {
                        CodecMapper::Vorbis(v) => {
                            v.probe_page_duration(self.page_reader.packets())
                        }
                        _ => 0,
                    };
                    let page_start = page_end - page_dur as i64;
                    return Ok(Some((self.page_reader.start_pos(), page_start, page_end)));
                }
                Err(LingError::Eof) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// seek 后重置所有逻辑流运行态
    fn reset_streams(&mut self) {
        self.eof = false;
        for ls in &mut self.logical {
            ls.reset();
        }
    }

    /// 读页直到目标流有排队 packet, 其余流的 packet 直接丢弃
    fn fill_target_queue(&mut self, io: &mut IoContext, logical_idx: usize) -> LingResult<bool> {
        loop {
            if self.logical[logical_idx].queued() > 0 {
                return Ok(true);
            }
            for (i, ls) in self.logical.iter_mut().enumerate() {
                if i != logical_idx {
                    while ls.pop_packet().is_some() {}
                }
            }
            match self.page_reader.next_page(io) {
                Ok(()) => self.route_page()?,
                Err(LingError::Eof) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Demuxer for OggDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }

    fn name(&self) -> &str {
        "ogg"
    }

    fn open(&mut self, io: &mut IoContext) -> LingResult<()> {
        // 回退窗口须容纳一个完整页面 (CRC 失败重扫描)
        io.ensure_seek_back(OGG_PAGE_MAX_SIZE);

        // 首页必须为 BOS
        self.page_reader.try_read_page(io)?;
        if !self.page_reader.header().is_first() {
            return Err(LingError::InvalidData("Ogg 首页不是逻辑流起始页".into()));
        }
        self.handle_bos_page();

        // 读完所有 BOS 页
        loop {
            self.page_reader.next_page(io)?;
            if self.page_reader.header().is_first() {
                self.handle_bos_page();
            } else {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(LingError::InvalidData("Ogg 文件中未找到可识别的流".into()));
        }

        // 数据区从首个非 BOS 页开始; 继续吃页直到头包齐备
        self.data_start = self.page_reader.start_pos();
        self.route_page()?;
        let mut header_pages = 0usize;
        while !self.headers_ready() && header_pages < HEADER_PAGE_LIMIT {
            match self.page_reader.next_page(io) {
                Ok(()) => {
                    if self.page_reader.header().is_first() {
                        return Err(LingError::ResetRequired);
                    }
                    self.route_page()?;
                }
                Err(LingError::Eof) => break,
                Err(e) => return Err(e),
            }
            header_pages += 1;
        }
        self.sync_stream_metadata();

        if io.is_seekable() {
            self.scan_bounds(io)?;
        }

        debug!(
            "打开 Ogg: {} 个流, 时长 {:?} 秒",
            self.streams.len(),
            self.duration_sec,
        );

        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> LingResult<Packet> {
        loop {
            if let Some(pkt) = self.pop_queued() {
                return Ok(pkt);
            }
            if self.eof {
                return Err(LingError::Eof);
            }

            match self.page_reader.next_page(io) {
                Ok(()) => {
                    if self.page_reader.header().is_first() {
                        // 数据阶段出现新的 BOS 页: 链式物理流边界
                        warn!("Ogg: 遇到链式物理流边界");
                        return Err(LingError::ResetRequired);
                    }
                    self.route_page()?;
                }
                Err(LingError::Eof) => {
                    // 排空队列后报告流结束
                    self.eof = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: usize,
        timestamp: i64,
        mode: SeekMode,
    ) -> LingResult<SeekedTo> {
        let logical_idx = self
            .logical
            .iter()
            .position(|s| s.stream_index == stream_index)
            .ok_or(LingError::Seek(SeekErrorKind::InvalidTrack))?;

        let required_ts = timestamp.max(0);

        // 范围检查: 超出总帧数 (含起始偏移) 的目标直接拒绝
        if let Some(end) = self.logical[logical_idx].end_bound {
            let limit = self.page_ts_coord(logical_idx, end.ts);
            if required_ts > limit {
                return Err(LingError::Seek(SeekErrorKind::OutOfRange));
            }
        }

        if !io.is_seekable() {
            // 不可寻址: 只能向前消费到目标
            loop {
                if !self.fill_target_queue(io, logical_idx)? {
                    return Err(LingError::Seek(SeekErrorKind::OutOfRange));
                }
                let ls = &mut self.logical[logical_idx];
                let pkt = ls.peek_packet().expect("队列非空");
                let is_header = ls.mapper.is_header_packet(&pkt.data);
                if !is_header
                    && pkt.pts != ling_core::timestamp::NOPTS_VALUE
                    && pkt.pts + pkt.duration >= required_ts
                {
                    let actual_ts = pkt.pts;
                    if mode == SeekMode::Accurate && actual_ts > required_ts {
                        return Err(LingError::Seek(SeekErrorKind::ForwardOnly));
                    }
                    return Ok(SeekedTo {
                        required_ts,
                        actual_ts,
                    });
                }
                ls.pop_packet();
            }
        }

        // 字节区间二分
        let mut start = self.data_start;
        let mut end = io
            .size()
            .ok_or(LingError::Seek(SeekErrorKind::Unseekable))?;

        // 用预建索引收窄初始区间
        if !self.seek_index.is_empty() {
            let delay = self.logical[logical_idx]
                .start_bound
                .map(|b| i64::from(b.delay))
                .unwrap_or(0);
            let raw_required = if self.options.enable_gapless {
                required_ts
            } else {
                required_ts - delay
            };
            for &(ts, pos) in &self.seek_index {
                if (ts as i64) <= raw_required {
                    start = start.max(pos);
                } else {
                    end = end.min(pos + OGG_PAGE_MAX_SIZE as u64).min(io.size().unwrap_or(end));
                    break;
                }
            }
        }

        while end - start > 2 * OGG_PAGE_MAX_SIZE as u64 {
            let mid = start + (end - start) / 2;
            match self.probe_page_after(io, mid, logical_idx)? {
                None => end = mid,
                Some((page_pos, page_start_ts, page_end_ts)) => {
                    if required_ts < page_start_ts {
                        end = mid;
                    } else if required_ts > page_end_ts {
                        start = mid;
                    } else {
                        // 目标落在该页内
                        start = page_pos;
                        break;
                    }
                }
            }
        }

        io.seek(SeekFrom::Start(start))?;
        self.reset_streams();

        // 前滚: 消费到首个覆盖目标时间的 packet (头包直接跳过)
        let actual_ts;
        loop {
            if !self.fill_target_queue(io, logical_idx)? {
                return Err(LingError::Seek(SeekErrorKind::OutOfRange));
            }
            let ls = &mut self.logical[logical_idx];
            let pkt = ls.peek_packet().expect("队列非空");
            let is_header = ls.mapper.is_header_packet(&pkt.data);
            let pts_known = pkt.pts != ling_core::timestamp::NOPTS_VALUE;
            if !is_header
                && pts_known
                && (mode == SeekMode::Coarse || pkt.pts + pkt.duration >= required_ts)
            {
                actual_ts = pkt.pts;
                break;
            }
            ls.pop_packet();
        }

        debug!(
            "Ogg seek: stream={stream_index}, required={required_ts}, actual={actual_ts}",
        );
        Ok(SeekedTo {
            required_ts,
            actual_ts,
        })
    }

    fn duration(&self) -> Option<f64> {
        self.duration_sec
    }
}

/// Ogg 格式探测器
pub struct OggProbe;

impl FormatProbe for OggProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        // 魔数匹配
        if data.len() >= 4 && data[0..4] == OGG_SYNC {
            return Some(SCORE_MAX);
        }
        // 某些文件会在 Ogg 前附带 ID3v2 标签, 尝试从标签后匹配
        if data.len() >= 14 && &data[0..3] == b"ID3" {
            let size = ((data[6] & 0x7F) as usize) << 21
                | ((data[7] & 0x7F) as usize) << 14
                | ((data[8] & 0x7F) as usize) << 7
                | (data[9] & 0x7F) as usize;
            let ogg_offset = 10 + size;
            if data.len() >= ogg_offset + 4 && data[ogg_offset..ogg_offset + 4] == OGG_SYNC {
                return Some(SCORE_MAX - 2);
            }
        }

        // 扩展名匹配
        if let Some(name) = filename
            && let Some(ext) = name.rsplit('.').next()
            && FormatId::Ogg.extensions().contains(&ext.to_lowercase().as_str())
        {
            return Some(SCORE_EXTENSION);
        }

        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_ogg_magic() {
        let probe = OggProbe;
        assert!(probe.probe(b"OggS", None).is_some());
        assert!(probe.probe(b"RIFF", None).is_none());
        assert_eq!(probe.format_id(), FormatId::Ogg);
    }

    #[test]
    fn test_probe_ogg_id3_prefix() {
        let probe = OggProbe;
        // ID3(size=0) + OggS
        let data = b"ID3\x04\x00\x00\x00\x00\x00\x00OggS";
        assert!(probe.probe(data, None).is_some());
    }

    #[test]
    fn test_probe_ogg_extension() {
        let probe = OggProbe;
        assert!(probe.probe(&[], Some("test.ogg")).is_some());
        assert!(probe.probe(&[], Some("test.oga")).is_some());
        assert!(probe.probe(&[], Some("test.mp3")).is_none());
    }
}

//! Vorbis I 音频解码器.
//!
//! 完整解码链路:
//! - 三个头包 (identification/comment/setup) 解析与校验
//! - codebook 构建与 Huffman/VQ 解码
//! - floor1 曲线合成, residue 0/1/2 解码, 声道反耦合
//! - IMDCT 与块间重叠相加, 输出平面 f32 PCM
//!
//! 输出声道按固定置换表排列 (1-8 声道), 更多声道保持原序.

pub(crate) mod bitreader;
pub(crate) mod codebook;
pub(crate) mod dsp;
pub(crate) mod floor;
pub(crate) mod headers;
pub(crate) mod imdct;
pub(crate) mod residue;
pub(crate) mod setup;
pub(crate) mod window;

use log::debug;
use std::collections::VecDeque;

use ling_core::{LingError, LingResult, Rational, SampleFormat};

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::frame::{AudioFrame, Frame};
use crate::packet::Packet;

use self::bitreader::{BitReader, ilog};
use self::dsp::DspChannel;
use self::floor::build_inverse_db_table;
use self::headers::{CommentHeader, IdentHeader, channel_layout_for, parse_comment_header, parse_ident_header};
use self::imdct::Imdct;
use self::residue::inverse_coupling;
use self::setup::Setup;
use self::window::{LappingState, Windows, overlap_add};

/// 头包解析阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
    Identification,
    Comment,
    Setup,
    Audio,
}

/// Vorbis 声道到输出槽位的置换表
///
/// 返回值 `order[out_slot] = vorbis_channel`; 9 声道以上保持原序.
fn channel_order(channels: usize) -> Vec<usize> {
    match channels {
        1 => vec![0],
        2 => vec![0, 1],
        3 => vec![0, 2, 1],
        4 => vec![0, 1, 2, 3],
        5 => vec![0, 2, 1, 3, 4],
        6 => vec![0, 2, 1, 4, 5, 3],
        7 => vec![0, 2, 1, 5, 6, 4, 3],
        8 => vec![0, 2, 1, 6, 7, 4, 5, 3],
        n => (0..n).collect(),
    }
}

/// Vorbis 解码器
pub struct VorbisDecoder {
    opened: bool,
    flushing: bool,
    stage: HeaderStage,
    ident: Option<IdentHeader>,
    setup: Option<Setup>,
    comment: Option<CommentHeader>,
    /// 反 dB 幅度表, 构造时计算一次
    inverse_db: [f32; 256],
    windows: Option<Windows>,
    imdct_short: Option<Imdct>,
    imdct_long: Option<Imdct>,
    channels: Vec<DspChannel>,
    /// 输出槽位 → Vorbis 声道
    order: Vec<usize>,
    lapping: LappingState,
    pending_frames: VecDeque<Frame>,
    next_pts: i64,
    /// residue type 2 交织暂存
    interleave_buf: Vec<f32>,
    /// residue 分类字暂存
    classifs_buf: Vec<u8>,
    /// submap 声道集合暂存
    channel_set: Vec<usize>,
    /// 重叠相加输出暂存
    out_buf: Vec<f32>,
}

impl VorbisDecoder {
    /// 创建 Vorbis 解码器 (工厂函数)
    pub fn create() -> LingResult<Box<dyn Decoder>> {
        Ok(Box::new(Self {
            opened: false,
            flushing: false,
            stage: HeaderStage::Identification,
            ident: None,
            setup: None,
            comment: None,
            inverse_db: build_inverse_db_table(),
            windows: None,
            imdct_short: None,
            imdct_long: None,
            channels: Vec::new(),
            order: Vec::new(),
            lapping: LappingState::default(),
            pending_frames: VecDeque::new(),
            next_pts: 0,
            interleave_buf: Vec::new(),
            classifs_buf: Vec::new(),
            channel_set: Vec::new(),
            out_buf: Vec::new(),
        }))
    }

    /// 解析 identification 头并分配按最大块尺寸的声道暂存
    fn apply_ident(&mut self, packet: &[u8]) -> LingResult<()> {
        let ident = parse_ident_header(packet)?;
        let bs1 = ident.blocksize1();
        let ch = usize::from(ident.channels);

        self.channels = (0..ch).map(|_| DspChannel::new(bs1)).collect();
        self.order = channel_order(ch);
        self.windows = Some(Windows::new(ident.blocksize0(), bs1));
        self.imdct_short = Some(Imdct::new(ident.blocksize0() / 2));
        self.imdct_long = Some(Imdct::new(bs1 / 2));
        self.out_buf = vec![0.0; bs1 / 2];

        debug!(
            "Vorbis: {} 声道, {} Hz, blocksize {}/{}",
            ident.channels,
            ident.sample_rate,
            ident.blocksize0(),
            bs1,
        );

        self.ident = Some(ident);
        self.stage = HeaderStage::Comment;
        Ok(())
    }

    /// 按包类型处理头包
    fn handle_header_packet(&mut self, data: &[u8]) -> LingResult<()> {
        let packet_type = *data.first().ok_or(LingError::Eof)?;
        match packet_type {
            0x01 => self.apply_ident(data),
            0x03 => {
                if self.ident.is_none() {
                    return Err(LingError::InvalidData(
                        "Vorbis comment 前缺少 identification 头".into(),
                    ));
                }
                self.comment = Some(parse_comment_header(data)?);
                self.stage = HeaderStage::Setup;
                Ok(())
            }
            0x05 => {
                let ident = self.ident.as_ref().ok_or_else(|| {
                    LingError::InvalidData("Vorbis setup 前缺少 identification 头".into())
                })?;
                self.setup = Some(Setup::parse(data, ident)?);
                self.stage = HeaderStage::Audio;
                Ok(())
            }
            other => Err(LingError::InvalidData(format!(
                "期望 Vorbis 头包, 实际包类型 0x{other:02X}",
            ))),
        }
    }

    /// 解码一个音频包: mode → floor → residue → 反耦合 →
    /// 点积 → IMDCT → 重叠相加 → 裁剪
    fn decode_audio_packet(&mut self, packet: &Packet) -> LingResult<()> {
        let data = packet.data.as_ref();
        let ident = self
            .ident
            .as_ref()
            .ok_or_else(|| LingError::InvalidData("Vorbis 头信息未就绪".into()))?;
        let setup = self
            .setup
            .as_ref()
            .ok_or_else(|| LingError::InvalidData("Vorbis setup 信息未就绪".into()))?;

        let mut br = BitReader::new(data);

        // 音频包首位必须为 0
        if br.read_bool()? {
            return Err(LingError::InvalidData("Vorbis 音频包首位必须为 0".into()));
        }

        let mode_bits = ilog(setup.modes.len() as u32 - 1);
        let mode_idx = br.read_bits_leq32(mode_bits)? as usize;
        let mode = *setup.modes.get(mode_idx).ok_or_else(|| {
            LingError::InvalidData(format!("Vorbis mode 索引越界: {mode_idx}"))
        })?;
        let mapping = &setup.mappings[usize::from(mode.mapping)];

        let bs = if mode.block_flag {
            // 长块包携带两个窗标志位, 实际窗形由 lapping 状态决定
            br.read_bits_leq32(2)?;
            ident.blocksize1()
        } else {
            ident.blocksize0()
        };
        let n2 = bs / 2;
        let ch_count = self.channels.len();

        // floor: 逐声道读取并合成曲线
        for c in 0..ch_count {
            self.channels[c].reset_block(n2);
            let submap = mapping.submaps[usize::from(mapping.multiplex[c])];
            let floor = &setup.floors[usize::from(submap.floor)];
            let channel = &mut self.channels[c];
            let used = floor.read_channel(&mut br, &setup.codebooks, &mut channel.floor_scratch)?;
            channel.do_not_decode = !used;
            if used {
                floor.synthesis(
                    &mut channel.floor_scratch,
                    &self.inverse_db,
                    &mut channel.floor[..n2],
                )?;
            }
        }

        // 非零传播: 耦合对中只要有一侧解码, 两侧都解码
        for coupling in &mapping.couplings {
            let m = usize::from(coupling.magnitude);
            let a = usize::from(coupling.angle);
            if self.channels[m].do_not_decode != self.channels[a].do_not_decode {
                self.channels[m].do_not_decode = false;
                self.channels[a].do_not_decode = false;
            }
        }

        // residue: 按 submap 的声道集合解码
        for (submap_idx, submap) in mapping.submaps.iter().enumerate() {
            self.channel_set.clear();
            for (c, &mux) in mapping.multiplex.iter().enumerate() {
                if usize::from(mux) == submap_idx {
                    self.channel_set.push(c);
                }
            }
            let residue = &setup.residues[usize::from(submap.residue)];
            residue.decode(
                &mut br,
                &setup.codebooks,
                &self.channel_set,
                &mut self.channels,
                n2,
                &mut self.interleave_buf,
                &mut self.classifs_buf,
            )?;
        }

        // 声道反耦合
        inverse_coupling(&mapping.couplings, &mut self.channels, n2)?;

        // 点积: floor 曲线乘 residue 得到频谱
        for channel in &mut self.channels {
            if channel.do_not_decode {
                continue;
            }
            for (f, &r) in channel.floor[..n2].iter_mut().zip(&channel.residue[..n2]) {
                *f *= r;
            }
        }

        // IMDCT: floor 缓冲此时即频谱
        let imdct = if mode.block_flag {
            self.imdct_long.as_mut()
        } else {
            self.imdct_short.as_mut()
        }
        .ok_or_else(|| LingError::Internal("Vorbis IMDCT 未初始化".into()))?;

        // 首包没有前块可重叠, 只保存右半, 不产生输出
        let Some(prev_bs) = self.lapping.prev_blocksize else {
            for channel in &mut self.channels {
                imdct.imdct(&channel.floor[..n2], &mut channel.imdct[..bs]);
                channel.overlap[..n2].copy_from_slice(&channel.imdct[n2..bs]);
            }
            self.lapping.prev_blocksize = Some(bs);
            if packet.pts != ling_core::timestamp::NOPTS_VALUE {
                self.next_pts = packet.pts;
            }
            return Ok(());
        };

        let out_frames = (prev_bs + bs) / 4;
        let trim_start = (packet.trim_start as usize).min(out_frames);
        let trim_end = (packet.trim_end as usize).min(out_frames - trim_start);
        let kept = out_frames - trim_start - trim_end;

        let mut frame = AudioFrame::new(
            kept as u32,
            ident.sample_rate,
            SampleFormat::F32p,
            channel_layout_for(ident.channels),
        );
        frame.time_base = Rational::sample_rate_base(ident.sample_rate);

        let windows = self
            .windows
            .as_ref()
            .ok_or_else(|| LingError::Internal("Vorbis 窗表未初始化".into()))?;

        // 重叠相加, 写入按置换排列的输出平面
        for (out_slot, &v_ch) in self.order.iter().enumerate() {
            let channel = &mut self.channels[v_ch];
            imdct.imdct(&channel.floor[..n2], &mut channel.imdct[..bs]);
            overlap_add(
                &mut self.out_buf[..out_frames],
                &channel.imdct[..bs],
                &mut channel.overlap,
                prev_bs,
                bs,
                windows,
            );
            frame.data[out_slot] = self.out_buf[trim_start..trim_start + kept]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect();
        }

        // 更新 lapping 与时间戳
        self.lapping.prev_blocksize = Some(bs);

        if kept > 0 {
            let pts = if packet.pts != ling_core::timestamp::NOPTS_VALUE {
                packet.pts
            } else {
                self.next_pts
            };
            frame.pts = pts;
            frame.duration = kept as i64;
            self.next_pts = pts.saturating_add(kept as i64);
            self.pending_frames.push_back(Frame::Audio(frame));
        }

        Ok(())
    }

    /// 取 comment 头解析出的标签 (若有)
    pub fn comments(&self) -> Option<&[(String, String)]> {
        self.comment.as_ref().map(|c| c.comments.as_slice())
    }
}

impl Decoder for VorbisDecoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Vorbis
    }

    fn name(&self) -> &str {
        "vorbis"
    }

    fn open(&mut self, params: &CodecParameters) -> LingResult<()> {
        self.opened = true;
        self.flushing = false;
        self.stage = HeaderStage::Identification;
        self.ident = None;
        self.setup = None;
        self.comment = None;
        self.pending_frames.clear();
        self.lapping = LappingState::default();
        self.next_pts = 0;

        if !params.extra_data.is_empty() {
            self.apply_ident(&params.extra_data)?;
        }

        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> LingResult<()> {
        if !self.opened {
            return Err(LingError::InvalidArgument("Vorbis 解码器未打开".into()));
        }

        if packet.is_empty() {
            self.flushing = true;
            return Ok(());
        }

        match self.stage {
            HeaderStage::Audio => self.decode_audio_packet(packet),
            _ => self.handle_header_packet(packet.data.as_ref()),
        }
    }

    fn receive_frame(&mut self) -> LingResult<Frame> {
        if let Some(frame) = self.pending_frames.pop_front() {
            return Ok(frame);
        }
        if self.flushing {
            return Err(LingError::Eof);
        }
        Err(LingError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.flushing = false;
        self.pending_frames.clear();
        self.lapping = LappingState::default();
        self.next_pts = 0;
        for channel in &mut self.channels {
            channel.reset_lapping();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_声道置换为双射() {
        for ch in 1..=10usize {
            let order = channel_order(ch);
            assert_eq!(order.len(), ch);
            let mut seen = vec![false; ch];
            for &v in &order {
                assert!(v < ch, "{ch} 声道置换值越界");
                assert!(!seen[v], "{ch} 声道置换重复");
                seen[v] = true;
            }
        }
    }

    #[test]
    fn test_标准置换表() {
        assert_eq!(channel_order(6), vec![0, 2, 1, 4, 5, 3]);
        assert_eq!(channel_order(8), vec![0, 2, 1, 6, 7, 4, 5, 3]);
        assert_eq!(channel_order(9), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_未打开时拒绝数据() {
        let mut dec = VorbisDecoder::create().unwrap();
        let pkt = Packet::from_data(vec![0u8; 8]);
        assert!(dec.send_packet(&pkt).is_err());
    }
}

//! Vorbis 包时长解析器 (不做解码).
//!
//! 容器层在时间戳分配与 seek 探测时需要知道每个音频包贡献的
//! 采样数, 但不需要真正解码. 本解析器从 identification/setup 头
//! 提取块大小与模式块标志位图, 之后仅读取每包开头的模式位.

use ling_core::{LingError, LingResult};

use crate::decoders::vorbis::bitreader::{BitReader, ilog};
use crate::decoders::vorbis::headers::parse_ident_header;
use crate::decoders::vorbis::setup::Setup;

/// 轻量 Vorbis 包解析器
#[derive(Debug, Clone)]
pub struct VorbisPacketParser {
    /// 模式索引位数
    mode_bits: u32,
    /// 模式块标志位图 (bit i = mode i 的 block_flag)
    mode_block_flags: u64,
    mode_count: usize,
    bs0_exp: u8,
    bs1_exp: u8,
    /// 上一包的块指数; 无前包时包时长为 0
    prev_bs_exp: Option<u8>,
}

impl VorbisPacketParser {
    /// 从 identification 与 setup 头包构造解析器
    pub fn new(ident_packet: &[u8], setup_packet: &[u8]) -> LingResult<Self> {
        let ident = parse_ident_header(ident_packet)?;
        let setup = Setup::parse(setup_packet, &ident)?;

        let mode_count = setup.modes.len();
        if mode_count == 0 || mode_count > 64 {
            return Err(LingError::InvalidData(format!(
                "Vorbis mode 数非法: {mode_count}",
            )));
        }
        let mut mode_block_flags = 0u64;
        for (i, mode) in setup.modes.iter().enumerate() {
            if mode.block_flag {
                mode_block_flags |= 1 << i;
            }
        }

        Ok(Self {
            mode_bits: ilog(mode_count as u32 - 1),
            mode_block_flags,
            mode_count,
            bs0_exp: ident.bs0_exp,
            bs1_exp: ident.bs1_exp,
            prev_bs_exp: None,
        })
    }

    /// 计算一个包的时长 (采样数)
    ///
    /// 头包、畸形包以及流中首个音频包的时长为 0.
    pub fn packet_duration(&mut self, packet: &[u8]) -> u64 {
        let mut br = BitReader::new(packet);

        // 首位 1 为头包, 不贡献采样
        match br.read_bool() {
            Ok(false) => {}
            _ => return 0,
        }

        let mode_idx = match br.read_bits_leq32(self.mode_bits) {
            Ok(v) => v as usize,
            Err(_) => return 0,
        };
        if mode_idx >= self.mode_count {
            return 0;
        }

        let cur_bs_exp = if self.mode_block_flags & (1 << mode_idx) != 0 {
            self.bs1_exp
        } else {
            self.bs0_exp
        };

        let duration = match self.prev_bs_exp {
            Some(prev) => (1u64 << prev) / 4 + (1u64 << cur_bs_exp) / 4,
            None => 0,
        };
        self.prev_bs_exp = Some(cur_bs_exp);
        duration
    }

    /// 清除前包状态 (seek 或流重启后调用)
    pub fn reset(&mut self) {
        self.prev_bs_exp = None;
    }
}

//! 编解码器参数.
//!
//! 对标 FFmpeg 的 `AVCodecParameters`, 描述解码器的配置参数,
//! 通常由解封装器从容器头部提取.

use ling_core::{ChannelLayout, SampleFormat};

use crate::codec_id::CodecId;

/// 编解码器参数
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 额外数据 (Vorbis identification 头包等)
    pub extra_data: Vec<u8>,
    /// 码率 (bits/s, 0 表示未知)
    pub bit_rate: u64,
    /// 音频参数
    pub audio: AudioCodecParams,
}

/// 音频编解码器参数
#[derive(Debug, Clone)]
pub struct AudioCodecParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 每帧采样数 (0 表示可变)
    pub frame_size: u32,
}

impl Default for AudioCodecParams {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            channel_layout: ChannelLayout::STEREO,
            sample_format: SampleFormat::None,
            frame_size: 0,
        }
    }
}

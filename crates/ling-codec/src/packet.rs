//! 压缩数据包 (Packet).
//!
//! 对标 FFmpeg 的 `AVPacket`, 表示从容器格式中读取的一段压缩数据.
//! 时间戳与时长以所属流的时间基 (音频为 `1/sample_rate`) 为单位.

use bytes::Bytes;
use ling_core::Rational;

/// 压缩数据包
///
/// 从容器格式中读取的一段压缩数据, 需要送入解码器进行解码.
/// `trim_start`/`trim_end` 携带无缝播放 (gapless) 的裁剪计数:
/// 解码器应丢弃输出开头/结尾对应数量的采样.
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 解码时间戳 (DTS)
    pub dts: i64,
    /// 数据包时长 (以 time_base 为单位)
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 起始裁剪采样数 (编码器前导延迟)
    pub trim_start: u32,
    /// 末尾裁剪采样数 (编码器填充)
    pub trim_end: u32,
    /// 在容器中的字节偏移量 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: ling_core::timestamp::NOPTS_VALUE,
            dts: ling_core::timestamp::NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            trim_start: 0,
            trim_end: 0,
            pos: -1,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包 (flush packet)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 裁剪后的有效时长
    pub fn trimmed_duration(&self) -> i64 {
        (self.duration - i64::from(self.trim_start) - i64::from(self.trim_end)).max(0)
    }
}

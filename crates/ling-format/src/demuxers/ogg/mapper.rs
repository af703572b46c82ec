//! Ogg 逻辑流到编解码器的映射.
//!
//! 每条逻辑流由 BOS 包识别出编解码器并绑定一个 mapper:
//! - Vorbis: 完整实现 (头包解析、包时长、granule 换算)
//! - FLAC / Opus: 仅识别签名, 任何映射操作返回不支持

use log::warn;

use ling_codec::CodecId;
use ling_codec::parsers::vorbis::VorbisPacketParser;
use ling_core::{ChannelLayout, LingError, LingResult};

/// mapper 对一个完整 packet 的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MappedPacket {
    /// 码流数据包, 携带其采样时长
    StreamData {
        /// 包时长 (采样数)
        dur: u64,
    },
    /// 旁路数据 (元数据等)
    SideData,
    /// 解码器 setup 数据
    Setup,
    /// 无法归类
    Unknown,
}

/// 编解码器 mapper
pub(crate) enum CodecMapper {
    Vorbis(VorbisMapper),
    Flac,
    Opus,
}

impl CodecMapper {
    /// 从 BOS 包的首个 packet 识别编解码器
    pub(crate) fn detect(packet: &[u8]) -> Option<Self> {
        if packet.len() >= 7 && packet[0] == 0x01 && &packet[1..7] == b"vorbis" {
            return VorbisMapper::new(packet).map(Self::Vorbis);
        }
        if packet.len() >= 8 && &packet[0..8] == b"OpusHead" {
            return Some(Self::Opus);
        }
        if packet.len() >= 5 && &packet[0..5] == b"\x7fFLAC" {
            return Some(Self::Flac);
        }
        if packet.len() >= 4 && &packet[0..4] == b"fLaC" {
            return Some(Self::Flac);
        }
        None
    }

    /// 编解码器标识
    pub(crate) fn codec_id(&self) -> CodecId {
        match self {
            Self::Vorbis(_) => CodecId::Vorbis,
            Self::Flac => CodecId::Flac,
            Self::Opus => CodecId::Opus,
        }
    }

    /// 分类一个完整 packet 并计算其时长
    pub(crate) fn map_packet(&mut self, packet: &[u8]) -> LingResult<MappedPacket> {
        match self {
            Self::Vorbis(mapper) => Ok(mapper.map_packet(packet)),
            Self::Flac | Self::Opus => Err(LingError::Unsupported(format!(
                "{} 映射未实现",
                self.codec_id(),
            ))),
        }
    }

    /// 绝对粒度位置换算为流时间基的时间戳
    ///
    /// Vorbis 的 granule 就是页尾最后一个完整采样的序号.
    pub(crate) fn absgp_to_ts(&self, absgp: u64) -> u64 {
        match self {
            Self::Vorbis(_) | Self::Flac | Self::Opus => absgp,
        }
    }

    /// 清除跨包状态 (seek 或流重启后调用)
    pub(crate) fn reset(&mut self) {
        if let Self::Vorbis(mapper) = self {
            mapper.reset();
        }
    }

    /// 判断一个 packet 是否为头包 (seek 前滚时跳过)
    pub(crate) fn is_header_packet(&self, data: &[u8]) -> bool {
        match self {
            Self::Vorbis(_) => {
                data.len() >= 7 && data[0] & 0x01 == 1 && &data[1..7] == b"vorbis"
            }
            _ => false,
        }
    }

    /// 采样率 (头包就绪后可用)
    pub(crate) fn sample_rate(&self) -> Option<u32> {
        match self {
            Self::Vorbis(mapper) => Some(mapper.sample_rate),
            _ => None,
        }
    }
}

/// Vorbis 逻辑流 mapper
pub(crate) struct VorbisMapper {
    /// identification 头包 (作为流的 extra_data)
    pub(crate) ident_data: Vec<u8>,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u8,
    /// comment 头解析出的标签
    pub(crate) comments: Vec<(String, String)>,
    /// 时长解析器, setup 头就绪后可用
    parser: Option<VorbisPacketParser>,
}

impl VorbisMapper {
    /// 从 identification 头包构造
    ///
    /// 只提取固定偏移的采样率与声道数; 完整校验由解码器完成.
    fn new(ident: &[u8]) -> Option<Self> {
        if ident.len() < 30 {
            return None;
        }
        let channels = ident[11];
        let sample_rate = u32::from_le_bytes([ident[12], ident[13], ident[14], ident[15]]);
        if channels == 0 || sample_rate == 0 {
            return None;
        }
        Some(Self {
            ident_data: ident.to_vec(),
            sample_rate,
            channels,
            comments: Vec::new(),
            parser: None,
        })
    }

    /// 声道布局
    pub(crate) fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_channels(u32::from(self.channels))
    }

    /// 头包是否齐备 (setup 已解析)
    pub(crate) fn is_ready(&self) -> bool {
        self.parser.is_some()
    }

    fn map_packet(&mut self, packet: &[u8]) -> MappedPacket {
        let Some(&first) = packet.first() else {
            return MappedPacket::Unknown;
        };

        // 头包: 首字节为奇数包类型且后随 "vorbis" 签名
        if packet.len() >= 7 && &packet[1..7] == b"vorbis" {
            match first {
                0x01 => return MappedPacket::Setup,
                0x03 => {
                    self.parse_comments(packet);
                    return MappedPacket::SideData;
                }
                0x05 => {
                    match VorbisPacketParser::new(&self.ident_data, packet) {
                        Ok(parser) => self.parser = Some(parser),
                        Err(e) => {
                            warn!("Ogg: Vorbis setup 头解析失败, 包时长不可用: {e}");
                        }
                    }
                    return MappedPacket::Setup;
                }
                _ => return MappedPacket::Unknown,
            }
        }

        // 音频包首位为 0
        if first & 0x01 != 0 {
            return MappedPacket::Unknown;
        }

        let dur = match self.parser.as_mut() {
            Some(parser) => parser.packet_duration(packet),
            None => 0,
        };
        MappedPacket::StreamData { dur }
    }

    /// 解析 comment 头中的 KEY=VALUE 标签
    fn parse_comments(&mut self, packet: &[u8]) {
        fn read_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
            let bytes = data.get(*pos..*pos + 4)?;
            *pos += 4;
            Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }

        let mut pos = 7usize;
        let Some(vendor_len) = read_u32(packet, &mut pos) else {
            return;
        };
        pos += vendor_len as usize;

        let Some(count) = read_u32(packet, &mut pos) else {
            return;
        };
        for _ in 0..count {
            let Some(len) = read_u32(packet, &mut pos) else {
                return;
            };
            let Some(bytes) = packet.get(pos..pos + len as usize) else {
                return;
            };
            pos += len as usize;

            let text = String::from_utf8_lossy(bytes);
            if let Some((key, value)) = text.split_once('=') {
                self.comments.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// 用头包重建时长解析器并清除前包状态
    fn reset(&mut self) {
        if let Some(parser) = self.parser.as_mut() {
            parser.reset();
        }
    }

    /// 探测一个页面内完整 packet 的总时长 (不影响流状态)
    pub(crate) fn probe_page_duration<'a>(
        &self,
        packets: impl Iterator<Item = &'a [u8]>,
    ) -> u64 {
        let Some(parser) = self.parser.as_ref() else {
            return 0;
        };
        let mut probe = parser.clone();
        probe.reset();
        packets.map(|p| probe.packet_duration(p)).sum()
    }
}

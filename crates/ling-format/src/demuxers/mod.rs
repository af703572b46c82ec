//! 解封装器实现模块.

pub mod ogg;

use crate::registry::FormatRegistry;

/// 注册所有内置解封装器与探测器
pub fn register_all_demuxers(registry: &mut FormatRegistry) {
    registry.register_demuxer(
        crate::format_id::FormatId::Ogg,
        "ogg",
        ogg::OggDemuxer::create,
    );
    registry.register_probe(Box::new(ogg::OggProbe));
}

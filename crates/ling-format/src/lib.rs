//! # ling-format
//!
//! Ling 音频框架容器格式库, 提供解封装框架.
//!
//! 本 crate 对标 FFmpeg 的 libavformat, 负责容器格式的读取:
//! 带回退窗口的环形缓冲 I/O、格式探测、Ogg 物理/逻辑流解复用
//! 与二分 seek.

pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod io;
pub mod probe;
pub mod registry;
pub mod stream;

// 重导出常用类型
pub use demuxer::{Demuxer, FormatOptions, SeekMode, SeekedTo};
pub use format_id::FormatId;
pub use io::IoContext;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream::Stream;

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
}

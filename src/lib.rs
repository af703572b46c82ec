//! # Ling (聆)
//!
//! 纯 Rust 实现的 Ogg/Vorbis 音频解码框架.
//!
//! Ling 提供从字节流到 PCM 的完整解码链路:
//! - **容器**: Ogg 物理/逻辑流解复用, 页面 CRC 校验与重同步,
//!   帧精确的时间戳分配, 无缝播放裁剪, 二分 seek
//! - **编解码**: Vorbis I 解码 (codebook/floor1/residue/耦合/IMDCT)
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ling::format::FormatOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut io = ling::format::IoContext::open_read("audio.ogg")?;
//! let registry = ling::default_format_registry();
//! let mut demuxer =
//!     registry.open_input(&mut io, Some("audio.ogg"), FormatOptions::default())?;
//! let packet = demuxer.read_packet(&mut io)?;
//! println!("首个数据包: {} 字节", packet.size());
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ling-core` | 核心类型与工具 |
//! | `ling-codec` | 编解码器框架与 Vorbis 解码器 |
//! | `ling-format` | 容器格式框架与 Ogg 解封装 |

/// 核心类型与工具 (对标 libavutil)
pub use ling_core as core;

/// 编解码器框架 (对标 libavcodec)
pub use ling_codec as codec;

/// 容器格式框架 (对标 libavformat)
pub use ling_format as format;

/// 获取 Ling 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码器的注册表
pub fn default_codec_registry() -> ling_codec::CodecRegistry {
    let mut registry = ling_codec::CodecRegistry::new();
    ling_codec::register_all(&mut registry);
    registry
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> ling_format::FormatRegistry {
    let mut registry = ling_format::FormatRegistry::new();
    ling_format::register_all(&mut registry);
    registry
}

//! # ling-codec
//!
//! Ling 音频框架编解码器库, 提供解码器框架与 Packet/Frame 抽象.
//!
//! 本 crate 对标 FFmpeg 的 libavcodec, 定义了解码器注册与解码流程的
//! 核心抽象, 并内置完整的 Vorbis I 解码器.
//!
//! ## 支持的编解码器
//!
//! - **解码器**: Vorbis (floor 1, residue 0/1/2, 声道耦合, IMDCT)
//! - FLAC 与 Opus 仅作为 Ogg 映射占位, 不提供解码
//!
//! ## 使用示例
//!
//! ```rust
//! use ling_codec::{CodecRegistry, CodecId};
//!
//! let mut reg = CodecRegistry::new();
//! ling_codec::register_all(&mut reg);
//!
//! let decoder = reg.create_decoder(CodecId::Vorbis).unwrap();
//! assert_eq!(decoder.name(), "vorbis");
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;
pub mod parsers;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{AudioCodecParams, CodecParameters};
pub use decoder::Decoder;
pub use frame::{AudioFrame, Frame};
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}

//! 统一错误类型定义.
//!
//! 所有 Ling crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Seek 失败的具体分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// 底层字节源不支持随机访问
    Unseekable,
    /// 字节源只能向前读取, 无法回退到目标位置
    ForwardOnly,
    /// 目标时间戳超出流的范围
    OutOfRange,
    /// 目标流索引无效
    InvalidTrack,
}

impl SeekErrorKind {
    /// 获取分类的人类可读描述
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Unseekable => "字节源不可寻址",
            Self::ForwardOnly => "字节源只能向前读取",
            Self::OutOfRange => "目标时间戳超出范围",
            Self::InvalidTrack => "目标流无效",
        }
    }
}

/// Ling 框架统一错误类型
#[derive(Debug, Error)]
pub enum LingError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的特性 (floor 0, mapping ≠ 0, FLAC/Opus 映射等)
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 无效数据 (包或 setup 头中的损坏码流)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 页面 CRC 校验失败 (可恢复, 重新同步后继续)
    #[error("Ogg 页面 CRC 校验失败")]
    CrcMismatch,

    /// 新的物理流 (链式流) 开始, 调用方需要重建解码器
    #[error("遇到新的物理流边界, 需要重建解码状态")]
    ResetRequired,

    /// Seek 失败
    #[error("seek 失败: {}", .0.description())]
    Seek(SeekErrorKind),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 未找到指定的编解码器
    #[error("未找到编解码器: {0}")]
    CodecNotFound(String),

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Ling 框架统一 Result 类型
pub type LingResult<T> = Result<T, LingError>;

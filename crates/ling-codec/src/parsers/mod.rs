//! 解封装侧的轻量码流解析器.
//!
//! 与完整解码器不同, 解析器只读取确定时长/边界所需的最少字段,
//! 供容器层做时间戳分配与 seek 探测.

pub mod vorbis;

//! 解封装器 (Demuxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVInputFormat`, 定义了从容器格式中读取数据包
//! 以及按时间 seek 的接口.

use ling_codec::Packet;
use ling_core::LingResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装行为选项
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// 无缝播放: 去除编码器前导延迟与末尾填充
    pub enable_gapless: bool,
    /// 打开时预建 seek 索引 (仅可寻址输入)
    pub prebuild_seek_index: bool,
    /// seek 索引的填充粒度 (秒)
    pub seek_index_fill_rate: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            enable_gapless: false,
            prebuild_seek_index: false,
            seek_index_fill_rate: 20,
        }
    }
}

/// Seek 模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// 尽力而为: 停在二分定位到的页面附近即可
    Coarse,
    /// 精确: 定位到时间戳不超过目标的最近数据包
    Accurate,
}

/// Seek 结果
#[derive(Debug, Clone, Copy)]
pub struct SeekedTo {
    /// 请求的时间戳 (流时间基)
    pub required_ts: i64,
    /// 实际落点的时间戳 (下一个数据包的 pts)
    pub actual_ts: i64,
}

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 打开容器并解析头部
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包
/// 4. 可选: 调用 `seek()` 进行定位
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    ///
    /// 读取容器头部, 解析出所有流的信息. 首页不是流起始页时失败.
    fn open(&mut self, io: &mut IoContext) -> LingResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(LingError::Eof)`: 已到达流末尾且队列排空
    /// - `Err(LingError::ResetRequired)`: 遇到新的物理流 (链式流)
    fn read_packet(&mut self, io: &mut IoContext) -> LingResult<Packet>;

    /// 定位到指定时间点
    ///
    /// # 参数
    /// - `stream_index`: 目标流索引
    /// - `timestamp`: 目标时间戳 (以流的 time_base 为单位)
    /// - `mode`: Coarse 为尽力而为, Accurate 保证落点 ≤ 目标
    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: usize,
        timestamp: i64,
        mode: SeekMode,
    ) -> LingResult<SeekedTo>;

    /// 获取容器时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;

    /// 获取容器元数据
    fn metadata(&self) -> &[(String, String)] {
        &[]
    }
}

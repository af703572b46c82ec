//! 每声道的 DSP 暂存区.
//!
//! 所有缓冲在解码器构造时按最大块尺寸分配一次, 之后不再扩容.

use super::floor::FloorScratch;

/// 单个声道的解码暂存
#[derive(Debug, Clone)]
pub(crate) struct DspChannel {
    /// floor 曲线 (长度 bs1/2)
    pub(crate) floor: Vec<f32>,
    /// residue 向量 (长度 bs1/2)
    pub(crate) residue: Vec<f32>,
    /// IMDCT 输出 (长度 bs1)
    pub(crate) imdct: Vec<f32>,
    /// 上一块右半 (长度 bs1/2)
    pub(crate) overlap: Vec<f32>,
    /// 本包该声道是否不解码 (floor 未使用)
    pub(crate) do_not_decode: bool,
    /// floor 解码暂存
    pub(crate) floor_scratch: FloorScratch,
}

impl DspChannel {
    /// 以最大块尺寸 (blocksize1) 分配声道暂存
    pub(crate) fn new(blocksize1: usize) -> Self {
        Self {
            floor: vec![0.0; blocksize1 / 2],
            residue: vec![0.0; blocksize1 / 2],
            imdct: vec![0.0; blocksize1],
            overlap: vec![0.0; blocksize1 / 2],
            do_not_decode: false,
            floor_scratch: FloorScratch::new(),
        }
    }

    /// 包解码开始前重置本块工作区
    pub(crate) fn reset_block(&mut self, n2: usize) {
        for v in &mut self.floor[..n2] {
            *v = 0.0;
        }
        for v in &mut self.residue[..n2] {
            *v = 0.0;
        }
        self.do_not_decode = false;
    }

    /// seek/flush 后清空跨包状态
    pub(crate) fn reset_lapping(&mut self) {
        for v in &mut self.overlap {
            *v = 0.0;
        }
    }
}

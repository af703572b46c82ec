//! Vorbis 窗函数与块间重叠相加 (lapping).
//!
//! 两个预计算半窗 (短/长), 斜坡长度为 blocksize/2:
//! `w[i] = sin(π/2 · sin²(π/2 · (i+0.5)/len))`.
//!
//! 每包输出 (prev_bs + cur_bs)/4 个采样: IMDCT 左半与上一包保存的
//! 右半在两块中较小者的窗斜坡上重叠相加; 长短块相邻时, 长块窗的
//! 平坦段直通、零段丢弃.

use std::f64::consts::PI;

/// 预计算的短/长半窗
#[derive(Debug, Clone)]
pub(crate) struct Windows {
    /// 短块斜坡, 长度 blocksize0/2
    short_win: Vec<f32>,
    /// 长块斜坡, 长度 blocksize1/2
    long_win: Vec<f32>,
}

impl Windows {
    /// 以两种块大小构造半窗
    pub(crate) fn new(blocksize0: usize, blocksize1: usize) -> Self {
        Self {
            short_win: build_half_window(blocksize0 / 2),
            long_win: build_half_window(blocksize1 / 2),
        }
    }

    /// 取指定块大小对应的斜坡窗
    fn for_blocksize(&self, blocksize: usize) -> &[f32] {
        if blocksize / 2 == self.short_win.len() {
            &self.short_win
        } else {
            &self.long_win
        }
    }
}

/// 构造长度为 `len` 的窗斜坡
fn build_half_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let x = PI / 2.0 * (i as f64 + 0.5) / len as f64;
            let s = x.sin();
            (PI / 2.0 * s * s).sin() as f32
        })
        .collect()
}

/// 块间 lapping 状态: 上一包的块大小 (首包前为空)
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LappingState {
    /// 上一包的块大小
    pub(crate) prev_blocksize: Option<usize>,
}

/// 将当前块的 IMDCT 输出与上一块的右半重叠相加
///
/// - `out`: 本包输出区, 长度 (prev_bs + cur_bs)/4
/// - `imdct`: 当前块时域信号, 长度 cur_bs
/// - `overlap`: 上一块保存的右半 (原始未加窗), 有效长度 prev_bs/2;
///   调用结束后被替换为当前块的右半
///
/// 输出值截断到 [-1, 1].
pub(crate) fn overlap_add(
    out: &mut [f32],
    imdct: &[f32],
    overlap: &mut [f32],
    prev_bs: usize,
    cur_bs: usize,
    windows: &Windows,
) {
    debug_assert_eq!(imdct.len(), cur_bs);
    debug_assert_eq!(out.len(), (prev_bs + cur_bs) / 4);

    let lap_len = prev_bs.min(cur_bs) / 2;
    let win = windows.for_blocksize(prev_bs.min(cur_bs));

    if prev_bs == cur_bs {
        // 等块: 全程重叠
        for i in 0..lap_len {
            let v = overlap[i] * win[lap_len - 1 - i] + imdct[i] * win[i];
            out[i] = v.clamp(-1.0, 1.0);
        }
    } else if prev_bs > cur_bs {
        // 长块后接短块: 长窗右侧平坦段直通, 零段丢弃
        let pass = (prev_bs - cur_bs) / 4;
        for i in 0..pass {
            out[i] = overlap[i].clamp(-1.0, 1.0);
        }
        for i in 0..lap_len {
            let v = overlap[pass + i] * win[lap_len - 1 - i] + imdct[i] * win[i];
            out[pass + i] = v.clamp(-1.0, 1.0);
        }
    } else {
        // 短块后接长块: 长窗左侧零段跳过, 平坦段从 IMDCT 尾部直通
        let lead = (cur_bs - prev_bs) / 4;
        for i in 0..lap_len {
            let v = overlap[i] * win[lap_len - 1 - i] + imdct[lead + i] * win[i];
            out[i] = v.clamp(-1.0, 1.0);
        }
        for (i, slot) in out.iter_mut().enumerate().skip(lap_len) {
            *slot = imdct[lead + i].clamp(-1.0, 1.0);
        }
    }

    // 保存当前块右半, 供下一包重叠
    overlap[..cur_bs / 2].copy_from_slice(&imdct[cur_bs / 2..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_窗斜坡端点与单调性() {
        let w = build_half_window(128);
        assert!(w[0] > 0.0 && w[0] < 0.01);
        assert!(w[127] > 0.999);
        assert!(w.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn test_窗能量互补() {
        // Princen-Bradley 条件: w[i]² + w[len-1-i]² = 1
        let w = build_half_window(64);
        for i in 0..64 {
            let e = w[i] * w[i] + w[63 - i] * w[63 - i];
            assert!((e - 1.0).abs() < 1e-6, "i={i}: e={e}");
        }
    }

    #[test]
    fn test_等块重叠长度() {
        let windows = Windows::new(64, 256);
        let imdct = vec![0.25f32; 64];
        let mut overlap = vec![0.5f32; 128];
        let mut out = vec![0.0f32; 32];
        overlap_add(&mut out, &imdct, &mut overlap, 64, 64, &windows);

        // 重叠区应为上一块右半与当前左半的加窗和
        let w = build_half_window(32);
        for i in 0..32 {
            let want = 0.5 * w[31 - i] + 0.25 * w[i];
            assert!((out[i] - want).abs() < 1e-6);
        }
        // 右半被保存
        assert_eq!(&overlap[..32], &imdct[32..]);
    }

    #[test]
    fn test_长短块过渡区段() {
        let windows = Windows::new(64, 256);

        // 长 → 短: 前 (256-64)/4 = 48 个采样直通
        let imdct = vec![0.0f32; 64];
        let mut overlap = vec![0.75f32; 128];
        let mut out = vec![0.0f32; 80];
        overlap_add(&mut out, &imdct, &mut overlap, 256, 64, &windows);
        for &v in &out[..48] {
            assert_eq!(v, 0.75);
        }

        // 短 → 长: 重叠区 32, 其余从 IMDCT 尾部直通
        let imdct: Vec<f32> = (0..256).map(|i| i as f32 / 512.0).collect();
        let mut overlap2 = vec![0.0f32; 128];
        let mut out = vec![0.0f32; 80];
        overlap_add(&mut out, &imdct, &mut overlap2, 64, 256, &windows);
        for (i, &v) in out.iter().enumerate().skip(32) {
            let want = imdct[48 + i];
            assert!((v - want).abs() < 1e-6, "直通区 i={i}");
        }
    }

    #[test]
    fn test_输出截断() {
        let windows = Windows::new(64, 256);
        let imdct = vec![4.0f32; 64];
        let mut overlap = vec![4.0f32; 128];
        let mut out = vec![0.0f32; 32];
        overlap_add(&mut out, &imdct, &mut overlap, 64, 64, &windows);
        assert!(out.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }
}

//! 逆 MDCT: 经前/后旋转归约为 n/2 点复数 FFT.
//!
//! 频谱长度 n 的 IMDCT 输出 2n 点时域信号:
//! 1. 前旋转: 偶序/逆奇序频谱对乘旋转因子, 打包为 n/2 点复序列;
//! 2. n/2 点正向复数 FFT (无归一化);
//! 3. 后旋转: 每个频点乘共轭旋转因子, 依 IMDCT 对称性散布到
//!    输出的四个 n/2 长度区段.
//!
//! 旋转因子 w[k] = sqrt(|scale|)·e^{jθ}, θ = (π/n)(1/8 + k).

use std::f64::consts::PI;

/// 单精度复数
#[derive(Debug, Clone, Copy, Default)]
struct Complex {
    re: f32,
    im: f32,
}

/// 迭代基-2 复数 FFT (正向, e^{-j2πik/N} 约定, 无归一化)
#[derive(Debug, Clone)]
struct Fft {
    size: usize,
    /// 位逆序置换表
    rev: Vec<u32>,
    /// 旋转因子 w^k = e^{-j2πk/N}, k ∈ [0, N/2)
    twiddles: Vec<Complex>,
}

impl Fft {
    fn new(size: usize) -> Self {
        assert!(size.is_power_of_two() && size >= 2, "FFT 点数必须为 2 的幂");

        let bits = size.trailing_zeros();
        let rev = (0..size as u32)
            .map(|i| i.reverse_bits() >> (32 - bits))
            .collect();

        let twiddles = (0..size / 2)
            .map(|k| {
                let theta = -2.0 * PI * k as f64 / size as f64;
                Complex {
                    re: theta.cos() as f32,
                    im: theta.sin() as f32,
                }
            })
            .collect();

        Self {
            size,
            rev,
            twiddles,
        }
    }

    /// 原位变换
    fn transform(&self, buf: &mut [Complex]) {
        assert_eq!(buf.len(), self.size, "FFT 输入长度不匹配");

        for i in 0..self.size {
            let j = self.rev[i] as usize;
            if i < j {
                buf.swap(i, j);
            }
        }

        let mut len = 2usize;
        while len <= self.size {
            let half = len / 2;
            let stride = self.size / len;
            for start in (0..self.size).step_by(len) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let a = buf[start + k];
                    let b = buf[start + k + half];
                    let t = Complex {
                        re: b.re * w.re - b.im * w.im,
                        im: b.re * w.im + b.im * w.re,
                    };
                    buf[start + k] = Complex {
                        re: a.re + t.re,
                        im: a.im + t.im,
                    };
                    buf[start + k + half] = Complex {
                        re: a.re - t.re,
                        im: a.im - t.im,
                    };
                }
            }
            len *= 2;
        }
    }
}

/// 逆 MDCT 变换器
///
/// 针对固定频谱长度构造一次, 旋转因子与 FFT 表复用.
#[derive(Debug, Clone)]
pub(crate) struct Imdct {
    /// 频谱长度 n
    n: usize,
    /// n/2 个前/后旋转因子
    twiddle: Vec<Complex>,
    fft: Fft,
    scratch: Vec<Complex>,
}

impl Imdct {
    /// 创建频谱长度为 `n` 的 IMDCT (scale = 1)
    pub(crate) fn new(n: usize) -> Self {
        Self::new_scaled(n, 1.0)
    }

    /// 创建带缩放的 IMDCT
    ///
    /// `n` 必须为 2 的幂且 ≥ 4.
    pub(crate) fn new_scaled(n: usize, scale: f64) -> Self {
        assert!(n.is_power_of_two() && n >= 4, "IMDCT 频谱长度必须为 2 的幂且 ≥ 4");

        let sqrt_scale = scale.abs().sqrt();
        let twiddle = (0..n / 2)
            .map(|k| {
                let theta = PI / n as f64 * (1.0 / 8.0 + k as f64);
                Complex {
                    re: (sqrt_scale * theta.cos()) as f32,
                    im: (sqrt_scale * theta.sin()) as f32,
                }
            })
            .collect();

        Self {
            n,
            twiddle,
            fft: Fft::new(n / 2),
            scratch: vec![Complex::default(); n / 2],
        }
    }

    /// 执行 IMDCT: `spec` 长度必须为 n, `out` 长度必须为 2n
    pub(crate) fn imdct(&mut self, spec: &[f32], out: &mut [f32]) {
        let n = self.n;
        assert_eq!(spec.len(), n, "IMDCT 频谱长度不匹配");
        assert_eq!(out.len(), 2 * n, "IMDCT 输出长度不匹配");

        let n2 = n / 2;
        let n4 = n / 4;

        // 前旋转 + 打包
        for i in 0..n2 {
            let even = spec[2 * i];
            let odd = -spec[n - 1 - 2 * i];
            let w = self.twiddle[i];
            self.scratch[i] = Complex {
                re: odd * w.im - even * w.re,
                im: odd * w.re + even * w.im,
            };
        }

        self.fft.transform(&mut self.scratch);

        // 后旋转: V[m] = Z[m] · conj(w[m])
        for m in 0..n2 {
            let z = self.scratch[m];
            let w = self.twiddle[m];
            self.scratch[m] = Complex {
                re: z.re * w.re + z.im * w.im,
                im: z.im * w.re - z.re * w.im,
            };
        }

        // 依对称性散布到四个 n/2 区段
        for j in 0..n4 {
            let a = self.scratch[j];
            let b = self.scratch[n4 + j];
            out[2 * j] = -b.re;
            out[n2 - 1 - 2 * j] = a.im;
            out[n2 + 2 * j] = -a.im;
            out[n - 1 - 2 * j] = b.re;
            out[n + 2 * j] = -b.im;
            out[3 * n2 + 2 * j] = a.re;
        }
        for j in 0..n4 {
            let c = self.scratch[n4 - 1 - j];
            let d = self.scratch[n2 - 1 - j];
            out[n + 2 * j + 1] = c.re;
            out[3 * n2 + 2 * j + 1] = -d.im;
        }
    }
}

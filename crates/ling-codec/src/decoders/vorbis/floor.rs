//! Vorbis floor 解码.
//!
//! 仅支持 floor type 1 (分段折线谱包络). floor type 0 (LSP) 在
//! setup 阶段语法级跳过, 任何使用都返回不支持错误.
//!
//! floor1 曲线以整数折线描述: x 轴为频点 (x-list), y 轴为量化幅度,
//! 合成时经 256 项反 dB 表映射为线性幅度.

use ling_core::{LingError, LingResult};

use super::bitreader::{BitReader, ilog};
use super::codebook::VorbisCodebook;

/// multiplier (1-4) 对应的 y 值范围
const FLOOR1_RANGES: [u32; 4] = [256, 128, 86, 64];

/// x-list 的最大长度 (隐式两点 + 31 分区 × 8 维)
const FLOOR1_MAX_POINTS: usize = 65;

/// 构建 256 项反 dB 幅度表
///
/// 表项为 `10^((i - 255) * 7 / 256)`, 尾项为 1.0;
/// 在解码器构造时计算一次, 避免全局单例.
pub(crate) fn build_inverse_db_table() -> [f32; 256] {
    let mut table = [0.0f32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = 10.0f64.powf((i as f64 - 255.0) * 7.0 / 256.0) as f32;
    }
    table
}

/// floor 配置 (setup 产物, 不可变)
#[derive(Debug, Clone)]
pub(crate) enum Floor {
    /// floor type 0: 语法可跳过, 使用即报错
    Zero,
    /// floor type 1
    One(Floor1),
}

impl Floor {
    /// 从 setup 位流读取一个 floor 配置
    pub(crate) fn read(br: &mut BitReader<'_>, codebook_count: usize) -> LingResult<Self> {
        let floor_type = br.read_bits_leq32(16)?;
        match floor_type {
            0 => {
                skip_floor0_setup(br, codebook_count)?;
                Ok(Self::Zero)
            }
            1 => Ok(Self::One(Floor1::read(br, codebook_count)?)),
            _ => Err(LingError::InvalidData(format!(
                "Vorbis floor_type 不支持: {floor_type}",
            ))),
        }
    }

    /// 读取一个声道的 floor 数据
    ///
    /// 返回 false 表示该声道本包未使用 floor (输出保持为零).
    pub(crate) fn read_channel(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[VorbisCodebook],
        scratch: &mut FloorScratch,
    ) -> LingResult<bool> {
        match self {
            Self::Zero => Err(LingError::Unsupported("Vorbis floor0 解码不支持".into())),
            Self::One(f1) => f1.read_channel(br, codebooks, scratch),
        }
    }

    /// 将读取到的 floor 数据合成为幅度曲线
    pub(crate) fn synthesis(
        &self,
        scratch: &mut FloorScratch,
        inverse_db: &[f32; 256],
        out: &mut [f32],
    ) -> LingResult<()> {
        match self {
            Self::Zero => Err(LingError::Unsupported("Vorbis floor0 合成不支持".into())),
            Self::One(f1) => {
                f1.synthesis(scratch, inverse_db, out);
                Ok(())
            }
        }
    }
}

/// floor0 的 setup 字段仅做语法消费
fn skip_floor0_setup(br: &mut BitReader<'_>, codebook_count: usize) -> LingResult<()> {
    let _order = br.read_bits_leq32(8)?;
    let _rate = br.read_bits_leq32(16)?;
    let _bark_map_size = br.read_bits_leq32(16)?;
    let amp_bits = br.read_bits_leq32(6)?;
    if amp_bits == 0 {
        return Err(LingError::InvalidData("Vorbis floor0 amp_bits 非法".into()));
    }
    let _amp_offset = br.read_bits_leq32(8)?;
    let book_count = br.read_bits_leq32(4)? + 1;
    for _ in 0..book_count {
        let book = br.read_bits_leq32(8)? as usize;
        if book >= codebook_count {
            return Err(LingError::InvalidData("Vorbis floor0 book 索引越界".into()));
        }
    }
    Ok(())
}

/// floor1 的一个分区类
#[derive(Debug, Clone)]
struct Floor1Class {
    /// 类内维数 (每分区读出的 x 点数)
    dimensions: u32,
    /// 子类位数
    subclass_bits: u32,
    /// 主码本 (subclass_bits > 0 时存在)
    masterbook: Option<u8>,
    /// 子码本表, 每项 None 表示该子类不读码字 (y 取 0)
    subclass_books: Vec<Option<u8>>,
}

/// floor1 配置
#[derive(Debug, Clone)]
pub(crate) struct Floor1 {
    /// 各分区的类索引
    partition_classes: Vec<u8>,
    /// 类表
    classes: Vec<Floor1Class>,
    /// y 量化倍率 (1-4)
    multiplier: u32,
    /// x 断点表: [0, 1<<range_bits, 分区断点...]
    x_list: Vec<u32>,
    /// 对 i ≥ 2 预计算的邻居 (low, high): x[..i] 中小于/大于 x[i] 的最近点
    neighbors: Vec<(u8, u8)>,
    /// 按 x 值稳定排序的遍历顺序
    sort_order: Vec<u8>,
}

impl Floor1 {
    /// 从 setup 位流读取 floor1 配置
    fn read(br: &mut BitReader<'_>, codebook_count: usize) -> LingResult<Self> {
        let partitions = br.read_bits_leq32(5)?;
        let mut partition_classes = Vec::with_capacity(partitions as usize);
        let mut maximum_class = 0u32;
        for _ in 0..partitions {
            let class = br.read_bits_leq32(4)?;
            maximum_class = maximum_class.max(class);
            partition_classes.push(class as u8);
        }

        let class_count = if partitions > 0 { maximum_class + 1 } else { 0 };
        let mut classes = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            let dimensions = br.read_bits_leq32(3)? + 1;
            let subclass_bits = br.read_bits_leq32(2)?;

            let masterbook = if subclass_bits > 0 {
                let book = br.read_bits_leq32(8)? as usize;
                if book >= codebook_count {
                    return Err(LingError::InvalidData(
                        "Vorbis floor1 masterbook 索引越界".into(),
                    ));
                }
                Some(book as u8)
            } else {
                None
            };

            let mut subclass_books = Vec::with_capacity(1usize << subclass_bits);
            for _ in 0..(1u32 << subclass_bits) {
                // 读出值为 book+1, 0 表示该子类不使用码本
                let raw = br.read_bits_leq32(8)?;
                if raw == 0 {
                    subclass_books.push(None);
                } else {
                    let book = (raw - 1) as usize;
                    if book >= codebook_count {
                        return Err(LingError::InvalidData(
                            "Vorbis floor1 子码本索引越界".into(),
                        ));
                    }
                    subclass_books.push(Some(book as u8));
                }
            }

            classes.push(Floor1Class {
                dimensions,
                subclass_bits,
                masterbook,
                subclass_books,
            });
        }

        let multiplier = br.read_bits_leq32(2)? + 1;
        let range_bits = br.read_bits_leq32(4)?;

        let mut x_list = vec![0u32, 1u32 << range_bits];
        for &class_idx in &partition_classes {
            let dims = classes[class_idx as usize].dimensions;
            for _ in 0..dims {
                x_list.push(br.read_bits_leq32(range_bits)?);
            }
        }
        if x_list.len() > FLOOR1_MAX_POINTS {
            return Err(LingError::InvalidData("Vorbis floor1 x-list 过长".into()));
        }

        // x 值必须互不相同
        let mut sorted_x = x_list.clone();
        sorted_x.sort_unstable();
        if sorted_x.windows(2).any(|w| w[0] == w[1]) {
            return Err(LingError::InvalidData("Vorbis floor1 x-list 含重复值".into()));
        }

        // 预计算邻居: 在 x[..i] 中找小于 x[i] 的最大值与大于 x[i] 的最小值
        let mut neighbors = Vec::with_capacity(x_list.len());
        for i in 0..x_list.len() {
            if i < 2 {
                neighbors.push((0u8, 0u8));
                continue;
            }
            let mut low = 0usize;
            let mut high = 1usize;
            for j in 0..i {
                if x_list[j] < x_list[i] && x_list[j] >= x_list[low] {
                    low = j;
                }
                if x_list[j] > x_list[i] && x_list[j] <= x_list[high] {
                    high = j;
                }
            }
            neighbors.push((low as u8, high as u8));
        }

        // 按 x 值的稳定排序遍历顺序
        let mut sort_order: Vec<u8> = (0..x_list.len() as u8).collect();
        sort_order.sort_by_key(|&i| x_list[i as usize]);

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            x_list,
            neighbors,
            sort_order,
        })
    }

    /// y 值范围
    fn range(&self) -> u32 {
        FLOOR1_RANGES[(self.multiplier - 1) as usize]
    }

    /// 读取一个声道的 floor1 数据到 scratch
    fn read_channel(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[VorbisCodebook],
        scratch: &mut FloorScratch,
    ) -> LingResult<bool> {
        scratch.ys.clear();

        if !br.read_bool()? {
            return Ok(false);
        }

        let range = self.range();
        let y_bits = ilog(range - 1);
        scratch.ys.push(br.read_bits_leq32(y_bits)?);
        scratch.ys.push(br.read_bits_leq32(y_bits)?);

        for &class_idx in &self.partition_classes {
            let class = &self.classes[class_idx as usize];
            let csub = (1u32 << class.subclass_bits) - 1;

            let mut cval = 0u32;
            if let Some(masterbook) = class.masterbook {
                let book = &codebooks[masterbook as usize];
                let (entry, _) = br.read_codebook(&book.codebook)?;
                cval = entry;
            }

            for _ in 0..class.dimensions {
                let book_idx = class.subclass_books[(cval & csub) as usize];
                cval >>= class.subclass_bits;
                match book_idx {
                    Some(idx) => {
                        let book = &codebooks[idx as usize];
                        let (entry, _) = br.read_codebook(&book.codebook)?;
                        scratch.ys.push(entry);
                    }
                    None => scratch.ys.push(0),
                }
            }
        }

        Ok(true)
    }

    /// 合成 floor 曲线
    ///
    /// 步骤 1: 由邻居插值预测每个点的幅度, 与读出的残差合成 final_y,
    /// 并标记实际绘制的点. 步骤 2: 按 x 排序遍历, 在相邻绘制点之间
    /// 以 Bresenham 直线渲染, y 经反 dB 表映射.
    fn synthesis(&self, scratch: &mut FloorScratch, inverse_db: &[f32; 256], out: &mut [f32]) {
        let n2 = out.len();
        let range = self.range() as i32;
        let points = self.x_list.len().min(scratch.ys.len());
        if points < 2 || n2 == 0 {
            return;
        }

        let final_y = &mut scratch.final_y;
        let step2 = &mut scratch.step2;
        final_y.clear();
        step2.clear();

        final_y.push((scratch.ys[0] as i32).clamp(0, range - 1));
        final_y.push((scratch.ys[1] as i32).clamp(0, range - 1));
        step2.push(true);
        step2.push(true);

        for i in 2..points {
            let (low, high) = self.neighbors[i];
            let predicted = render_point(
                self.x_list[low as usize] as i32,
                final_y[low as usize],
                self.x_list[high as usize] as i32,
                final_y[high as usize],
                self.x_list[i] as i32,
            );
            let val = scratch.ys[i] as i32;
            let highroom = range - predicted;
            let lowroom = predicted;
            let room = highroom.min(lowroom) * 2;

            if val != 0 {
                step2[low as usize] = true;
                step2[high as usize] = true;
                step2.push(true);
                let unclamped = if val >= room {
                    if highroom > lowroom {
                        val - lowroom + predicted
                    } else {
                        predicted - (val - highroom) - 1
                    }
                } else if val % 2 == 1 {
                    predicted - ((val + 1) >> 1)
                } else {
                    predicted + (val >> 1)
                };
                final_y.push(unclamped.clamp(0, range - 1));
            } else {
                step2.push(false);
                final_y.push(predicted.clamp(0, range - 1));
            }
        }

        // 步骤 2: 沿排序顺序连接绘制点
        let multiplier = self.multiplier as i32;
        let mut lx = 0i32;
        let mut ly = final_y[self.sort_order[0] as usize] * multiplier;
        for &idx in &self.sort_order[1..] {
            let idx = idx as usize;
            if idx >= points || !step2[idx] {
                continue;
            }
            let hx = self.x_list[idx] as i32;
            let hy = final_y[idx] * multiplier;
            if lx < n2 as i32 {
                render_line(lx, ly, hx, hy, inverse_db, out);
            }
            lx = hx;
            ly = hy;
        }

        // 末端延伸: 最后一个绘制点之后保持恒定幅度
        if (lx as usize) < n2 {
            let amp = inverse_db[(ly.clamp(0, 255)) as usize];
            for sample in &mut out[lx as usize..] {
                *sample = amp;
            }
        }
    }
}

/// 整数线性插值预测一个点的 y 值
fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
    let dy = y1 - y0;
    let adx = x1 - x0;
    let ady = dy.abs();
    let err = ady * (x - x0);
    let off = if adx == 0 { 0 } else { err / adx };
    if dy < 0 { y0 - off } else { y0 + off }
}

/// Bresenham 风格直线渲染, y 经反 dB 表映射写入 out
fn render_line(x0: i32, y0: i32, x1: i32, y1: i32, inverse_db: &[f32; 256], out: &mut [f32]) {
    let n = out.len() as i32;
    let dy = y1 - y0;
    let adx = x1 - x0;
    if adx <= 0 {
        return;
    }
    let mut ady = dy.abs();
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    ady -= base.abs() * adx;

    let x_end = x1.min(n);
    let mut y = y0;
    let mut err = 0i32;

    if x0 < n {
        out[x0 as usize] = inverse_db[y.clamp(0, 255) as usize];
    }
    for x in (x0 + 1)..x_end {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }
        out[x as usize] = inverse_db[y.clamp(0, 255) as usize];
    }
}

/// 每声道的 floor 解码暂存区, 在解码器构造时分配一次
#[derive(Debug, Clone, Default)]
pub(crate) struct FloorScratch {
    /// 读出的量化 y 值
    pub(crate) ys: Vec<u32>,
    /// 合成的最终 y 值
    final_y: Vec<i32>,
    /// 实际绘制标记
    step2: Vec<bool>,
}

impl FloorScratch {
    /// 以 floor1 最大点数预留容量
    pub(crate) fn new() -> Self {
        Self {
            ys: Vec::with_capacity(FLOOR1_MAX_POINTS),
            final_y: Vec::with_capacity(FLOOR1_MAX_POINTS),
            step2: Vec::with_capacity(FLOOR1_MAX_POINTS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_反db表() {
        let table = build_inverse_db_table();
        assert!((table[255] - 1.0).abs() < 1e-6);
        assert!((table[0] - 1.0649863e-7).abs() < 1e-12);
        // 单调递增
        assert!(table.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_render_point_整数插值() {
        assert_eq!(render_point(0, 0, 128, 64, 64), 32);
        assert_eq!(render_point(0, 64, 128, 0, 64), 32);
        assert_eq!(render_point(0, 10, 100, 10, 57), 10);
    }

    #[test]
    fn test_render_line_端点与斜率() {
        let table = build_inverse_db_table();
        let mut out = vec![0.0f32; 128];
        render_line(0, 32, 128, 64, &table, &mut out);

        // 起点取 y0 对应的幅度
        assert_eq!(out[0], table[32]);
        // 中点接近线性插值的 y 值
        let mid = out[64];
        assert!(mid >= table[47] && mid <= table[49], "中点幅度偏离直线");
        // 曲线单调上升
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_合成_两点直线() {
        // x-list [0, 128], partitions=0, multiplier=2 (range=128),
        // floor_y = [16, 32]
        let f1 = Floor1 {
            partition_classes: Vec::new(),
            classes: Vec::new(),
            multiplier: 2,
            x_list: vec![0, 128],
            neighbors: vec![(0, 0), (0, 0)],
            sort_order: vec![0, 1],
        };
        let table = build_inverse_db_table();
        let mut scratch = FloorScratch::new();
        scratch.ys = vec![16, 32];
        scratch.step2.clear();

        let mut out = vec![0.0f32; 128];
        f1.synthesis(&mut scratch, &table, &mut out);

        // 首点幅度 = 反 dB 表 [16*2]
        assert_eq!(out[0], table[32]);
        // 渲染为 Bresenham 直线: 每步 y 增量非负且尾点接近 32*2
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert!(out[127] >= table[60] && out[127] <= table[64]);
    }

    #[test]
    fn test_floor0_使用报错() {
        let floor = Floor::Zero;
        let mut scratch = FloorScratch::new();
        let table = build_inverse_db_table();
        let mut out = vec![0.0f32; 64];
        assert!(matches!(
            floor.synthesis(&mut scratch, &table, &mut out),
            Err(LingError::Unsupported(_))
        ));
    }
}

//! Vorbis residue 解码 (type 0/1/2) 与声道耦合反变换.
//!
//! 公共管线: classbook 为每个分区选类, 每类最多 8 个按趟 (pass)
//! 使用的 VQ 码本; 逐趟遍历全部分区, 命中的分区读出 VQ 向量并
//! 累加进 residue 向量. residue 中途的流耗尽是合法的 (编码趟数
//! 少于上限), 其余错误中止整包.

use ling_core::{LingError, LingResult};

use super::bitreader::BitReader;
use super::codebook::VorbisCodebook;
use super::dsp::DspChannel;

/// residue 配置 (setup 产物, 不可变)
#[derive(Debug, Clone)]
pub(crate) struct Residue {
    /// residue 类型 (0/1/2)
    residue_type: u16,
    /// 解码区间起点 (按 n/2 截断)
    begin: u32,
    /// 解码区间终点 (按 n/2 截断)
    end: u32,
    /// 分区大小
    partition_size: u32,
    /// 类数
    classifications: u8,
    /// 分类码本索引
    classbook: u8,
    /// 每类的趟位图
    cascades: Vec<u8>,
    /// 每类 × 趟的 VQ 码本 (趟位图对应位为 1 时存在)
    books: Vec<[Option<u8>; 8]>,
    /// 最高趟号
    max_pass: u8,
}

impl Residue {
    /// 从 setup 位流读取一个 residue 配置
    pub(crate) fn read(br: &mut BitReader<'_>, codebook_count: usize) -> LingResult<Self> {
        let residue_type = br.read_bits_leq32(16)? as u16;
        if residue_type > 2 {
            return Err(LingError::InvalidData(format!(
                "Vorbis residue_type 不支持: {residue_type}",
            )));
        }

        let begin = br.read_bits_leq32(24)?;
        let end = br.read_bits_leq32(24)?;
        let partition_size = br.read_bits_leq32(24)? + 1;
        let classifications = (br.read_bits_leq32(6)? + 1) as u8;
        let classbook = br.read_bits_leq32(8)? as u8;
        if usize::from(classbook) >= codebook_count {
            return Err(LingError::InvalidData(
                "Vorbis residue classbook 索引越界".into(),
            ));
        }

        let mut cascades = Vec::with_capacity(usize::from(classifications));
        for _ in 0..classifications {
            let low = br.read_bits_leq32(3)?;
            let high = if br.read_bool()? {
                br.read_bits_leq32(5)?
            } else {
                0
            };
            cascades.push(((high << 3) | low) as u8);
        }

        let mut books = Vec::with_capacity(usize::from(classifications));
        let mut max_pass = 0u8;
        for &cascade in &cascades {
            let mut class_books = [None; 8];
            for (pass, slot) in class_books.iter_mut().enumerate() {
                if cascade & (1 << pass) != 0 {
                    let book = br.read_bits_leq32(8)? as usize;
                    if book >= codebook_count {
                        return Err(LingError::InvalidData(
                            "Vorbis residue 码本索引越界".into(),
                        ));
                    }
                    *slot = Some(book as u8);
                    max_pass = max_pass.max(pass as u8);
                }
            }
            books.push(class_books);
        }

        Ok(Self {
            residue_type,
            begin,
            end,
            partition_size,
            classifications,
            classbook,
            cascades,
            books,
            max_pass,
        })
    }

    /// 解码一个 submap 的 residue
    ///
    /// `channels` 为该 submap 内的声道索引集合, 结果累加进各声道的
    /// residue 向量 (长度 n2). type 2 先解出交织向量再按声道拆分,
    /// 交织暂存区由调用方持有以避免按包分配.
    pub(crate) fn decode(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[VorbisCodebook],
        channels: &[usize],
        dsp: &mut [DspChannel],
        n2: usize,
        interleave_buf: &mut Vec<f32>,
        classifs_buf: &mut Vec<u8>,
    ) -> LingResult<()> {
        if self.residue_type == 2 {
            self.decode_type2(br, codebooks, channels, dsp, n2, interleave_buf, classifs_buf)
        } else {
            self.decode_type01(br, codebooks, channels, dsp, n2, classifs_buf)
        }
    }

    /// type 0/1: 每声道独立的分区流
    fn decode_type01(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[VorbisCodebook],
        channels: &[usize],
        dsp: &mut [DspChannel],
        n2: usize,
        classifs_buf: &mut Vec<u8>,
    ) -> LingResult<()> {
        let begin = (self.begin as usize).min(n2);
        let end = (self.end as usize).min(n2);
        let psize = self.partition_size as usize;
        if end <= begin || psize == 0 {
            return Ok(());
        }
        let partitions = (end - begin) / psize;
        if partitions == 0 {
            return Ok(());
        }

        let classbook = &codebooks[usize::from(self.classbook)];
        let classwords = usize::from(classbook.dimensions).max(1);
        let class_count = usize::from(self.classifications);

        let ch_count = channels.len();
        let cl_stride = partitions + classwords;
        classifs_buf.clear();
        classifs_buf.resize(ch_count * cl_stride, 0);

        for pass in 0..=self.max_pass {
            let mut partition_count = 0usize;
            while partition_count < partitions {
                // 分类码字仅在第 0 趟读出并缓存
                if pass == 0 {
                    for (j, &ch) in channels.iter().enumerate() {
                        if dsp[ch].do_not_decode {
                            continue;
                        }
                        let entry = match br.read_codebook(&classbook.codebook) {
                            Ok((entry, _)) => entry,
                            Err(LingError::Eof) => return Ok(()),
                            Err(e) => return Err(e),
                        };
                        // 按 classifications 基展开, 低位数字给组内末尾分区
                        let mut tmp = entry as usize;
                        for i in (0..classwords).rev() {
                            classifs_buf[j * cl_stride + partition_count + i] =
                                (tmp % class_count) as u8;
                            tmp /= class_count;
                        }
                    }
                }

                for _ in 0..classwords {
                    if partition_count >= partitions {
                        break;
                    }
                    for (j, &ch) in channels.iter().enumerate() {
                        if dsp[ch].do_not_decode {
                            continue;
                        }
                        let class = classifs_buf[j * cl_stride + partition_count];
                        if self.cascades[usize::from(class)] & (1 << pass) == 0 {
                            continue;
                        }
                        let book_idx = self.books[usize::from(class)][usize::from(pass)]
                            .ok_or_else(|| {
                                LingError::Internal("Vorbis residue 趟位图与码本表不一致".into())
                            })?;
                        let book = &codebooks[usize::from(book_idx)];
                        let offset = begin + partition_count * psize;
                        let out = &mut dsp[ch].residue[offset..offset + psize];
                        if !self.decode_partition(br, book, out)? {
                            return Ok(());
                        }
                    }
                    partition_count += 1;
                }
            }
        }

        Ok(())
    }

    /// type 2: 所有声道交织为单一向量, 按 type 1 规则解码后拆分
    #[allow(clippy::too_many_arguments)]
    fn decode_type2(
        &self,
        br: &mut BitReader<'_>,
        codebooks: &[VorbisCodebook],
        channels: &[usize],
        dsp: &mut [DspChannel],
        n2: usize,
        interleave_buf: &mut Vec<f32>,
        classifs_buf: &mut Vec<u8>,
    ) -> LingResult<()> {
        let ch_count = channels.len();
        if ch_count == 0 {
            return Ok(());
        }
        // 所有声道都不解码时, 本 submap 不占用任何位
        if channels.iter().all(|&ch| dsp[ch].do_not_decode) {
            return Ok(());
        }

        let total = n2 * ch_count;
        let begin = (self.begin as usize).min(total);
        let end = (self.end as usize).min(total);
        let psize = self.partition_size as usize;
        if end <= begin || psize == 0 {
            return Ok(());
        }
        let partitions = (end - begin) / psize;

        interleave_buf.clear();
        interleave_buf.resize(total, 0.0);

        let classbook = &codebooks[usize::from(self.classbook)];
        let classwords = usize::from(classbook.dimensions).max(1);
        let class_count = usize::from(self.classifications);

        classifs_buf.clear();
        classifs_buf.resize(partitions + classwords, 0);

        'passes: for pass in 0..=self.max_pass {
            let mut partition_count = 0usize;
            while partition_count < partitions {
                if pass == 0 {
                    let entry = match br.read_codebook(&classbook.codebook) {
                        Ok((entry, _)) => entry,
                        Err(LingError::Eof) => break 'passes,
                        Err(e) => return Err(e),
                    };
                    let mut tmp = entry as usize;
                    for i in (0..classwords).rev() {
                        if partition_count + i < partitions {
                            classifs_buf[partition_count + i] = (tmp % class_count) as u8;
                        }
                        tmp /= class_count;
                    }
                }

                for _ in 0..classwords {
                    if partition_count >= partitions {
                        break;
                    }
                    let class = classifs_buf[partition_count];
                    if self.cascades[usize::from(class)] & (1 << pass) != 0 {
                        let book_idx = self.books[usize::from(class)][usize::from(pass)]
                            .ok_or_else(|| {
                                LingError::Internal("Vorbis residue 趟位图与码本表不一致".into())
                            })?;
                        let book = &codebooks[usize::from(book_idx)];
                        let offset = begin + partition_count * psize;
                        let out = &mut interleave_buf[offset..offset + psize];
                        if !self.decode_partition_dense(br, book, out)? {
                            break 'passes;
                        }
                    }
                    partition_count += 1;
                }
            }
        }

        // 拆分交织向量回各声道
        for (pos, &ch) in channels.iter().enumerate() {
            let residue = &mut dsp[ch].residue;
            for i in 0..n2 {
                residue[i] += interleave_buf[i * ch_count + pos];
            }
        }

        Ok(())
    }

    /// 按 residue 类型解一个分区, 返回 false 表示流耗尽 (合法截断)
    fn decode_partition(
        &self,
        br: &mut BitReader<'_>,
        book: &VorbisCodebook,
        out: &mut [f32],
    ) -> LingResult<bool> {
        match self.residue_type {
            0 => self.decode_partition_interleaved(br, book, out),
            _ => self.decode_partition_dense(br, book, out),
        }
    }

    /// format 0: VQ 向量按 step 跨步散布
    fn decode_partition_interleaved(
        &self,
        br: &mut BitReader<'_>,
        book: &VorbisCodebook,
        out: &mut [f32],
    ) -> LingResult<bool> {
        let dim = usize::from(book.dimensions);
        if dim == 0 {
            return Err(LingError::InvalidData(
                "Vorbis residue 码本维数为 0".into(),
            ));
        }
        let step = out.len() / dim;
        for j in 0..step {
            let entry = match br.read_codebook(&book.codebook) {
                Ok((entry, _)) => entry,
                Err(LingError::Eof) => return Ok(false),
                Err(e) => return Err(e),
            };
            let vec = book.vq_vector(entry)?;
            for (k, &v) in vec.iter().enumerate() {
                out[j + k * step] += v;
            }
        }
        Ok(true)
    }

    /// format 1: VQ 向量按维数连续累加, dim 2/4 使用展开路径
    fn decode_partition_dense(
        &self,
        br: &mut BitReader<'_>,
        book: &VorbisCodebook,
        out: &mut [f32],
    ) -> LingResult<bool> {
        let dim = usize::from(book.dimensions);
        if dim == 0 {
            return Err(LingError::InvalidData(
                "Vorbis residue 码本维数为 0".into(),
            ));
        }

        let mut pos = 0usize;
        match dim {
            2 => {
                while pos + 2 <= out.len() {
                    let entry = match br.read_codebook(&book.codebook) {
                        Ok((entry, _)) => entry,
                        Err(LingError::Eof) => return Ok(false),
                        Err(e) => return Err(e),
                    };
                    let vec = book.vq_vector(entry)?;
                    out[pos] += vec[0];
                    out[pos + 1] += vec[1];
                    pos += 2;
                }
            }
            4 => {
                while pos + 4 <= out.len() {
                    let entry = match br.read_codebook(&book.codebook) {
                        Ok((entry, _)) => entry,
                        Err(LingError::Eof) => return Ok(false),
                        Err(e) => return Err(e),
                    };
                    let vec = book.vq_vector(entry)?;
                    out[pos] += vec[0];
                    out[pos + 1] += vec[1];
                    out[pos + 2] += vec[2];
                    out[pos + 3] += vec[3];
                    pos += 4;
                }
            }
            _ => {
                while pos < out.len() {
                    let entry = match br.read_codebook(&book.codebook) {
                        Ok((entry, _)) => entry,
                        Err(LingError::Eof) => return Ok(false),
                        Err(e) => return Err(e),
                    };
                    let vec = book.vq_vector(entry)?;
                    let take = vec.len().min(out.len() - pos);
                    for (slot, &v) in out[pos..pos + take].iter_mut().zip(vec) {
                        *slot += v;
                    }
                    pos += dim;
                }
            }
        }
        Ok(true)
    }
}

/// 声道耦合步骤 (来自 mapping)
#[derive(Debug, Clone, Copy)]
pub(crate) struct CouplingStep {
    /// 幅度声道
    pub(crate) magnitude: u8,
    /// 角度声道
    pub(crate) angle: u8,
}

/// 对 residue 向量执行 Vorbis 反耦合平方规则
///
/// 对每个耦合对 (M, A), 逐元素:
/// M>0 时: A>0 → (M, M−A), 否则 (M+A, M);
/// M≤0 时: A>0 → (M, M+A), 否则 (M−A, M).
pub(crate) fn inverse_coupling(
    coupling_steps: &[CouplingStep],
    dsp: &mut [DspChannel],
    n2: usize,
) -> LingResult<()> {
    for step in coupling_steps.iter().rev() {
        let m_ch = usize::from(step.magnitude);
        let a_ch = usize::from(step.angle);
        if m_ch == a_ch || m_ch >= dsp.len() || a_ch >= dsp.len() {
            return Err(LingError::InvalidData(
                "Vorbis coupling 声道索引非法".into(),
            ));
        }

        // 同时可变借用两个声道的 residue
        let (lo, hi) = if m_ch < a_ch { (m_ch, a_ch) } else { (a_ch, m_ch) };
        let (head, tail) = dsp.split_at_mut(hi);
        let (first, second) = (&mut head[lo], &mut tail[0]);
        let (mag, ang) = if m_ch < a_ch {
            (&mut first.residue, &mut second.residue)
        } else {
            (&mut second.residue, &mut first.residue)
        };

        for i in 0..n2 {
            let m = mag[i];
            let a = ang[i];
            let (new_m, new_a) = if m > 0.0 {
                if a > 0.0 { (m, m - a) } else { (m + a, m) }
            } else if a > 0.0 {
                (m, m + a)
            } else {
                (m - a, m)
            };
            mag[i] = new_m;
            ang[i] = new_a;
        }
    }
    Ok(())
}

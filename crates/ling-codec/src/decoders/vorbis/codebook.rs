//! Vorbis codebook: 规范 Huffman 码表构建与 VQ 查找表.
//!
//! 码表被拍平为分块前缀表: 每个条目要么是跳转 (进入下一块),
//! 要么是值 (码字终点). 读取器按块宽窥视位流, 沿跳转链下降,
//! 命中值条目后消费其码长. 块宽上限默认 4 位, Vorbis 运行时用 8 位.

use std::collections::BTreeMap;

use ling_core::{LingError, LingResult};

use super::bitreader::{BitReader, ilog};

/// 码表条目, 64 位紧凑编码
///
/// - bit 63: 跳转标志
/// - bits 32..63 (31 位): 跳转偏移或值载荷
/// - bits 0..32: 跳转块宽或值码长 (0 表示空槽, 命中即数据错误)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CodebookEntry(u64);

impl CodebookEntry {
    const JUMP_FLAG: u64 = 1 << 63;

    /// 空槽 (稀疏码表中未使用的位型)
    pub(crate) const EMPTY: Self = Self(0);

    /// 构造值条目
    pub(crate) fn new_value(value: u32, len: u32) -> Self {
        debug_assert!(value <= 0x7FFF_FFFF);
        Self((u64::from(value) << 32) | u64::from(len))
    }

    /// 构造跳转条目
    pub(crate) fn new_jump(offset: u32, width: u32) -> Self {
        debug_assert!(offset <= 0x7FFF_FFFF);
        Self(Self::JUMP_FLAG | (u64::from(offset) << 32) | u64::from(width))
    }

    /// 是否为跳转条目
    pub(crate) fn is_jump(&self) -> bool {
        self.0 & Self::JUMP_FLAG != 0
    }

    /// 是否为值条目 (空槽不算)
    pub(crate) fn is_value(&self) -> bool {
        !self.is_jump()
    }

    /// 值载荷
    pub(crate) fn value(&self) -> u32 {
        ((self.0 >> 32) & 0x7FFF_FFFF) as u32
    }

    /// 值条目的码长 (本块内剩余位数)
    pub(crate) fn value_len(&self) -> u32 {
        self.0 as u32
    }

    /// 跳转目标偏移
    pub(crate) fn jump_offset(&self) -> usize {
        ((self.0 >> 32) & 0x7FFF_FFFF) as usize
    }

    /// 跳转目标块宽
    pub(crate) fn jump_len(&self) -> u32 {
        self.0 as u32
    }
}

/// 码字位序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitOrder {
    /// 码字按读出顺序给出
    Verbatim,
    /// 码字按读出顺序的逆序给出 (Vorbis 使用)
    Reverse,
}

/// 拍平的 Huffman 码表
#[derive(Debug, Clone)]
pub(crate) struct Codebook {
    /// 条目表, 下标 0 为哨兵跳转条目
    table: Vec<CodebookEntry>,
}

impl Codebook {
    /// Vorbis 码字的最大位数
    pub(crate) const MAX_CODE_BITS: u32 = 32;

    /// 初始块: (偏移, 块宽), 由哨兵条目给出
    pub(crate) fn initial_block(&self) -> (usize, u32) {
        let sentinel = self.table[0];
        (sentinel.jump_offset(), sentinel.jump_len())
    }

    /// 取指定下标的条目
    ///
    /// 下标越界属于构建错误, 直接 panic.
    pub(crate) fn entry(&self, index: usize) -> CodebookEntry {
        self.table[index]
    }
}

/// 码表构建器
pub(crate) struct CodebookBuilder {
    /// 每块的最大位宽
    max_bits_per_block: u32,
    /// 码字位序
    bit_order: BitOrder,
    /// 是否允许零码长条目 (稀疏码表)
    is_sparse: bool,
}

/// 构建过程中的中间条目
#[derive(Debug, Clone, Copy)]
struct BuildItem {
    /// 位序调整后的码字 (低位先读)
    key: u32,
    /// 码长
    len: u32,
    /// 条目值
    value: u32,
}

impl CodebookBuilder {
    /// 创建密集码表构建器
    pub(crate) fn new(bit_order: BitOrder) -> Self {
        Self {
            max_bits_per_block: 4,
            bit_order,
            is_sparse: false,
        }
    }

    /// 创建稀疏码表构建器 (允许零码长的未用条目)
    pub(crate) fn new_sparse(bit_order: BitOrder) -> Self {
        Self {
            max_bits_per_block: 4,
            bit_order,
            is_sparse: true,
        }
    }

    /// 设置每块的最大位宽 (Vorbis 运行时设为 8)
    pub(crate) fn bits_per_block(&mut self, bits: u32) {
        debug_assert!(bits >= 1 && bits <= 16);
        self.max_bits_per_block = bits;
    }

    /// 从平行数组 (码字, 码长, 值) 构建拍平码表
    pub(crate) fn make(
        &self,
        code_words: &[u32],
        code_lens: &[u8],
        values: &[u32],
    ) -> LingResult<Codebook> {
        if code_words.len() != code_lens.len() || code_words.len() != values.len() {
            return Err(LingError::InvalidArgument(
                "codebook 构建数组长度不一致".into(),
            ));
        }

        let mut items = Vec::with_capacity(code_words.len());
        for ((&word, &len), &value) in code_words.iter().zip(code_lens).zip(values) {
            if len == 0 {
                if self.is_sparse {
                    continue;
                }
                return Err(LingError::InvalidData(
                    "非稀疏 codebook 含零码长条目".into(),
                ));
            }
            if u32::from(len) > Codebook::MAX_CODE_BITS {
                return Err(LingError::InvalidData("codebook 码长超过 32 位".into()));
            }
            let len = u32::from(len);
            let key = match self.bit_order {
                BitOrder::Verbatim => word,
                BitOrder::Reverse => word.reverse_bits() >> (32 - len),
            };
            items.push(BuildItem { key, len, value });
        }

        // 哨兵占位, 根块构建完成后回填
        let mut table = vec![CodebookEntry::EMPTY];

        if items.is_empty() {
            // 全空码表: 任何解码尝试都会命中空槽
            table[0] = CodebookEntry::new_jump(1, 1);
            table.push(CodebookEntry::EMPTY);
            table.push(CodebookEntry::EMPTY);
            return Ok(Codebook { table });
        }

        if items.len() == 1 {
            // 单条目码表: 整块映射到唯一值, 消费其声明码长
            let item = items[0];
            let width = item.len.min(self.max_bits_per_block);
            table[0] = CodebookEntry::new_jump(1, width);
            for _ in 0..(1usize << width) {
                table.push(CodebookEntry::new_value(item.value, item.len));
            }
            return Ok(Codebook { table });
        }

        let (root_offset, root_width) = self.build_block(&mut table, &items, 0)?;
        table[0] = CodebookEntry::new_jump(root_offset, root_width);

        if !self.is_sparse {
            // 完整性: 规范长度必须铺满整棵树
            if table.iter().skip(1).any(|e| *e == CodebookEntry::EMPTY) {
                return Err(LingError::InvalidData("codebook 长度表欠指定".into()));
            }
        }

        Ok(Codebook { table })
    }

    /// 递归构建一个前缀块, 返回 (块偏移, 块宽)
    fn build_block(
        &self,
        table: &mut Vec<CodebookEntry>,
        items: &[BuildItem],
        consumed: u32,
    ) -> LingResult<(u32, u32)> {
        let max_rem = items
            .iter()
            .map(|i| i.len - consumed)
            .max()
            .unwrap_or(1)
            .max(1);
        let width = max_rem.min(self.max_bits_per_block);
        let block_size = 1usize << width;

        let offset = table.len();
        if offset + block_size > 0x7FFF_FFFF {
            return Err(LingError::InvalidData("codebook 跳转表溢出".into()));
        }
        table.resize(offset + block_size, CodebookEntry::EMPTY);

        // 叶子: 剩余码长不超过块宽, 在高位 don't-care 上复制
        let mut pending: BTreeMap<u32, Vec<BuildItem>> = BTreeMap::new();
        for item in items {
            let rem = item.len - consumed;
            let chunk = (item.key >> consumed) & low_mask(width);
            if rem <= width {
                let low = chunk & low_mask(rem);
                let copies = 1u32 << (width - rem);
                for hi in 0..copies {
                    let slot = offset + ((hi << rem) | low) as usize;
                    if table[slot] != CodebookEntry::EMPTY {
                        return Err(LingError::InvalidData("codebook 长度表过度指定".into()));
                    }
                    table[slot] = CodebookEntry::new_value(item.value, rem);
                }
            } else {
                pending.entry(chunk).or_default().push(*item);
            }
        }

        // 子块: 按本块前缀分组递归
        for (chunk, group) in pending {
            let slot = offset + chunk as usize;
            if table[slot] != CodebookEntry::EMPTY {
                return Err(LingError::InvalidData("codebook 长度表过度指定".into()));
            }
            let (child_offset, child_width) = self.build_block(table, &group, consumed + width)?;
            table[slot] = CodebookEntry::new_jump(child_offset, child_width);
        }

        Ok((offset as u32, width))
    }
}

/// 低 N 位掩码 (u32)
#[inline]
fn low_mask(n: u32) -> u32 {
    if n >= 32 { u32::MAX } else { (1u32 << n) - 1 }
}

/// 按 Vorbis 首次适配规则从码长表分配规范码字
///
/// 码字按条目顺序分配: 每个条目取其码长上编号最小的可用码.
/// 过度指定 (树容量耗尽) 返回数据错误; 欠指定由调用方根据
/// 稀疏/单条目情况判定.
pub(crate) fn assign_codewords(code_lens: &[u8]) -> LingResult<(Vec<u32>, bool)> {
    let mut codes = vec![0u32; code_lens.len()];
    let mut available = [0u32; 33];
    let mut seen_first = false;

    for (i, &len) in code_lens.iter().enumerate() {
        if len == 0 {
            continue;
        }
        let len = u32::from(len);
        if !seen_first {
            // 首个条目取全零码, 沿路径登记各深度的兄弟分支
            codes[i] = 0;
            for depth in 1..=len {
                available[depth as usize] = 1u32 << (32 - depth);
            }
            seen_first = true;
            continue;
        }

        let mut z = len;
        while z > 0 && available[z as usize] == 0 {
            z -= 1;
        }
        if z == 0 {
            return Err(LingError::InvalidData("codebook 长度表过度指定".into()));
        }
        let res = available[z as usize];
        available[z as usize] = 0;
        codes[i] = res >> (32 - len);
        for depth in (z + 1)..=len {
            available[depth as usize] = res + (1u32 << (32 - depth));
        }
    }

    let complete = available[1..=32].iter().all(|&v| v == 0);
    Ok((codes, complete))
}

/// Vorbis 的 lookup1_values: 满足 r^dim ≤ entries 的最大 r
pub(crate) fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
    if entries == 0 || dimensions == 0 {
        return 0;
    }
    let mut lo = 1u32;
    let mut hi = entries.max(1);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if pow_le(mid, dimensions, entries) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn pow_le(base: u32, exp: u32, limit: u32) -> bool {
    let mut out = 1u128;
    let limit = limit as u128;
    for _ in 0..exp {
        out *= base as u128;
        if out > limit {
            return false;
        }
    }
    true
}

/// Vorbis float32_unpack: 解包 VQ 表的浮点参数
fn float32_unpack(x: u32) -> f32 {
    let mantissa = f64::from(x & 0x1F_FFFF);
    let exponent = i32::try_from((x & 0x7FE0_0000) >> 21).unwrap_or(0);
    let signed = if x & 0x8000_0000 != 0 {
        -mantissa
    } else {
        mantissa
    };
    (signed * f64::from(exponent - 788).exp2()) as f32
}

/// 解析完成的 Vorbis codebook
#[derive(Debug, Clone)]
pub(crate) struct VorbisCodebook {
    /// 每个码字覆盖的标量维数
    pub(crate) dimensions: u16,
    /// 条目数
    pub(crate) entries: u32,
    /// Huffman 码表, 值为条目索引
    pub(crate) codebook: Codebook,
    /// 预展开的 VQ 查找表 (entries × dimensions), lookup_type 0 时为空
    pub(crate) vq: Option<Vec<f32>>,
}

impl VorbisCodebook {
    /// 从 setup 位流读取一个 codebook
    pub(crate) fn read(br: &mut BitReader<'_>) -> LingResult<Self> {
        let sync = br.read_bits_leq32(24)?;
        if sync != 0x564342 {
            return Err(LingError::InvalidData(format!(
                "Vorbis codebook 同步字错误: 0x{sync:06X}",
            )));
        }

        let dimensions = br.read_bits_leq32(16)? as u16;
        let entries = br.read_bits_leq32(24)?;
        let ordered = br.read_bool()?;

        let mut code_lens = vec![0u8; entries as usize];
        let mut is_sparse = false;

        if ordered {
            let mut cur_entry = 0u32;
            let mut cur_len = br.read_bits_leq32(5)? + 1;
            while cur_entry < entries {
                let left = entries - cur_entry;
                let number = br.read_bits_leq32(ilog(left))?;
                if number == 0 || number > left {
                    return Err(LingError::InvalidData(
                        "Vorbis codebook ordered 长度组无效".into(),
                    ));
                }
                if cur_len > 32 {
                    return Err(LingError::InvalidData(
                        "Vorbis codebook ordered 码长超过 32".into(),
                    ));
                }
                for len in &mut code_lens[cur_entry as usize..(cur_entry + number) as usize] {
                    *len = cur_len as u8;
                }
                cur_entry += number;
                cur_len += 1;
            }
        } else {
            is_sparse = br.read_bool()?;
            for len in &mut code_lens {
                let used = if is_sparse { br.read_bool()? } else { true };
                if used {
                    *len = (br.read_bits_leq32(5)? + 1) as u8;
                }
            }
        }

        let used_count = code_lens.iter().filter(|&&l| l > 0).count();
        let (code_words, complete) = assign_codewords(&code_lens)?;
        if !complete && !is_sparse && used_count > 1 {
            return Err(LingError::InvalidData(
                "Vorbis codebook 长度表欠指定".into(),
            ));
        }

        let vq = Self::read_vq(br, dimensions, entries)?;

        let values: Vec<u32> = (0..entries).collect();
        let mut builder = if is_sparse {
            CodebookBuilder::new_sparse(BitOrder::Reverse)
        } else {
            CodebookBuilder::new(BitOrder::Reverse)
        };
        builder.bits_per_block(8);
        let codebook = builder.make(&code_words, &code_lens, &values)?;

        Ok(Self {
            dimensions,
            entries,
            codebook,
            vq,
        })
    }

    /// 读取并展开 VQ 查找表
    fn read_vq(br: &mut BitReader<'_>, dimensions: u16, entries: u32) -> LingResult<Option<Vec<f32>>> {
        let lookup_type = br.read_bits_leq32(4)?;
        match lookup_type {
            0 => Ok(None),
            1 | 2 => {
                let min_value = float32_unpack(br.read_bits_leq32(32)?);
                let delta_value = float32_unpack(br.read_bits_leq32(32)?);
                let value_bits = br.read_bits_leq32(4)? + 1;
                let sequence_p = br.read_bool()?;

                let dims = u32::from(dimensions);
                let lookup_values = if lookup_type == 1 {
                    lookup1_values(entries, dims)
                } else {
                    entries.checked_mul(dims).ok_or_else(|| {
                        LingError::InvalidData("Vorbis codebook VQ 表尺寸溢出".into())
                    })?
                };

                let mut multiplicands = Vec::with_capacity(lookup_values as usize);
                for _ in 0..lookup_values {
                    multiplicands.push(br.read_bits_leq32(value_bits)?);
                }

                // 展开为 entries × dimensions 的密集表
                let total = (entries as usize)
                    .checked_mul(dims as usize)
                    .ok_or_else(|| LingError::InvalidData("Vorbis codebook VQ 表尺寸溢出".into()))?;
                let mut vq = vec![0.0f32; total];
                for entry in 0..entries as usize {
                    let mut last = 0.0f32;
                    let mut index_divisor = 1usize;
                    for j in 0..dims as usize {
                        let m_idx = if lookup_type == 1 {
                            (entry / index_divisor) % lookup_values as usize
                        } else {
                            entry * dims as usize + j
                        };
                        let m = multiplicands[m_idx] as f32;
                        let v = m * delta_value + min_value + last;
                        if sequence_p {
                            last = v;
                        }
                        vq[entry * dims as usize + j] = v;
                        if lookup_type == 1 {
                            index_divisor = index_divisor
                                .checked_mul(lookup_values as usize)
                                .ok_or_else(|| {
                                    LingError::InvalidData("Vorbis codebook 索引溢出".into())
                                })?;
                        }
                    }
                }
                Ok(Some(vq))
            }
            _ => Err(LingError::InvalidData(format!(
                "Vorbis codebook lookup_type 非法: {lookup_type}",
            ))),
        }
    }

    /// 取条目对应的 VQ 向量
    pub(crate) fn vq_vector(&self, entry: u32) -> LingResult<&[f32]> {
        let dims = usize::from(self.dimensions);
        let vq = self
            .vq
            .as_deref()
            .ok_or_else(|| LingError::InvalidData("Vorbis codebook 缺少 VQ 查找表".into()))?;
        let start = entry as usize * dims;
        vq.get(start..start + dims)
            .ok_or_else(|| LingError::InvalidData("Vorbis codebook VQ 条目越界".into()))
    }
}

//! Vorbis 位流读取器.
//!
//! 按小端位序读取 (LSb first): 每个字节的 bit 0 是最先读出的位.
//! 使用 64 位滚动缓存, 每次按 1-8 字节从底层缓冲区补充;
//! 缓冲区尾部不足 8 字节时允许部分补充, 使跨越末尾字节的
//! Huffman 码字仍可解出.

use ling_core::{LingError, LingResult};

use super::codebook::Codebook;

/// LSb-first 位流读取器
pub(crate) struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 下一个待装载的字节索引
    byte_pos: usize,
    /// 位缓存 (低位在前)
    cache: u64,
    /// 缓存中的有效位数
    cache_bits: u32,
}

impl<'a> BitReader<'a> {
    /// 创建新的位流读取器
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            cache: 0,
            cache_bits: 0,
        }
    }

    /// 获取已消费的总位数
    pub(crate) fn bits_read(&self) -> usize {
        self.byte_pos * 8 - self.cache_bits as usize
    }

    /// 从底层缓冲区补充缓存 (1-8 字节, 允许部分补充)
    fn refill(&mut self) {
        while self.cache_bits <= 56 && self.byte_pos < self.data.len() {
            self.cache |= u64::from(self.data[self.byte_pos]) << self.cache_bits;
            self.cache_bits += 8;
            self.byte_pos += 1;
        }
    }

    /// 读取 1 个位
    pub(crate) fn read_bool(&mut self) -> LingResult<bool> {
        Ok(self.read_bits_leq32(1)? != 0)
    }

    /// 读取 N 个位 (0 ≤ N ≤ 32), 低位在前
    pub(crate) fn read_bits_leq32(&mut self, n: u32) -> LingResult<u32> {
        debug_assert!(n <= 32, "read_bits_leq32: n={} 超过 32 位", n);
        if n == 0 {
            return Ok(0);
        }
        if self.cache_bits < n {
            self.refill();
            if self.cache_bits < n {
                return Err(LingError::Eof);
            }
        }
        let out = (self.cache & mask_lo(n)) as u32;
        self.cache >>= n;
        self.cache_bits -= n;
        Ok(out)
    }

    /// 跳过 N 个位, 不返回值
    pub(crate) fn ignore_bits(&mut self, mut n: u32) -> LingResult<()> {
        while n > 0 {
            let step = n.min(32);
            self.read_bits_leq32(step)?;
            n -= step;
        }
        Ok(())
    }

    /// 用指定 codebook 解码一个 Huffman 码字
    ///
    /// 返回 (码字对应的条目值, 消费的位数). 码流在码字中途耗尽时
    /// 返回 `Eof`.
    pub(crate) fn read_codebook(&mut self, codebook: &Codebook) -> LingResult<(u32, u32)> {
        // 解码前部分补充, 保证跨越末尾 8 字节的码字可解
        if self.cache_bits < Codebook::MAX_CODE_BITS {
            self.refill();
        }

        let mut consumed = 0u32;
        let (mut offset, mut width) = codebook.initial_block();
        loop {
            let peek = (self.cache & mask_lo(width)) as u32;
            let entry = codebook.entry(offset + peek as usize);
            if entry.is_value() {
                let value_len = entry.value_len();
                if value_len == 0 {
                    // 空槽: 位流不足以区分截断码字时按 EOF 处理,
                    // 否则是稀疏码表中未分配的位型
                    if self.cache_bits < width {
                        return Err(LingError::Eof);
                    }
                    return Err(LingError::InvalidData(
                        "Vorbis codebook 命中未分配码字".into(),
                    ));
                }
                if self.cache_bits < value_len {
                    return Err(LingError::Eof);
                }
                self.cache >>= value_len;
                self.cache_bits -= value_len;
                consumed += value_len;
                return Ok((entry.value(), consumed));
            }
            // 跳转条目: 消费本块宽度, 进入下一块
            if self.cache_bits < width {
                return Err(LingError::Eof);
            }
            self.cache >>= width;
            self.cache_bits -= width;
            consumed += width;
            offset = entry.jump_offset();
            width = entry.jump_len();
            if self.cache_bits < width {
                self.refill();
            }
        }
    }
}

/// 低 N 位掩码
#[inline]
fn mask_lo(n: u32) -> u64 {
    if n >= 64 { u64::MAX } else { (1u64 << n) - 1 }
}

/// 计算表示 [0, v] 范围所需的位数 (Vorbis 的 ilog 定义)
pub(crate) fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_位序() {
        let data = [0b1011_0010];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_leq32(1).unwrap(), 0);
        assert_eq!(br.read_bits_leq32(3).unwrap(), 0b001);
        assert_eq!(br.read_bits_leq32(4).unwrap(), 0b1011);
    }

    #[test]
    fn test_read_bits_跨字节() {
        let data = [0xCD, 0xAB, 0x34, 0x12];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_leq32(16).unwrap(), 0xABCD);
        assert_eq!(br.read_bits_leq32(16).unwrap(), 0x1234);
    }

    #[test]
    fn test_read_bits_32位读取() {
        let data = [0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_leq32(32).unwrap(), 0x12345678);
        assert_eq!(br.read_bits_leq32(8).unwrap(), 0xFF);
    }

    #[test]
    fn test_ignore_与read等价() {
        // ignore_bits(k) + read_bits(n) 的流位置应与 read_bits(k+n) 一致
        let data = [0x5A, 0xC3, 0x96, 0x0F];
        let mut a = BitReader::new(&data);
        let mut b = BitReader::new(&data);
        a.ignore_bits(5).unwrap();
        a.read_bits_leq32(7).unwrap();
        b.read_bits_leq32(12).unwrap();
        assert_eq!(a.bits_read(), b.bits_read());
        assert_eq!(
            a.read_bits_leq32(8).unwrap(),
            b.read_bits_leq32(8).unwrap()
        );
    }

    #[test]
    fn test_eof() {
        let data = [0xFF];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_leq32(8).unwrap(), 0xFF);
        assert!(matches!(br.read_bits_leq32(1), Err(LingError::Eof)));
    }

    #[test]
    fn test_ilog() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(2), 2);
        assert_eq!(ilog(3), 2);
        assert_eq!(ilog(4), 3);
        assert_eq!(ilog(7), 3);
    }
}

//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力.
//!
//! 按小端位序写入 (LSb first): 每个字节的 bit 0 是最先写入的位,
//! 与 Vorbis 码流的位序一致, 主要用于构造测试码流.

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用小端位序 (LSb first).
///
/// # 示例
/// ```
/// use ling_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b0001, 4);
/// bw.write_bits(0b1011, 4);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b1011_0001]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current_byte |= 1 << self.bit_count;
        }
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 低位在前 (与 Vorbis 读取顺序一致).
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in 0..n {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    /// 在字节边界写入原始字节
    ///
    /// 仅在对齐时可用 (调试断言).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bit_count, 0, "write_bytes 需要字节对齐");
        self.data.extend_from_slice(bytes);
    }

    /// 结束写入, 返回字节缓冲区
    ///
    /// 不完整的末尾字节以 0 填充高位.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.data.push(self.current_byte);
        }
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

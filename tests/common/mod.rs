//! 管线测试的 Ogg/Vorbis 码流合成工具.
//!
//! 用核心 bit writer 按位构造合法的 Vorbis 头包与静音音频包,
//! 再包装为带正确 CRC 的 Ogg 页面, 得到可完整解码的内存流.
#![allow(dead_code)]

use ling::core::bitwriter::BitWriter;
use ling::core::crc::crc32_ogg;

/// 测试流参数: 双声道 44.1kHz, blocksize 128/512
pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u8 = 2;
pub const BS0_EXP: u8 = 7;
pub const BS1_EXP: u8 = 9;

/// 短块/长块产生的采样数 (与前块等大时)
pub const SHORT_FRAMES: u64 = (1 << BS0_EXP) / 2;

/// 构造 identification 头包
pub fn ident_packet() -> Vec<u8> {
    let mut v = Vec::new();
    v.push(0x01);
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(CHANNELS);
    v.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&128_000i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.push((BS1_EXP << 4) | BS0_EXP);
    v.push(1);
    v
}

/// 构造 comment 头包 (带一个 TITLE 标签)
pub fn comment_packet() -> Vec<u8> {
    let mut v = Vec::new();
    v.push(0x03);
    v.extend_from_slice(b"vorbis");
    let vendor = b"ling pipeline test";
    v.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    v.extend_from_slice(vendor);
    v.extend_from_slice(&1u32.to_le_bytes());
    let tag = b"TITLE=silence";
    v.extend_from_slice(&(tag.len() as u32).to_le_bytes());
    v.extend_from_slice(tag);
    v.push(1);
    v
}

/// 构造最小但完整的 setup 头包
///
/// - 1 个 codebook: 1 维 2 条目, 码长 [1,1], 无 VQ (仅作 classbook)
/// - 1 个 floor1: 无分区, multiplier=2, range_bits=7
/// - 1 个 residue (type 1): cascade 全零, 不引用第二级码本
/// - 1 个 mapping (单 submap, 无耦合), 2 个 mode (短块/长块)
pub fn setup_packet() -> Vec<u8> {
    let mut bw = BitWriter::new();

    // codebooks
    bw.write_bits(0, 8); // count - 1
    bw.write_bits(0x564342, 24); // 同步字
    bw.write_bits(1, 16); // dimensions
    bw.write_bits(2, 24); // entries
    bw.write_bit(false); // ordered
    bw.write_bit(false); // sparse
    bw.write_bits(0, 5); // length-1 of entry 0
    bw.write_bits(0, 5); // length-1 of entry 1
    bw.write_bits(0, 4); // lookup_type 0

    // time domain transforms
    bw.write_bits(0, 6); // count - 1
    bw.write_bits(0, 16);

    // floors
    bw.write_bits(0, 6); // count - 1
    bw.write_bits(1, 16); // floor_type 1
    bw.write_bits(0, 5); // partitions = 0
    bw.write_bits(1, 2); // multiplier - 1 → 2
    bw.write_bits(7, 4); // range_bits

    // residues
    bw.write_bits(0, 6); // count - 1
    bw.write_bits(1, 16); // residue_type 1
    bw.write_bits(0, 24); // begin
    bw.write_bits(64, 24); // end
    bw.write_bits(15, 24); // partition_size - 1
    bw.write_bits(0, 6); // classifications - 1
    bw.write_bits(0, 8); // classbook
    bw.write_bits(0, 3); // cascade low
    bw.write_bit(false); // cascade high flag

    // mappings
    bw.write_bits(0, 6); // count - 1
    bw.write_bits(0, 16); // mapping_type 0
    bw.write_bit(false); // 单 submap
    bw.write_bit(false); // 无耦合
    bw.write_bits(0, 2); // reserved
    bw.write_bits(0, 8); // time submap (废弃)
    bw.write_bits(0, 8); // floor
    bw.write_bits(0, 8); // residue

    // modes
    bw.write_bits(1, 6); // count - 1 → 2 个
    bw.write_bit(false); // mode 0: 短块
    bw.write_bits(0, 16);
    bw.write_bits(0, 16);
    bw.write_bits(0, 8);
    bw.write_bit(true); // mode 1: 长块
    bw.write_bits(0, 16);
    bw.write_bits(0, 16);
    bw.write_bits(0, 8);

    bw.write_bit(true); // framing

    let mut v = Vec::new();
    v.push(0x05);
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&bw.finish());
    v
}

/// 构造一个静音音频包 (所有声道 floor 不使用)
pub fn silence_packet(long_block: bool) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bit(false); // 音频包
    bw.write_bit(long_block); // mode (1 位)
    if long_block {
        bw.write_bits(0, 2); // 窗标志位
    }
    for _ in 0..CHANNELS {
        bw.write_bit(false); // floor 不使用
    }
    bw.finish()
}

/// 包装一个 Ogg 页面 (lacing 自动切分, CRC 正确)
pub fn build_page(
    flags: u8,
    absgp: u64,
    serial: u32,
    sequence: u32,
    packets: &[&[u8]],
) -> Vec<u8> {
    let mut segments = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        let mut remaining = packet.len();
        loop {
            if remaining >= 255 {
                segments.push(255u8);
                remaining -= 255;
            } else {
                segments.push(remaining as u8);
                break;
            }
        }
        body.extend_from_slice(packet);
    }

    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(flags);
    page.extend_from_slice(&absgp.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    let crc_offset = page.len();
    page.extend_from_slice(&0u32.to_le_bytes());
    page.push(segments.len() as u8);
    page.extend_from_slice(&segments);
    page.extend_from_slice(&body);

    let crc = crc32_ogg(&page);
    page[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
    page
}

/// 流合成描述: 每页的音频包数
pub struct StreamSpec {
    pub serial: u32,
    /// 每个音频包是否为长块
    pub blocks: Vec<bool>,
    /// 每页装多少个音频包
    pub packets_per_page: usize,
    /// 首个音频页 granule 的额外扣减 (模拟编码器前导延迟)
    pub start_delay: u64,
    /// 每个音频包末尾的填充字节数 (撑大文件以触发二分 seek)
    pub packet_padding: usize,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            serial: 0x0517,
            blocks: vec![false; 12],
            packets_per_page: 4,
            start_delay: 0,
            packet_padding: 0,
        }
    }
}

/// 按 Vorbis 规则计算每个音频包的时长 (首包为 0)
pub fn packet_durations(blocks: &[bool]) -> Vec<u64> {
    let mut durs = Vec::with_capacity(blocks.len());
    let mut prev: Option<u8> = None;
    for &long in blocks {
        let exp = if long { BS1_EXP } else { BS0_EXP };
        let dur = match prev {
            Some(p) => (1u64 << p) / 4 + (1u64 << exp) / 4,
            None => 0,
        };
        durs.push(dur);
        prev = Some(exp);
    }
    durs
}

/// 合成完整的 Ogg/Vorbis 内存流, 返回 (字节流, 总呈现帧数)
pub fn build_stream(spec: &StreamSpec) -> (Vec<u8>, u64) {
    let mut data = Vec::new();
    let mut sequence = 0u32;

    // BOS: identification
    let ident = ident_packet();
    data.extend_from_slice(&build_page(0x02, 0, spec.serial, sequence, &[&ident]));
    sequence += 1;

    // comment + setup
    let comment = comment_packet();
    let setup = setup_packet();
    data.extend_from_slice(&build_page(
        0,
        0,
        spec.serial,
        sequence,
        &[&comment, &setup],
    ));
    sequence += 1;

    // 音频页 (包尾填充零字节不影响解码, 解码器只消费所需的位)
    let durs = packet_durations(&spec.blocks);
    let packets: Vec<Vec<u8>> = spec
        .blocks
        .iter()
        .map(|&b| {
            let mut p = silence_packet(b);
            p.resize(p.len() + spec.packet_padding, 0);
            p
        })
        .collect();
    let total: u64 = durs.iter().sum::<u64>() - spec.start_delay;

    let mut cum = 0u64;
    let mut i = 0usize;
    while i < packets.len() {
        let end = (i + spec.packets_per_page).min(packets.len());
        let page_packets: Vec<&[u8]> = packets[i..end].iter().map(|p| p.as_slice()).collect();
        cum += durs[i..end].iter().sum::<u64>();
        let granule = cum.saturating_sub(spec.start_delay);
        let flags = if end == packets.len() { 0x04 } else { 0 };
        data.extend_from_slice(&build_page(
            flags,
            granule,
            spec.serial,
            sequence,
            &page_packets,
        ));
        sequence += 1;
        i = end;
    }

    (data, total)
}

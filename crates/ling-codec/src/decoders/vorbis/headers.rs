//! Vorbis 头包解析: identification 与 comment.
//!
//! identification 头为固定 30 字节布局, comment 头为长度前缀的
//! UTF-8 字符串表. setup 头的解析在 `setup` 模块.

use ling_core::{ChannelLayout, LingError, LingResult};

/// identification 头解析结果
#[derive(Debug, Clone)]
pub(crate) struct IdentHeader {
    /// 声道数 (1-255, >8 时声道顺序不做映射)
    pub(crate) channels: u8,
    /// 采样率 (Hz)
    pub(crate) sample_rate: u32,
    /// 短块指数 (blocksize0 = 1 << bs0_exp)
    pub(crate) bs0_exp: u8,
    /// 长块指数 (blocksize1 = 1 << bs1_exp)
    pub(crate) bs1_exp: u8,
}

impl IdentHeader {
    /// 短块大小
    pub(crate) fn blocksize0(&self) -> usize {
        1usize << self.bs0_exp
    }

    /// 长块大小
    pub(crate) fn blocksize1(&self) -> usize {
        1usize << self.bs1_exp
    }
}

/// 块指数的合法范围 (Vorbis I: 64 至 8192 点)
const BS_EXP_MIN: u8 = 6;
const BS_EXP_MAX: u8 = 13;

/// 解析 30 字节的 identification 头包
pub(crate) fn parse_ident_header(packet: &[u8]) -> LingResult<IdentHeader> {
    if packet.len() < 30 {
        return Err(LingError::InvalidData(format!(
            "Vorbis identification 头包长度不足: {}",
            packet.len(),
        )));
    }
    if packet[0] != 0x01 || &packet[1..7] != b"vorbis" {
        return Err(LingError::InvalidData(
            "Vorbis identification 头包标识无效".into(),
        ));
    }

    let version = u32::from_le_bytes([packet[7], packet[8], packet[9], packet[10]]);
    if version != 0 {
        return Err(LingError::InvalidData(format!(
            "Vorbis 版本不支持: {version}",
        )));
    }

    let channels = packet[11];
    if channels == 0 {
        return Err(LingError::InvalidData("Vorbis 声道数不能为 0".into()));
    }

    let sample_rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
    if sample_rate == 0 {
        return Err(LingError::InvalidData("Vorbis 采样率不能为 0".into()));
    }

    // 16..28 为三个码率字段, 解码不使用
    let bs = packet[28];
    let bs0_exp = bs & 0x0F;
    let bs1_exp = bs >> 4;
    if bs0_exp < BS_EXP_MIN || bs1_exp > BS_EXP_MAX || bs0_exp > bs1_exp {
        return Err(LingError::InvalidData(format!(
            "Vorbis blocksize 非法: bs0_exp={bs0_exp}, bs1_exp={bs1_exp}",
        )));
    }

    if packet[29] & 0x01 == 0 {
        return Err(LingError::InvalidData(
            "Vorbis identification 头包 framing_flag 非法".into(),
        ));
    }

    Ok(IdentHeader {
        channels,
        sample_rate,
        bs0_exp,
        bs1_exp,
    })
}

/// comment 头解析结果
#[derive(Debug, Clone, Default)]
pub(crate) struct CommentHeader {
    /// 编码器厂商字符串
    pub(crate) vendor: String,
    /// KEY=VALUE 形式的标签对
    pub(crate) comments: Vec<(String, String)>,
}

/// 解析 comment 头包 (packet type 0x03)
pub(crate) fn parse_comment_header(packet: &[u8]) -> LingResult<CommentHeader> {
    if packet.len() < 7 || packet[0] != 0x03 || &packet[1..7] != b"vorbis" {
        return Err(LingError::InvalidData("Vorbis comment 头包标识无效".into()));
    }

    let mut pos = 7usize;
    let vendor_len = read_le_u32(packet, &mut pos)? as usize;
    let vendor_bytes = slice_at(packet, pos, vendor_len, "Vorbis vendor 字段")?;
    let vendor = String::from_utf8_lossy(vendor_bytes).into_owned();
    pos += vendor_len;

    let comment_count = read_le_u32(packet, &mut pos)? as usize;
    let mut comments = Vec::new();
    for _ in 0..comment_count {
        let comment_len = read_le_u32(packet, &mut pos)? as usize;
        let bytes = slice_at(packet, pos, comment_len, "Vorbis comment 项")?;
        pos += comment_len;

        let text = String::from_utf8_lossy(bytes);
        match text.split_once('=') {
            Some((key, value)) => comments.push((key.to_string(), value.to_string())),
            None => comments.push((text.into_owned(), String::new())),
        }
    }

    // Ogg 封装下 comment 头末尾的 framing 位可能缺失, 存在时必须为 1
    if let Some(&flag) = packet.get(pos)
        && flag & 0x01 == 0
    {
        return Err(LingError::InvalidData(
            "Vorbis comment 头包 framing_flag 非法".into(),
        ));
    }

    Ok(CommentHeader { vendor, comments })
}

fn slice_at<'a>(data: &'a [u8], pos: usize, need: usize, what: &str) -> LingResult<&'a [u8]> {
    data.get(pos..pos.saturating_add(need)).ok_or_else(|| {
        LingError::InvalidData(format!(
            "{} 读取越界: pos={}, need={}, len={}",
            what,
            pos,
            need,
            data.len(),
        ))
    })
}

fn read_le_u32(data: &[u8], pos: &mut usize) -> LingResult<u32> {
    let bytes = slice_at(data, *pos, 4, "Vorbis u32")?;
    let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    *pos += 4;
    Ok(v)
}

/// 将声道数映射为布局 (Vorbis 最多映射 8 声道)
pub(crate) fn channel_layout_for(channels: u8) -> ChannelLayout {
    ChannelLayout::from_channels(u32::from(channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_ident_header(channels: u8, sample_rate: u32, bs: u8) -> Vec<u8> {
        let mut v = Vec::new();
        v.push(0x01);
        v.extend_from_slice(b"vorbis");
        v.extend_from_slice(&0u32.to_le_bytes());
        v.push(channels);
        v.extend_from_slice(&sample_rate.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.extend_from_slice(&128000i32.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.push(bs);
        v.push(1);
        v
    }

    #[test]
    fn test_ident_规范示例() {
        // 30 字节: 双声道 44.1kHz, bs0=2^8, bs1=2^11
        let header = build_ident_header(2, 44100, 0xB8);
        let ident = parse_ident_header(&header).unwrap();
        assert_eq!(ident.channels, 2);
        assert_eq!(ident.sample_rate, 44100);
        assert_eq!(ident.bs0_exp, 8);
        assert_eq!(ident.bs1_exp, 11);
        assert_eq!(ident.blocksize0(), 256);
        assert_eq!(ident.blocksize1(), 2048);
    }

    #[test]
    fn test_ident_blocksize_校验() {
        // bs0 > bs1 非法
        assert!(parse_ident_header(&build_ident_header(2, 44100, 0x8B)).is_err());
        // bs0 < 6 非法
        assert!(parse_ident_header(&build_ident_header(2, 44100, 0x85)).is_err());
        // bs1 > 13 非法
        assert!(parse_ident_header(&build_ident_header(2, 44100, 0xE8)).is_err());
    }

    #[test]
    fn test_ident_framing_校验() {
        let mut header = build_ident_header(2, 44100, 0xB8);
        header[29] = 0;
        assert!(parse_ident_header(&header).is_err());
    }

    #[test]
    fn test_comment_解析() {
        let mut v = Vec::new();
        v.push(0x03);
        v.extend_from_slice(b"vorbis");
        let vendor = b"ling test vendor";
        v.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        v.extend_from_slice(vendor);
        v.extend_from_slice(&2u32.to_le_bytes());
        for c in [&b"TITLE=test tone"[..], &b"ARTIST=ling"[..]] {
            v.extend_from_slice(&(c.len() as u32).to_le_bytes());
            v.extend_from_slice(c);
        }
        v.push(1);

        let comment = parse_comment_header(&v).unwrap();
        assert_eq!(comment.vendor, "ling test vendor");
        assert_eq!(comment.comments.len(), 2);
        assert_eq!(comment.comments[0], ("TITLE".into(), "test tone".into()));
        assert_eq!(comment.comments[1], ("ARTIST".into(), "ling".into()));
    }
}

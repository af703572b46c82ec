//! Vorbis setup 头解码.
//!
//! 一次性解出全部不可变表: codebook、floor、residue、mapping、mode.
//! 解出的 `Setup` 在解码器生命周期内共享, 不再修改.

use ling_core::{LingError, LingResult};

use super::bitreader::{BitReader, ilog};
use super::codebook::VorbisCodebook;
use super::floor::Floor;
use super::headers::IdentHeader;
use super::residue::{CouplingStep, Residue};

/// 一个 submap 引用的 floor 与 residue
#[derive(Debug, Clone, Copy)]
pub(crate) struct Submap {
    /// floor 配置索引
    pub(crate) floor: u8,
    /// residue 配置索引
    pub(crate) residue: u8,
}

/// mapping 配置 (type 0)
#[derive(Debug, Clone)]
pub(crate) struct Mapping {
    /// 声道耦合步骤
    pub(crate) couplings: Vec<CouplingStep>,
    /// 每声道所属的 submap
    pub(crate) multiplex: Vec<u8>,
    /// submap 表
    pub(crate) submaps: Vec<Submap>,
}

/// mode 配置
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mode {
    /// 块标志: false → 短块, true → 长块
    pub(crate) block_flag: bool,
    /// mapping 索引
    pub(crate) mapping: u8,
}

/// setup 头解码产物
#[derive(Debug, Clone)]
pub(crate) struct Setup {
    pub(crate) codebooks: Vec<VorbisCodebook>,
    pub(crate) floors: Vec<Floor>,
    pub(crate) residues: Vec<Residue>,
    pub(crate) mappings: Vec<Mapping>,
    pub(crate) modes: Vec<Mode>,
}

impl Setup {
    /// 解析 setup 头包 (packet type 0x05)
    pub(crate) fn parse(packet: &[u8], ident: &IdentHeader) -> LingResult<Self> {
        if packet.len() < 8 || packet[0] != 0x05 || &packet[1..7] != b"vorbis" {
            return Err(LingError::InvalidData("Vorbis setup 头包标识无效".into()));
        }

        let mut br = BitReader::new(&packet[7..]);

        let codebook_count = (br.read_bits_leq32(8)? + 1) as usize;
        let mut codebooks = Vec::with_capacity(codebook_count);
        for i in 0..codebook_count {
            let cb = VorbisCodebook::read(&mut br).map_err(|e| {
                annotate(e, format!("codebook {i} 解析失败 (bit={})", br.bits_read()))
            })?;
            codebooks.push(cb);
        }

        parse_time_domain_transforms(&mut br)?;

        let floor_count = (br.read_bits_leq32(6)? + 1) as usize;
        let mut floors = Vec::with_capacity(floor_count);
        for i in 0..floor_count {
            let floor = Floor::read(&mut br, codebook_count).map_err(|e| {
                annotate(e, format!("floor {i} 解析失败 (bit={})", br.bits_read()))
            })?;
            floors.push(floor);
        }

        let residue_count = (br.read_bits_leq32(6)? + 1) as usize;
        let mut residues = Vec::with_capacity(residue_count);
        for i in 0..residue_count {
            let residue = Residue::read(&mut br, codebook_count).map_err(|e| {
                annotate(e, format!("residue {i} 解析失败 (bit={})", br.bits_read()))
            })?;
            residues.push(residue);
        }

        let mapping_count = (br.read_bits_leq32(6)? + 1) as usize;
        let mut mappings = Vec::with_capacity(mapping_count);
        for i in 0..mapping_count {
            let mapping = parse_mapping(&mut br, ident.channels, floor_count, residue_count)
                .map_err(|e| {
                    annotate(e, format!("mapping {i} 解析失败 (bit={})", br.bits_read()))
                })?;
            mappings.push(mapping);
        }

        let mode_count = (br.read_bits_leq32(6)? + 1) as usize;
        let mut modes = Vec::with_capacity(mode_count);
        for i in 0..mode_count {
            let mode = parse_mode(&mut br, mapping_count)
                .map_err(|e| annotate(e, format!("mode {i} 解析失败 (bit={})", br.bits_read())))?;
            modes.push(mode);
        }

        if !br.read_bool()? {
            return Err(LingError::InvalidData(
                "Vorbis setup 头包 framing_flag 非法".into(),
            ));
        }

        Ok(Self {
            codebooks,
            floors,
            residues,
            mappings,
            modes,
        })
    }
}

/// 为解析错误附加段级上下文
fn annotate(err: LingError, context: String) -> LingError {
    match err {
        LingError::InvalidData(msg) => {
            LingError::InvalidData(format!("Vorbis setup {context}: {msg}"))
        }
        LingError::Eof => LingError::InvalidData(format!("Vorbis setup {context}: 位流提前耗尽")),
        other => other,
    }
}

/// time domain transforms 必须全为 0
fn parse_time_domain_transforms(br: &mut BitReader<'_>) -> LingResult<()> {
    let count = br.read_bits_leq32(6)? + 1;
    for _ in 0..count {
        if br.read_bits_leq32(16)? != 0 {
            return Err(LingError::InvalidData(
                "Vorbis time domain transform 必须为 0".into(),
            ));
        }
    }
    Ok(())
}

fn parse_mapping(
    br: &mut BitReader<'_>,
    channels: u8,
    floor_count: usize,
    residue_count: usize,
) -> LingResult<Mapping> {
    let mapping_type = br.read_bits_leq32(16)?;
    if mapping_type != 0 {
        return Err(LingError::Unsupported(format!(
            "Vorbis mapping_type 不支持: {mapping_type}",
        )));
    }

    let submap_count = if br.read_bool()? {
        br.read_bits_leq32(4)? + 1
    } else {
        1
    };

    let mut couplings = Vec::new();
    if br.read_bool()? {
        let coupling_steps = br.read_bits_leq32(8)? + 1;
        let ch_bits = ilog(u32::from(channels) - 1);
        for _ in 0..coupling_steps {
            let magnitude = br.read_bits_leq32(ch_bits)?;
            let angle = br.read_bits_leq32(ch_bits)?;
            if magnitude == angle
                || magnitude >= u32::from(channels)
                || angle >= u32::from(channels)
            {
                return Err(LingError::InvalidData("Vorbis coupling 参数非法".into()));
            }
            couplings.push(CouplingStep {
                magnitude: magnitude as u8,
                angle: angle as u8,
            });
        }
    }

    if br.read_bits_leq32(2)? != 0 {
        return Err(LingError::InvalidData(
            "Vorbis mapping reserved bits 必须为 0".into(),
        ));
    }

    let mut multiplex = Vec::with_capacity(usize::from(channels));
    if submap_count > 1 {
        for _ in 0..channels {
            let mux = br.read_bits_leq32(4)?;
            if mux >= submap_count {
                return Err(LingError::InvalidData("Vorbis mapping mux 值越界".into()));
            }
            multiplex.push(mux as u8);
        }
    } else {
        multiplex.resize(usize::from(channels), 0);
    }

    let mut submaps = Vec::with_capacity(submap_count as usize);
    for _ in 0..submap_count {
        // time 子映射配置已废弃, 读出并丢弃
        let _time = br.read_bits_leq32(8)?;
        let floor = br.read_bits_leq32(8)? as usize;
        let residue = br.read_bits_leq32(8)? as usize;
        if floor >= floor_count || residue >= residue_count {
            return Err(LingError::InvalidData(
                "Vorbis mapping floor/residue 索引越界".into(),
            ));
        }
        submaps.push(Submap {
            floor: floor as u8,
            residue: residue as u8,
        });
    }

    Ok(Mapping {
        couplings,
        multiplex,
        submaps,
    })
}

fn parse_mode(br: &mut BitReader<'_>, mapping_count: usize) -> LingResult<Mode> {
    let block_flag = br.read_bool()?;
    let window_type = br.read_bits_leq32(16)?;
    let transform_type = br.read_bits_leq32(16)?;
    if window_type != 0 || transform_type != 0 {
        return Err(LingError::InvalidData(
            "Vorbis mode window/transform 必须为 0".into(),
        ));
    }

    let mapping = br.read_bits_leq32(8)? as usize;
    if mapping >= mapping_count {
        return Err(LingError::InvalidData("Vorbis mode mapping 索引越界".into()));
    }

    Ok(Mode {
        block_flag,
        mapping: mapping as u8,
    })
}

//! Ogg 解封装管线测试.
//!
//! 用合成的 Ogg/Vorbis 内存流验证:
//! - 格式探测与打开 (流信息、元数据、时长)
//! - 头包与音频包的入队顺序与时间戳回推
//! - CRC 损坏页的重同步恢复
//! - 无缝播放的前导延迟裁剪

mod common;

use ling::codec::CodecId;
use ling::format::io::MemoryBackend;
use ling::format::stream::StreamParams;
use ling::format::{FormatOptions, IoContext};

use common::*;

fn open_demuxer(
    data: Vec<u8>,
    options: FormatOptions,
) -> (IoContext, Box<dyn ling::format::Demuxer>) {
    let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
    let registry = ling::default_format_registry();
    let demuxer = registry
        .open_input(&mut io, Some("test.ogg"), options)
        .expect("打开合成流失败");
    (io, demuxer)
}

#[test]
fn test_打开与流信息() {
    let (data, total) = build_stream(&StreamSpec::default());
    let (_io, demuxer) = open_demuxer(data, FormatOptions::default());

    let streams = demuxer.streams();
    assert_eq!(streams.len(), 1);
    let stream = &streams[0];
    assert_eq!(stream.codec_id, CodecId::Vorbis);
    assert_eq!(stream.time_base.den, SAMPLE_RATE as i32);
    assert_eq!(stream.duration, total as i64);
    assert_eq!(stream.nb_frames, total);
    assert!(!stream.extra_data.is_empty(), "extra_data 应为 ident 头包");
    assert_eq!(stream.extra_data[0], 0x01);

    // comment 元数据回填
    assert_eq!(
        stream.metadata,
        vec![("TITLE".to_string(), "silence".to_string())]
    );

    match &stream.params {
        StreamParams::Audio(a) => {
            assert_eq!(a.sample_rate, SAMPLE_RATE);
            assert_eq!(a.channel_layout.channels, u32::from(CHANNELS));
        }
        _ => panic!("期望音频流参数"),
    }

    let sec = demuxer.duration().expect("可寻址输入应有时长");
    assert!((sec - total as f64 / SAMPLE_RATE as f64).abs() < 1e-9);
}

#[test]
fn test_包序与时间戳回推() {
    let spec = StreamSpec::default();
    let (data, _) = build_stream(&spec);
    let durs = packet_durations(&spec.blocks);
    let (mut io, mut demuxer) = open_demuxer(data, FormatOptions::default());

    // 前两个包: comment 与 setup 头包 (不占时间轴)
    let pkt = demuxer.read_packet(&mut io).unwrap();
    assert_eq!(pkt.data[0], 0x03);
    assert_eq!(pkt.duration, 0);
    let pkt = demuxer.read_packet(&mut io).unwrap();
    assert_eq!(pkt.data[0], 0x05);

    // 音频包: pts 为前序时长的累积, duration 符合 (prev+cur)/4
    let mut expected_pts = 0i64;
    for &dur in &durs {
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.duration, dur as i64);
        assert_eq!(pkt.pts, expected_pts, "包 pts 应与累计时长一致");
        expected_pts += dur as i64;
    }

    assert!(matches!(
        demuxer.read_packet(&mut io),
        Err(ling::core::LingError::Eof)
    ));
}

#[test]
fn test_crc损坏页恢复() {
    let spec = StreamSpec {
        blocks: vec![false; 16],
        packets_per_page: 2,
        ..StreamSpec::default()
    };
    let (mut data, _) = build_stream(&spec);

    // 翻转中部一个字节, 破坏某个音频页的 CRC
    let mid = data.len() * 2 / 3;
    data[mid] ^= 0xFF;

    let (mut io, mut demuxer) = open_demuxer(data, FormatOptions::default());

    // 读完整个流: 损坏页被跳过, 不返回硬错误
    let mut audio_packets = 0usize;
    loop {
        match demuxer.read_packet(&mut io) {
            Ok(pkt) => {
                if pkt.data.first().map(|&b| b & 0x01 == 0).unwrap_or(false) {
                    audio_packets += 1;
                }
            }
            Err(ling::core::LingError::Eof) => break,
            Err(e) => panic!("损坏页不应产生硬错误: {e}"),
        }
    }
    // 一页 2 个包, 损坏一页丢 2 个
    assert!(audio_packets >= 12, "损坏单页后仍应读出大部分包");
    assert!(audio_packets < 16, "损坏页的包应被丢弃");
}

#[test]
fn test_无缝裁剪前导延迟() {
    let spec = StreamSpec {
        start_delay: 48,
        blocks: vec![false; 12],
        ..StreamSpec::default()
    };
    let (data, total) = build_stream(&spec);
    let options = FormatOptions {
        enable_gapless: true,
        ..FormatOptions::default()
    };
    let (mut io, mut demuxer) = open_demuxer(data, options);

    let mut trim_total = 0u64;
    let mut last_end = 0i64;
    loop {
        match demuxer.read_packet(&mut io) {
            Ok(pkt) => {
                trim_total += u64::from(pkt.trim_start);
                if pkt.duration > 0 {
                    let end = pkt.pts + pkt.duration
                        - i64::from(pkt.trim_end)
                        - i64::from(pkt.trim_start);
                    assert!(end >= last_end, "裁剪后的结束时间应单调不减");
                    last_end = end;
                }
            }
            Err(ling::core::LingError::Eof) => break,
            Err(e) => panic!("读取失败: {e}"),
        }
    }
    assert_eq!(trim_total, 48, "前导延迟应全部映射为 trim_start");
    assert_eq!(last_end, total as i64);
}

#[test]
fn test_非起始首页被拒绝() {
    let spec = StreamSpec::default();
    let (data, _) = build_stream(&spec);

    // 跳过 BOS 页: 从第二页开始喂
    let ident = ident_packet();
    let bos_len = build_page(0x02, 0, spec.serial, 0, &[&ident]).len();
    let tail = data[bos_len..].to_vec();

    let mut io = IoContext::new(Box::new(MemoryBackend::from_data(tail)));
    let registry = ling::default_format_registry();
    assert!(
        registry
            .open_input(&mut io, Some("test.ogg"), FormatOptions::default())
            .is_err(),
        "首页不是 BOS 时应拒绝打开"
    );
}

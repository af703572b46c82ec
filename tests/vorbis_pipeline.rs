//! Vorbis 解码管线测试.
//!
//! 合成流 → 解封装 → 解码 → PCM, 验证:
//! - 头包链路 (extra_data 的 ident + 流内 comment/setup)
//! - 每包输出帧数 (prev_bs + cur_bs)/4, 首包零输出
//! - 长短块交替的输出连续性
//! - 输出为静音且值在 [-1, 1]

mod common;

use ling::codec::codec_parameters::{AudioCodecParams, CodecParameters};
use ling::codec::{CodecId, Frame, Packet};
use ling::core::{LingError, SampleFormat};
use ling::format::io::MemoryBackend;
use ling::format::stream::StreamParams;
use ling::format::{FormatOptions, IoContext};

use common::*;

/// 解出整条流的全部音频帧
fn decode_stream(data: Vec<u8>, options: FormatOptions) -> Vec<ling::codec::AudioFrame> {
    let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
    let format_registry = ling::default_format_registry();
    let codec_registry = ling::default_codec_registry();

    let mut demuxer = format_registry
        .open_input(&mut io, Some("test.ogg"), options)
        .expect("打开失败");

    let stream = demuxer.streams()[0].clone();
    assert_eq!(stream.codec_id, CodecId::Vorbis);
    let (sample_rate, channel_layout) = match &stream.params {
        StreamParams::Audio(a) => (a.sample_rate, a.channel_layout),
        _ => panic!("期望音频流"),
    };

    let mut decoder = codec_registry.create_decoder(CodecId::Vorbis).unwrap();
    decoder
        .open(&CodecParameters {
            codec_id: CodecId::Vorbis,
            extra_data: stream.extra_data.clone(),
            bit_rate: 0,
            audio: AudioCodecParams {
                sample_rate,
                channel_layout,
                sample_format: SampleFormat::F32p,
                frame_size: 0,
            },
        })
        .expect("解码器打开失败");

    let mut frames = Vec::new();
    loop {
        let pkt = match demuxer.read_packet(&mut io) {
            Ok(pkt) => pkt,
            Err(LingError::Eof) => break,
            Err(e) => panic!("读包失败: {e}"),
        };
        decoder.send_packet(&pkt).expect("解码失败");
        loop {
            match decoder.receive_frame() {
                Ok(Frame::Audio(frame)) => frames.push(frame),
                Err(LingError::NeedMoreData) | Err(LingError::Eof) => break,
                Err(e) => panic!("取帧失败: {e}"),
            }
        }
    }

    // flush
    decoder.send_packet(&Packet::empty()).unwrap();
    while let Ok(Frame::Audio(frame)) = decoder.receive_frame() {
        frames.push(frame);
    }
    frames
}

#[test]
fn test_短块静音流解码() {
    let spec = StreamSpec::default();
    let (data, total) = build_stream(&spec);
    let frames = decode_stream(data, FormatOptions::default());

    // 首包零输出: 12 个包产生 11 帧
    assert_eq!(frames.len(), spec.blocks.len() - 1);

    let mut next_pts = 0i64;
    let mut decoded = 0u64;
    for frame in &frames {
        assert_eq!(u64::from(frame.nb_samples), SHORT_FRAMES);
        assert_eq!(frame.sample_rate, SAMPLE_RATE);
        assert_eq!(frame.data.len(), usize::from(CHANNELS));
        assert_eq!(frame.pts, next_pts, "帧 pts 应连续");
        next_pts += frame.duration;
        decoded += u64::from(frame.nb_samples);

        for ch in 0..usize::from(CHANNELS) {
            let plane = frame.plane_f32(ch);
            assert_eq!(plane.len(), frame.nb_samples as usize);
            assert!(plane.iter().all(|&v| v == 0.0), "静音流应解出全零");
        }
    }
    assert_eq!(decoded, total);
}

#[test]
fn test_长短块交替帧数() {
    // 短短长长短: 验证过渡块的帧数 (prev+cur)/4
    let blocks = vec![false, false, true, true, false];
    let spec = StreamSpec {
        blocks: blocks.clone(),
        packets_per_page: 2,
        ..StreamSpec::default()
    };
    let (data, total) = build_stream(&spec);
    let frames = decode_stream(data, FormatOptions::default());

    let durs = packet_durations(&blocks);
    let expected: Vec<u64> = durs[1..].to_vec();
    let got: Vec<u64> = frames.iter().map(|f| u64::from(f.nb_samples)).collect();
    assert_eq!(got, expected, "每包帧数应为 (prev_bs+cur_bs)/4");
    assert_eq!(got.iter().sum::<u64>(), total);

    // 输出值在 [-1, 1] 内
    for frame in &frames {
        for ch in 0..usize::from(CHANNELS) {
            assert!(
                frame
                    .plane_f32(ch)
                    .iter()
                    .all(|&v| (-1.0..=1.0).contains(&v))
            );
        }
    }
}

#[test]
fn test_无缝裁剪后的总帧数() {
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
    let frames = decode_stream(data, options);

    let decoded: u64 = frames.iter().map(|f| u64::from(f.nb_samples)).sum();
    assert_eq!(decoded, total, "裁剪后总帧数应等于呈现帧数");

    // 首个可闻采样从 0 开始
    assert_eq!(frames.first().map(|f| f.pts), Some(0));
}

#[test]
fn test_损坏音频包可跳过() {
    let spec = StreamSpec::default();
    let (data, _) = build_stream(&spec);

    let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
    let format_registry = ling::default_format_registry();
    let codec_registry = ling::default_codec_registry();
    let mut demuxer = format_registry
        .open_input(&mut io, Some("test.ogg"), FormatOptions::default())
        .unwrap();
    let stream = demuxer.streams()[0].clone();

    let mut decoder = codec_registry.create_decoder(CodecId::Vorbis).unwrap();
    decoder
        .open(&CodecParameters {
            codec_id: CodecId::Vorbis,
            extra_data: stream.extra_data.clone(),
            bit_rate: 0,
            audio: AudioCodecParams::default(),
        })
        .unwrap();

    // 送入头包 (comment + setup)
    for _ in 0..2 {
        let pkt = demuxer.read_packet(&mut io).unwrap();
        decoder.send_packet(&pkt).unwrap();
    }

    // 伪造一个首位为 1 的"音频包": 解码报数据错误
    let mut bad = Packet::from_data(vec![0xFFu8, 0x00]);
    bad.stream_index = 0;
    assert!(matches!(
        decoder.send_packet(&bad),
        Err(LingError::InvalidData(_))
    ));

    // 后续正常包仍可解码
    let pkt = demuxer.read_packet(&mut io).unwrap();
    decoder.send_packet(&pkt).expect("错误包之后应能继续解码");
}

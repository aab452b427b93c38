//! 所有权句柄测试
//!
//! 验证 DecoderBox 的构造/析构配对、裸指针出口以及命令行探测流程。


use audio_decoder_handle::ffi::{audio_decoder_free, audio_decoder_get_output_info};
use audio_decoder_handle::tools::{AppConfig, inspect_audio_file};
use audio_decoder_handle::{
    AudioError, Decoder, DecoderBox, DecoderConfig, DecoderHandle, SampleFormat,
};
use audio_test_fixtures::{
    VORBIS_CHANNELS, VORBIS_FRAMES, VORBIS_SAMPLE_RATE, log, sample_at_f32, vorbis_fixture,
    wav_bytes, wav_fixture,
};
use std::path::PathBuf;

fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_open_memory_reports_output_info() {
    init_test_logging();

    let handle = DecoderBox::open_memory(wav_bytes(2, 44100, 2048), &DecoderConfig::default())
        .expect("WAV应能解码");

    assert!(handle.is_initialized());
    let info = handle.output_info();
    assert_eq!(info.format, SampleFormat::S16);
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, 44100);
    assert_eq!(info.bytes_per_frame(), 4);
}

#[test]
fn test_open_file_and_decode_through_deref() {
    init_test_logging();

    let path = wav_fixture("box_decode.wav", 1, 22050, 4000);
    let mut handle = DecoderBox::open_file(&path, &DecoderConfig::default()).unwrap();

    let decoder = handle.decoder_mut().expect("句柄应已初始化");
    assert_eq!(decoder.length_in_pcm_frames(), Some(4000));

    let mut out = vec![0.0f32; 4000];
    let mut total = 0;
    while total < out.len() {
        let read = decoder.read_frames_f32(&mut out[total..]).unwrap();
        if read == 0 {
            break;
        }
        total += read;
    }
    assert_eq!(total, 4000);
    assert_eq!(out[3999], sample_at_f32(3999, 0));
    assert_eq!(decoder.skipped_packets(), 0);
}

#[test]
fn test_vorbis_file_through_decoder_box() {
    init_test_logging();

    let mut handle = DecoderBox::open_file(vorbis_fixture(), &DecoderConfig::default())
        .expect("OGG/Vorbis应能解码");

    let info = handle.output_info();
    assert_eq!(
        (info.format, info.channels, info.sample_rate),
        (SampleFormat::F32, VORBIS_CHANNELS, VORBIS_SAMPLE_RATE)
    );

    let channels = VORBIS_CHANNELS as usize;
    let decoder = handle.decoder_mut().expect("句柄应已初始化");
    assert_eq!(decoder.length_in_pcm_frames(), Some(VORBIS_FRAMES));

    let mut reference = vec![0.0f32; (VORBIS_FRAMES as usize + 100) * channels];
    let mut total = 0;
    loop {
        let read = decoder
            .read_frames_f32(&mut reference[total * channels..])
            .unwrap();
        if read == 0 {
            break;
        }
        total += read;
    }
    assert_eq!(total as u64, VORBIS_FRAMES, "完整读取帧数应等于声明长度");
    assert_eq!(decoder.cursor_in_pcm_frames(), VORBIS_FRAMES);
    assert_eq!(decoder.skipped_packets(), 0);

    for target in [130u64, 9999, 17001] {
        decoder.seek_to_pcm_frame(target).unwrap();
        assert_eq!(decoder.cursor_in_pcm_frames(), target);

        let mut out = vec![0.0f32; 300 * channels];
        assert_eq!(decoder.read_frames_f32(&mut out).unwrap(), 300);
        assert_eq!(decoder.cursor_in_pcm_frames(), target + 300);

        let offset = target as usize * channels;
        for (i, (got, want)) in out.iter().zip(&reference[offset..]).enumerate() {
            assert!(
                (got - want).abs() < 1e-6,
                "定位到{target}后第{i}个样本与参考不一致: {got} vs {want}"
            );
        }
    }

    log("DecoderBox读取Vorbis并定位", "Vorbis decode and seek via DecoderBox");
}

#[test]
fn test_init_replaces_backend_state() {
    let mut handle = DecoderBox::try_new().unwrap();
    assert!(!handle.is_initialized());

    let first = Decoder::from_memory(wav_bytes(1, 8000, 64), &DecoderConfig::default()).unwrap();
    handle.init(first);
    assert_eq!(handle.output_info().sample_rate, 8000);

    let config = DecoderConfig::default().with_format(SampleFormat::F32);
    let second = Decoder::from_memory(wav_bytes(2, 48000, 64), &config).unwrap();
    handle.init(second);
    assert_eq!(handle.output_info().format, SampleFormat::F32);
    assert_eq!(handle.output_info().sample_rate, 48000);

    handle.uninit();
    assert!(!handle.is_initialized());
    assert!(handle.decoder().is_none());
}

#[test]
fn test_raw_pointer_escape_hatch() {
    let handle = DecoderBox::open_memory(wav_bytes(2, 32000, 128), &DecoderConfig::default())
        .unwrap();

    // 借出的裸指针可直接用于C ABI
    let (mut format, mut channels, mut rate) = (0u32, 0u32, 0u32);
    unsafe {
        audio_decoder_get_output_info(handle.as_ptr(), &mut format, &mut channels, &mut rate);
    }
    assert_eq!((format, channels, rate), (SampleFormat::S16.as_raw(), 2, 32000));

    // 交出所有权后由FFI释放
    let raw: *mut DecoderHandle = handle.into_raw();
    unsafe { audio_decoder_free(raw) };

    log("into_raw 后由 FFI 释放", "Ownership handed to FFI free");
}

#[test]
fn test_handles_move_across_threads() {
    let handle = DecoderBox::open_memory(wav_bytes(1, 16000, 512), &DecoderConfig::default())
        .unwrap();

    let worker = std::thread::spawn(move || {
        let mut handle = handle;
        let decoder = handle.decoder_mut().unwrap();
        let mut out = [0.0f32; 16];
        decoder.read_frames_f32(&mut out).unwrap()
    });

    assert_eq!(worker.join().unwrap(), 16);
}

#[test]
fn test_open_errors_are_typed() {
    let missing = DecoderBox::open_file("/nonexistent/dir/file.ogg", &DecoderConfig::default());
    assert!(matches!(missing, Err(AudioError::IoError(_))));

    let garbage = DecoderBox::open_memory(vec![0u8; 256], &DecoderConfig::default());
    assert!(matches!(garbage, Err(AudioError::FormatError(_))));
}

// ========== 命令行探测流程 ==========

#[test]
fn test_inspect_audio_file_with_trial_decode() {
    init_test_logging();

    let path = wav_fixture("box_inspect.wav", 2, 44100, 44100);
    let config = AppConfig {
        inputs: vec![path.clone()],
        format: SampleFormat::Unknown,
        frames: Some(1000),
        verbose: false,
    };

    let report = inspect_audio_file(&path, &config).unwrap();
    assert_eq!(report.path, path);
    assert_eq!(report.output.format, SampleFormat::S16);
    assert_eq!(report.output.channels, 2);
    assert_eq!(report.output.sample_rate, 44100);
    assert_eq!(report.length_frames, Some(44100));

    let stats = report.decoded.expect("应包含试解码统计");
    assert_eq!(stats.frames_read, 1000);
    assert!(stats.peak > 0.0 && stats.peak <= 1.0);
}

#[test]
fn test_inspect_audio_file_missing_input() {
    let config = AppConfig {
        inputs: vec![],
        format: SampleFormat::F32,
        frames: None,
        verbose: false,
    };
    let result = inspect_audio_file(&PathBuf::from("/nonexistent/a.wav"), &config);
    assert!(result.is_err());
}

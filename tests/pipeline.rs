//! End-to-end runs of the file-level operations against a temporary tree.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use rusty_dfos::data::loader::{load_matrix, save_matrix};
use rusty_dfos::process::codec::CompressParams;
use rusty_dfos::process::convert::VelocityParams;
use rusty_dfos::process::correlation::CorrelationParams;
use rusty_dfos::process::filter::FilterParams;
use rusty_dfos::process::spectral::SpectralParams;
use rusty_dfos::{
    jobs, DenoiseMethod, Error, FileStore, Matrix, ProcessingConfig, TaskRunner, Trace, TraceStats,
    Waveform, WaveformFormat, WaveformStore,
};

const FS: f64 = 500.0;

fn two_tone(n: usize, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / FS;
            (2.0 * PI * 5.0 * t + phase).sin() + (2.0 * PI * 80.0 * t).sin()
        })
        .collect()
}

fn write_waveform(dir: &Path, name: &str, traces: Vec<Vec<f64>>) -> PathBuf {
    let traces = traces
        .into_iter()
        .enumerate()
        .map(|(i, data)| {
            Trace::new(
                data,
                TraceStats {
                    delta: Some(1.0 / FS),
                    starttime: Some("2024-01-01T00:00:00".into()),
                    network: Some("FO".into()),
                    station: Some("SYN".into()),
                    channel: format!("{:02}", i + 1),
                },
            )
        })
        .collect();
    let path = dir.join(name);
    FileStore
        .save(&Waveform::new(traces), &path, WaveformFormat::Json)
        .unwrap();
    path
}

fn runner() -> TaskRunner {
    TaskRunner::default()
}

fn rms(x: &[f64]) -> f64 {
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

#[test]
fn txt_with_header_converts_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("record.txt");
    let matrix = Matrix::from_columns(vec![vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 4.0]]).unwrap();
    save_matrix(&matrix, &txt).unwrap();
    let header = dir.path().join("record_head.txt");
    std::fs::write(
        &header,
        "# test header\nstarttime: 2024-03-01T12:00:00\ndelta: 0.002\nstation: SYN\n",
    )
    .unwrap();

    let runner = runner();
    let out = runner
        .convert_format(&txt, WaveformFormat::Json, Some(&header))
        .unwrap();
    assert_eq!(out, dir.path().join("DFSPy_format_outputs").join("record.json"));

    let back = FileStore.load(&out).unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back.traces[1].data, vec![-1.0, 0.5, 4.0]);
    let stats = &back.traces[0].stats;
    assert_eq!(stats.delta, Some(0.002));
    assert_eq!(stats.starttime.as_deref(), Some("2024-03-01T12:00:00"));
    assert_eq!(stats.station.as_deref(), Some("SYN"));
    assert_eq!(stats.channel, "01");
}

#[test]
fn txt_conversion_needs_a_header() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("record.txt");
    save_matrix(&Matrix::from_columns(vec![vec![1.0, 2.0]]).unwrap(), &txt).unwrap();

    let err = runner()
        .convert_format(&txt, WaveformFormat::Json, None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(!dir.path().join("DFSPy_format_outputs").exists());
}

#[test]
fn seismic_targets_are_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "w.json", vec![vec![0.0; 8]]);
    let err = runner()
        .convert_format(&input, WaveformFormat::Sac, None)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[test]
fn bandpass_removes_out_of_band_tone() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "line.json", vec![two_tone(3000, 0.0)]);

    let out = runner().bandpass_file(&input, 1.0, 20.0).unwrap();
    assert_eq!(
        out,
        dir.path().join("DFSPy_denoise_outputs").join("line_Bandpass.json")
    );

    let filtered = FileStore.load(&out).unwrap();
    let data = &filtered.traces[0].data;
    assert_eq!(data.len(), 3000);
    // Only the 5 Hz tone survives: RMS of a unit sine.
    let mid = rms(&data[1000..2000]);
    assert!((mid - 0.5_f64.sqrt()).abs() < 0.05, "rms {mid}");
    assert_eq!(filtered.traces[0].stats.station.as_deref(), Some("SYN"));
}

#[test]
fn reprocessing_an_output_does_not_nest() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "line.json", vec![two_tone(1000, 0.0)]);
    let runner = runner();

    let first = runner.filter_file(&input, &FilterParams::bandpass(1.0, 20.0)).unwrap();
    let second = runner.filter_file(&first, &FilterParams::bandpass(2.0, 10.0)).unwrap();
    assert_eq!(first.parent(), second.parent());
    assert_eq!(
        second.file_name().unwrap(),
        "line_bandpass_o4_1-20Hz_bandpass_o4_2-10Hz.json"
    );

    // A different task from inside an output directory lands beside it.
    let vel = runner
        .strain_to_velocity_file(&second, &VelocityParams::new(1000.0))
        .unwrap();
    assert_eq!(vel.parent().unwrap(), dir.path().join("DFSPy_paraconv_outputs"));
}

#[test]
fn failed_validation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "line.json", vec![two_tone(400, 0.0)]);
    let runner = runner();

    // 300 Hz is above Nyquist for 500 Hz sampling.
    let err = runner.bandpass_file(&input, 1.0, 300.0).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    let err = runner
        .strain_to_velocity_file(&input, &VelocityParams::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(!dir.path().join("DFSPy_denoise_outputs").exists());
    assert!(!dir.path().join("DFSPy_paraconv_outputs").exists());
}

#[test]
fn correlation_denoise_keeps_shape_and_names_output() {
    let dir = tempfile::tempdir().unwrap();
    let traces = (0..4).map(|ch| two_tone(600, ch as f64 * 0.1)).collect();
    let input = write_waveform(dir.path(), "array.json", traces);
    let params = CorrelationParams {
        window_size: 128,
        step_size: 64,
        corr_threshold: 0.4,
    };

    let out = runner()
        .correlation_denoise_file(&input, &params)
        .unwrap();
    assert!(out.ends_with("DFSPy_denoise_outputs/array_corr_w128_s64_t0.40.json"));
    let result = FileStore.load(&out).unwrap();
    assert_eq!(result.len(), 4);
    assert!(result.iter().all(|tr| tr.data.len() == 600));
    assert!(result.iter().flat_map(|tr| &tr.data).all(|v| v.is_finite()));
}

#[test]
fn spectral_subtraction_of_silence_is_silence() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "quiet.json", vec![vec![0.0; 300], vec![0.0; 300]]);
    let mut config = ProcessingConfig::default();
    config.spectral = SpectralParams {
        frame_length: 64,
        hop_length: 32,
        ..SpectralParams::default()
    };

    let out = runner()
        .denoise_file(&input, DenoiseMethod::Spectral, &config)
        .unwrap();
    let result = FileStore.load(&out).unwrap();
    for trace in &result {
        assert_eq!(trace.data.len(), 300);
        assert!(trace.data.iter().all(|v| *v == 0.0));
    }
}

#[test]
fn wavelet_denoise_through_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "line.json", vec![two_tone(513, 0.0)]);
    let mut config = ProcessingConfig::default();
    config.wavelet.level = Some(3);

    let out = runner()
        .denoise_file(&input, DenoiseMethod::Wavelet, &config)
        .unwrap();
    assert_eq!(out.file_name().unwrap(), "line_wd_db4_L3.json");
    assert_eq!(FileStore.load(&out).unwrap().traces[0].data.len(), 513);

    config.wavelet.basis = "coif17".into();
    let err = runner()
        .denoise_file(&input, DenoiseMethod::Wavelet, &config)
        .unwrap_err();
    assert!(matches!(err, Error::MissingCapability(_)));
}

#[test]
fn velocity_scales_samples() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "strain.json", vec![vec![5000.0, -2500.0, 0.0]]);

    let out = runner()
        .strain_to_velocity_file(&input, &VelocityParams::new(2.0))
        .unwrap();
    assert_eq!(out.file_name().unwrap(), "strain_velocity.json");
    assert_eq!(FileStore.load(&out).unwrap().traces[0].data, vec![2.0, -1.0, 0.0]);
}

#[test]
fn compress_then_decompress_round_trips_text() {
    let dir = tempfile::tempdir().unwrap();
    let columns: Vec<Vec<f64>> = (0..3).map(|ch| two_tone(257, ch as f64)).collect();
    let matrix = Matrix::from_columns(columns).unwrap();
    let src = dir.path().join("block.txt");
    save_matrix(&matrix, &src).unwrap();
    let runner = runner();

    let (payload, ratio) = runner.compress_file(&src, &CompressParams::default()).unwrap();
    assert_eq!(
        payload,
        dir.path().join("DFSPy_compress_outputs").join("block-coefficients.bin")
    );
    assert!(ratio > 0.0);

    let rebuilt = runner.decompress_file(&payload, None).unwrap();
    assert_eq!(
        rebuilt,
        dir.path()
            .join("DFSPy_decompress_outputs")
            .join("block-coefficients-reconstructed.txt")
    );
    let original = load_matrix(&src).unwrap();
    let back = load_matrix(&rebuilt).unwrap();
    assert_eq!(back.shape(), (257, 3));
    for t in 0..3 {
        for (a, b) in original.column(t).iter().zip(back.column(t)) {
            assert!((a - b).abs() <= 1e-6 * a.abs().max(1.0), "{a} vs {b}");
        }
    }

    let named = runner.decompress_file(&payload, Some("restored.txt")).unwrap();
    assert_eq!(named.file_name().unwrap(), "restored.txt");
}

#[test]
fn corrupt_payload_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("junk-coefficients.bin");
    std::fs::write(&bogus, [0xffu8; 5]).unwrap();
    let err = runner().decompress_file(&bogus, None).unwrap_err();
    assert!(matches!(err, Error::CorruptPayload(_)));
}

#[test]
fn custom_prefix_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "line.json", vec![two_tone(400, 0.0)]);
    let config = ProcessingConfig {
        output_prefix: "Run7".into(),
        ..ProcessingConfig::default()
    };
    let out = TaskRunner::from_config(&config)
        .bandpass_file(&input, 1.0, 20.0)
        .unwrap();
    assert_eq!(out.parent().unwrap(), dir.path().join("Run7_denoise_outputs"));
}

#[test]
fn tasks_run_as_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_waveform(dir.path(), "line.json", vec![two_tone(400, 0.0)]);

    let job = jobs::spawn("bandpass", move || {
        runner().bandpass_file(&input, 1.0, 20.0)
    })
    .unwrap();
    let out = job.wait().unwrap();
    assert!(out.is_file());
}

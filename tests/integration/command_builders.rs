// Structural tests for the ffmpeg invocation builders

use bookend::engine::{
    JobSpec, ProbeResult, build_concat_cmd, build_image_segment_cmd, build_remux_cmd,
    build_transcode_cmd, keyframe_interval,
};
use std::path::{Path, PathBuf};
use std::process::Command;

fn to_string(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

fn probed_source() -> ProbeResult {
    ProbeResult {
        video_codec: Some("h264".to_string()),
        width: 1280,
        height: 720,
        fps: 29.97,
        has_audio: true,
        audio_codec: Some("aac".to_string()),
        audio_sample_rate: 44100,
        audio_channels: 2,
        duration: 60.0,
        ..ProbeResult::default()
    }
}

fn full_spec() -> JobSpec {
    let mut spec = JobSpec::new(PathBuf::from("/in/main.mp4"), PathBuf::from("/out/final.mp4"));
    spec.start_image = Some(PathBuf::from("/in/intro.png"));
    spec.start_duration = 3.0;
    spec.end_image = Some(PathBuf::from("/in/outro.png"));
    spec.end_duration = 2.5;
    spec
}

#[test]
fn test_remux_never_reencodes() {
    let cmd = build_remux_cmd(
        Path::new("ffmpeg"),
        Path::new("/in/main.mp4"),
        Path::new("/tmp/main.ts"),
    );
    let s = to_string(&cmd);

    assert!(s.contains("-c copy"));
    assert!(s.contains("-bsf:v h264_mp4toannexb"));
    assert!(s.contains("-f mpegts"));
    assert!(s.contains("-progress pipe:1"));
    assert!(!s.contains("libx264"));
    assert!(!s.contains("-crf"));
}

#[test]
fn test_image_segment_with_audio() {
    let info = probed_source();
    let cmd = build_image_segment_cmd(
        Path::new("ffmpeg"),
        Path::new("/in/intro.png"),
        Path::new("/tmp/intro.ts"),
        3.0,
        30,
        &info,
    );
    let s = to_string(&cmd);

    assert!(s.contains("-loop 1"));
    assert!(s.contains("-framerate 30"));
    assert!(s.contains("-t 3.000"));
    assert!(s.contains("anullsrc=r=44100:cl=stereo"));
    assert!(s.contains("scale=1920:1080:flags=lanczos,format=yuv420p"));
    assert!(s.contains("-c:v libx264"));
    assert!(s.contains("-profile:v high"));
    // 2 second GOP at 30 fps
    assert!(s.contains("-g 60"));
    assert!(s.contains("-sc_threshold 0"));
    assert!(s.contains("-c:a aac"));
    assert!(s.contains("-ar 44100"));
    assert!(s.contains("-f mpegts"));
    assert!(s.contains("-colorspace bt709"));
}

#[test]
fn test_image_segment_without_audio_has_no_audio_args() {
    let info = ProbeResult {
        has_audio: false,
        ..probed_source()
    };
    let cmd = build_image_segment_cmd(
        Path::new("ffmpeg"),
        Path::new("/in/intro.png"),
        Path::new("/tmp/intro.ts"),
        3.0,
        24,
        &info,
    );
    let s = to_string(&cmd);

    assert!(!s.contains("anullsrc"));
    assert!(!s.contains("-c:a"));
    assert!(s.contains("-g 48"));
}

#[test]
fn test_image_segment_mono_layout() {
    let info = ProbeResult {
        audio_channels: 1,
        audio_sample_rate: 22050,
        ..probed_source()
    };
    let cmd = build_image_segment_cmd(
        Path::new("ffmpeg"),
        Path::new("/in/intro.png"),
        Path::new("/tmp/intro.ts"),
        1.0,
        30,
        &info,
    );
    assert!(to_string(&cmd).contains("anullsrc=r=22050:cl=mono"));
}

#[test]
fn test_concat_is_stream_copy_with_faststart() {
    let cmd = build_concat_cmd(
        Path::new("ffmpeg"),
        Path::new("/tmp/list.txt"),
        Path::new("/out/final.mp4"),
    );
    let s = to_string(&cmd);

    assert!(s.contains("-f concat"));
    assert!(s.contains("-safe 0"));
    assert!(s.contains("-c copy"));
    assert!(s.contains("-bsf:a aac_adtstoasc"));
    assert!(s.contains("-movflags +faststart"));
    // The concat step must not re-encode anything
    assert!(!s.contains("-c:v"));
    assert!(!s.contains("libx264"));
}

#[test]
fn test_transcode_software_quality_target() {
    let cmd = build_transcode_cmd(Path::new("ffmpeg"), &full_spec(), &probed_source(), None);
    let s = to_string(&cmd);

    assert!(s.contains("-c:v libx264"));
    assert!(s.contains("-preset medium"));
    assert!(s.contains("-crf 19"));
    assert!(s.contains("-map [v]"));
    assert!(s.contains("-map 0:a?"));
    assert!(s.contains("-movflags +faststart"));
    assert!(s.contains("-colorspace bt709"));
    assert!(s.contains("-color_primaries bt709"));
    assert!(s.contains("-color_trc bt709"));
    // 29.97 rounds to 30 fps, 60 frame GOP
    assert!(s.contains("-r 30"));
    assert!(s.contains("-g 60"));
    // no hardware bitrate caps in software mode
    assert!(!s.contains("-maxrate"));
}

#[test]
fn test_transcode_hardware_encoder() {
    let cmd = build_transcode_cmd(
        Path::new("ffmpeg"),
        &full_spec(),
        &probed_source(),
        Some("h264_videotoolbox"),
    );
    let s = to_string(&cmd);

    assert!(s.contains("-c:v h264_videotoolbox"));
    assert!(s.contains("-b:v 8M"));
    assert!(s.contains("-maxrate 10M"));
    assert!(s.contains("-bufsize 20M"));
    assert!(!s.contains("-crf"));
    // same GOP and color policy as the software path
    assert!(s.contains("-g 60"));
    assert!(s.contains("-colorspace bt709"));
}

#[test]
fn test_transcode_inputs_and_filter_graph() {
    let spec = full_spec();
    let cmd = build_transcode_cmd(Path::new("ffmpeg"), &spec, &probed_source(), None);
    let s = to_string(&cmd);

    // three inputs: main, looped intro, looped outro
    assert_eq!(s.matches("-i ").count(), 3);
    assert!(s.contains("-t 3.000"));
    assert!(s.contains("-t 2.500"));
    assert!(s.contains("[intro][main][outro]concat=n=3:v=1:a=0[v]"));
    assert!(s.contains("flags=lanczos"));
    assert!(s.contains("flags=bicubic"));
}

#[test]
fn test_transcode_start_only() {
    let mut spec = full_spec();
    spec.end_image = None;
    let cmd = build_transcode_cmd(Path::new("ffmpeg"), &spec, &probed_source(), None);
    let s = to_string(&cmd);

    assert_eq!(s.matches("-i ").count(), 2);
    assert!(s.contains("[intro][main]concat=n=2:v=1:a=0[v]"));
    assert!(!s.contains("[outro]"));
}

#[test]
fn test_unknown_fps_defaults() {
    let info = ProbeResult {
        fps: 0.0,
        has_audio: false,
        ..ProbeResult::default()
    };
    let cmd = build_transcode_cmd(Path::new("ffmpeg"), &full_spec(), &info, None);
    let s = to_string(&cmd);

    assert!(s.contains("-r 30"), "unknown frame rate falls back to 30");
    assert!(s.contains("-g 60"));

    assert_eq!(keyframe_interval(0), 60);
}

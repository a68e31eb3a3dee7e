// Source media probing using ffprobe

use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::env::BinaryEnvironment;

/// Normalized metadata for the first video and first audio stream of a
/// source file. All fields default to "unknown" values; a probe never
/// fails, it just returns defaults the pipeline substitutes for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub video_codec: Option<String>,
    pub width: u32,
    pub height: u32,
    pub pix_fmt: Option<String>,
    /// Frames per second; 0.0 means unknown (consumers substitute 30).
    pub fps: f64,
    pub color_primaries: Option<String>,
    pub color_transfer: Option<String>,
    pub sample_aspect_ratio: Option<String>,
    pub display_aspect_ratio: Option<String>,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    /// Container duration in seconds; 0.0 means unknown.
    pub duration: f64,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self {
            video_codec: None,
            width: 0,
            height: 0,
            pix_fmt: None,
            fps: 0.0,
            color_primaries: None,
            color_transfer: None,
            sample_aspect_ratio: None,
            display_aspect_ratio: None,
            has_audio: false,
            audio_codec: None,
            audio_sample_rate: 48000,
            audio_channels: 2,
            duration: 0.0,
        }
    }
}

impl ProbeResult {
    /// Frame rate rounded to an integer, with the 30 fps default
    /// applied when probing could not tell.
    pub fn target_fps(&self) -> u32 {
        if self.fps > 0.0 {
            (self.fps.round() as u32).max(1)
        } else {
            30
        }
    }

    /// Source duration, or `None` when unknown.
    pub fn duration_or_none(&self) -> Option<f64> {
        if self.duration > 0.0 {
            Some(self.duration)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    sample_aspect_ratio: Option<String>,
    display_aspect_ratio: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Build the ffprobe invocation requesting structured stream and
/// format metadata. Separate from [`probe_media`] so the pipeline can
/// run it through its cancellable process runner.
pub fn probe_cmd(ffprobe: &Path, path: &Path) -> Command {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "-show_format",
    ])
    .arg(path);
    cmd
}

/// Probe a video file. Invocation or parse failures yield a default
/// result rather than an error; callers treat all-default fields as
/// "metadata unavailable".
pub fn probe_media(env: &BinaryEnvironment, path: &Path) -> ProbeResult {
    let ffprobe = match env.ffprobe() {
        Ok(p) => p,
        Err(e) => {
            debug!(path = %path.display(), "probe skipped: {e}");
            return ProbeResult::default();
        }
    };

    let output = match probe_cmd(ffprobe, path).output() {
        Ok(o) => o,
        Err(e) => {
            debug!(path = %path.display(), "ffprobe spawn failed: {e}");
            return ProbeResult::default();
        }
    };

    if !output.status.success() {
        debug!(path = %path.display(), status = %output.status, "ffprobe failed");
        return ProbeResult::default();
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe JSON into a [`ProbeResult`], taking the first video
/// and first audio stream encountered.
pub fn parse_probe_output(json: &str) -> ProbeResult {
    let mut result = ProbeResult::default();

    let data: FfprobeOutput = match serde_json::from_str(json) {
        Ok(data) => data,
        Err(e) => {
            debug!("ffprobe JSON parse failed: {e}");
            return result;
        }
    };

    for stream in &data.streams {
        match stream.codec_type.as_deref() {
            Some("video") if result.video_codec.is_none() => {
                result.video_codec = stream.codec_name.clone();
                result.width = stream.width.unwrap_or(0);
                result.height = stream.height.unwrap_or(0);
                result.pix_fmt = stream.pix_fmt.clone();
                result.fps = stream
                    .avg_frame_rate
                    .as_deref()
                    .or(stream.r_frame_rate.as_deref())
                    .and_then(parse_fraction)
                    .unwrap_or(0.0);
                result.color_primaries = stream.color_primaries.clone();
                result.color_transfer = stream.color_transfer.clone();
                result.sample_aspect_ratio = stream.sample_aspect_ratio.clone();
                result.display_aspect_ratio = stream.display_aspect_ratio.clone();
            }
            Some("audio") if !result.has_audio => {
                result.has_audio = true;
                result.audio_codec = stream.codec_name.clone();
                result.audio_sample_rate = stream
                    .sample_rate
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(48000);
                result.audio_channels = stream.channels.unwrap_or(2);
            }
            _ => {}
        }
    }

    result.duration = data
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse().ok())
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    result
}

/// Parse a frame-rate rational like "30000/1001" (or a plain number)
/// to f64. Zero or malformed denominators and non-finite or negative
/// results yield `None`.
pub fn parse_fraction(s: &str) -> Option<f64> {
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };

    (value.is_finite() && value >= 0.0).then_some(value)
}

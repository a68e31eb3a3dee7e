//! Locating ffmpeg/ffprobe across deployment layouts.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use super::core::{PipelineError, PipelineResult};

/// Env override for the encoder binary, highest resolution priority.
pub const FFMPEG_ENV_KEY: &str = "FFMPEG_BIN";
/// Env override for the prober binary, highest resolution priority.
pub const FFPROBE_ENV_KEY: &str = "FFPROBE_BIN";

/// Hardware encoder names recognised in `ffmpeg -encoders` output.
const HARDWARE_ENCODERS: &[&str] = &[
    "h264_videotoolbox",
    "hevc_videotoolbox",
    "h264_nvenc",
    "hevc_nvenc",
    "h264_qsv",
    "hevc_qsv",
    "h264_vaapi",
    "hevc_vaapi",
];

/// H.264 hardware encoders usable for the fallback re-encode, best
/// first. VAAPI is excluded: it wants hardware-frame uploads our
/// filter graph never performs.
const FALLBACK_HW_PRIORITY: &[&str] = &["h264_videotoolbox", "h264_nvenc", "h264_qsv"];

/// Resolved tool paths and encoder capabilities for one session.
/// Immutable once constructed; shared read-only by every job.
#[derive(Debug, Clone, Default)]
pub struct BinaryEnvironment {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    hardware_encoders: Vec<String>,
}

impl BinaryEnvironment {
    /// Resolve both tools through the override/embedded/system chain
    /// and scan hardware encoder support. Missing binaries do not fail
    /// resolution; they surface as `BinaryNotFound` when first needed.
    pub fn resolve() -> Self {
        let ffmpeg = resolve_tool("ffmpeg", FFMPEG_ENV_KEY);
        let ffprobe = resolve_tool("ffprobe", FFPROBE_ENV_KEY);
        let hardware_encoders = ffmpeg
            .as_deref()
            .map(detect_hardware_encoders)
            .unwrap_or_default();

        Self {
            ffmpeg,
            ffprobe,
            hardware_encoders,
        }
    }

    /// Build an environment from known paths, skipping discovery.
    pub fn from_paths(
        ffmpeg: Option<PathBuf>,
        ffprobe: Option<PathBuf>,
        hardware_encoders: Vec<String>,
    ) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            hardware_encoders,
        }
    }

    pub fn ffmpeg(&self) -> PipelineResult<&Path> {
        self.ffmpeg
            .as_deref()
            .ok_or(PipelineError::BinaryNotFound {
                tool: "ffmpeg",
                env_key: FFMPEG_ENV_KEY,
            })
    }

    pub fn ffprobe(&self) -> PipelineResult<&Path> {
        self.ffprobe
            .as_deref()
            .ok_or(PipelineError::BinaryNotFound {
                tool: "ffprobe",
                env_key: FFPROBE_ENV_KEY,
            })
    }

    /// Resolved encoder path, if any, for display.
    pub fn ffmpeg_path(&self) -> Option<&Path> {
        self.ffmpeg.as_deref()
    }

    /// Resolved prober path, if any, for display.
    pub fn ffprobe_path(&self) -> Option<&Path> {
        self.ffprobe.as_deref()
    }

    pub fn hardware_encoders(&self) -> &[String] {
        &self.hardware_encoders
    }

    pub fn has_hardware_encoder(&self, name: &str) -> bool {
        self.hardware_encoders.iter().any(|e| e == name)
    }

    /// Best available hardware encoder for the fallback re-encode.
    pub fn preferred_hardware_encoder(&self) -> Option<&'static str> {
        FALLBACK_HW_PRIORITY
            .iter()
            .find(|name| self.has_hardware_encoder(name))
            .copied()
    }
}

/// Find the first usable binary: env override, then embedded bundle
/// candidates, then well-known system locations and PATH.
fn resolve_tool(tool: &str, env_key: &str) -> Option<PathBuf> {
    let resolved = override_candidate(env_key)
        .into_iter()
        .chain(embedded_candidates(tool))
        .chain(system_candidates(tool))
        .find(|candidate| validate_candidate(candidate));

    match &resolved {
        Some(path) => debug!(tool, path = %path.display(), "resolved binary"),
        None => warn!(tool, env_key, "no usable binary found"),
    }

    resolved
}

fn override_candidate(env_key: &str) -> Option<PathBuf> {
    let value = env::var_os(env_key)?;
    if value.is_empty() {
        return None;
    }
    Some(PathBuf::from(value))
}

/// Candidate paths inside a self-contained bundle, most specific
/// first, pre-filtered to existing executables so the version probe
/// never runs against a path that cannot work.
fn embedded_candidates(tool: &str) -> Vec<PathBuf> {
    let tool_file = tool_file_name(tool);
    let mut candidates = Vec::new();

    for base in bundle_roots() {
        let bin = base.join("assets").join("bin");
        candidates.push(bin.join(platform_dir()).join(arch_dir()).join(&tool_file));
        candidates.push(bin.join(platform_dir()).join(&tool_file));
        candidates.push(bin.join(&tool_file));
    }

    candidates
        .into_iter()
        .filter(|p| p.is_file() && is_executable(p))
        .collect()
}

/// Well-known install prefixes plus a PATH scan.
fn system_candidates(tool: &str) -> Vec<PathBuf> {
    let tool_file = tool_file_name(tool);
    let mut candidates = Vec::new();

    if cfg!(unix) {
        for prefix in ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"] {
            candidates.push(Path::new(prefix).join(&tool_file));
        }
    }

    if let Some(paths) = env::var_os("PATH") {
        candidates.extend(env::split_paths(&paths).map(|dir| dir.join(&tool_file)));
    }

    candidates
}

fn bundle_roots() -> Vec<PathBuf> {
    let Ok(exe) = env::current_exe() else {
        return Vec::new();
    };
    let Some(exe_dir) = exe.parent().map(Path::to_path_buf) else {
        return Vec::new();
    };

    // macOS .app layout keeps binaries under Contents/Resources,
    // siblings of the Contents/MacOS executable directory.
    let mut roots = vec![exe_dir.clone()];
    if let Some(contents) = exe_dir.parent() {
        roots.push(contents.join("Resources"));
    }
    roots
}

fn tool_file_name(tool: &str) -> String {
    if cfg!(windows) {
        format!("{tool}.exe")
    } else {
        tool.to_string()
    }
}

fn platform_dir() -> &'static str {
    if cfg!(target_os = "macos") {
        "mac"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        "linux"
    }
}

fn arch_dir() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x86_64"
    }
}

/// A candidate is usable when it exists, is executable, and answers a
/// version probe with exit code 0.
fn validate_candidate(path: &Path) -> bool {
    if !path.is_file() || !is_executable(path) {
        return false;
    }

    match Command::new(path).arg("-version").output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!(path = %path.display(), "version probe failed: {e}");
            false
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Scan `ffmpeg -encoders` output for known hardware encoder names.
/// Any failure degrades to "no hardware encoders available".
fn detect_hardware_encoders(ffmpeg: &Path) -> Vec<String> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output();

    let listing = match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).to_string(),
        Ok(out) => {
            debug!(status = %out.status, "encoder listing failed");
            return Vec::new();
        }
        Err(e) => {
            debug!("encoder listing failed: {e}");
            return Vec::new();
        }
    };

    HARDWARE_ENCODERS
        .iter()
        .filter(|name| listing.contains(*name))
        .map(|name| name.to_string())
        .collect()
}

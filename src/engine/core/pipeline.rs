//! Two-tier wrap pipeline: remux+concat fast path with a full
//! re-encode fallback.
//!
//! Step order on the fast path mirrors the output structure: remux the
//! main video into a transport stream, synthesize bookend segments,
//! stream-copy concat. Any fast-path step failure escalates to the
//! re-encode; only a re-encode failure is terminal.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

use super::error::{PipelineError, PipelineResult};
use super::ffmpeg_cmd::{
    build_concat_cmd, build_image_segment_cmd, build_remux_cmd, build_transcode_cmd, format_cmd,
};
use super::types::{JobEvent, JobSpec, ProgressParser};
use crate::engine::env::BinaryEnvironment;
use crate::engine::probe::{self, ProbeResult};

/// Cancellation handle shared between the engine and a running
/// pipeline. `cancel` flips the flag checked between steps and kills
/// whatever external process is currently registered, so cancellation
/// latency is bounded by the child's kill latency rather than step
/// granularity.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.kill_running();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn kill_running(&self) {
        if let Some(child) = self.child.lock().unwrap().as_mut() {
            let _ = child.kill();
        }
    }

    fn register(&self, child: Child) {
        *self.child.lock().unwrap() = Some(child);
        // A cancel that raced the spawn must still kill the child.
        if self.is_cancelled() {
            self.kill_running();
        }
    }

    fn take(&self) -> Option<Child> {
        self.child.lock().unwrap().take()
    }
}

enum ToolError {
    Cancelled,
    Failed(String),
}

/// Run one job to completion. Emits progress/status events through
/// `emit`; returns the output path on success. The per-job scratch
/// directory is removed on every exit path, including cancellation.
pub fn run_job<F>(
    env: &BinaryEnvironment,
    spec: &JobSpec,
    token: &CancelToken,
    mut emit: F,
) -> PipelineResult<PathBuf>
where
    F: FnMut(JobEvent),
{
    if !spec.has_images() {
        return Err(PipelineError::InvalidJob(
            "at least one of start/end image is required".to_string(),
        ));
    }

    let scratch = tempfile::Builder::new()
        .prefix(&format!("bookend_{}_", spec.id.simple()))
        .tempdir()?;

    let mut run = PipelineRun {
        env,
        spec,
        token,
        emit: &mut emit,
        scratch: scratch.path().to_path_buf(),
    };
    run.execute()
}

struct PipelineRun<'a> {
    env: &'a BinaryEnvironment,
    spec: &'a JobSpec,
    token: &'a CancelToken,
    emit: &'a mut dyn FnMut(JobEvent),
    scratch: PathBuf,
}

impl PipelineRun<'_> {
    fn execute(&mut self) -> PipelineResult<PathBuf> {
        self.check_cancelled()?;
        self.status(5.0, "Probing source video");
        let info = self.probe_source()?;

        if let Some(parent) = self.spec.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if self.spec.prefer_remux {
            match self.copy_concat(&info) {
                Ok(output) => return Ok(output),
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) if e.is_escalatable() => {
                    warn!(job = %self.spec.id, "fast path failed, re-encoding: {e}");
                    self.status(20.0, "Fast path failed, falling back to re-encode");
                }
                Err(e) => return Err(e),
            }
        }

        self.transcode(&info)
    }

    /// Strategy A: remux the source, synthesize bookend segments,
    /// stream-copy concat everything into the output.
    fn copy_concat(&mut self, info: &ProbeResult) -> PipelineResult<PathBuf> {
        let fps = info.target_fps();

        self.check_cancelled()?;
        self.status(15.0, "Remuxing source into transport stream");
        let main_ts = self.scratch.join("main.ts");
        let cmd = build_remux_cmd(self.env.ffmpeg()?, &self.spec.video_path, &main_ts);
        self.run_tool(cmd, info.duration_or_none(), 15.0, 20.0)
            .map_err(|e| step_error(e, PipelineError::Remux))?;

        let mut segments = Vec::new();

        if let Some(image) = &self.spec.start_image {
            self.check_cancelled()?;
            self.status(35.0, "Encoding intro image segment");
            let seg = self.scratch.join("intro.ts");
            let cmd = build_image_segment_cmd(
                self.env.ffmpeg()?,
                image,
                &seg,
                self.spec.start_duration,
                fps,
                info,
            );
            self.run_tool(cmd, Some(self.spec.start_duration), 35.0, 20.0)
                .map_err(|e| step_error(e, PipelineError::SegmentEncode))?;
            segments.push(seg);
        }

        segments.push(main_ts);

        if let Some(image) = &self.spec.end_image {
            self.check_cancelled()?;
            self.status(55.0, "Encoding outro image segment");
            let seg = self.scratch.join("outro.ts");
            let cmd = build_image_segment_cmd(
                self.env.ffmpeg()?,
                image,
                &seg,
                self.spec.end_duration,
                fps,
                info,
            );
            self.run_tool(cmd, Some(self.spec.end_duration), 55.0, 25.0)
                .map_err(|e| step_error(e, PipelineError::SegmentEncode))?;
            segments.push(seg);
        }

        self.check_cancelled()?;
        self.status(80.0, "Concatenating segments");
        let list_path = self.scratch.join("list.txt");
        write_concat_manifest(&list_path, &segments)
            .map_err(|e| PipelineError::Concat(e.to_string()))?;

        let cmd = build_concat_cmd(self.env.ffmpeg()?, &list_path, &self.spec.output_path);
        self.run_tool(cmd, self.spec.total_duration(info.duration), 80.0, 19.0)
            .map_err(|e| step_error(e, PipelineError::Concat))?;

        self.status(100.0, "Completed");
        Ok(self.spec.output_path.clone())
    }

    /// Strategy B: one filter-graph re-encode over all inputs.
    fn transcode(&mut self, info: &ProbeResult) -> PipelineResult<PathBuf> {
        self.check_cancelled()?;
        self.status(20.0, "Re-encoding full output");

        let hw_encoder = if self.spec.use_hardware {
            self.env.preferred_hardware_encoder()
        } else {
            None
        };
        if let Some(encoder) = hw_encoder {
            debug!(job = %self.spec.id, encoder, "using hardware encoder");
        }

        let cmd = build_transcode_cmd(self.env.ffmpeg()?, self.spec, info, hw_encoder);
        self.run_tool(cmd, self.spec.total_duration(info.duration), 20.0, 79.0)
            .map_err(|e| step_error(e, PipelineError::Transcode))?;

        self.status(100.0, "Completed");
        Ok(self.spec.output_path.clone())
    }

    /// Probe through the cancellable runner so a cancel mid-probe
    /// kills ffprobe too. Failures degrade to default metadata.
    fn probe_source(&mut self) -> PipelineResult<ProbeResult> {
        let Ok(ffprobe) = self.env.ffprobe() else {
            debug!(job = %self.spec.id, "no prober available, using default metadata");
            return Ok(ProbeResult::default());
        };

        let mut cmd = probe::probe_cmd(ffprobe, &self.spec.video_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(job = %self.spec.id, "ffprobe spawn failed: {e}");
                return Ok(ProbeResult::default());
            }
        };

        let mut stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::Io(std::io::Error::other("failed to capture ffprobe stdout"))
        })?;
        self.token.register(child);

        let mut json = String::new();
        let read_ok = stdout.read_to_string(&mut json).is_ok();

        let status = match self.token.take() {
            Some(mut child) => child.wait().ok(),
            None => None,
        };

        if self.token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        match status {
            Some(status) if status.success() && read_ok => Ok(probe::parse_probe_output(&json)),
            _ => {
                debug!(job = %self.spec.id, "probe failed, using default metadata");
                Ok(ProbeResult::default())
            }
        }
    }

    /// Spawn an external tool, drain its output continuously, and map
    /// its progress lines into the `[offset, offset + span]` window of
    /// the job's 0-100 range.
    fn run_tool(
        &mut self,
        mut cmd: Command,
        total_duration: Option<f64>,
        offset: f64,
        span: f64,
    ) -> Result<(), ToolError> {
        debug!(job = %self.spec.id, cmd = %format_cmd(&cmd));

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::Failed(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Failed("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::Failed("failed to capture stderr".to_string()))?;

        let stderr_thread = thread::spawn(move || {
            let mut output = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                output.push_str(&line);
                output.push('\n');
            }
            output
        });

        self.token.register(child);

        let mut parser = ProgressParser::new();
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            parser.parse_line(&line);
            if total_duration.is_some() {
                let pct = offset + parser.progress_pct(total_duration) * span / 100.0;
                (self.emit)(JobEvent::Progress {
                    job_id: self.spec.id,
                    pct,
                });
            }
            if self.token.is_cancelled() {
                break;
            }
        }

        let status = match self.token.take() {
            Some(mut child) => child
                .wait()
                .map_err(|e| ToolError::Failed(format!("failed to wait for ffmpeg: {e}")))?,
            None => return Err(ToolError::Cancelled),
        };

        let stderr_output = stderr_thread.join().unwrap_or_default();

        if self.token.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        if !status.success() {
            return Err(ToolError::Failed(failure_message(&stderr_output, status)));
        }
        Ok(())
    }

    fn check_cancelled(&self) -> PipelineResult<()> {
        if self.token.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn status(&mut self, pct: f64, message: &str) {
        (self.emit)(JobEvent::Progress {
            job_id: self.spec.id,
            pct,
        });
        (self.emit)(JobEvent::Status {
            job_id: self.spec.id,
            message: message.to_string(),
        });
    }
}

fn step_error(e: ToolError, wrap: fn(String) -> PipelineError) -> PipelineError {
    match e {
        ToolError::Cancelled => PipelineError::Cancelled,
        ToolError::Failed(msg) => wrap(msg),
    }
}

/// Condense an ffmpeg stderr dump into a short human-readable message.
fn failure_message(stderr: &str, status: std::process::ExitStatus) -> String {
    let tail: Vec<&str> = stderr
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .take(4)
        .collect();

    if tail.is_empty() {
        format!("ffmpeg exited with {status}")
    } else {
        let mut lines: Vec<&str> = tail.into_iter().rev().collect();
        lines.dedup();
        format!("ffmpeg exited with {status}: {}", lines.join(" | "))
    }
}

/// Write the concat demuxer manifest. Single quotes inside paths use
/// the demuxer's '\'' escape.
fn write_concat_manifest(path: &Path, segments: &[PathBuf]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', "'\\''");
        writeln!(file, "file '{escaped}'")?;
    }
    Ok(())
}

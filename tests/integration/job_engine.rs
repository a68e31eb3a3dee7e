// Engine behavior tests over fake ffmpeg/ffprobe executables.
//
// The fake tools append their argv to a log file and succeed, fail, or
// stall depending on the scenario, so queueing, cancellation and
// strategy escalation are all observable without a real ffmpeg.

use bookend::engine::{BinaryEnvironment, JobEngine, JobEvent, JobSpec, JobStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn spec(dir: &std::path::Path, name: &str) -> JobSpec {
    let mut spec = JobSpec::new(
        dir.join(format!("{name}.mp4")),
        dir.join(format!("{name}_out.mp4")),
    );
    spec.start_image = Some(dir.join("cover.png"));
    spec.start_duration = 1.0;
    spec
}

fn wait_terminal(engine: &JobEngine, job_id: uuid::Uuid, timeout: Duration) -> JobStatus {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let state = engine.job_state(job_id).expect("job should be registered");
        if state.status.is_terminal() {
            return state.status;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("job {job_id} did not reach a terminal state in time");
}

#[test]
fn test_submission_requires_an_image() {
    let env = Arc::new(BinaryEnvironment::from_paths(None, None, Vec::new()));
    let engine = JobEngine::new(env);

    let bare = JobSpec::new(PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/out.mp4"));
    assert!(engine.submit(bare).is_err());
    assert!(engine.snapshot().is_empty());
}

#[cfg(unix)]
mod with_fake_tools {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write an executable shell script and return its path.
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A fake ffmpeg that logs its argv and exits 0.
    fn logging_ffmpeg(dir: &Path, log: &Path) -> PathBuf {
        write_script(
            dir,
            "ffmpeg",
            &format!("echo \"$@\" >> {}\nexit 0\n", log.display()),
        )
    }

    fn env_with(ffmpeg: PathBuf) -> Arc<BinaryEnvironment> {
        Arc::new(BinaryEnvironment::from_paths(Some(ffmpeg), None, Vec::new()))
    }

    #[test]
    fn test_jobs_run_fifo_and_complete() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("invocations.log");
        let ffmpeg = logging_ffmpeg(tmp.path(), &log);
        let engine = JobEngine::new(env_with(ffmpeg));

        let first = engine.submit(spec(tmp.path(), "first")).unwrap();
        let second = engine.submit(spec(tmp.path(), "second")).unwrap();

        assert_eq!(wait_terminal(&engine, first, Duration::from_secs(10)), JobStatus::Done);
        assert_eq!(wait_terminal(&engine, second, Duration::from_secs(10)), JobStatus::Done);

        let state = engine.job_state(first).unwrap();
        assert_eq!(state.progress_pct, 100.0);
        assert_eq!(
            state.output_path,
            Some(tmp.path().join("first_out.mp4")),
            "completion carries the output path"
        );

        // With concurrency 1 the first job's invocations all precede
        // the second's.
        let contents = fs::read_to_string(&log).unwrap();
        let first_last = contents
            .lines()
            .enumerate()
            .filter(|(_, l)| l.contains("first.mp4") || l.contains("first_out.mp4"))
            .map(|(i, _)| i)
            .max()
            .unwrap();
        let second_first = contents
            .lines()
            .enumerate()
            .filter(|(_, l)| l.contains("second.mp4") || l.contains("second_out.mp4"))
            .map(|(i, _)| i)
            .min()
            .unwrap();
        assert!(first_last < second_first, "jobs must not interleave");
    }

    #[test]
    fn test_cancel_queued_job_never_spawns_a_binary() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("invocations.log");
        // First job stalls so the second stays queued.
        let ffmpeg = write_script(
            tmp.path(),
            "ffmpeg",
            &format!(
                "echo \"$@\" >> {}\nexec sleep 30\n",
                log.display()
            ),
        );
        let engine = JobEngine::new(env_with(ffmpeg));

        let running = engine.submit(spec(tmp.path(), "running")).unwrap();
        let queued = engine.submit(spec(tmp.path(), "queued")).unwrap();
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.queued_count(), 1);

        assert!(engine.cancel(queued));
        let state = engine.job_state(queued).unwrap();
        assert_eq!(state.status, JobStatus::Cancelled);

        // Cancel the stalled job too; its child is killed rather than
        // waited out, so this returns well before the 30s sleep.
        let started = Instant::now();
        assert!(engine.cancel(running));
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "cancelling a running job must kill the external process"
        );
        assert_eq!(
            engine.job_state(running).unwrap().status,
            JobStatus::Cancelled
        );

        // The queued job's files never reached the fake ffmpeg.
        let contents = fs::read_to_string(&log).unwrap_or_default();
        assert!(
            !contents.contains("queued.mp4"),
            "cancelled queued job must not invoke any binary"
        );
    }

    #[test]
    fn test_concat_failure_escalates_to_reencode() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("invocations.log");
        // Fail only the concat invocation; everything else succeeds.
        let ffmpeg = write_script(
            tmp.path(),
            "ffmpeg",
            &format!(
                "echo \"$@\" >> {}\ncase \"$*\" in *\" concat\"*) exit 1;; esac\nexit 0\n",
                log.display()
            ),
        );
        let engine = JobEngine::new(env_with(ffmpeg));

        let job_id = engine.submit(spec(tmp.path(), "clip")).unwrap();
        assert_eq!(
            wait_terminal(&engine, job_id, Duration::from_secs(10)),
            JobStatus::Done,
            "a concat failure must fall back to the re-encode, not fail"
        );

        let contents = fs::read_to_string(&log).unwrap();
        assert!(
            contents.lines().any(|l| l.contains("-filter_complex")),
            "fallback re-encode must have run"
        );
        assert!(
            contents.lines().any(|l| l.contains("h264_mp4toannexb")),
            "fast path was attempted first"
        );
    }

    #[test]
    fn test_transcode_failure_is_terminal() {
        let tmp = TempDir::new().unwrap();
        // Everything fails: fast path escalates, fallback fails, job errors.
        let ffmpeg = write_script(tmp.path(), "ffmpeg", "exit 1\n");
        let engine = JobEngine::new(env_with(ffmpeg));

        let job_id = engine.submit(spec(tmp.path(), "doomed")).unwrap();
        assert_eq!(
            wait_terminal(&engine, job_id, Duration::from_secs(10)),
            JobStatus::Error
        );

        let state = engine.job_state(job_id).unwrap();
        assert!(state.error.unwrap().contains("re-encode failed"));
    }

    #[test]
    fn test_direct_reencode_when_remux_disabled() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("invocations.log");
        let ffmpeg = logging_ffmpeg(tmp.path(), &log);
        let engine = JobEngine::new(env_with(ffmpeg));

        let mut job = spec(tmp.path(), "direct");
        job.prefer_remux = false;
        let job_id = engine.submit(job).unwrap();
        assert_eq!(
            wait_terminal(&engine, job_id, Duration::from_secs(10)),
            JobStatus::Done
        );

        let contents = fs::read_to_string(&log).unwrap();
        assert!(contents.lines().any(|l| l.contains("-filter_complex")));
        assert!(
            !contents.contains("mpegts"),
            "no transport-stream steps when remux is disabled"
        );
    }

    #[test]
    fn test_events_arrive_in_pipeline_order() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("invocations.log");
        let ffmpeg = logging_ffmpeg(tmp.path(), &log);
        let engine = JobEngine::new(env_with(ffmpeg));

        let job_id = engine.submit(spec(tmp.path(), "clip")).unwrap();

        let mut statuses = Vec::new();
        let mut last_pct = 0.0f64;
        for event in engine.events().iter() {
            match event {
                JobEvent::Status { message, .. } => statuses.push(message),
                JobEvent::Progress { pct, .. } => {
                    // per-job event order implies monotonic step anchors
                    if pct > last_pct {
                        last_pct = pct;
                    }
                }
                JobEvent::Finished { job_id: id, .. } => {
                    assert_eq!(id, job_id);
                    break;
                }
                JobEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
                _ => {}
            }
        }

        let joined = statuses.join("\n");
        let probing = joined.find("Probing source video").unwrap();
        let remuxing = joined.find("Remuxing source").unwrap();
        let intro = joined.find("Encoding intro image segment").unwrap();
        let concat = joined.find("Concatenating segments").unwrap();
        assert!(probing < remuxing && remuxing < intro && intro < concat);
        assert!(last_pct >= 100.0 - 1e-9);
    }
}

use crate::cli::{Cli, Commands};
use bookend::config::Config;
use bookend::engine::{
    BinaryEnvironment, JobEngine, JobEvent, JobSpec, probe_media, scan_and_match,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use uuid::Uuid;

pub fn run(cli: Cli) {
    match cli.command {
        Commands::Process {
            video,
            start_image,
            end_image,
            start_duration,
            end_duration,
            output,
            no_remux,
            no_hardware,
        } => handle_process(
            video,
            start_image,
            end_image,
            start_duration,
            end_duration,
            output,
            no_remux,
            no_hardware,
        ),
        Commands::Batch {
            video_dir,
            image_dir,
            output_dir,
            duration,
            no_remux,
            no_hardware,
            dry_run,
        } => handle_batch(
            video_dir, image_dir, output_dir, duration, no_remux, no_hardware, dry_run,
        ),
        Commands::Probe { file } => handle_probe(file),
        Commands::CheckFfmpeg => handle_check_ffmpeg(),
        Commands::InitConfig => handle_init_config(),
    }
}

/// Default single-job output: processed_<basename>.mp4 next to the source.
fn default_output_path(video: &Path) -> PathBuf {
    let base = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = format!("processed_{base}.mp4");
    match video.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_process(
    video: PathBuf,
    start_image: Option<PathBuf>,
    end_image: Option<PathBuf>,
    start_duration: f64,
    end_duration: f64,
    output: Option<PathBuf>,
    no_remux: bool,
    no_hardware: bool,
) {
    if start_image.is_none() && end_image.is_none() {
        eprintln!("Error: at least one of --start-image/--end-image is required");
        process::exit(2);
    }

    let config = Config::load().unwrap_or_default();
    let output = output.unwrap_or_else(|| default_output_path(&video));

    let mut spec = JobSpec::new(video, output);
    spec.start_image = start_image;
    spec.start_duration = start_duration;
    spec.end_image = end_image;
    spec.end_duration = end_duration;
    spec.prefer_remux = config.defaults.prefer_remux && !no_remux;
    spec.use_hardware = config.defaults.use_hardware && !no_hardware;

    let env = Arc::new(BinaryEnvironment::resolve());
    let engine = JobEngine::new(env);

    let job_id = match engine.submit(spec) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    if !drive(&engine, [job_id].into()) {
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_batch(
    video_dir: PathBuf,
    image_dir: PathBuf,
    output_dir: PathBuf,
    duration: Option<f64>,
    no_remux: bool,
    no_hardware: bool,
    dry_run: bool,
) {
    let config = Config::load().unwrap_or_default();
    let image_duration = duration.unwrap_or(config.defaults.image_duration);

    let pairs = scan_and_match(&video_dir, &image_dir);
    if pairs.is_empty() {
        eprintln!(
            "No video/image pairs found in {} and {}",
            video_dir.display(),
            image_dir.display()
        );
        process::exit(1);
    }

    for pair in &pairs {
        println!(
            "{} + {} -> {}",
            pair.video.display(),
            pair.image.display(),
            pair.output_name
        );
    }
    println!("Total pairs: {}", pairs.len());

    if dry_run {
        return;
    }

    let env = Arc::new(BinaryEnvironment::resolve());
    let engine = JobEngine::with_workers(env, config.defaults.max_workers.max(1) as usize);

    let mut submitted = HashSet::new();
    for pair in pairs {
        // Batch mode shows the matched image on both ends
        let mut spec = JobSpec::new(pair.video, output_dir.join(&pair.output_name));
        spec.start_image = Some(pair.image.clone());
        spec.start_duration = image_duration;
        spec.end_image = Some(pair.image);
        spec.end_duration = image_duration;
        spec.prefer_remux = config.defaults.prefer_remux && !no_remux;
        spec.use_hardware = config.defaults.use_hardware && !no_hardware;

        match engine.submit(spec) {
            Ok(id) => {
                submitted.insert(id);
            }
            Err(e) => eprintln!("Error submitting job: {e}"),
        }
    }

    if !drive(&engine, submitted) {
        process::exit(1);
    }
}

/// Consume the engine's event stream until every submitted job reaches
/// a terminal state. Returns false if any job failed.
fn drive(engine: &JobEngine, mut pending: HashSet<Uuid>) -> bool {
    let total = pending.len();
    let mut all_ok = true;

    while !pending.is_empty() {
        let event = match engine.events().recv() {
            Ok(event) => event,
            Err(_) => break,
        };

        let short_id = short_id(event.job_id());
        match event {
            JobEvent::Started { .. } => {}
            JobEvent::Status { message, .. } => {
                println!("[{short_id}] {message}");
            }
            JobEvent::Progress { pct, .. } => {
                print!("\r[{short_id}] {pct:.0}%");
                use std::io::Write;
                std::io::stdout().flush().ok();
            }
            JobEvent::Finished {
                job_id,
                output_path,
            } => {
                println!("\n[{short_id}] Done: {}", output_path.display());
                pending.remove(&job_id);
            }
            JobEvent::Failed { job_id, error } => {
                eprintln!("\n[{short_id}] Error: {error}");
                pending.remove(&job_id);
                all_ok = false;
            }
            JobEvent::Cancelled { job_id } => {
                println!("\n[{short_id}] Cancelled");
                pending.remove(&job_id);
            }
        }
    }

    if total > 1 {
        println!(
            "{} succeeded, {} did not",
            engine
                .snapshot()
                .iter()
                .filter(|(_, s)| s.status == bookend::engine::JobStatus::Done)
                .count(),
            engine
                .snapshot()
                .iter()
                .filter(|(_, s)| s.status != bookend::engine::JobStatus::Done)
                .count(),
        );
    }

    all_ok
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn handle_probe(file: PathBuf) {
    let env = BinaryEnvironment::resolve();
    if env.ffprobe_path().is_none() {
        eprintln!("Error: ffprobe not found (set FFPROBE_BIN or install it on PATH)");
        process::exit(1);
    }

    let info = probe_media(&env, &file);
    if info.video_codec.is_none() && info.duration == 0.0 {
        eprintln!("Error: could not probe {}", file.display());
        process::exit(1);
    }

    println!("Video codec:  {}", info.video_codec.as_deref().unwrap_or("-"));
    println!("Resolution:   {}x{}", info.width, info.height);
    println!("Pixel format: {}", info.pix_fmt.as_deref().unwrap_or("-"));
    println!("Frame rate:   {:.3} fps", info.fps);
    println!("Duration:     {:.2} s", info.duration);
    if info.has_audio {
        println!(
            "Audio:        {} @ {} Hz, {} ch",
            info.audio_codec.as_deref().unwrap_or("-"),
            info.audio_sample_rate,
            info.audio_channels
        );
    } else {
        println!("Audio:        none");
    }
}

fn handle_check_ffmpeg() {
    let env = BinaryEnvironment::resolve();

    match env.ffmpeg_path() {
        Some(path) => println!("ffmpeg:  {}", path.display()),
        None => println!("ffmpeg:  NOT FOUND (set FFMPEG_BIN or install it on PATH)"),
    }
    match env.ffprobe_path() {
        Some(path) => println!("ffprobe: {}", path.display()),
        None => println!("ffprobe: NOT FOUND (set FFPROBE_BIN or install it on PATH)"),
    }

    if env.hardware_encoders().is_empty() {
        println!("Hardware encoders: none detected");
    } else {
        println!("Hardware encoders: {}", env.hardware_encoders().join(", "));
    }
    if let Some(encoder) = env.preferred_hardware_encoder() {
        println!("Fallback re-encode would use: {encoder}");
    }

    if env.ffmpeg_path().is_none() || env.ffprobe_path().is_none() {
        process::exit(1);
    }
}

fn handle_init_config() {
    match Config::config_path() {
        Ok(path) if path.exists() => {
            println!("Config exists at {}", path.display());
            match Config::load() {
                Ok(cfg) => println!("{cfg:#?}"),
                Err(e) => {
                    eprintln!("Config is invalid: {e:#}");
                    process::exit(1);
                }
            }
        }
        Ok(path) => {
            if let Err(e) = Config::ensure_default() {
                eprintln!("Failed to create default config: {e:#}");
                process::exit(1);
            }
            println!("Default config saved to {}", path.display());
        }
        Err(e) => {
            eprintln!("Could not determine config path: {e:#}");
            process::exit(1);
        }
    }
}

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use cli::Cli;
use tonebank::audio::decode;
use tonebank::audio::source::{BufferSource, ChannelSource, ToneSource};
use tonebank::audio::{RawBlock, SampleSource};
use tonebank::config::{self, AudioConfig, Config, SUPPORTED_SAMPLE_RATES};
use tonebank::dsp::calibration::CalibrationResult;
use tonebank::engine::runtime::{self, Clock, EngineEvent};
use tonebank::sink::FrameSink;
use tonebank::{persist, Engine};

/// Blocks the paced player may queue ahead of the engine.
const PLAYER_QUEUE_DEPTH: usize = 8;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    // Merge: config values apply only when CLI is at its default
    if cli.render_fps == 60 { cli.render_fps = cfg.output.render_fps; }
    if cli.frames.is_none() { cli.frames = cfg.output.frames.clone(); }
    if cli.profile.is_none() { cli.profile = cfg.output.profile.clone(); }
    let mut engine_cfg = cfg.engine;
    if cli.sample_rate != 16_000 { engine_cfg.audio.sample_rate = cli.sample_rate; }
    if let Some(mood) = cli.mood { engine_cfg.spectrum.mood = mood; }
    if cli.no_agc { engine_cfg.agc.enabled = false; }

    // 1. Build the input
    let (source, label) = match (&cli.input, cli.tone) {
        (Some(input), _) => {
            if !input.exists() {
                anyhow::bail!("Input file not found: {}", input.display());
            }
            log::info!("Decoding audio...");
            let recording = decode::decode_file(input)?;
            check_sample_rate(recording.sample_rate)?;
            engine_cfg.audio.sample_rate = recording.sample_rate;
            log::info!("Duration: {:.1}s @ {}Hz", recording.duration_secs(), recording.sample_rate);
            (recording.into_source(), input.display().to_string())
        }
        (None, Some(freq)) => {
            check_sample_rate(engine_cfg.audio.sample_rate)?;
            let sample_rate = engine_cfg.audio.sample_rate;
            let len = (cli.duration.max(0.0) * sample_rate as f32) as usize;
            let mut words = vec![0; len];
            ToneSource::new(freq, cli.amplitude, sample_rate).read(&mut words, Duration::ZERO);
            (BufferSource::new(words), format!("{:.1}Hz tone for {:.1}s", freq, cli.duration))
        }
        (None, None) => anyhow::bail!("Either an input audio file or --tone is required"),
    };

    // Decoded and synthesized audio carry no microphone bias.
    if engine_cfg.audio.dc_offset == AudioConfig::default().dc_offset {
        engine_cfg.audio.dc_offset = 0;
    }

    log::info!("tonebank - Goertzel spectrum engine");
    log::info!("Input: {}", label);

    // 2. Engine and noise profile
    let mut engine = Engine::new(engine_cfg).context("Failed to initialize engine")?;
    let profile_path = cli.profile.clone().or_else(persist::default_profile_path);
    if cli.calibrate {
        engine.start_calibration()?;
    } else if let Some(path) = profile_path.as_deref().filter(|p| p.exists()) {
        match persist::load_profile(path) {
            Ok(profile) => engine.restore_noise_profile(profile),
            Err(err) => log::warn!("{:#}", err),
        }
        let levels_path = persist::levels_path(path);
        if levels_path.exists() {
            match persist::load_levels(&levels_path) {
                Ok(levels) => engine.restore_calibrated_levels(levels),
                Err(err) => log::warn!("{:#}", err),
            }
        }
    }

    let chunk = engine.config().audio.samples_per_chunk;
    let total_cycles = source.len().div_ceil(chunk) as u64;
    let pb = ProgressBar::new(total_cycles);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} cycles ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut sink = cli.frames.as_deref().map(FrameSink::create).transpose()?;

    // 3. Run
    let engine = if cli.realtime {
        run_realtime(engine, source, cli.render_fps, profile_path.as_deref(), &mut sink, &pb)?
    } else {
        run_offline(engine, source, cli.render_fps, profile_path.as_deref(), &mut sink, &pb)?
    };
    pb.finish_with_message("Analysis complete");

    // 4. Report
    if let Some(sink) = sink {
        let frames = sink.frames();
        sink.finish()?;
        if let Some(ref path) = cli.frames {
            log::info!("Wrote {} frames to {}", frames, path.display());
        }
    }
    let report = engine.diagnostics().report();
    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    log::info!(
        "Done! {} cycles, {} overruns, {} underruns, {} zone transitions",
        report.cycles, report.overruns, report.underruns, report.zone_transitions
    );
    Ok(())
}

/// Process the whole input on this thread, timestamped by samples consumed,
/// writing a frame every `cycle_rate / render_fps` cycles.
fn run_offline(
    mut engine: Engine,
    mut source: BufferSource,
    render_fps: u32,
    profile_path: Option<&Path>,
    sink: &mut Option<FrameSink<std::io::BufWriter<std::fs::File>>>,
    pb: &ProgressBar,
) -> Result<Engine> {
    let stride = (engine.config().nominal_cycle_rate() / render_fps.max(1) as f32).round().max(1.0) as u64;
    let mut block = RawBlock::new(engine.config().audio.samples_per_chunk);

    while !source.is_exhausted() {
        let t_now_ms = engine.elapsed_ms();
        let outcome = engine.process_cycle(&mut source, &mut block, t_now_ms);
        if let Some(result) = outcome.calibration {
            calibration_done(&result, profile_path)?;
        }
        if let Some(sink) = sink.as_mut() {
            if engine.cycles() % stride == 0 {
                sink.write_frame(&engine.snapshot())?;
            }
        }
        pb.inc(1);
    }
    Ok(engine)
}

/// Feed the input through a paced player thread into the engine thread and
/// sample snapshots at `render_fps` on this one.
fn run_realtime(
    engine: Engine,
    mut source: BufferSource,
    render_fps: u32,
    profile_path: Option<&Path>,
    sink: &mut Option<FrameSink<std::io::BufWriter<std::fs::File>>>,
    pb: &ProgressBar,
) -> Result<Engine> {
    let chunk = engine.config().audio.samples_per_chunk;
    let period = Duration::from_secs_f64(chunk as f64 / engine.config().audio.sample_rate as f64);
    let (tx, rx) = bounded::<Vec<i32>>(PLAYER_QUEUE_DEPTH);

    let player = thread::Builder::new()
        .name("tonebank-player".into())
        .spawn(move || {
            let started = Instant::now();
            let mut sent: u32 = 0;
            while !source.is_exhausted() {
                let mut block = vec![0; chunk];
                let n = source.read(&mut block, Duration::ZERO);
                block.truncate(n);
                if let Some(wait) = (started + period * sent).checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
                if tx.send(block).is_err() {
                    break;
                }
                sent += 1;
            }
        })
        .context("Failed to start player thread")?;

    let mut handle = runtime::spawn(engine, Box::new(ChannelSource::new(rx)), Clock::Wall)
        .context("Failed to start engine thread")?;

    // The event channel hands over everything queued before it reports the
    // engine thread gone, so waiting on it (not on the thread) loses nothing.
    let frame_interval = Duration::from_secs_f64(1.0 / render_fps.max(1) as f64);
    let mut last_cycle = 0;
    loop {
        let done = match handle.events().recv_timeout(frame_interval) {
            Ok(EngineEvent::CalibrationComplete(result)) => {
                calibration_done(&result, profile_path)?;
                false
            }
            Ok(EngineEvent::ConfigFaults(faults)) => {
                log::warn!("{} config faults", faults.len());
                false
            }
            Ok(EngineEvent::SourceEnded { cycles }) => {
                log::debug!("Source ended after {} cycles", cycles);
                true
            }
            Ok(other) => {
                log::debug!("Engine event: {:?}", other);
                false
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        };

        let snap = handle.snapshots().read();
        if snap.cycle != last_cycle {
            last_cycle = snap.cycle;
            pb.set_position(snap.cycle);
            if let Some(sink) = sink.as_mut() {
                sink.write_frame(snap)?;
            }
        }
        if done {
            break;
        }
    }

    if player.join().is_err() {
        log::warn!("Player thread panicked");
    }
    handle
        .wait()
        .map_err(|_| anyhow::anyhow!("Engine thread panicked"))
}

fn check_sample_rate(sample_rate: u32) -> Result<()> {
    if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
        anyhow::bail!("Unsupported sample rate {}Hz (supported: {:?})", sample_rate, SUPPORTED_SAMPLE_RATES);
    }
    Ok(())
}

fn calibration_done(result: &CalibrationResult, profile_path: Option<&Path>) -> Result<()> {
    log::info!(
        "Calibration complete: min level {:.0}, VU floor {:.3}, DC offset {}",
        result.sweet_spot_min_level, result.vu_level_floor, result.dc_offset
    );
    match profile_path {
        Some(path) => {
            persist::save_profile(path, &result.profile)?;
            persist::save_levels(&persist::levels_path(path), &result.levels())
        }
        None => {
            log::warn!("No config directory; calibration not saved");
            Ok(())
        }
    }
}

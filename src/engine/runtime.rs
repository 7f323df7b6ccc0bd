//! Dedicated real-time thread around an [`Engine`].
//!
//! Commands are drained between cycles only, so a cycle never observes a
//! half-applied change. Results leave through the snapshot triple buffer and
//! an event channel.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use super::snapshot::{snapshot_channel, SnapshotReader};
use super::{Diagnostics, Engine};
use crate::audio::{RawBlock, SampleSource, MAX_CHUNK_SIZE};
use crate::config::{ConfigFault, EngineConfig};
use crate::dsp::calibration::CalibrationResult;
use crate::dsp::NoiseProfile;
use crate::error::CalibrationError;

#[derive(Debug)]
pub enum EngineCommand {
    StartCalibration,
    AbortCalibration,
    ApplyConfig(Box<EngineConfig>),
    RestoreProfile(Box<NoiseProfile>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    CalibrationStarted,
    CalibrationComplete(Box<CalibrationResult>),
    CalibrationAborted,
    CalibrationRejected(CalibrationError),
    ConfigFaults(Vec<ConfigFault>),
    /// A finite source ran dry; the thread exits after sending this.
    SourceEnded { cycles: u64 },
}

/// Where cycle timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Milliseconds since the thread started.
    Wall,
    /// Milliseconds of audio consumed; deterministic for offline playback.
    Samples,
}

pub struct EngineHandle {
    commands: Sender<EngineCommand>,
    events: Receiver<EngineEvent>,
    snapshots: SnapshotReader,
    diagnostics: Arc<Diagnostics>,
    join: Option<JoinHandle<Engine>>,
}

/// Move `engine` onto its own thread, reading from `source`.
pub fn spawn(mut engine: Engine, mut source: Box<dyn SampleSource + Send>, clock: Clock) -> std::io::Result<EngineHandle> {
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let (publisher, snapshots) = snapshot_channel();
    engine.attach_publisher(publisher);
    let diagnostics = engine.diagnostics();

    let join = thread::Builder::new()
        .name("tonebank-engine".into())
        .spawn(move || {
            run_loop(&mut engine, source.as_mut(), &command_rx, &event_tx, clock);
            engine
        })?;

    Ok(EngineHandle {
        commands: command_tx,
        events: event_rx,
        snapshots,
        diagnostics,
        join: Some(join),
    })
}

/// Apply one command. Returns false on shutdown.
fn handle_command(engine: &mut Engine, command: EngineCommand, events: &Sender<EngineEvent>) -> bool {
    let event = match command {
        EngineCommand::StartCalibration => match engine.start_calibration() {
            Ok(()) => EngineEvent::CalibrationStarted,
            Err(err) => EngineEvent::CalibrationRejected(err),
        },
        EngineCommand::AbortCalibration => match engine.abort_calibration() {
            Ok(()) => EngineEvent::CalibrationAborted,
            Err(err) => EngineEvent::CalibrationRejected(err),
        },
        EngineCommand::ApplyConfig(config) => {
            let faults = engine.apply_config(*config);
            if faults.is_empty() {
                return true;
            }
            EngineEvent::ConfigFaults(faults)
        }
        EngineCommand::RestoreProfile(profile) => {
            engine.restore_noise_profile(*profile);
            return true;
        }
        EngineCommand::Shutdown => return false,
    };
    // Nobody listening is not an error for the real-time thread.
    let _ = events.send(event);
    true
}

fn run_loop(
    engine: &mut Engine,
    source: &mut dyn SampleSource,
    commands: &Receiver<EngineCommand>,
    events: &Sender<EngineEvent>,
    clock: Clock,
) {
    let started = Instant::now();
    let mut block = RawBlock::new(MAX_CHUNK_SIZE);

    'run: loop {
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if !handle_command(engine, command, events) {
                        break 'run;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'run,
            }
        }

        if source.is_exhausted() {
            log::info!("Source ended after {} cycles", engine.cycles());
            let _ = events.send(EngineEvent::SourceEnded { cycles: engine.cycles() });
            break;
        }

        let t_now_ms = match clock {
            Clock::Wall => started.elapsed().as_millis() as u64,
            Clock::Samples => engine.elapsed_ms(),
        };
        let outcome = engine.process_cycle(source, &mut block, t_now_ms);
        if let Some(result) = outcome.calibration {
            let _ = events.send(EngineEvent::CalibrationComplete(Box::new(result)));
        }
    }
    log::debug!("Engine thread stopping");
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    pub fn snapshots(&mut self) -> &mut SnapshotReader {
        &mut self.snapshots
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the thread and take the engine back.
    pub fn shutdown(mut self) -> thread::Result<Engine> {
        let _ = self.commands.send(EngineCommand::Shutdown);
        self.join_engine()
    }

    /// Wait for the thread to end on its own (finite sources).
    pub fn wait(mut self) -> thread::Result<Engine> {
        self.join_engine()
    }

    fn join_engine(&mut self) -> thread::Result<Engine> {
        match self.join.take() {
            Some(join) => join.join(),
            None => Err(Box::new("engine thread already joined") as Box<dyn Any + Send>),
        }
    }
}

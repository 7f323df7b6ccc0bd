//! The engine context: owns every pipeline stage and runs one cycle at a time.

pub mod diagnostics;
pub mod runtime;
pub mod snapshot;

use std::sync::Arc;
use std::time::Instant;

use crate::audio::{RawBlock, SampleSource, DEFAULT_READ_TIMEOUT};
use crate::config::{ConfigFault, EngineConfig};
use crate::dsp::agc::AgcController;
use crate::dsp::calibration::{CalibratedLevels, CalibrationResult, CalibrationSample, CalibrationSession};
use crate::dsp::chroma::Chromagram;
use crate::dsp::conditioner::{ConditionStats, Conditioner, ConditionerSettings};
use crate::dsp::follower::{FollowerInput, SpectralFollower};
use crate::dsp::history::HISTORY_CAPACITY;
use crate::dsp::vu::{VuEstimator, WaveformPeak};
use crate::dsp::zone::{ZoneInput, ZoneMachine, ZoneTransition};
use crate::dsp::{goertzel, BinTable, Fixed, NoiseProfile, Spectrogram};
use crate::error::{CalibrationError, EngineError};

pub use diagnostics::{Diagnostics, DiagnosticsReport};
pub use snapshot::{Snapshot, SnapshotPublisher, SnapshotReader};

/// Cycles between history/spectrogram integrity checks.
const INTEGRITY_INTERVAL: u64 = 128;

/// Denoised magnitude above which a bin counts as active.
const ACTIVE_BIN_THRESHOLD: f32 = 1.0;

/// What one cycle produced besides the published snapshot.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub stats: ConditionStats,
    pub transition: Option<ZoneTransition>,
    pub calibration: Option<CalibrationResult>,
}

pub struct Engine {
    config: EngineConfig,
    settings: ConditionerSettings,
    bins: BinTable,
    conditioner: Conditioner,
    spectrogram: Spectrogram,
    follower: SpectralFollower,
    chroma: Chromagram,
    agc: AgcController,
    vu: VuEstimator,
    peak: WaveformPeak,
    zone: ZoneMachine,
    noise_profile: NoiseProfile,
    calibration: Option<CalibrationSession>,
    calibrated: Option<CalibratedLevels>,
    diagnostics: Arc<Diagnostics>,
    publisher: Option<SnapshotPublisher>,
    cycle: u64,
    samples_processed: u64,
    last_t_ms: u64,
}

fn conditioner_settings(config: &EngineConfig) -> ConditionerSettings {
    ConditionerSettings {
        input_shift: config.audio.input_shift,
        dc_offset: config.audio.dc_offset,
        sensitivity: Fixed::from_f32(config.audio.sensitivity),
    }
}

impl Engine {
    /// Validate `config` and allocate every buffer the engine will use.
    pub fn new(mut config: EngineConfig) -> Result<Self, EngineError> {
        let faults = config.validate();
        let diagnostics = Arc::new(Diagnostics::new());
        diagnostics.record_config_faults(faults.len());

        let bins = BinTable::build(config.audio.sample_rate, config.spectrum.note_offset, HISTORY_CAPACITY);
        let conditioner = Conditioner::new(HISTORY_CAPACITY)?;

        log::info!(
            "Engine: {}Hz, {} samples/chunk ({:.0} cycles/s), {} bins from {:.1}Hz",
            config.audio.sample_rate,
            config.audio.samples_per_chunk,
            config.nominal_cycle_rate(),
            bins.valid_count(HISTORY_CAPACITY),
            bins.bins()[0].target_freq
        );

        Ok(Self {
            settings: conditioner_settings(&config),
            follower: SpectralFollower::new(config.spectrum.mood, config.nominal_cycle_rate()),
            agc: AgcController::new(&config.agc),
            bins,
            conditioner,
            spectrogram: Spectrogram::default(),
            chroma: Chromagram::new(),
            vu: VuEstimator::new(),
            peak: WaveformPeak::new(),
            zone: ZoneMachine::new(),
            noise_profile: NoiseProfile::default(),
            calibration: None,
            calibrated: None,
            diagnostics,
            publisher: None,
            cycle: 0,
            samples_processed: 0,
            last_t_ms: 0,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bins(&self) -> &BinTable {
        &self.bins
    }

    pub fn spectrogram(&self) -> &Spectrogram {
        &self.spectrogram
    }

    pub fn agc(&self) -> &AgcController {
        &self.agc
    }

    pub fn vu(&self) -> &VuEstimator {
        &self.vu
    }

    pub fn zone(&self) -> &ZoneMachine {
        &self.zone
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Audio time implied by the samples consumed so far.
    pub fn elapsed_ms(&self) -> u64 {
        self.samples_processed * 1_000 / self.config.audio.sample_rate as u64
    }

    /// Publish a snapshot to `publisher` at the end of every cycle.
    pub fn attach_publisher(&mut self, publisher: SnapshotPublisher) {
        self.publisher = Some(publisher);
    }

    /// Swap in a new configuration between cycles.
    ///
    /// The bin table is rebuilt only when the sample rate or note offset
    /// changed. Rejected fields fall back to defaults and are returned.
    /// Calibrated levels override whatever `config` says for them.
    pub fn apply_config(&mut self, mut config: EngineConfig) -> Vec<ConfigFault> {
        let faults = config.validate();
        self.diagnostics.record_config_faults(faults.len());
        if let Some(levels) = &self.calibrated {
            levels.apply(&mut config);
        }

        if config.audio.sample_rate != self.config.audio.sample_rate
            || config.spectrum.note_offset != self.config.spectrum.note_offset
        {
            self.bins = BinTable::build(config.audio.sample_rate, config.spectrum.note_offset, HISTORY_CAPACITY);
            self.spectrogram.reset();
            self.chroma.reset();
            log::info!(
                "Rebuilt bin table for {}Hz, note offset {}",
                config.audio.sample_rate,
                config.spectrum.note_offset
            );
        }
        self.follower.configure(config.spectrum.mood, config.nominal_cycle_rate());
        self.agc.configure(&config.agc);
        self.settings = conditioner_settings(&config);
        self.config = config;
        faults
    }

    pub fn noise_profile(&self) -> &NoiseProfile {
        &self.noise_profile
    }

    /// Replace the noise profile, e.g. with one loaded from disk.
    pub fn restore_noise_profile(&mut self, profile: NoiseProfile) {
        self.noise_profile = profile;
    }

    pub fn calibrated_levels(&self) -> Option<&CalibratedLevels> {
        self.calibrated.as_ref()
    }

    /// Reinstate levels from an earlier calibration, e.g. loaded from disk.
    pub fn restore_calibrated_levels(&mut self, levels: CalibratedLevels) {
        levels.apply(&mut self.config);
        self.settings = conditioner_settings(&self.config);
        self.calibrated = Some(levels);
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration_progress(&self) -> Option<f32> {
        self.calibration.as_ref().map(CalibrationSession::progress)
    }

    pub fn start_calibration(&mut self) -> Result<(), CalibrationError> {
        if self.calibration.is_some() {
            return Err(CalibrationError::AlreadyRunning);
        }
        let levels = &self.config.levels;
        self.calibration = Some(CalibrationSession::new(levels.sweet_spot_min_level, levels.vu_level_floor));
        log::info!("Noise calibration started, keep the room quiet");
        Ok(())
    }

    /// Drop the running calibration; the previous calibration stays in effect.
    pub fn abort_calibration(&mut self) -> Result<(), CalibrationError> {
        match self.calibration.take() {
            Some(session) => {
                log::info!("Noise calibration aborted after {} cycles", session.iteration());
                Ok(())
            }
            None => Err(CalibrationError::NotRunning),
        }
    }

    /// Read one chunk from `source` (bounded by the default timeout) and
    /// process it.
    pub fn process_cycle(&mut self, source: &mut dyn SampleSource, block: &mut RawBlock, t_now_ms: u64) -> CycleOutcome {
        block.set_requested(self.config.audio.samples_per_chunk);
        block.fill_from(source, DEFAULT_READ_TIMEOUT);
        self.process_block(block, t_now_ms)
    }

    /// Run the pipeline once: condition, Goertzel bank, follower, AGC, VU,
    /// zone, publish.
    pub fn process_block(&mut self, block: &RawBlock, t_now_ms: u64) -> CycleOutcome {
        let started = Instant::now();

        let stats = self.conditioner.process(block, &self.settings, self.agc.gain_fixed());
        if stats.underrun {
            self.diagnostics.record_underrun();
        }

        goertzel::process_bank(
            &self.bins,
            self.conditioner.history(),
            &mut self.spectrogram.raw,
            &mut self.spectrogram.normalized,
        );

        let calibrating = self.calibration.is_some();
        let input = FollowerInput {
            profile: (!calibrating).then_some(&self.noise_profile),
            a_weighting: self.config.spectrum.a_weighting,
        };
        self.follower.process(&mut self.spectrogram, &self.bins, input);
        self.chroma.update(
            &self.spectrogram.final_,
            self.config.spectrum.chromagram_range,
            self.bins.note_offset(),
        );

        self.agc.update(stats.pre_gain_rms);
        self.vu.update(
            self.conditioner.waveform_fixed(),
            self.agc.is_silent(),
            calibrating,
            self.config.levels.vu_level_floor,
        );

        let mut transition = None;
        let mut completed = None;
        match self.calibration.as_mut() {
            Some(session) => {
                self.zone.hold(stats.max_abs);
                completed = session.observe(CalibrationSample {
                    normalized: &self.spectrogram.normalized,
                    max_abs: stats.max_abs,
                    raw_mean: stats.raw_mean,
                    vu: self.vu.state().raw_level,
                });
            }
            None => {
                let levels = &self.config.levels;
                self.peak.update(stats.max_abs, levels.sweet_spot_min_level);
                transition = self.zone.update(&ZoneInput {
                    max_abs: stats.max_abs,
                    t_now_ms,
                    min_level: levels.sweet_spot_min_level,
                    max_level: levels.sweet_spot_max_level,
                    standby_dimming: self.config.display.standby_dimming,
                });
            }
        }
        if transition.is_some() {
            self.diagnostics.record_zone_transition();
        }
        if let Some(result) = &completed {
            self.commit_calibration(result, t_now_ms);
        }

        self.cycle += 1;
        self.samples_processed += block.requested() as u64;
        self.last_t_ms = t_now_ms;

        if self.cycle % INTEGRITY_INTERVAL == 0 {
            self.check_integrity();
        }

        let peak = self.spectrogram.peak_bin().map(|(bin, _)| (bin, self.bins.bins()[bin].target_freq));
        self.diagnostics.record_spectrum(
            self.spectrogram.active_bins(ACTIVE_BIN_THRESHOLD),
            peak,
            self.agc.gain(),
        );

        if self.publisher.is_some() {
            let snapshot = self.snapshot();
            if let Some(publisher) = self.publisher.as_mut() {
                publisher.publish(snapshot);
            }
        }

        let budget_us = block.requested() as u64 * 1_000_000 / self.config.audio.sample_rate as u64;
        self.diagnostics.record_cycle(started.elapsed().as_micros() as u64, budget_us);

        CycleOutcome {
            stats,
            transition,
            calibration: completed,
        }
    }

    /// Apply everything a finished calibration learned in one step.
    fn commit_calibration(&mut self, result: &CalibrationResult, t_now_ms: u64) {
        self.calibration = None;
        self.noise_profile = result.profile.clone();
        self.restore_calibrated_levels(result.levels());
        self.zone.reset(t_now_ms);
        self.diagnostics.record_calibration();
        log::info!(
            "Noise calibration complete: min level {:.0}, VU floor {:.3}, DC offset {}",
            result.sweet_spot_min_level,
            result.vu_level_floor,
            result.dc_offset
        );
    }

    /// Reinitialize the signal path if the history mirror diverged or a
    /// stage produced a non-finite value.
    fn check_integrity(&mut self) {
        let history_ok = self.conditioner.is_consistent();
        let spectrum_ok = self.spectrogram.is_finite();
        if history_ok && spectrum_ok {
            return;
        }
        log::warn!(
            "Integrity check failed at cycle {} (history {}, spectrum {}), reinitializing",
            self.cycle,
            if history_ok { "ok" } else { "corrupt" },
            if spectrum_ok { "ok" } else { "non-finite" }
        );
        self.conditioner.reset();
        self.spectrogram.reset();
        self.chroma.reset();
        self.vu.reset();
        self.diagnostics.record_integrity_fault();
    }

    pub fn snapshot(&self) -> Snapshot {
        let peak = self.spectrogram.peak_bin();
        let vu = self.vu.state();
        let agc = self.agc.state();
        let zone = self.zone.state();
        Snapshot {
            cycle: self.cycle,
            t_ms: self.last_t_ms,
            spectrum: self.spectrogram.final_,
            magnitudes: self.spectrogram.normalized,
            chromagram: *self.chroma.notes(),
            novelty: self.chroma.novelty(),
            vu: vu.level,
            vu_average: vu.average,
            waveform_peak: self.peak.scaled(),
            zone: zone.zone,
            silent_scale: zone.silent_scale,
            extended_silence: zone.extended_silence,
            agc_gain: agc.gain,
            silence_gate: agc.silence_gate,
            calibrating: self.calibration.is_some(),
            calibration_progress: self.calibration_progress().unwrap_or(0.0),
            peak_bin: peak.map(|(bin, _)| bin),
            peak_hz: peak.map_or(0.0, |(bin, _)| self.bins.bins()[bin].target_freq),
        }
    }
}

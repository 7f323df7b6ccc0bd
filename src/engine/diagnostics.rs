use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

const NO_PEAK: u32 = u32::MAX;

/// Counters shared with observers. All updates are relaxed atomics; readers
/// may see values from slightly different cycles.
#[derive(Debug)]
pub struct Diagnostics {
    cycles: AtomicU64,
    last_cycle_us: AtomicU64,
    max_cycle_us: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    integrity_faults: AtomicU64,
    config_faults: AtomicU64,
    zone_transitions: AtomicU64,
    calibrations: AtomicU64,
    active_bins: AtomicU32,
    peak_bin: AtomicU32,
    peak_hz_bits: AtomicU32,
    agc_gain_bits: AtomicU32,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            last_cycle_us: AtomicU64::new(0),
            max_cycle_us: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            integrity_faults: AtomicU64::new(0),
            config_faults: AtomicU64::new(0),
            zone_transitions: AtomicU64::new(0),
            calibrations: AtomicU64::new(0),
            active_bins: AtomicU32::new(0),
            peak_bin: AtomicU32::new(NO_PEAK),
            peak_hz_bits: AtomicU32::new(0),
            agc_gain_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub cycles: u64,
    pub last_cycle_us: u64,
    pub max_cycle_us: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub integrity_faults: u64,
    pub config_faults: u64,
    pub zone_transitions: u64,
    pub calibrations: u64,
    pub active_bins: u32,
    pub peak_bin: Option<u32>,
    pub peak_hz: f32,
    pub agc_gain: f32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero budget (an empty block) never counts as an overrun.
    pub(crate) fn record_cycle(&self, elapsed_us: u64, budget_us: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_us.store(elapsed_us, Ordering::Relaxed);
        self.max_cycle_us.fetch_max(elapsed_us, Ordering::Relaxed);
        if budget_us > 0 && elapsed_us > budget_us {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_integrity_fault(&self) {
        self.integrity_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_config_faults(&self, count: usize) {
        self.config_faults.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_zone_transition(&self) {
        self.zone_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_calibration(&self) {
        self.calibrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spectrum(&self, active_bins: usize, peak: Option<(usize, f32)>, agc_gain: f32) {
        self.active_bins.store(active_bins as u32, Ordering::Relaxed);
        match peak {
            Some((bin, hz)) => {
                self.peak_bin.store(bin as u32, Ordering::Relaxed);
                self.peak_hz_bits.store(hz.to_bits(), Ordering::Relaxed);
            }
            None => {
                self.peak_bin.store(NO_PEAK, Ordering::Relaxed);
                self.peak_hz_bits.store(0, Ordering::Relaxed);
            }
        }
        self.agc_gain_bits.store(agc_gain.to_bits(), Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> DiagnosticsReport {
        let peak_bin = self.peak_bin.load(Ordering::Relaxed);
        DiagnosticsReport {
            cycles: self.cycles.load(Ordering::Relaxed),
            last_cycle_us: self.last_cycle_us.load(Ordering::Relaxed),
            max_cycle_us: self.max_cycle_us.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            integrity_faults: self.integrity_faults.load(Ordering::Relaxed),
            config_faults: self.config_faults.load(Ordering::Relaxed),
            zone_transitions: self.zone_transitions.load(Ordering::Relaxed),
            calibrations: self.calibrations.load(Ordering::Relaxed),
            active_bins: self.active_bins.load(Ordering::Relaxed),
            peak_bin: (peak_bin != NO_PEAK).then_some(peak_bin),
            peak_hz: f32::from_bits(self.peak_hz_bits.load(Ordering::Relaxed)),
            agc_gain: f32::from_bits(self.agc_gain_bits.load(Ordering::Relaxed)),
        }
    }
}

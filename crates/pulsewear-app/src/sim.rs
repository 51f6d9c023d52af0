//! Simulated wrist hardware
//!
//! Synthetic PPG and gait sources stand in for the MAX30102 and MPU6050, and
//! a stdout link stands in for the BLE notify characteristic. The monitor is
//! driven on simulated time, so a ten-minute run takes milliseconds.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io::Write;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use pulsewear_core::anomaly::{AnomalyScorer, NoScorer, NormalizedVitals};
use pulsewear_core::config::Periodic;
use pulsewear_core::profile::{submit, SettingsQueue};
use pulsewear_core::{
    AccelSource, DefaultMonitor, Devices, OpticalSource, PipelineConfig, PipelineCounters, ProfileWrite,
    RawAccelSample, RawOpticalSample, Transport,
};

/// Accelerometer counts for 1 g at ±2 g full scale
const ONE_G: i16 = 16_384;

/// Simulated interval between counter dumps
const COUNTER_DUMP_PERIOD_MS: u64 = 10_000;

// ============================================================================
// Sources
// ============================================================================

/// PPG with a sinusoidal pulse on a constant DC level.
#[derive(Debug)]
pub struct SyntheticPpg {
    bpm: f64,
    sample_period_ms: u64,
    next_sample_ms: u64,
    index: u64,
    dc: f64,
    amplitude: f64,
    red_ratio: f64,
    on_wrist: bool,
    fifo: VecDeque<RawOpticalSample>,
}

impl SyntheticPpg {
    /// Pulse at `bpm` sampled at `sample_rate_hz`
    pub fn new(bpm: f32, sample_rate_hz: u32) -> Self {
        Self {
            bpm: f64::from(bpm),
            sample_period_ms: u64::from(1000 / sample_rate_hz.max(1)),
            next_sample_ms: 0,
            index: 0,
            dc: 100_000.0,
            amplitude: 500.0,
            red_ratio: 0.6,
            on_wrist: true,
            fifo: VecDeque::new(),
        }
    }

    /// Take the sensor off or put it back on
    pub fn set_on_wrist(&mut self, on_wrist: bool) {
        self.on_wrist = on_wrist;
    }

    /// Queue every sample due up to `now_ms`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn advance_to(&mut self, now_ms: u64) {
        while self.next_sample_ms <= now_ms {
            let t = self.next_sample_ms as f64 / 1000.0;
            let sample = if self.on_wrist {
                let pulse = (2.0 * PI * self.bpm / 60.0 * t).sin() * self.amplitude;
                let noise = (self.index as f64 * 0.123).sin() * 10.0; // Pseudo-noise
                let ir = self.dc + pulse + noise;
                RawOpticalSample::new(ir as u32, (ir * self.red_ratio) as u32)
            } else {
                RawOpticalSample::new(1_200, 900)
            };
            self.fifo.push_back(sample);
            self.index += 1;
            self.next_sample_ms += self.sample_period_ms;
        }
    }
}

impl OpticalSource for SyntheticPpg {
    fn read_optical(&mut self) -> Option<RawOpticalSample> {
        self.fifo.pop_front()
    }
}

/// Gravity on Z with a short jolt once per step.
#[derive(Debug)]
pub struct SyntheticGait {
    step_period_ms: Option<u64>,
    next_step_ms: u64,
    now_ms: u64,
}

impl SyntheticGait {
    /// Walk at `cadence_spm` steps per minute (0 = standing still)
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(cadence_spm: f32) -> Self {
        let step_period_ms = (cadence_spm > 0.0).then(|| (60_000.0 / cadence_spm) as u64);
        Self {
            step_period_ms,
            next_step_ms: step_period_ms.unwrap_or(0),
            now_ms: 0,
        }
    }

    /// Move simulated time forward
    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }
}

impl AccelSource for SyntheticGait {
    fn read_accel(&mut self) -> RawAccelSample {
        match self.step_period_ms {
            Some(period) if self.now_ms >= self.next_step_ms => {
                self.next_step_ms += period;
                RawAccelSample::new(300, -200, ONE_G + ONE_G / 2)
            }
            _ => RawAccelSample::new(0, 0, ONE_G),
        }
    }
}

/// Stand-in for the deployed model.
#[derive(Debug, Default, Clone, Copy)]
pub enum SimScorer {
    /// No model: every sample goes out without an alert
    #[default]
    Absent,
    /// Distance of heart rate and SpO2 from the training mean
    Deviation,
}

impl AnomalyScorer for SimScorer {
    fn score(&mut self, vitals: &NormalizedVitals) -> f32 {
        match self {
            Self::Absent => NoScorer.score(vitals),
            Self::Deviation => ((vitals.heart_rate.abs() + vitals.spo2.abs()) / 6.0).min(1.0),
        }
    }
}

// ============================================================================
// Link
// ============================================================================

/// Transport that records payloads and optionally echoes them to a writer.
///
/// The first write error stops the echo and is kept for [`StdoutLink::take_error`].
pub struct StdoutLink {
    connected: bool,
    sink: Option<Box<dyn Write>>,
    text: bool,
    error: Option<std::io::Error>,
    payloads: Vec<Vec<u8>>,
}

impl StdoutLink {
    /// Connected link; `text` payloads are echoed verbatim, others as hex
    pub fn new(echo: bool, text: bool) -> Self {
        let sink: Option<Box<dyn Write>> = if echo { Some(Box::new(std::io::stdout())) } else { None };
        Self::with_sink(sink, text)
    }

    /// Connected link echoing into `sink`
    pub fn with_sink(sink: Option<Box<dyn Write>>, text: bool) -> Self {
        Self {
            connected: true,
            sink,
            text,
            error: None,
            payloads: Vec::new(),
        }
    }

    /// Change connection state
    pub fn set_connected(&mut self, connected: bool) {
        if connected != self.connected {
            info!(connected, "link state changed");
        }
        self.connected = connected;
    }

    /// Everything sent so far
    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    /// Echo failure, if one happened
    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.error.take()
    }

    fn echo(&mut self, payload: &[u8]) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let line = if self.text {
            String::from_utf8_lossy(payload).into_owned()
        } else {
            payload.iter().map(|b| format!("{b:02x}")).collect()
        };
        if let Err(e) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
            self.sink = None;
            self.error = Some(e);
        }
    }
}

impl Transport for StdoutLink {
    fn notify(&mut self, payload: &[u8]) -> bool {
        if !self.connected {
            return false;
        }
        self.echo(payload);
        self.payloads.push(payload.to_vec());
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Simulated duration
    pub seconds: u64,
    /// Pulse rate of the synthetic PPG
    pub bpm: f32,
    /// Steps per minute
    pub cadence_spm: f32,
    /// PPG sample rate
    pub ppg_rate_hz: u32,
    /// Drop the link at this many seconds
    pub disconnect_after_s: Option<u64>,
    /// Bring it back at this many seconds
    pub reconnect_after_s: Option<u64>,
    /// Settings written by the "app" before the run starts
    pub writes: Vec<ProfileWrite>,
    /// Score samples with [`SimScorer::Deviation`]
    pub score: bool,
    /// Print payloads as they are sent
    pub echo: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            seconds: 120,
            bpm: 72.0,
            cadence_spm: 100.0,
            ppg_rate_hz: 50,
            disconnect_after_s: None,
            reconnect_after_s: None,
            writes: Vec::new(),
            score: false,
            echo: false,
        }
    }
}

/// End-of-run figures
#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    /// Final heart rate estimate
    pub heart_rate_bpm: f32,
    /// Final SpO2 estimate
    pub spo2_percent: f32,
    /// Whether the last reading was valid
    pub reading_valid: bool,
    /// Steps counted
    pub steps: u32,
    /// Calories burned
    pub calories_kcal: f32,
    /// Payloads handed to the link
    pub payloads_sent: usize,
    /// Samples still buffered at the end
    pub pending_samples: usize,
    /// Beats accepted into the average
    pub beats_accepted: u32,
    /// Beats rejected as implausible
    pub beats_rejected: u32,
    /// Batch sends deferred for lack of a receiver
    pub sends_deferred: u32,
    /// Realtime samples lost for lack of a receiver
    pub samples_dropped: u32,
    /// Payloads that failed to encode
    pub encode_failures: u32,
}

/// Result of a run
#[derive(Debug)]
pub struct SimOutcome {
    /// Summary figures
    pub summary: SimSummary,
    /// Raw payloads in send order
    pub payloads: Vec<Vec<u8>>,
}

fn link_up(opts: &SimOptions, now_ms: u64) -> bool {
    let down_from = opts.disconnect_after_s.map(|s| s * 1000);
    let up_from = opts.reconnect_after_s.map(|s| s * 1000);
    match (down_from, up_from) {
        (Some(down), Some(up)) if up > down => now_ms < down || now_ms >= up,
        (Some(down), _) => now_ms < down,
        (None, _) => true,
    }
}

/// Drive the monitor for `opts.seconds` of simulated time, echoing payloads
/// to stdout when `opts.echo` is set.
pub fn run(config: &PipelineConfig, opts: &SimOptions) -> anyhow::Result<SimOutcome> {
    run_with_link(config, opts, StdoutLink::new(opts.echo, config.delivery.format.is_text()))
}

/// Drive the monitor over a caller-supplied link.
pub fn run_with_link(config: &PipelineConfig, opts: &SimOptions, link: StdoutLink) -> anyhow::Result<SimOutcome> {
    let mut monitor = DefaultMonitor::from_config(config);
    let mut counters = PipelineCounters::default();

    let mut queue = SettingsQueue::new();
    let (mut tx, mut rx) = queue.split();
    for write in &opts.writes {
        write.validate()?;
        submit(&mut tx, *write)?;
    }

    let scorer = if opts.score {
        SimScorer::Deviation
    } else {
        SimScorer::Absent
    };
    let mut devices = Devices {
        optical: SyntheticPpg::new(opts.bpm, opts.ppg_rate_hz),
        accel: SyntheticGait::new(opts.cadence_spm),
        transport: link,
        scorer,
    };

    let step_ms = config
        .ticks
        .optical_period_ms
        .min(config.ticks.motion_period_ms)
        .max(1);
    let end_ms = opts.seconds * 1000;

    info!(seconds = opts.seconds, bpm = opts.bpm, cadence = opts.cadence_spm, "simulation started");

    let mut dump = Periodic::new(COUNTER_DUMP_PERIOD_MS);
    let mut now = 0;
    while now < end_ms {
        devices.transport.set_connected(link_up(opts, now));
        devices.optical.advance_to(now);
        devices.accel.advance_to(now);

        if monitor.apply_settings(&mut rx, now, &mut counters) {
            debug!(now, "settings applied");
        }
        monitor.run_once(now, &mut devices, &mut counters);
        if let Some(e) = devices.transport.take_error() {
            return Err(e).context("writing payload output");
        }

        if now > 0 && dump.due(now) {
            debug!(now, ?counters, pending = monitor.delivery().pending(), "pipeline counters");
        }
        now += step_ms;
    }

    let reading = monitor.reading();
    let summary = SimSummary {
        heart_rate_bpm: reading.heart_rate_bpm,
        spo2_percent: reading.spo2_percent,
        reading_valid: reading.valid,
        steps: monitor.step_state().total_steps,
        calories_kcal: monitor.calories_kcal(),
        payloads_sent: devices.transport.payloads().len(),
        pending_samples: monitor.delivery().pending(),
        beats_accepted: counters.beats_accepted,
        beats_rejected: counters.beats_rejected,
        sends_deferred: counters.sends_deferred,
        samples_dropped: counters.samples_dropped,
        encode_failures: counters.encode_failures,
    };
    info!(
        hr = summary.heart_rate_bpm,
        steps = summary.steps,
        kcal = summary.calories_kcal,
        sent = summary.payloads_sent,
        "simulation finished"
    );

    Ok(SimOutcome {
        summary,
        payloads: devices.transport.payloads,
    })
}

use crate::config::{ConfigError, ConfigKey, ConfigValue, Extract, ValueKind};
use crate::demo_mode::{Mode, ModeCaps, UnknownModeError};
use crate::demo_probe::{default_channels, enabled_count, Channel, Coupling};
use crate::packet::{
    AnalogPacket, DsoPacket, LogicFormat, LogicPacket, MeasuredQuantity, Packet, PacketSink,
    PacketStatus, SinkError, Unit,
};
use crate::pacing::{Clock, MonotonicClock, Pacer, POLL_INTERVAL};
use crate::sample_generator::{SampleGenerator, ScopeScene, StatusSnapshot};
use crate::trigger_config::{LogicTrigger, TriggerMatcher, TriggerStage};
use crate::waveform::{Pattern, UnknownPatternError};
use std::thread;
use std::time::{Duration, Instant};

/// Timebase bounds in nanoseconds per division.
pub const MIN_TIMEBASE: u64 = 10;
pub const MAX_TIMEBASE: u64 = 10_000_000_000;
const DEFAULT_TIMEBASE: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Could not allocate a sample buffer of {words} words")]
    Allocation { words: usize },

    #[error("An acquisition is already running")]
    InvalidState,

    #[error("No acquisition has been started")]
    DeviceClosed,

    #[error("Packet delivery failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due yet.
    Pending,
    Emitted { samples: u64 },
    /// The sample limit was reached and the acquisition stopped.
    Completed,
    /// The acquisition had already stopped.
    Stopped,
}

/// Settings accepted between captures.
#[derive(Debug, Clone)]
struct DeviceSettings {
    mode: Mode,
    samplerate: u64,
    limit_samples: u64,
    pattern: Pattern,
    instant: bool,
    timebase: u64,
    trigger_enabled: bool,
    trigger: LogicTrigger,
    channels: Vec<Channel>,
}

impl DeviceSettings {
    fn for_mode(mode: Mode) -> Self {
        let caps = mode.caps();
        Self {
            mode,
            samplerate: caps.default_samplerate,
            limit_samples: caps.default_limit_samples,
            pattern: Pattern::Sine,
            instant: false,
            timebase: DEFAULT_TIMEBASE,
            trigger_enabled: false,
            trigger: LogicTrigger::default(),
            channels: default_channels(caps),
        }
    }

    /// Non-instant oscilloscope captures redraw a fixed window forever.
    fn is_continuous(&self) -> bool {
        self.mode == Mode::Oscilloscope && !self.instant
    }
}

/// Mutable state of one running acquisition.
#[derive(Debug)]
pub struct AcquisitionState {
    samplerate: u64,
    limit_samples: u64,
    window: u64,
    samples_counter: u64,
    cursor: u64,
    pacer: Pacer,
    matcher: TriggerMatcher,
    buf: Vec<u16>,
}

impl AcquisitionState {
    pub fn samplerate(&self) -> u64 {
        self.samplerate
    }

    pub fn limit_samples(&self) -> u64 {
        self.limit_samples
    }

    pub fn samples_counter(&self) -> u64 {
        self.samples_counter
    }

    /// Virtual sample position used to index the waveform tables.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn not_sent(&self) -> u64 {
        self.pacer.not_sent()
    }

    pub fn started_at(&self) -> Instant {
        self.pacer.started()
    }

    pub fn trigger_stage(&self) -> TriggerStage {
        self.matcher.stage()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buf.len()
    }

    /// Synthesize, scan and forward one burst of `sending` due samples.
    fn run_burst(
        &mut self,
        settings: &DeviceSettings,
        sink: &mut dyn PacketSink,
        generator: &mut SampleGenerator,
        status: &mut StatusSnapshot,
        sending: u64,
    ) -> Result<(), SinkError> {
        let caps = settings.mode.caps();
        let enabled = enabled_count(&settings.channels);

        let produced = if settings.is_continuous() {
            let step = if enabled == 1 { sending / 2 } else { sending };
            self.samples_counter = (self.samples_counter + step).min(self.window);
            self.samples_counter as usize
        } else {
            self.samples_counter += sending;
            sending as usize
        };

        #[cfg(feature = "cpu-profiling")]
        let zone = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("synthesize"), 0));

        let words = &mut self.buf[..produced];
        match settings.mode {
            Mode::Logic => generator.fill_logic(words, enabled),
            Mode::Analog | Mode::Oscilloscope => {
                let scene = ScopeScene {
                    caps,
                    channels: &settings.channels,
                    pattern: settings.pattern,
                    samplerate: self.samplerate,
                    cursor: self.cursor,
                    expected_samples: self.limit_samples,
                };
                generator.fill_scope(words, &scene, status);
            }
        }
        #[cfg(feature = "cpu-profiling")]
        drop(zone);

        let scan_len = produced.min(sending as usize);
        if let Some(real_pos) = self.matcher.scan(&self.buf[..scan_len]) {
            sink.forward(&Packet::Trigger { real_pos })?;
        }

        status.trig_hit = self.matcher.is_satisfied();
        status.set_captured(self.samples_counter);
        if !self.matcher.is_satisfied() {
            return Ok(());
        }

        if settings.is_continuous() {
            if self.samples_counter < self.window {
                self.cursor = 0;
            } else {
                self.cursor += sending;
            }
        } else {
            self.cursor += sending;
        }

        let data = &self.buf[..produced];
        let packet = data_packet(settings, caps, enabled, data);
        sink.forward(&packet)
    }
}

fn data_packet<'a>(
    settings: &'a DeviceSettings,
    caps: &ModeCaps,
    enabled: usize,
    data: &'a [u16],
) -> Packet<'a> {
    match settings.mode {
        Mode::Logic => Packet::Logic(LogicPacket {
            length: data.len() * usize::from(caps.num_channels >> 3),
            format: LogicFormat::CrossChannelInterleaved,
            data,
        }),
        Mode::Oscilloscope => Packet::Dso(DsoPacket {
            channels: &settings.channels,
            num_samples: if enabled == 1 {
                data.len() * 2
            } else {
                data.len()
            },
            mq: MeasuredQuantity::Voltage,
            unit: Unit::Volt,
            ac_coupled: settings
                .channels
                .iter()
                .any(|c| c.enabled && c.coupling == Coupling::Ac),
            data,
        }),
        Mode::Analog => Packet::Analog(AnalogPacket {
            channels: &settings.channels,
            num_samples: data.len(),
            unit_bits: caps.unit_bits,
            mq: MeasuredQuantity::Voltage,
            unit: Unit::Volt,
            data,
        }),
    }
}

/// Software stand-in for the USB instrument.
///
/// The host calls [`DemoScope::tick`] once per poll period while an
/// acquisition is active. Entry points are not synchronised internally; the
/// caller serialises them.
pub struct DemoScope<C: Clock = MonotonicClock> {
    clock: C,
    settings: DeviceSettings,
    phase: Phase,
    acquisition: Option<AcquisitionState>,
    sink: Option<Box<dyn PacketSink>>,
    generator: SampleGenerator,
    status: StatusSnapshot,
}

impl DemoScope<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }

    /// Tick on the poll interval until the acquisition ends or `timeout`
    /// passes. Returns whether the acquisition ended.
    pub fn run_until_stopped(&mut self, timeout: Duration) -> Result<bool, EngineError> {
        let deadline = Instant::now() + timeout;
        while self.phase == Phase::Active {
            if Instant::now() >= deadline {
                log::debug!("Acquisition still running after {timeout:?}");
                return Ok(false);
            }
            if self.tick()? != TickOutcome::Completed {
                thread::sleep(self.poll_interval());
            }
        }
        Ok(true)
    }
}

impl Default for DemoScope<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> DemoScope<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            settings: DeviceSettings::for_mode(Mode::Logic),
            phase: Phase::Idle,
            acquisition: None,
            sink: None,
            generator: SampleGenerator::new(),
            status: StatusSnapshot::default(),
        }
    }

    /// Replace the sample generator, e.g. with a seeded one.
    pub fn with_generator(mut self, generator: SampleGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// How often the host should call [`DemoScope::tick`].
    pub fn poll_interval(&self) -> Duration {
        POLL_INTERVAL
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    pub fn caps(&self) -> &'static ModeCaps {
        self.settings.mode.caps()
    }

    pub fn samplerate(&self) -> u64 {
        self.settings.samplerate
    }

    pub fn limit_samples(&self) -> u64 {
        self.settings.limit_samples
    }

    pub fn pattern(&self) -> Pattern {
        self.settings.pattern
    }

    pub fn channels(&self) -> &[Channel] {
        &self.settings.channels
    }

    pub fn trigger(&self) -> Option<LogicTrigger> {
        self.settings.trigger_enabled.then_some(self.settings.trigger)
    }

    pub fn acquisition(&self) -> Option<&AcquisitionState> {
        self.acquisition.as_ref()
    }

    pub fn supported_samplerates(&self) -> Vec<u64> {
        self.caps().supported_samplerates()
    }

    fn ensure_inactive(&self) -> Result<(), ConfigError> {
        if self.phase == Phase::Active {
            return Err(ConfigError::InvalidState);
        }
        Ok(())
    }

    /// Switch personality. Channels return to their defaults and the
    /// current samplerate is clamped into the new mode's bounds.
    pub fn select_mode(&mut self, mode: Mode) -> Result<(), ConfigError> {
        self.ensure_inactive()?;
        let caps = mode.caps();
        let samplerate = caps.clamp_samplerate(self.settings.samplerate);
        if samplerate != self.settings.samplerate {
            log::warn!(
                "Samplerate {} Hz outside {} bounds, using {} Hz",
                self.settings.samplerate,
                mode,
                samplerate
            );
        }
        self.settings.mode = mode;
        self.settings.samplerate = samplerate;
        self.settings.limit_samples = caps.default_limit_samples;
        self.settings.channels = default_channels(caps);
        log::debug!("Setting mode to {mode}");
        Ok(())
    }

    /// Arm a logic trigger for the next acquisition, or disarm with `None`.
    pub fn set_trigger(&mut self, trigger: Option<LogicTrigger>) -> Result<(), ConfigError> {
        self.ensure_inactive()?;
        self.settings.trigger_enabled = trigger.is_some();
        self.settings.trigger = trigger.unwrap_or_default();
        log::debug!("Setting trigger to {:?}", self.trigger());
        Ok(())
    }

    pub fn set_channel_attr(
        &mut self,
        index: u16,
        key: ConfigKey,
        value: ConfigValue,
    ) -> Result<(), ConfigError> {
        if !key.is_channel_key() {
            return Err(ConfigError::NotApplicable {
                key: key.to_string(),
            });
        }
        self.configure(key, value, Some(index))
    }

    /// Set a configuration key addressed by its wire name.
    pub fn configure_by_name(
        &mut self,
        name: &str,
        value: ConfigValue,
        channel: Option<u16>,
    ) -> Result<(), ConfigError> {
        self.configure(name.parse()?, value, channel)
    }

    pub fn configure(
        &mut self,
        key: ConfigKey,
        value: ConfigValue,
        channel: Option<u16>,
    ) -> Result<(), ConfigError> {
        self.ensure_inactive()?;
        if key.is_read_only() {
            return Err(ConfigError::NotApplicable {
                key: key.to_string(),
            });
        }
        if key.is_channel_key() {
            let index = channel.ok_or(ConfigError::MissingChannel(key))?;
            return self.configure_channel(key, value, index);
        }

        let caps = self.caps();
        match key {
            ConfigKey::Samplerate => {
                let rate = u64::from_config(key, value)?;
                if rate == 0 {
                    return Err(ConfigError::invalid(key, "samplerate must be positive"));
                }
                let clamped = caps.clamp_samplerate(rate);
                if clamped != rate {
                    log::warn!("Samplerate {rate} Hz outside {} bounds, using {clamped} Hz", caps.mode);
                }
                self.settings.samplerate = clamped;
            }
            ConfigKey::LimitSamples => {
                let mut limit = u64::from_config(key, value)?;
                if limit == 0 {
                    return Err(ConfigError::invalid(key, "sample limit must be positive"));
                }
                let depth = caps.max_burst as u64;
                if caps.mode == Mode::Oscilloscope && limit > depth {
                    log::warn!("Sample limit {limit} exceeds scope depth, using {depth}");
                    limit = depth;
                }
                self.settings.limit_samples = limit;
            }
            ConfigKey::DeviceMode => {
                let mode = match value {
                    ConfigValue::Int16(id) => Mode::from_id(id)
                        .ok_or_else(|| ConfigError::invalid(key, format!("unknown mode id {id}")))?,
                    ConfigValue::String(name) => name
                        .parse()
                        .map_err(|e: UnknownModeError| ConfigError::invalid(key, e.to_string()))?,
                    other => {
                        return Err(ConfigError::TypeMismatch {
                            key,
                            expected: ValueKind::Int16,
                            found: other.kind(),
                        })
                    }
                };
                return self.select_mode(mode);
            }
            ConfigKey::PatternMode => {
                let name = String::from_config(key, value)?;
                self.settings.pattern = name
                    .parse()
                    .map_err(|e: UnknownPatternError| ConfigError::invalid(key, e.to_string()))?;
            }
            ConfigKey::Instant => self.settings.instant = bool::from_config(key, value)?,
            ConfigKey::Timebase => {
                let timebase = u64::from_config(key, value)?;
                if !(MIN_TIMEBASE..=MAX_TIMEBASE).contains(&timebase) {
                    return Err(ConfigError::invalid(key, format!("{timebase} ns/div out of range")));
                }
                self.settings.timebase = timebase;
            }
            ConfigKey::TriggerEnable => {
                self.settings.trigger_enabled = bool::from_config(key, value)?;
            }
            ConfigKey::TriggerMask => self.settings.trigger.mask = trigger_word(key, value)?,
            ConfigKey::TriggerValue => self.settings.trigger.value = trigger_word(key, value)?,
            ConfigKey::TriggerEdge => self.settings.trigger.edge = trigger_word(key, value)?,
            ConfigKey::HorizTriggerPos | ConfigKey::TriggerHoldoff | ConfigKey::TriggerMargin => {
                log::debug!("Accepting {key} without effect");
                return Ok(());
            }
            _ => {
                return Err(ConfigError::NotApplicable {
                    key: key.to_string(),
                })
            }
        }
        log::debug!("Setting {key} done");
        Ok(())
    }

    fn configure_channel(
        &mut self,
        key: ConfigKey,
        value: ConfigValue,
        index: u16,
    ) -> Result<(), ConfigError> {
        let mode = self.settings.mode;
        let channel = self
            .settings
            .channels
            .get_mut(usize::from(index))
            .ok_or(ConfigError::NoSuchChannel { index })?;

        if key != ConfigKey::ProbeEnable && mode == Mode::Logic {
            return Err(ConfigError::InvalidState);
        }

        match key {
            ConfigKey::ProbeEnable => channel.enabled = bool::from_config(key, value)?,
            ConfigKey::ProbeVdiv => {
                let vdiv = u64::from_config(key, value)?;
                if vdiv == 0 {
                    return Err(ConfigError::invalid(key, "vdiv must be positive"));
                }
                channel.vdiv = vdiv;
                if channel.map_default {
                    channel.reset_map();
                }
            }
            ConfigKey::ProbeFactor => {
                let factor = u64::from_config(key, value)?;
                if factor == 0 {
                    return Err(ConfigError::invalid(key, "factor must be positive"));
                }
                channel.vfactor = factor;
                if channel.map_default {
                    channel.reset_map();
                }
            }
            ConfigKey::ProbeOffset => {
                let offset = u64::from_config(key, value)?;
                let full_scale = (1u64 << channel.bits) - 1;
                if offset > full_scale {
                    return Err(ConfigError::invalid(key, format!("offset {offset} above {full_scale}")));
                }
                channel.offset = offset as u16;
            }
            ConfigKey::ProbeCoupling => {
                let byte = u8::from_config(key, value)?;
                channel.coupling = Coupling::from_byte(byte)
                    .ok_or_else(|| ConfigError::invalid(key, format!("unknown coupling {byte}")))?;
            }
            ConfigKey::ProbeTriggerValue => channel.trig_value = u8::from_config(key, value)?,
            ConfigKey::ProbeMapDefault => {
                channel.map_default = bool::from_config(key, value)?;
                if channel.map_default {
                    channel.reset_map();
                }
            }
            ConfigKey::ProbeMapUnit => {
                let unit = String::from_config(key, value)?;
                if !channel.map_default {
                    channel.map_unit = unit;
                }
            }
            ConfigKey::ProbeMapMin => {
                let min = f64::from_config(key, value)?;
                if !channel.map_default {
                    channel.map_min = min;
                }
            }
            ConfigKey::ProbeMapMax => {
                let max = f64::from_config(key, value)?;
                if !channel.map_default {
                    channel.map_max = max;
                }
            }
            _ => {
                return Err(ConfigError::NotApplicable {
                    key: key.to_string(),
                })
            }
        }
        log::debug!("Setting {key} of channel {index} done");
        Ok(())
    }

    pub fn config_get(&self, key: ConfigKey, channel: Option<u16>) -> Result<ConfigValue, ConfigError> {
        if key.is_channel_key() {
            let index = channel.ok_or(ConfigError::MissingChannel(key))?;
            let ch = self
                .settings
                .channels
                .get(usize::from(index))
                .ok_or(ConfigError::NoSuchChannel { index })?;
            return Ok(match key {
                ConfigKey::ProbeEnable => ch.enabled.into(),
                ConfigKey::ProbeVdiv => ch.vdiv.into(),
                ConfigKey::ProbeFactor => ch.vfactor.into(),
                ConfigKey::ProbeOffset => u64::from(ch.offset).into(),
                ConfigKey::ProbeHwOffset => u64::from(ch.hw_offset).into(),
                ConfigKey::ProbeCoupling => ch.coupling.as_byte().into(),
                ConfigKey::ProbeTriggerValue => ch.trig_value.into(),
                ConfigKey::ProbeMapDefault => ch.map_default.into(),
                ConfigKey::ProbeMapUnit => ConfigValue::String(ch.map_unit.clone()),
                ConfigKey::ProbeMapMin => ch.map_min.into(),
                ConfigKey::ProbeMapMax => ch.map_max.into(),
                _ => {
                    return Err(ConfigError::NotApplicable {
                        key: key.to_string(),
                    })
                }
            });
        }

        let caps = self.caps();
        Ok(match key {
            ConfigKey::Samplerate => self.settings.samplerate.into(),
            ConfigKey::LimitSamples => self.settings.limit_samples.into(),
            ConfigKey::DeviceMode => self.settings.mode.id().into(),
            ConfigKey::PatternMode => self.settings.pattern.as_str().into(),
            ConfigKey::Instant => self.settings.instant.into(),
            ConfigKey::Timebase => self.settings.timebase.into(),
            ConfigKey::TriggerEnable => self.settings.trigger_enabled.into(),
            ConfigKey::TriggerMask => u64::from(self.settings.trigger.mask).into(),
            ConfigKey::TriggerValue => u64::from(self.settings.trigger.value).into(),
            ConfigKey::TriggerEdge => u64::from(self.settings.trigger.edge).into(),
            ConfigKey::MaxTimebase => MAX_TIMEBASE.into(),
            ConfigKey::MinTimebase => MIN_TIMEBASE.into(),
            ConfigKey::SamplerateMin => caps.min_samplerate.into(),
            ConfigKey::SamplerateMax => caps.max_samplerate.into(),
            _ => {
                return Err(ConfigError::NotApplicable {
                    key: key.to_string(),
                })
            }
        })
    }

    /// Begin pacing. `sink` receives every forwarded packet, starting with
    /// a stream header.
    pub fn acquisition_start(&mut self, sink: impl PacketSink + 'static) -> Result<(), EngineError> {
        if self.phase == Phase::Active {
            return Err(EngineError::InvalidState);
        }

        let caps = self.caps();
        let words = caps.max_burst;
        let mut buf = Vec::new();
        buf.try_reserve_exact(words).map_err(|e| {
            log::error!("Sample buffer allocation failed: {e}");
            EngineError::Allocation { words }
        })?;
        buf.resize(words, 0);

        let mut sink: Box<dyn PacketSink> = Box::new(sink);
        sink.forward(&Packet::Header)?;

        let limit = self.settings.limit_samples;
        let window = if enabled_count(&self.settings.channels) == 1 {
            limit / 2
        } else {
            limit
        }
        .min(words as u64);

        self.acquisition = Some(AcquisitionState {
            samplerate: self.settings.samplerate,
            limit_samples: limit,
            window,
            samples_counter: 0,
            cursor: 0,
            pacer: Pacer::new(self.settings.samplerate, self.clock.now()),
            matcher: TriggerMatcher::new(self.settings.trigger, self.settings.trigger_enabled),
            buf,
        });
        self.sink = Some(sink);
        self.status = StatusSnapshot::default();
        self.phase = Phase::Active;

        log::debug!(
            "Starting {} acquisition at {} Hz, limit {} samples",
            self.settings.mode,
            self.settings.samplerate,
            limit
        );
        Ok(())
    }

    /// Advance the virtual capture to the current time.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("tick"), 0));

        match self.phase {
            Phase::Idle => return Err(EngineError::DeviceClosed),
            Phase::Stopped => return Ok(TickOutcome::Stopped),
            Phase::Active => {}
        }

        let now = self.clock.now();
        let Self {
            settings,
            acquisition,
            sink,
            generator,
            status,
            ..
        } = &mut *self;
        let (Some(acq), Some(sink)) = (acquisition.as_mut(), sink.as_mut()) else {
            return Err(EngineError::DeviceClosed);
        };

        let caps = settings.mode.caps();
        let continuous = settings.is_continuous();
        let due = acq.pacer.due_samples(now);
        let remaining = acq.limit_samples.saturating_sub(acq.samples_counter);

        let mut sending = match caps.pacing_quantum() {
            Some(quantum) => acq.pacer.quantize(due, quantum, remaining),
            None => due,
        };
        sending = sending.min(caps.max_burst as u64);
        if !continuous {
            sending = sending.min(remaining);
        }

        let mut outcome = TickOutcome::Pending;
        if sending > 0 {
            acq.run_burst(settings, &mut **sink, generator, status, sending)?;
            outcome = TickOutcome::Emitted { samples: sending };
        }

        let completed = !continuous && acq.samples_counter >= acq.limit_samples;
        if completed {
            log::info!("Requested number of samples reached.");
            self.acquisition_stop()?;
            return Ok(TickOutcome::Completed);
        }
        Ok(outcome)
    }

    /// Stop pacing, release the buffer and send the end packet.
    ///
    /// Calling it again, or before any acquisition, does nothing.
    pub fn acquisition_stop(&mut self) -> Result<(), EngineError> {
        if self.phase != Phase::Active {
            return Ok(());
        }
        log::debug!("Stopping acquisition.");
        self.phase = Phase::Stopped;

        if let Some(acq) = self.acquisition.take() {
            self.status.set_captured(acq.samples_counter);
        }
        if let Some(mut sink) = self.sink.take() {
            sink.forward(&Packet::End(PacketStatus::Ok))?;
        }
        Ok(())
    }

    pub fn status_query(&self) -> StatusSnapshot {
        self.status.clone()
    }
}

fn trigger_word(key: ConfigKey, value: ConfigValue) -> Result<u16, ConfigError> {
    let word = u64::from_config(key, value)?;
    u16::try_from(word).map_err(|_| ConfigError::invalid(key, format!("{word:#x} wider than 16 bits")))
}

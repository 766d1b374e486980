use crate::demo_mode::ModeCaps;
use crate::demo_probe::{Channel, Coupling};
use crate::waveform::{Pattern, TABLE_DC_BIAS};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// RMS of a sine relative to its peak.
const RMS_FACTOR: f64 = 0.707;

/// Per-channel measurements as reported by a status query.
///
/// Cycle lengths are in nanoseconds. `acc_mean` and `acc_square` are sums
/// over `total_samples` samples; use [`ChannelStatus::mean`] and
/// [`ChannelStatus::rms`] for the per-sample values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelStatus {
    pub max: u8,
    pub min: u8,
    pub high_level: u8,
    pub low_level: u8,
    pub level_valid: bool,
    pub plevel: bool,
    pub cyc_cnt: u64,
    pub cyc_tlen: f64,
    pub cyc_plen: f64,
    pub cyc_llen: f64,
    pub cyc_rlen: f64,
    pub cyc_flen: f64,
    pub acc_mean: f64,
    pub acc_square: f64,
    pub total_samples: u64,
}

impl ChannelStatus {
    pub fn mean(&self) -> f64 {
        if self.total_samples == 0 {
            return 0.0;
        }
        self.acc_mean / self.total_samples as f64
    }

    pub fn rms(&self) -> f64 {
        if self.total_samples == 0 {
            return 0.0;
        }
        (self.acc_square / self.total_samples as f64).sqrt()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub measure_valid: bool,
    pub trig_hit: bool,
    pub samples_counter: u64,
    /// Captured sample count, least significant byte first.
    pub captured_cnt: [u8; 4],
    pub channels: Vec<ChannelStatus>,
}

impl StatusSnapshot {
    pub fn captured_count(&self) -> u32 {
        u32::from_le_bytes(self.captured_cnt)
    }

    pub(crate) fn set_captured(&mut self, samples_counter: u64) {
        self.samples_counter = samples_counter;
        self.captured_cnt = (samples_counter as u32).to_le_bytes();
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    max: u8,
    min: u8,
    cycle_time_ns: f64,
    cycle_count: u64,
    /// Table value of the last synthesized sample.
    previous: Option<i16>,
    /// Virtual position of the last rising zero crossing.
    last_crossing: Option<u64>,
    /// Virtual position the next contiguous buffer starts at.
    next_position: u64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            max: u8::MIN,
            min: u8::MAX,
            cycle_time_ns: 0.0,
            cycle_count: 1,
            previous: None,
            last_crossing: None,
            next_position: 0,
        }
    }
}

/// Everything the scope synthesizer reads besides the buffer itself.
#[derive(Debug, Clone, Copy)]
pub struct ScopeScene<'a> {
    pub caps: &'a ModeCaps,
    pub channels: &'a [Channel],
    pub pattern: Pattern,
    pub samplerate: u64,
    /// Virtual sample position of the first word.
    pub cursor: u64,
    /// Total samples expected for the run, used to scale mean and RMS.
    pub expected_samples: u64,
}

/// Table stride for analog and oscilloscope synthesis.
///
/// With a single enabled channel the stride doubles, so that channel keeps
/// the bandwidth of the interleaved pair.
pub fn scope_span(caps: &ModeCaps, samplerate: u64, enabled: usize) -> f64 {
    let span = caps.max_samplerate as f64 / samplerate.max(1) as f64;
    if enabled == 1 {
        span * 2.0
    } else {
        span
    }
}

/// Produces packed sample words and folds in running channel statistics.
#[derive(Debug, Clone)]
pub struct SampleGenerator {
    rng: SmallRng,
    accumulators: Vec<Accumulator>,
}

impl SampleGenerator {
    pub fn new() -> Self {
        Self::from_rng(SmallRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(SmallRng::seed_from_u64(seed))
    }

    fn from_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            accumulators: Vec::new(),
        }
    }

    /// Fill `buf` with bursty toggling logic data.
    ///
    /// Words are produced in groups of four. After a zero baseline of
    /// `4 * enabled` words, each group start either copies or inverts the
    /// word one full cycle back; the rest of the group repeats it.
    #[tracing::instrument(level = "trace", skip_all, fields(n = buf.len()))]
    pub fn fill_logic(&mut self, buf: &mut [u16], enabled: usize) {
        let ch_num = enabled.max(1);
        let cycle = ch_num * 4;
        for i in 0..buf.len() {
            buf[i] = if i < cycle {
                0
            } else if i % 4 == 0 {
                let start_rand = self.rng.gen_range(0..cycle);
                let back = buf[i - cycle];
                if start_rand == (i / 4) % ch_num {
                    !back
                } else {
                    back
                }
            } else {
                buf[i - 1]
            };
        }
    }

    /// Fill `buf` with 8-bit samples of every enabled channel and update
    /// `status` with the measurements so far.
    ///
    /// Channel `n` occupies byte `n` of each word. Statistics restart
    /// whenever the scene's cursor is zero.
    #[tracing::instrument(level = "trace", skip_all, fields(n = buf.len(), cursor = scene.cursor))]
    pub fn fill_scope(&mut self, buf: &mut [u16], scene: &ScopeScene<'_>, status: &mut StatusSnapshot) {
        let enabled = scene.channels.iter().filter(|c| c.enabled).count();
        let span = scope_span(scene.caps, scene.samplerate, enabled);
        let max_rate = scene.caps.max_samplerate as f64;

        if scene.cursor == 0 || self.accumulators.len() != scene.channels.len() {
            self.accumulators = vec![Accumulator::default(); scene.channels.len()];
        }

        buf.fill(0);
        for channel in scene.channels.iter().filter(|c| c.enabled) {
            let Some(acc) = self.accumulators.get_mut(usize::from(channel.index)) else {
                continue;
            };
            // Crossing state only carries over into the buffer that follows on.
            if acc.next_position != scene.cursor {
                acc.previous = None;
                acc.last_crossing = None;
            }
            let shift = channel.index * 8;

            for (i, word) in buf.iter_mut().enumerate() {
                let sample = scene.cursor + i as u64;
                let position = (sample as f64 * span).floor() as u64;
                let value = scene.pattern.sample_at(position);
                let byte = channel.sample_byte(value, TABLE_DC_BIAS);
                *word |= u16::from(byte) << shift;

                acc.max = acc.max.max(byte);
                acc.min = acc.min.min(byte);
                if acc.previous.is_some_and(|p| p < 0) && value >= 0 {
                    if let Some(last) = acc.last_crossing {
                        acc.cycle_time_ns = 2.0 * (sample - last) as f64 * 1e9 / max_rate;
                    }
                    acc.cycle_count += 1;
                    acc.last_crossing = Some(sample);
                }
                acc.previous = Some(value);
            }
            acc.next_position = scene.cursor + buf.len() as u64;
        }

        self.fold_status(scene, status);
    }

    fn fold_status(&self, scene: &ScopeScene<'_>, status: &mut StatusSnapshot) {
        let mut ranges: Vec<(u8, u8)> = self.accumulators.iter().map(|a| (a.max, a.min)).collect();

        // A disabled channel reports the combined range of the whole set.
        if scene.channels.iter().any(|c| !c.enabled) {
            let max = ranges.iter().map(|r| r.0).max().unwrap_or(u8::MIN);
            let min = ranges.iter().map(|r| r.1).min().unwrap_or(u8::MAX);
            ranges.fill((max, min));
        }

        let total = scene.expected_samples;
        status.channels = scene
            .channels
            .iter()
            .zip(self.accumulators.iter().zip(ranges))
            .map(|(channel, (acc, (max, min)))| {
                let tlen = acc.cycle_time_ns * acc.cycle_count as f64;
                let hw_offset = f64::from(channel.hw_offset);
                let (mean, peak) = match channel.coupling {
                    Coupling::Ac => (hw_offset, f64::from(max) - hw_offset),
                    Coupling::Dc | Coupling::Gnd => (
                        (f64::from(max) + f64::from(min)) / 2.0,
                        f64::from(max) - f64::from(min),
                    ),
                };
                ChannelStatus {
                    max,
                    min,
                    high_level: max,
                    low_level: min,
                    level_valid: true,
                    plevel: true,
                    cyc_cnt: acc.cycle_count,
                    cyc_tlen: tlen,
                    cyc_plen: tlen / 2.0,
                    cyc_llen: 0.0,
                    cyc_rlen: tlen / 4.0,
                    cyc_flen: tlen / 4.0,
                    acc_mean: mean * total as f64,
                    acc_square: (peak * RMS_FACTOR).powi(2) * total as f64,
                    total_samples: total,
                }
            })
            .collect();
        status.measure_valid = true;
    }
}

impl Default for SampleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_mode::{mhz, Mode};
    use crate::demo_probe::default_channels;

    fn scene<'a>(channels: &'a [Channel], samplerate: u64, cursor: u64) -> ScopeScene<'a> {
        ScopeScene {
            caps: Mode::Oscilloscope.caps(),
            channels,
            pattern: Pattern::Sine,
            samplerate,
            cursor,
            expected_samples: 10_000,
        }
    }

    #[test]
    fn test_span_two_channels_half_rate() {
        let caps = Mode::Oscilloscope.caps();
        assert!((scope_span(caps, mhz(100), 2) - 2.0).abs() < f64::EPSILON);
        assert!((scope_span(caps, mhz(100), 1) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_two_channel_packing() {
        let mut channels = default_channels(Mode::Oscilloscope.caps());
        channels[1].coupling = Coupling::Dc;
        let mut generator = SampleGenerator::with_seed(1);
        let mut status = StatusSnapshot::default();
        let mut buf = vec![0u16; 300];
        generator.fill_scope(&mut buf, &scene(&channels, mhz(100), 0), &mut status);

        for (i, word) in buf.iter().enumerate() {
            let value = Pattern::Sine.sample_at(2 * i as u64);
            assert_eq!(word & 0xff, u16::from(channels[0].sample_byte(value, TABLE_DC_BIAS)));
            assert_eq!((word >> 8) & 0xff, u16::from(channels[1].sample_byte(value, TABLE_DC_BIAS)));
        }
    }

    #[test]
    fn test_cursor_continues_the_waveform() {
        let channels = default_channels(Mode::Oscilloscope.caps());
        let mut generator = SampleGenerator::with_seed(1);
        let mut status = StatusSnapshot::default();
        let mut whole = vec![0u16; 120];
        generator.fill_scope(&mut whole, &scene(&channels, mhz(100), 0), &mut status);
        let mut tail = vec![0u16; 20];
        generator.fill_scope(&mut tail, &scene(&channels, mhz(100), 100), &mut status);
        assert_eq!(&whole[100..], &tail[..]);
    }

    #[test]
    fn test_statistics_for_sine() {
        let mut channels = default_channels(Mode::Oscilloscope.caps());
        channels[1].coupling = Coupling::Dc;
        let mut generator = SampleGenerator::with_seed(1);
        let mut status = StatusSnapshot::default();
        let mut buf = vec![0u16; 400];
        generator.fill_scope(&mut buf, &scene(&channels, mhz(100), 0), &mut status);

        assert!(status.measure_valid);
        let ch0 = &status.channels[0];
        assert_eq!((ch0.max, ch0.min), (228, 28));
        assert_eq!((ch0.high_level, ch0.low_level), (228, 28));
        assert_eq!(ch0.cyc_cnt, 5);
        assert!((ch0.cyc_tlen / ch0.cyc_cnt as f64 - 1000.0).abs() < 1e-6);
        assert!((ch0.cyc_plen - ch0.cyc_tlen / 2.0).abs() < 1e-9);
        assert!((ch0.cyc_rlen - ch0.cyc_tlen / 4.0).abs() < 1e-9);
        assert!((ch0.mean() - 128.0).abs() < 1e-9);
        assert!((ch0.rms() - 70.7).abs() < 1e-9);

        let ch1 = &status.channels[1];
        assert_eq!((ch1.max, ch1.min), (248, 48));
        assert!((ch1.mean() - 148.0).abs() < 1e-9);
        assert!((ch1.rms() - 200.0 * 0.707).abs() < 1e-9);
    }

    #[test]
    fn test_crossing_on_buffer_boundary_is_counted() {
        let channels = default_channels(Mode::Oscilloscope.caps());
        let mut status = StatusSnapshot::default();

        let mut generator = SampleGenerator::with_seed(1);
        let mut whole = vec![0u16; 297];
        generator.fill_scope(&mut whole, &scene(&channels, mhz(100), 0), &mut status);
        let expected = status.channels[0].clone();

        // Sample 97 is the first non-negative value after the trough.
        assert!(Pattern::Sine.sample_at(2 * 96) < 0);
        assert!(Pattern::Sine.sample_at(2 * 97) >= 0);

        let mut generator = SampleGenerator::with_seed(1);
        let mut head = vec![0u16; 97];
        generator.fill_scope(&mut head, &scene(&channels, mhz(100), 0), &mut status);
        let mut tail = vec![0u16; 200];
        generator.fill_scope(&mut tail, &scene(&channels, mhz(100), 97), &mut status);

        let split = &status.channels[0];
        assert_eq!(split.cyc_cnt, expected.cyc_cnt);
        assert_eq!(split.cyc_cnt, 3);
        assert!((split.cyc_tlen - expected.cyc_tlen).abs() < 1e-9);
        assert!((split.cyc_tlen / split.cyc_cnt as f64 - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_disabled_channel_mirrors_sibling_range() {
        let mut channels = default_channels(Mode::Oscilloscope.caps());
        channels[1].enabled = false;
        let mut generator = SampleGenerator::with_seed(1);
        let mut status = StatusSnapshot::default();
        let mut buf = vec![0u16; 200];
        generator.fill_scope(&mut buf, &scene(&channels, mhz(100), 0), &mut status);

        assert!(buf.iter().all(|w| w >> 8 == 0));
        assert_eq!(status.channels[1].max, status.channels[0].max);
        assert_eq!(status.channels[1].min, status.channels[0].min);
    }

    #[test]
    fn test_statistics_accumulate_until_cursor_resets() {
        let channels = default_channels(Mode::Oscilloscope.caps());
        let mut generator = SampleGenerator::with_seed(1);
        let mut status = StatusSnapshot::default();
        let mut buf = vec![0u16; 10];
        generator.fill_scope(&mut buf, &scene(&channels, mhz(100), 0), &mut status);
        let first_max = status.channels[0].max;
        generator.fill_scope(&mut buf, &scene(&channels, mhz(100), 25), &mut status);
        assert_eq!(status.channels[0].max, 228);
        assert!(first_max < 228);
        generator.fill_scope(&mut buf, &scene(&channels, mhz(100), 0), &mut status);
        assert_eq!(status.channels[0].max, first_max);
    }

    #[test]
    fn test_logic_pattern_shape() {
        let mut generator = SampleGenerator::with_seed(7);
        let mut buf = vec![0xaaaau16; 4096];
        generator.fill_logic(&mut buf, 16);

        assert!(buf[..64].iter().all(|&w| w == 0));
        for i in 64..buf.len() {
            if i % 4 == 0 {
                assert!(buf[i] == buf[i - 64] || buf[i] == !buf[i - 64]);
            } else {
                assert_eq!(buf[i], buf[i - 1]);
            }
        }
        assert!(buf.iter().any(|&w| w == 0xffff), "no toggling at all");
    }

    #[test]
    fn test_logic_with_no_enabled_channels_uses_one_group() {
        let mut generator = SampleGenerator::with_seed(7);
        let mut buf = vec![1u16; 16];
        generator.fill_logic(&mut buf, 0);
        assert!(buf[..4].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_captured_count_bytes() {
        let mut status = StatusSnapshot::default();
        status.set_captured(0x0102_0304);
        assert_eq!(status.captured_cnt, [4, 3, 2, 1]);
        assert_eq!(status.captured_count(), 0x0102_0304);
    }
}

use std::fmt;
use std::str::FromStr;

/// Acquisition personality of the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Logic,
    Oscilloscope,
    Analog,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Logic => "logic",
            Mode::Oscilloscope => "dso",
            Mode::Analog => "analog",
        }
    }

    /// Numeric id used by the driver framework (`device_mode` as Int16).
    pub fn id(&self) -> i16 {
        match self {
            Mode::Logic => 0,
            Mode::Oscilloscope => 1,
            Mode::Analog => 2,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Mode::Logic),
            1 => Some(Mode::Oscilloscope),
            2 => Some(Mode::Analog),
            _ => None,
        }
    }

    pub fn caps(&self) -> &'static ModeCaps {
        match self {
            Mode::Logic => &CHANNEL_MODES[0],
            Mode::Analog => &CHANNEL_MODES[1],
            Mode::Oscilloscope => &CHANNEL_MODES[2],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown device mode '{0}'")]
pub struct UnknownModeError(pub String);

impl FromStr for Mode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logic" | "la" => Ok(Mode::Logic),
            "dso" | "oscilloscope" | "scope" => Ok(Mode::Oscilloscope),
            "analog" | "daq" => Ok(Mode::Analog),
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}

/// Immutable capability data of one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeCaps {
    pub mode: Mode,
    pub num_channels: u16,
    pub unit_bits: u8,
    pub default_samplerate: u64,
    pub default_limit_samples: u64,
    pub min_samplerate: u64,
    pub max_samplerate: u64,
    /// Largest number of sample words produced by a single tick.
    pub max_burst: usize,
    pub description: &'static str,
}

pub const fn hz(n: u64) -> u64 {
    n
}

pub const fn khz(n: u64) -> u64 {
    n * 1_000
}

pub const fn mhz(n: u64) -> u64 {
    n * 1_000_000
}

const BUFSIZE: usize = 512 * 1024;
const DSO_BUFSIZE: usize = 10 * 1024;

pub static CHANNEL_MODES: [ModeCaps; 3] = [
    ModeCaps {
        mode: Mode::Logic,
        num_channels: 16,
        unit_bits: 1,
        default_samplerate: mhz(1),
        default_limit_samples: 1_000_000,
        min_samplerate: khz(10),
        max_samplerate: mhz(100),
        max_burst: BUFSIZE,
        description: "Use 16 Channels (Max 20MHz)",
    },
    ModeCaps {
        mode: Mode::Analog,
        num_channels: 2,
        unit_bits: 8,
        default_samplerate: mhz(1),
        default_limit_samples: 1_000_000,
        min_samplerate: hz(10),
        max_samplerate: mhz(10),
        max_burst: BUFSIZE,
        description: "Use Channels 0~1 (Max 10MHz)",
    },
    ModeCaps {
        mode: Mode::Oscilloscope,
        num_channels: 2,
        unit_bits: 8,
        default_samplerate: mhz(100),
        default_limit_samples: 10_000,
        min_samplerate: hz(100),
        max_samplerate: mhz(200),
        max_burst: DSO_BUFSIZE,
        description: "Use Channels 0~1 (Max 200MHz)",
    },
];

/// 1-2-5 ladder of rates offered to the user, before mode filtering.
pub const SAMPLERATES: [u64; 24] = [
    hz(10),
    hz(20),
    hz(50),
    hz(100),
    hz(200),
    hz(500),
    khz(1),
    khz(2),
    khz(5),
    khz(10),
    khz(20),
    khz(50),
    khz(100),
    khz(200),
    khz(500),
    mhz(1),
    mhz(2),
    mhz(5),
    mhz(10),
    mhz(20),
    mhz(50),
    mhz(100),
    mhz(200),
    mhz(400),
];

impl ModeCaps {
    /// Clamp `rate` into this mode's `[min, max]` window.
    pub fn clamp_samplerate(&self, rate: u64) -> u64 {
        rate.clamp(self.min_samplerate, self.max_samplerate)
    }

    pub fn supported_samplerates(&self) -> Vec<u64> {
        SAMPLERATES
            .iter()
            .copied()
            .filter(|r| (self.min_samplerate..=self.max_samplerate).contains(r))
            .collect()
    }

    /// Logic captures are paced in whole quanta of this many samples.
    pub fn pacing_quantum(&self) -> Option<u64> {
        match self.mode {
            Mode::Logic => Some(LOGIC_QUANTUM),
            Mode::Analog | Mode::Oscilloscope => None,
        }
    }
}

pub const LOGIC_QUANTUM: u64 = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_lookup_matches_mode() {
        for mode in [Mode::Logic, Mode::Analog, Mode::Oscilloscope] {
            assert_eq!(mode.caps().mode, mode);
            assert!(mode.caps().min_samplerate <= mode.caps().default_samplerate);
            assert!(mode.caps().default_samplerate <= mode.caps().max_samplerate);
        }
    }

    #[test]
    fn test_clamp_samplerate() {
        let caps = Mode::Logic.caps();
        assert_eq!(caps.clamp_samplerate(100), khz(10));
        assert_eq!(caps.clamp_samplerate(mhz(400)), mhz(100));
        assert_eq!(caps.clamp_samplerate(mhz(5)), mhz(5));
    }

    #[test]
    fn test_supported_samplerates_respect_bounds() {
        let rates = Mode::Oscilloscope.caps().supported_samplerates();
        assert_eq!(rates.first(), Some(&hz(100)));
        assert_eq!(rates.last(), Some(&mhz(200)));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("DSO".parse::<Mode>().unwrap(), Mode::Oscilloscope);
        assert_eq!(Mode::from_id(Mode::Analog.id()), Some(Mode::Analog));
        assert!("spectrum".parse::<Mode>().is_err());
    }
}

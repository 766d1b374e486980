use crate::demo_mode::ModeCaps;
use polars::prelude::*;

/// Vertical divisions shown on screen, used for the default voltage map.
pub const DSO_VDIVS: u64 = 10;

/// Volts-per-division choices in millivolts.
pub const VDIVS: [u64; 10] = [10, 20, 50, 100, 200, 500, 1000, 2000, 5000, 10000];

pub const MAP_UNITS: [&str; 7] = ["V", "A", "°C", "°F", "g", "m", "m/s"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Dc,
    Ac,
    Gnd,
}

impl Coupling {
    pub fn as_byte(&self) -> u8 {
        match self {
            Coupling::Dc => 0,
            Coupling::Ac => 1,
            Coupling::Gnd => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Coupling::Dc),
            1 => Some(Coupling::Ac),
            2 => Some(Coupling::Gnd),
            _ => None,
        }
    }
}

/// One input of the virtual device together with its runtime attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub index: u16,
    pub name: String,
    pub enabled: bool,
    pub bits: u8,
    pub coupling: Coupling,
    /// Millivolts per division.
    pub vdiv: u64,
    /// Probe attenuation factor.
    pub vfactor: u64,
    /// Display offset.
    pub offset: u16,
    /// Raw value representing 0 V.
    pub hw_offset: u16,
    pub trig_value: u8,
    pub map_default: bool,
    pub map_unit: String,
    pub map_min: f64,
    pub map_max: f64,
}

impl Channel {
    pub fn new(index: u16, caps: &ModeCaps) -> Self {
        let bits = caps.unit_bits;
        let mid = 1u16 << (bits - 1);
        let offset = if bits >= 2 {
            let step = f64::from(1u16 << (bits - 2));
            let centre = f64::from(caps.num_channels - 1) / 2.0;
            (f64::from(mid) + (f64::from(index) - centre) * step) as u16
        } else {
            mid
        };

        let mut channel = Self {
            index,
            name: index.to_string(),
            enabled: true,
            bits,
            coupling: Coupling::Ac,
            vdiv: 1000,
            vfactor: 1,
            offset,
            hw_offset: mid,
            trig_value: mid as u8,
            map_default: true,
            map_unit: MAP_UNITS[0].to_string(),
            map_min: 0.0,
            map_max: 0.0,
        };
        channel.reset_map();
        channel
    }

    /// Restore the voltage map derived from vdiv and factor.
    pub fn reset_map(&mut self) {
        let span = (self.vdiv * self.vfactor * DSO_VDIVS) as f64 / 2000.0;
        self.map_unit = MAP_UNITS[0].to_string();
        self.map_min = -span;
        self.map_max = span;
    }

    /// Raw 8-bit level for a waveform table value.
    ///
    /// AC coupling removes `dc_bias` from the table value before scaling,
    /// DC coupling keeps it, ground coupling pins the level to `hw_offset`.
    pub fn sample_byte(&self, table_value: i16, dc_bias: i16) -> u8 {
        let gain = 1000.0 / self.vdiv as f64;
        let level = match self.coupling {
            Coupling::Ac => f64::from(self.hw_offset) + gain * f64::from(table_value - dc_bias),
            Coupling::Dc => f64::from(self.hw_offset) + gain * f64::from(table_value),
            Coupling::Gnd => f64::from(self.hw_offset),
        };
        level as u8
    }

    /// Convert raw sample values to the mapped unit.
    pub fn raw_to_voltage(&self, raw_value: Expr) -> Expr {
        let per_count = (self.map_max - self.map_min) / 256.0;
        (raw_value - lit(f64::from(self.hw_offset))) * lit(per_count)
    }

    /// Add a `ch<N>_volts` column computed from `ch<N>_raw`.
    pub fn apply_voltage_map(&self, df: LazyFrame) -> LazyFrame {
        let raw = format!("ch{}_raw", self.index);
        let volts = format!("ch{}_volts", self.index);
        df.with_column(self.raw_to_voltage(col(raw.as_str())).alias(volts.as_str()))
    }
}

/// The channel list of the selected mode.
pub fn default_channels(caps: &ModeCaps) -> Vec<Channel> {
    (0..caps.num_channels)
        .map(|index| Channel::new(index, caps))
        .collect()
}

pub fn enabled_count(channels: &[Channel]) -> usize {
    channels.iter().filter(|c| c.enabled).count()
}

use crate::packet::{Packet, PacketSink, SinkError};
use crate::trigger_config::TRIGGER_BITS;
use polars::prelude::*;

pub const TIME_COLUMN_NAME: &str = "time";
pub const BITMAP_COLUMN_NAME: &str = "bitmap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Logic,
    Scope,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No sample data was recorded")]
    Empty,

    #[error("Frame construction failed: {0}")]
    Frame(#[from] PolarsError),
}

/// Packet sink that keeps what the engine forwards.
///
/// Logic and analog payloads are appended. Oscilloscope payloads redraw a
/// window, so only the latest one is kept.
#[derive(Debug, Default)]
pub struct CaptureRecorder {
    kind: Option<CaptureKind>,
    samples: Vec<u16>,
    headers: usize,
    ends: usize,
    data_packets: usize,
    trigger_positions: Vec<usize>,
}

impl CaptureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<CaptureKind> {
        self.kind
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn headers(&self) -> usize {
        self.headers
    }

    pub fn ends(&self) -> usize {
        self.ends
    }

    pub fn data_packets(&self) -> usize {
        self.data_packets
    }

    /// Offsets reported by trigger packets, relative to their batch.
    pub fn trigger_positions(&self) -> &[usize] {
        &self.trigger_positions
    }

    /// Turn the recorded samples into a lazy frame with a time axis.
    ///
    /// Logic captures get a `bitmap` column plus one `bit_<N>` column per
    /// probe. Scope captures get `ch0_raw` and `ch1_raw`.
    pub fn to_lazy_frame(&self, samplerate: u64) -> Result<LazyFrame, CaptureError> {
        let kind = match self.kind {
            Some(kind) if !self.samples.is_empty() => kind,
            _ => return Err(CaptureError::Empty),
        };

        let (df, columns) = match kind {
            CaptureKind::Logic => logic_frame(&self.samples)?,
            CaptureKind::Scope => scope_frame(&self.samples)?,
        };

        let period = 1.0 / samplerate.max(1) as f64;
        let mut selection = vec![col(TIME_COLUMN_NAME)];
        selection.extend(columns.iter().map(|name| col(name.as_str())));

        Ok(df
            .lazy()
            .with_row_index("row_index", Some(0))
            .with_columns([
                (col("row_index").cast(DataType::Float64) * lit(period)).alias(TIME_COLUMN_NAME)
            ])
            .select(selection))
    }
}

fn logic_frame(samples: &[u16]) -> Result<(DataFrame, Vec<String>), PolarsError> {
    let bitmap: Vec<u32> = samples.iter().map(|&word| u32::from(word)).collect();
    let mut columns = vec![Column::new(BITMAP_COLUMN_NAME.into(), bitmap)];
    let mut names = vec![BITMAP_COLUMN_NAME.to_string()];

    for bit in 0..TRIGGER_BITS {
        let values: Vec<bool> = samples.iter().map(|word| (word >> bit) & 1 == 1).collect();
        let name = format!("bit_{bit}");
        columns.push(Series::new(name.as_str().into(), values).into());
        names.push(name);
    }
    Ok((DataFrame::new(columns)?, names))
}

fn scope_frame(samples: &[u16]) -> Result<(DataFrame, Vec<String>), PolarsError> {
    let mut columns = Vec::with_capacity(2);
    let mut names = Vec::with_capacity(2);
    for ch in 0..2 {
        let values: Vec<f64> = samples
            .iter()
            .map(|word| f64::from((word >> (8 * ch)) & 0xff))
            .collect();
        let name = format!("ch{ch}_raw");
        columns.push(Column::new(name.as_str().into(), values));
        names.push(name);
    }
    Ok((DataFrame::new(columns)?, names))
}

impl PacketSink for CaptureRecorder {
    fn forward(&mut self, packet: &Packet<'_>) -> Result<(), SinkError> {
        match packet {
            Packet::Header => self.headers += 1,
            Packet::Trigger { real_pos } => self.trigger_positions.push(*real_pos),
            Packet::End(_) => self.ends += 1,
            Packet::Logic(logic) => {
                self.kind = Some(CaptureKind::Logic);
                self.samples.extend_from_slice(logic.data);
                self.data_packets += 1;
            }
            Packet::Analog(analog) => {
                self.kind = Some(CaptureKind::Scope);
                self.samples.extend_from_slice(analog.data);
                self.data_packets += 1;
            }
            Packet::Dso(dso) => {
                self.kind = Some(CaptureKind::Scope);
                self.samples.clear();
                self.samples.extend_from_slice(dso.data);
                self.data_packets += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_mode::Mode;
    use crate::demo_probe::default_channels;
    use crate::packet::{DsoPacket, LogicFormat, LogicPacket, MeasuredQuantity, PacketStatus, Unit};

    #[test]
    fn test_empty_recorder() {
        let rec = CaptureRecorder::new();
        assert!(matches!(rec.to_lazy_frame(1000), Err(CaptureError::Empty)));
    }

    #[test]
    fn test_logic_frame_bits() -> Result<(), CaptureError> {
        let mut rec = CaptureRecorder::new();
        let data = [0x0000, 0x0005, 0xffff];
        rec.forward(&Packet::Header).unwrap();
        rec.forward(&Packet::Logic(LogicPacket {
            length: 6,
            format: LogicFormat::CrossChannelInterleaved,
            data: &data,
        }))
        .unwrap();
        rec.forward(&Packet::End(PacketStatus::Ok)).unwrap();
        assert_eq!(rec.kind(), Some(CaptureKind::Logic));
        assert_eq!(rec.headers(), 1);
        assert_eq!(rec.ends(), 1);

        let df = rec.to_lazy_frame(1000)?.collect()?;
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 2 + TRIGGER_BITS);

        let bit0: Vec<Option<bool>> = df.column("bit_0")?.bool()?.into_iter().collect();
        assert_eq!(bit0, vec![Some(false), Some(true), Some(true)]);
        let bit1: Vec<Option<bool>> = df.column("bit_1")?.bool()?.into_iter().collect();
        assert_eq!(bit1, vec![Some(false), Some(false), Some(true)]);

        let time = df.column(TIME_COLUMN_NAME)?.f64()?;
        assert_eq!(time.get(2), Some(0.002));
        Ok(())
    }

    #[test]
    fn test_scope_frame_keeps_latest_window() -> Result<(), CaptureError> {
        let channels = default_channels(Mode::Oscilloscope.caps());
        let mut rec = CaptureRecorder::new();
        for data in [[0x0102u16, 0x0304], [0x8080, 0x90a0]] {
            rec.forward(&Packet::Dso(DsoPacket {
                channels: &channels,
                num_samples: data.len(),
                mq: MeasuredQuantity::Voltage,
                unit: Unit::Volt,
                ac_coupled: true,
                data: &data,
            }))
            .unwrap();
        }
        assert_eq!(rec.data_packets(), 2);
        assert_eq!(rec.samples(), &[0x8080, 0x90a0]);

        let lf = rec.to_lazy_frame(1_000_000)?;
        let lf = channels
            .iter()
            .fold(lf, |lf, channel| channel.apply_voltage_map(lf));
        let df = lf.collect()?;

        let ch0: Vec<Option<f64>> = df.column("ch0_raw")?.f64()?.into_iter().collect();
        assert_eq!(ch0, vec![Some(128.0), Some(160.0)]);
        let ch1: Vec<Option<f64>> = df.column("ch1_raw")?.f64()?.into_iter().collect();
        assert_eq!(ch1, vec![Some(128.0), Some(144.0)]);

        let volts = df.column("ch0_volts")?.f64()?;
        let hw_offset = f64::from(channels[0].hw_offset);
        let per_count = (channels[0].map_max - channels[0].map_min) / 256.0;
        assert_eq!(volts.get(1), Some((160.0 - hw_offset) * per_count));
        Ok(())
    }
}

use crate::demo_probe::Channel;
use std::sync::{Arc, Mutex};

/// Layout of logic sample words: each word holds one sample of every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicFormat {
    CrossChannelInterleaved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasuredQuantity {
    Voltage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicPacket<'a> {
    /// Payload size in bytes.
    pub length: usize,
    pub format: LogicFormat,
    pub data: &'a [u16],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DsoPacket<'a> {
    pub channels: &'a [Channel],
    /// Doubled when exactly one channel is enabled.
    pub num_samples: usize,
    pub mq: MeasuredQuantity,
    pub unit: Unit,
    pub ac_coupled: bool,
    pub data: &'a [u16],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogPacket<'a> {
    pub channels: &'a [Channel],
    pub num_samples: usize,
    pub unit_bits: u8,
    pub mq: MeasuredQuantity,
    pub unit: Unit,
    pub data: &'a [u16],
}

/// One unit of the outgoing data feed.
///
/// Payload slices borrow the engine's sample buffer, which is overwritten on
/// the next tick. Sinks copy whatever they keep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet<'a> {
    Header,
    Logic(LogicPacket<'a>),
    Dso(DsoPacket<'a>),
    Analog(AnalogPacket<'a>),
    Trigger { real_pos: usize },
    End(PacketStatus),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Packet sink is closed")]
    Closed,

    #[error("Packet rejected: {0}")]
    Rejected(String),
}

/// Downstream consumer of forwarded packets.
pub trait PacketSink {
    fn forward(&mut self, packet: &Packet<'_>) -> Result<(), SinkError>;
}

impl<T: PacketSink> PacketSink for Arc<Mutex<T>> {
    fn forward(&mut self, packet: &Packet<'_>) -> Result<(), SinkError> {
        self.lock()
            .map_err(|_| SinkError::Closed)?
            .forward(packet)
    }
}

impl<F> PacketSink for F
where
    F: FnMut(&Packet<'_>) -> Result<(), SinkError>,
{
    fn forward(&mut self, packet: &Packet<'_>) -> Result<(), SinkError> {
        self(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink() {
        let mut seen = 0;
        let mut sink = |packet: &Packet<'_>| {
            if matches!(packet, Packet::End(_)) {
                return Err(SinkError::Closed);
            }
            seen += 1;
            Ok(())
        };
        assert!(sink.forward(&Packet::Header).is_ok());
        assert!(sink.forward(&Packet::Trigger { real_pos: 3 }).is_ok());
        assert!(matches!(
            sink.forward(&Packet::End(PacketStatus::Ok)),
            Err(SinkError::Closed)
        ));
        assert_eq!(seen, 2);
    }
}

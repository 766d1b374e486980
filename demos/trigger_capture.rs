// Logic capture gated by a trigger
//
// Arms a bit trigger, streams until the sample limit and reports where the
// trigger fired and how many samples made it through.

use clap::{Parser, ValueEnum};
use demoscope_rs::packet::Packet;
use demoscope_rs::{BitState, ConfigKey, DemoScope, LogicTrigger, SinkError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "trigger_capture")]
#[command(version = "1.0")]
#[command(about = "Capture logic samples after a trigger condition")]
struct Args {
    /// State of probe 0
    #[arg(long, value_enum, default_value_t = ProbeState::Rising)]
    bit0: ProbeState,

    /// State of probe 1
    #[arg(long, value_enum, default_value_t = ProbeState::Any)]
    bit1: ProbeState,

    /// Samplerate in Hz
    #[arg(short, long, default_value_t = 20_000)]
    samplerate: u64,

    /// Number of samples to capture
    #[arg(short, long, default_value_t = 20_000)]
    limit: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

/// Trigger condition for one probe
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProbeState {
    High,
    Low,
    Rising,
    Falling,
    /// Don't care
    Any,
}

impl From<ProbeState> for BitState {
    fn from(state: ProbeState) -> Self {
        match state {
            ProbeState::High => BitState::High,
            ProbeState::Low => BitState::Low,
            ProbeState::Rising => BitState::Rising,
            ProbeState::Falling => BitState::Falling,
            ProbeState::Any => BitState::DontCare,
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    trigger_pos: Option<usize>,
    packets: usize,
    bytes: usize,
    ended: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let trigger = LogicTrigger::start_capturing_when()
        .bit0(args.bit0.into())
        .bit1(args.bit1.into())
        .build();

    println!("DemoScope Trigger Capture");
    println!("=========================");
    println!(
        "Trigger: mask {:#06x} value {:#06x} edge {:#06x}\n",
        trigger.mask, trigger.value, trigger.edge
    );

    let mut scope = DemoScope::new();
    scope.configure(ConfigKey::Samplerate, args.samplerate.into(), None)?;
    scope.configure(ConfigKey::LimitSamples, args.limit.into(), None)?;
    scope.set_trigger(Some(trigger))?;

    let summary = Arc::new(Mutex::new(Summary::default()));
    let sink_summary = summary.clone();
    scope.acquisition_start(move |packet: &Packet<'_>| -> Result<(), SinkError> {
        let mut summary = sink_summary.lock().map_err(|_| SinkError::Closed)?;
        match packet {
            Packet::Trigger { real_pos } => summary.trigger_pos = Some(*real_pos),
            Packet::Logic(logic) => {
                summary.packets += 1;
                summary.bytes += logic.length;
            }
            Packet::End(_) => summary.ended = true,
            _ => {}
        }
        Ok(())
    })?;

    let finished = scope.run_until_stopped(Duration::from_secs(10))?;
    if !finished {
        scope.acquisition_stop()?;
    }

    let summary = summary.lock().map_err(|_| "summary lock poisoned")?;
    match summary.trigger_pos {
        Some(pos) => println!("Trigger fired at batch offset {pos}"),
        None => println!("Trigger never fired"),
    }
    println!(
        "{} logic packets, {} bytes, end packet seen: {}",
        summary.packets, summary.bytes, summary.ended
    );
    println!("Samples counted: {}", scope.status_query().captured_count());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_states_parse_as_value_enum() {
        let args = Args::try_parse_from(["trigger_capture", "--bit0", "falling"]).unwrap();
        assert_eq!(BitState::from(args.bit0), BitState::Falling);
        assert_eq!(BitState::from(args.bit1), BitState::DontCare);
        assert!(Args::try_parse_from(["trigger_capture", "--bit1", "sideways"]).is_err());
    }
}

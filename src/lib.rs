//! # DemoScope RS
//!
//! A virtual logic analyzer / oscilloscope. It behaves like a small USB
//! instrument but synthesizes every sample in software, paced against the
//! wall clock.
//!
//! ## Features
//!
//! - **Three personalities**: 16 channel logic analyzer, 2 channel
//!   oscilloscope and 2 channel data recorder, each with its own capability table
//! - **Waveform patterns**: sine, square, triangle, sawtooth and random tables
//! - **Real-time pacing**: due samples follow the wall clock regardless of how
//!   often the host polls
//! - **Logic triggers**: mask/value/edge words, built bit by bit with a builder
//! - **Probe model**: volts/div, coupling, probe factor and unit mapping per channel
//! - **Measurement status**: min/max, mean, RMS and cycle timing per channel
//! - **DataFrame output**: recorded captures convert to `polars` lazy frames
//!
//! ## Examples
//!
//! ### Logic capture
//!
//! ```rust,no_run
//! use demoscope_rs::{CaptureRecorder, ConfigKey, DemoScope};
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! let mut scope = DemoScope::new();
//! scope.configure(ConfigKey::Samplerate, 10_000u64.into(), None)?;
//! scope.configure(ConfigKey::LimitSamples, 10_000u64.into(), None)?;
//!
//! let recorder = Arc::new(Mutex::new(CaptureRecorder::new()));
//! scope.acquisition_start(recorder.clone())?;
//! scope.run_until_stopped(Duration::from_secs(5))?;
//!
//! let frame = recorder.lock().unwrap().to_lazy_frame(scope.samplerate())?.collect()?;
//! println!("Captured {} samples", frame.height());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Logic trigger
//!
//! ```rust
//! use demoscope_rs::{BitState, LogicTrigger};
//!
//! let trigger = LogicTrigger::start_capturing_when()
//!     .bit0(BitState::Rising)
//!     .bit1(BitState::Low)
//!     .build();
//!
//! assert_eq!(trigger.edge, 0b01);
//! assert_eq!(trigger.value, 0b01);
//! assert_eq!(trigger.mask & 0b11, 0);
//! ```
//!
//! ### Oscilloscope probes
//!
//! ```rust
//! use demoscope_rs::{ConfigKey, DemoScope, Mode};
//!
//! let mut scope = DemoScope::new();
//! scope.select_mode(Mode::Oscilloscope)?;
//! scope.set_channel_attr(0, ConfigKey::ProbeVdiv, 500u64.into())?;
//! scope.configure_by_name("pattern_mode", "Square".into(), None)?;
//! assert_eq!(scope.channels()[0].vdiv, 500);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capture;
pub mod config;
pub mod demo_mode;
pub mod demo_probe;
pub mod demo_scope;
pub mod packet;
pub mod pacing;
pub mod sample_generator;
pub mod trigger_config;
pub mod waveform;

// Re-export the main types for convenience
pub use trigger_config::{BitState, BitTriggerBuilder, LogicTrigger, TriggerMatcher, TriggerStage};

pub use demo_mode::{Mode, ModeCaps};

pub use demo_probe::{Channel, Coupling};

pub use config::{ConfigError, ConfigKey, ConfigValue};

pub use packet::{Packet, PacketSink, SinkError};

pub use pacing::{Clock, ManualClock, MonotonicClock, POLL_INTERVAL};

pub use sample_generator::{ChannelStatus, SampleGenerator, StatusSnapshot};

pub use demo_scope::{DemoScope, EngineError, Phase, TickOutcome};

pub use capture::{CaptureError, CaptureRecorder};

pub use waveform::Pattern;

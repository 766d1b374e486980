// Streaming capture example
//
// Runs one acquisition in the selected mode, polling the engine the way a
// host application would, and prints the measurement status at the end.

use clap::Parser;
use demoscope_rs::{
    CaptureRecorder, ConfigKey, DemoScope, Mode, Pattern, TickOutcome, POLL_INTERVAL,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "stream_capture")]
#[command(version = "1.0")]
#[command(about = "Stream synthesized samples from the virtual instrument")]
struct Args {
    /// Device mode: logic, dso or analog
    #[arg(short, long, default_value = "logic")]
    mode: Mode,

    /// Samplerate in Hz (clamped to the mode's bounds)
    #[arg(short, long, default_value_t = 10_000)]
    samplerate: u64,

    /// Number of samples to capture
    #[arg(short, long, default_value_t = 10_000)]
    limit: u64,

    /// Waveform pattern for the scope modes
    #[arg(short, long, default_value = "Sine")]
    pattern: Pattern,

    /// Capture a single burst instead of redrawing the scope window
    #[arg(short, long)]
    instant: bool,

    /// Give up after this many seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
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

    let mut scope = DemoScope::new();
    scope.select_mode(args.mode)?;
    scope.configure(ConfigKey::Samplerate, args.samplerate.into(), None)?;
    scope.configure(ConfigKey::LimitSamples, args.limit.into(), None)?;
    scope.configure(ConfigKey::PatternMode, args.pattern.as_str().into(), None)?;
    scope.configure(ConfigKey::Instant, args.instant.into(), None)?;

    println!("DemoScope Stream Capture");
    println!("========================");
    println!("Mode: {} ({})", scope.mode(), scope.caps().description);
    println!("Samplerate: {} Hz", scope.samplerate());
    println!("Limit: {} samples\n", scope.limit_samples());

    let recorder = Arc::new(Mutex::new(CaptureRecorder::new()));
    scope.acquisition_start(recorder.clone())?;

    let start = Instant::now();
    let deadline = Duration::from_secs(args.timeout);
    loop {
        match scope.tick()? {
            TickOutcome::Completed | TickOutcome::Stopped => break,
            TickOutcome::Emitted { samples } => log::debug!("Emitted {samples} samples"),
            TickOutcome::Pending => {}
        }
        if start.elapsed() > deadline {
            println!("Timeout reached, stopping");
            scope.acquisition_stop()?;
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let status = scope.status_query();
    println!(
        "Captured {} samples in {:.2}s",
        status.captured_count(),
        start.elapsed().as_secs_f64()
    );
    if status.measure_valid {
        for (i, ch) in status.channels.iter().enumerate() {
            println!(
                "  ch{i}: min {} max {} mean {:.1} rms {:.1} period {:.0} ns",
                ch.min,
                ch.max,
                ch.mean(),
                ch.rms(),
                ch.cyc_tlen
            );
        }
    }

    let recorder = recorder.lock().map_err(|_| "recorder lock poisoned")?;
    let frame = recorder.to_lazy_frame(scope.samplerate())?.collect()?;
    println!("\n{}", frame.head(Some(5)));
    Ok(())
}

//! # Strider Motion Binary
//!
//! Cyclic motion-control core running over the software transport: loads
//! the topology from TOML, enables every actuator on the velocity loop,
//! and cruises while emitting telemetry.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config until Ctrl-C
//! strider_motion --config config/motion.toml
//!
//! # Run for ten seconds with verbose logging
//! strider_motion --config config/motion.toml --duration 10 -v
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use strider_common::motion::{CmdStatus, OpMode, ServoCmd};
use strider_motion::controller::CycleView;
use strider_motion::{MotionConfig, MotionController, SimMaster};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Cruise velocity the demo strategy commands, counts per second.
const DEMO_CRUISE_VEL: i32 = 2000;

/// Strider Motion - cyclic fieldbus motion-control core
#[derive(Parser, Debug)]
#[command(name = "strider_motion")]
#[command(version)]
#[command(about = "Cyclic motion-control core over a simulated fieldbus")]
#[command(long_about = None)]
struct Args {
    /// Path to the controller configuration file.
    #[arg(short, long, default_value = "config/motion.toml")]
    config: PathBuf,

    /// Run duration in seconds; 0 runs until Ctrl-C.
    #[arg(short, long, default_value_t = 0)]
    duration: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = run() {
        error!("controller startup failed: {err}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_tracing(&args);

    info!("strider motion core v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = MotionConfig::load(&args.config)?;
    info!(
        slaves = config.slaves.len(),
        period_us = config.controller.cycle_period_us,
        "configuration loaded from {}",
        args.config.display()
    );

    let master = SimMaster::from_config(&config);
    let mut controller = MotionController::new(master, &config)?;
    controller.set_strategy(demo_strategy())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            stop.store(true, Ordering::SeqCst);
        })?;
    }
    if args.duration > 0 {
        let stop = Arc::clone(&stop);
        let duration = Duration::from_secs(args.duration);
        thread::spawn(move || {
            thread::sleep(duration);
            stop.store(true, Ordering::SeqCst);
        });
    }

    controller.start()?;
    let loop_result = controller.run(&stop);
    controller.stop();

    let stats = controller.stats();
    info!(
        cycles = stats.cycle_count,
        avg_ns = stats.avg_cycle_ns(),
        max_ns = stats.max_cycle_ns,
        overruns = stats.overruns,
        "cycle loop finished"
    );
    for (abs, frame) in controller.frames().iter().enumerate() {
        info!(
            servo = abs,
            position = frame.feedback_pos,
            velocity = frame.feedback_vel,
            "final actuator state"
        );
    }
    loop_result?;

    info!("strider motion core shutdown complete");
    Ok(())
}

/// Enable every actuator on the velocity loop, then cruise.
///
/// Stateless across cycles: each actuator's previous frame says whether
/// its enable chain has converged.
fn demo_strategy() -> impl FnMut(&mut CycleView<'_>) -> i32 + Send + 'static {
    |view| {
        for (abs, frame) in view.frames.iter_mut().enumerate() {
            let last = &view.last[abs];
            let cruising = last.cmd == ServoCmd::Run
                || (last.cmd == ServoCmd::Enable && last.ret == CmdStatus::Done.as_ret());
            if cruising {
                frame.cmd = ServoCmd::Run;
                frame.mode = OpMode::Velocity;
                frame.target_vel = DEMO_CRUISE_VEL;
            } else {
                frame.cmd = ServoCmd::Enable;
                frame.mode = OpMode::Velocity;
            }
        }
        0
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

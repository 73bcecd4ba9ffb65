//! Cycle orchestration.
//!
//! [`MotionController`] owns the device topology and runs the per-cycle
//! sequence: poll the inbound message slot, read feedback, update force
//! readings, invoke the registered strategy, execute the staged frame
//! commands, and publish the telemetry sample. All per-cycle buffers
//! are indexed by logical device ID; the identity maps translate to the
//! physical (declaration) order the bus uses.
//!
//! ## Threads
//!
//! The cycle body runs on the caller's thread (`cycle()` once per bus
//! exchange, or `run()` for the paced loop). The telemetry emitter is
//! the only thread the controller spawns; it is joined on `stop()` and
//! on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use strider_common::bridge::{Handoff, MsgBridge};
use strider_common::motion::{ForceReading, ServoFrame};
use strider_common::msg::RtMsg;
use strider_common::telemetry::{ImuCompact, TelemetrySample};

use crate::config::{MotionConfig, SlaveConfig, TelemetryConfig};
use crate::emitter::TelemetryTask;
use crate::error::{ConfigError, ControlError};
use crate::force::ForceSensor;
use crate::rt::{self, CycleStats};
use crate::servo::ServoDrive;
use crate::transport::CyclicMaster;

/// An overrun warning is emitted on the first overrun and then once per
/// this many further overruns.
const OVERRUN_WARN_EVERY: u64 = 100;

// ─── IMU Attitude Share ─────────────────────────────────────────────

/// Lock-free attitude share.
///
/// An external IMU driver thread stores the latest orientation; the
/// cycle snapshots it into the telemetry sample without locking.
#[derive(Debug, Default)]
pub struct ImuShare {
    yaw: AtomicU32,
    pitch: AtomicU32,
    roll: AtomicU32,
}

impl ImuShare {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a yaw/pitch/roll triple, radians.
    pub fn store(&self, yaw: f32, pitch: f32, roll: f32) {
        self.yaw.store(yaw.to_bits(), Ordering::Relaxed);
        self.pitch.store(pitch.to_bits(), Ordering::Relaxed);
        self.roll.store(roll.to_bits(), Ordering::Relaxed);
    }

    /// Snapshot the latest attitude.
    pub fn load(&self) -> ImuCompact {
        ImuCompact {
            yaw: f32::from_bits(self.yaw.load(Ordering::Relaxed)),
            pitch: f32::from_bits(self.pitch.load(Ordering::Relaxed)),
            roll: f32::from_bits(self.roll.load(Ordering::Relaxed)),
        }
    }
}

// ─── Strategy View ──────────────────────────────────────────────────

/// The strategy's window into one cycle.
///
/// Frames and force readings are in logical order. The strategy stages
/// commands by writing `cmd`/`mode`/targets into `frames`; the
/// orchestrator executes them after the strategy returns.
pub struct CycleView<'a> {
    /// Previous cycle's frames, with the `ret` of each executed command.
    pub last: &'a [ServoFrame],
    /// This cycle's frames, feedback fields already refreshed.
    pub frames: &'a mut [ServoFrame],
    /// This cycle's force readings. Setting `zeroing_requested` re-arms
    /// that sensor's baseline window after the cycle.
    pub force: &'a mut [ForceReading],
    /// Inbound message, if one arrived this cycle.
    pub msg_in: Option<&'a RtMsg>,
    /// Outbound message slot, forwarded to the application side.
    pub msg_out: &'a mut Option<RtMsg>,
}

type Strategy = Box<dyn FnMut(&mut CycleView<'_>) -> i32 + Send>;

// ─── Controller ─────────────────────────────────────────────────────

/// The cycle orchestrator over one transport.
pub struct MotionController<M: CyclicMaster> {
    master: M,
    servos: Vec<ServoDrive>,
    forces: Vec<ForceSensor>,
    servo_phy2abs: Vec<usize>,
    servo_abs2phy: Vec<usize>,
    force_phy2abs: Vec<usize>,
    force_abs2phy: Vec<usize>,
    frames: Vec<ServoFrame>,
    last_frames: Vec<ServoFrame>,
    force_readings: Vec<ForceReading>,
    strategy: Option<Strategy>,
    bridge: Arc<MsgBridge>,
    imu: Arc<ImuShare>,
    samples: Arc<Handoff<TelemetrySample>>,
    telemetry: Option<TelemetryTask>,
    telemetry_config: TelemetryConfig,
    cycle_period: Duration,
    cpu_core: usize,
    rt_priority: i32,
    cycle_count: i32,
    stats: CycleStats,
}

impl<M: CyclicMaster> MotionController<M> {
    /// Build the topology from configuration and program the device
    /// setup parameters over the transport.
    ///
    /// Slot numbering is declaration order across all slaves; couplers
    /// and junctions occupy slots without cyclic behavior.
    pub fn new(mut master: M, config: &MotionConfig) -> Result<Self, ConfigError> {
        if master.slave_count() != config.slaves.len() {
            return Err(ConfigError::Invalid(format!(
                "config declares {} slaves but the transport has {}",
                config.slaves.len(),
                master.slave_count()
            )));
        }

        let mut servos = Vec::new();
        let mut forces = Vec::new();
        for (slot, slave) in config.slaves.iter().enumerate() {
            match slave {
                SlaveConfig::Servo(servo) => {
                    let phy = servos.len();
                    servos.push(ServoDrive::new(slot, phy, servo.settings()));
                }
                SlaveConfig::ForceSensor(force) => {
                    let phy = forces.len();
                    forces.push(ForceSensor::new(slot, phy, force.abs_id));
                }
                SlaveConfig::Coupler | SlaveConfig::Junction => {}
            }
        }

        let (servo_phy2abs, servo_abs2phy) =
            identity_maps("servo", servos.iter().map(|drive| drive.abs_id()))?;
        let (force_phy2abs, force_abs2phy) =
            identity_maps("force sensor", forces.iter().map(|sensor| sensor.abs_id()))?;

        for drive in &mut servos {
            let link = master.link(drive.slot());
            drive.init(link);
        }
        for sensor in &mut forces {
            let link = master.link(sensor.slot());
            sensor.init(&*link);
        }

        info!(
            slots = config.slaves.len(),
            servos = servos.len(),
            forces = forces.len(),
            "controller topology ready"
        );

        let frames = vec![ServoFrame::default(); servos.len()];
        let force_readings = vec![ForceReading::default(); forces.len()];
        Ok(Self {
            master,
            last_frames: frames.clone(),
            frames,
            force_readings,
            servos,
            forces,
            servo_phy2abs,
            servo_abs2phy,
            force_phy2abs,
            force_abs2phy,
            strategy: None,
            bridge: Arc::new(MsgBridge::new()),
            imu: Arc::new(ImuShare::new()),
            samples: Arc::new(Handoff::new()),
            telemetry: None,
            telemetry_config: config.telemetry.clone(),
            cycle_period: Duration::from_micros(u64::from(config.controller.cycle_period_us)),
            cpu_core: config.controller.cpu_core,
            rt_priority: config.controller.rt_priority,
            cycle_count: 0,
            stats: CycleStats::new(),
        })
    }

    /// Register the cycle strategy. At most one may ever be registered.
    pub fn set_strategy(
        &mut self,
        strategy: impl FnMut(&mut CycleView<'_>) -> i32 + Send + 'static,
    ) -> Result<(), ControlError> {
        if self.strategy.is_some() {
            return Err(ControlError::StrategyAlreadySet);
        }
        self.strategy = Some(Box::new(strategy));
        Ok(())
    }

    /// The message link application threads use to talk to the cycle.
    pub fn bridge(&self) -> &Arc<MsgBridge> {
        &self.bridge
    }

    /// The attitude share an external IMU driver stores into.
    pub fn imu_share(&self) -> &Arc<ImuShare> {
        &self.imu
    }

    /// The hand-off cell the telemetry emitter drains.
    pub fn sample_handoff(&self) -> &Arc<Handoff<TelemetrySample>> {
        &self.samples
    }

    /// This cycle's frames, logical order.
    pub fn frames(&self) -> &[ServoFrame] {
        &self.frames
    }

    /// This cycle's force readings, logical order.
    pub fn force_readings(&self) -> &[ForceReading] {
        &self.force_readings
    }

    /// Cycle timing statistics of the paced loop.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// The underlying transport.
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Physical-to-logical servo ID map.
    pub fn servo_phy2abs(&self) -> &[usize] {
        &self.servo_phy2abs
    }

    /// Logical-to-physical servo ID map.
    pub fn servo_abs2phy(&self) -> &[usize] {
        &self.servo_abs2phy
    }

    /// Physical-to-logical force sensor ID map.
    pub fn force_phy2abs(&self) -> &[usize] {
        &self.force_phy2abs
    }

    /// Logical-to-physical force sensor ID map.
    pub fn force_abs2phy(&self) -> &[usize] {
        &self.force_abs2phy
    }

    /// Run one cycle body against the current process-data images.
    ///
    /// Invoked once per bus exchange. Never blocks and never allocates
    /// beyond the bounded message hand-offs.
    pub fn cycle(&mut self) {
        let msg_in = self.bridge.cycle_take();
        let mut msg_out: Option<RtMsg> = None;

        for abs in 0..self.servos.len() {
            let drive = &self.servos[self.servo_abs2phy[abs]];
            let link = self.master.link(drive.slot());
            drive.read_feedback(&*link, &mut self.frames[abs]);
        }

        for abs in 0..self.forces.len() {
            let sensor = &mut self.forces[self.force_abs2phy[abs]];
            let link = self.master.link(sensor.slot());
            sensor.read_data(&*link, &mut self.force_readings[abs]);
        }

        if let Some(strategy) = self.strategy.as_mut() {
            let mut view = CycleView {
                last: &self.last_frames,
                frames: &mut self.frames,
                force: &mut self.force_readings,
                msg_in: msg_in.as_ref(),
                msg_out: &mut msg_out,
            };
            strategy(&mut view);
        }

        for abs in 0..self.servos.len() {
            let drive = &mut self.servos[self.servo_abs2phy[abs]];
            let frame = &mut self.frames[abs];
            let link = self.master.link(drive.slot());
            drive.read_feedback(&*link, frame);
            let status = drive.execute(link, frame);
            frame.ret = status.as_ret();
            self.last_frames[abs] = *frame;
        }

        for abs in 0..self.forces.len() {
            if self.force_readings[abs].zeroing_requested {
                self.forces[self.force_abs2phy[abs]].require_zeroing();
                self.force_readings[abs].zeroing_requested = false;
            }
        }

        if let Some(msg) = msg_out {
            self.bridge.cycle_offer(msg);
        }

        let mut sample = TelemetrySample {
            cycle_count: self.cycle_count,
            imu: self.imu.load(),
            ..Default::default()
        };
        sample.load_frames(&self.frames);
        sample.load_force(&self.force_readings);
        self.samples.offer(sample);
        self.cycle_count = self.cycle_count.wrapping_add(1);
    }

    /// Spawn the telemetry emitter. May be called once.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if self.telemetry.is_some() {
            return Err(ControlError::TelemetryAlreadyRunning);
        }
        let task = TelemetryTask::spawn(self.telemetry_config.clone(), Arc::clone(&self.samples))?;
        self.telemetry = Some(task);
        Ok(())
    }

    /// Stop and join the telemetry emitter. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.telemetry.take() {
            task.stop();
        }
    }

    /// The paced cycle loop: exchange the bus and run the cycle body
    /// once per period until the stop flag is raised.
    ///
    /// With the `rt` feature this locks memory, pins the thread, raises
    /// it to SCHED_FIFO, and paces with absolute deadlines; otherwise
    /// it paces with plain sleeps. Overruns are counted and warned
    /// about, never fatal.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), ControlError> {
        rt::rt_setup(self.cpu_core, self.rt_priority)?;
        info!(
            period_us = self.cycle_period.as_micros() as u64,
            "cycle loop starting"
        );

        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(stop)
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(stop);
            Ok(())
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, stop: &AtomicBool) -> Result<(), ControlError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period_ns = self.cycle_period.as_nanos() as i64;
        let mut next_wake = clock_gettime(clock)
            .map_err(|err| ControlError::RtSetup(format!("clock_gettime: {err}")))?;

        while !stop.load(Ordering::Relaxed) {
            next_wake = rt::timespec_add_ns(next_wake, period_ns);

            let cycle_start = clock_gettime(clock)
                .map_err(|err| ControlError::RtSetup(format!("clock_gettime: {err}")))?;

            self.cycle();
            self.master.exchange();

            let cycle_end = clock_gettime(clock)
                .map_err(|err| ControlError::RtSetup(format!("clock_gettime: {err}")))?;
            self.note_cycle(rt::timespec_diff_ns(&cycle_end, &cycle_start));

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, stop: &AtomicBool) {
        use std::time::Instant;

        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            self.cycle();
            self.master.exchange();

            let elapsed = cycle_start.elapsed();
            self.note_cycle(elapsed.as_nanos() as i64);

            if let Some(remaining) = self.cycle_period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }

    fn note_cycle(&mut self, duration_ns: i64) {
        self.stats.record(duration_ns);
        if duration_ns > self.cycle_period.as_nanos() as i64 {
            self.stats.overruns += 1;
            if self.stats.overruns == 1 || self.stats.overruns % OVERRUN_WARN_EVERY == 0 {
                warn!(
                    duration_ns,
                    overruns = self.stats.overruns,
                    "cycle overrun"
                );
            }
        }
    }
}

impl<M: CyclicMaster> Drop for MotionController<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the `phy→abs` and `abs→phy` maps for one device class.
///
/// Logical IDs must form a permutation of `0..N-1`; anything sparse or
/// duplicated is rejected.
fn identity_maps(
    class: &str,
    ids: impl Iterator<Item = usize>,
) -> Result<(Vec<usize>, Vec<usize>), ConfigError> {
    let phy2abs: Vec<usize> = ids.collect();
    let mut abs2phy = vec![usize::MAX; phy2abs.len()];
    for (phy, &abs) in phy2abs.iter().enumerate() {
        if abs >= abs2phy.len() {
            return Err(ConfigError::Invalid(format!(
                "{class} abs_id {abs} out of range for {} devices",
                abs2phy.len()
            )));
        }
        if abs2phy[abs] != usize::MAX {
            return Err(ConfigError::Invalid(format!(
                "duplicate {class} abs_id {abs}"
            )));
        }
        abs2phy[abs] = phy;
    }
    Ok((phy2abs, abs2phy))
}

// ─── Tests ──────────────────────────────────────────────────────────

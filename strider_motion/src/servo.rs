//! Servo drive state machine.
//!
//! One [`ServoDrive`] per actuator slave. Drive state is observed from
//! the status word on every call; transitions are requested by writing
//! control words, mode selects, and targets through the slave's
//! [`PdoLink`]. Each operation performs at most one bus action per call
//! and reports progress as a [`CmdStatus`]; the cyclic loop calling it
//! again next period is the retry mechanism.
//!
//! A freshly constructed drive is *fake*: motion commands succeed
//! without touching the bus until the first `enable`, `disable`, or
//! `home` call. This lets a strategy issue `Run` against actuators that
//! are not powered yet.

use strider_common::motion::{
    CW_ENABLE_OP, CW_FAULT_RESET, CW_HOMING_START, CW_SHUTDOWN, CW_SWITCH_ON, CmdStatus,
    DriveState, MODE_HOMING, OpMode, ServoCmd, ServoFrame, StatusBits,
};
use tracing::info;

use crate::transport::{PdoLink, servo_chan};

/// Consecutive zero-command cycles required before an enable completes.
pub const STABILIZE_CYCLES: u32 = 10;

/// Current limit written while stabilizing in current mode.
pub const DEFAULT_CUR_LIMIT: i16 = 1500;

/// Default proportional gain for the host-side position loop.
pub const DEFAULT_KP: f64 = 200.0;

// ─── Settings ───────────────────────────────────────────────────────

/// Count-domain settings derived from one servo's configuration.
///
/// `max_pos_count`/`min_pos_count` are carried for strategies to
/// consult; the command paths do not enforce them.
#[derive(Debug, Clone)]
pub struct ServoSettings {
    /// Scale from configured units to encoder counts.
    pub input2count: i32,
    pub max_pos_count: i32,
    pub min_pos_count: i32,
    /// Velocity clamp for the host-side position loop, counts.
    pub max_vel_count: i32,
    /// Home position in counts; its negation is programmed as the
    /// drive homing offset at init.
    pub home_count: i32,
    /// Application-facing logical ID.
    pub abs_id: usize,
    /// Proportional gain of the host-side position loop.
    pub kp: f64,
    /// Drive homing method, programmed at init when present.
    pub home_mode: Option<i32>,
}

// ─── Drive ──────────────────────────────────────────────────────────

/// State machine for one servo actuator slave.
#[derive(Debug)]
pub struct ServoDrive {
    slot: usize,
    phy_id: usize,
    settings: ServoSettings,
    pos_offset: i32,
    is_fake: bool,
    is_waiting_mode: bool,
    enable_cycles: u32,
    running_mode: OpMode,
}

impl ServoDrive {
    /// `slot` is the physical bus slot, `phy_id` the physical index
    /// within the servo class.
    pub fn new(slot: usize, phy_id: usize, settings: ServoSettings) -> Self {
        Self {
            slot,
            phy_id,
            settings,
            pos_offset: 0,
            is_fake: true,
            is_waiting_mode: false,
            enable_cycles: 0,
            running_mode: OpMode::Velocity,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn phy_id(&self) -> usize {
        self.phy_id
    }

    pub fn abs_id(&self) -> usize {
        self.settings.abs_id
    }

    pub fn settings(&self) -> &ServoSettings {
        &self.settings
    }

    pub fn pos_offset(&self) -> i32 {
        self.pos_offset
    }

    /// Offset added to the raw encoder position in all reported
    /// positions. Defaults to 0.
    pub fn set_pos_offset(&mut self, offset: i32) {
        self.pos_offset = offset;
    }

    /// Program setup-time drive parameters: the homing method (when
    /// configured) and the homing offset.
    pub fn init(&mut self, link: &mut dyn PdoLink) {
        if let Some(home_mode) = self.settings.home_mode {
            link.write_param(servo_chan::PARAM_HOME_MODE, home_mode);
            info!(
                phy_id = self.phy_id,
                home_mode, "homing method configured"
            );
        }
        link.write_param(
            servo_chan::PARAM_HOME_OFFSET,
            self.settings.home_count.wrapping_neg(),
        );
    }

    /// Walk the drive toward `Running` in `mode`, one step per call.
    ///
    /// The priority chain, first match wins: power ladder
    /// (`PoweredOff` -> `Stopped` -> `Enabled` via control words 0x06,
    /// 0x07, 0x0F), then mode programming when the displayed mode does
    /// not match the requested one on the wire, then zero-command
    /// stabilization while `Running` (ten consecutive calls before
    /// `Done`, latching `mode` as the running mode), else a fault
    /// reset. The stabilization counter survives an interrupted
    /// attempt. Mode programming deliberately precedes the `Running`
    /// check so a faulted drive with a stale mode display is programmed
    /// before its fault is reset.
    pub fn enable(&mut self, link: &mut dyn PdoLink, mode: OpMode) -> CmdStatus {
        self.is_fake = false;

        let status = read_status(link);
        let display = read_display(link);
        let state = DriveState::from_status(status);

        if state == DriveState::PoweredOff {
            link.write_u16(servo_chan::CONTROL_WORD, CW_SHUTDOWN);
            CmdStatus::Busy
        } else if state == DriveState::Stopped {
            link.write_u16(servo_chan::CONTROL_WORD, CW_SWITCH_ON);
            CmdStatus::Busy
        } else if state == DriveState::Enabled {
            link.write_u16(servo_chan::CONTROL_WORD, CW_ENABLE_OP);
            CmdStatus::Busy
        } else if display != mode.wire_mode() {
            link.write_u8(servo_chan::MODE_SELECT, mode.wire_mode());
            CmdStatus::Busy
        } else if state == DriveState::Running {
            match mode {
                OpMode::Position | OpMode::Velocity => {
                    link.write_i32(servo_chan::TARGET_VEL, 0);
                }
                OpMode::Current => {
                    link.write_i16(servo_chan::TARGET_CUR, 0);
                    link.write_i16(servo_chan::CUR_LIMIT, DEFAULT_CUR_LIMIT);
                }
            }

            self.enable_cycles += 1;
            if self.enable_cycles >= STABILIZE_CYCLES {
                self.running_mode = mode;
                self.enable_cycles = 0;
                CmdStatus::Done
            } else {
                CmdStatus::Busy
            }
        } else {
            link.write_u16(servo_chan::CONTROL_WORD, CW_FAULT_RESET);
            CmdStatus::Busy
        }
    }

    /// Walk the drive down to `Stopped`, one step per call.
    pub fn disable(&mut self, link: &mut dyn PdoLink) -> CmdStatus {
        self.is_fake = false;

        match DriveState::from_status(read_status(link)) {
            DriveState::Stopped => CmdStatus::Done,
            DriveState::Enabled | DriveState::Running | DriveState::PoweredOff => {
                link.write_u16(servo_chan::CONTROL_WORD, CW_SHUTDOWN);
                CmdStatus::Busy
            }
            DriveState::Fault => {
                link.write_u16(servo_chan::CONTROL_WORD, CW_FAULT_RESET);
                CmdStatus::Busy
            }
        }
    }

    /// Run the drive-internal homing procedure, one step per call.
    ///
    /// Requires `Running`. Switches the displayed mode to homing,
    /// asserts the homing control word until the status word reports
    /// attained (bit 12), then restores the running mode latched by the
    /// last completed enable and re-runs the enable chain until it
    /// settles.
    pub fn home(&mut self, link: &mut dyn PdoLink) -> CmdStatus {
        self.is_fake = false;

        if self.is_waiting_mode {
            let ret = self.enable(link, self.running_mode);
            if ret.is_done() {
                self.is_waiting_mode = false;
            }
            return ret;
        }

        let status = read_status(link);
        if DriveState::from_status(status) != DriveState::Running {
            return CmdStatus::Rejected;
        }

        if read_display(link) != MODE_HOMING {
            link.write_u8(servo_chan::MODE_SELECT, MODE_HOMING);
            CmdStatus::Busy
        } else if StatusBits::from_bits_truncate(status).contains(StatusBits::TARGET_REACHED) {
            // Attained. Hand the drive back to the latched operating
            // mode; the waiting phase re-runs the enable chain.
            link.write_u8(servo_chan::MODE_SELECT, self.running_mode as u8);
            self.is_waiting_mode = true;
            CmdStatus::Busy
        } else {
            link.write_u16(servo_chan::CONTROL_WORD, CW_HOMING_START);
            CmdStatus::Busy
        }
    }

    /// Track `target` counts with the host-side position loop: a
    /// proportional velocity command clamped to `max_vel_count`.
    /// Requires `Running` with the velocity loop displayed.
    pub fn run_pos(&mut self, link: &mut dyn PdoLink, target: i32) -> CmdStatus {
        if self.is_fake {
            return CmdStatus::Done;
        }
        if !self.ready_for(link, OpMode::Velocity) {
            return CmdStatus::Rejected;
        }

        let error = f64::from(target) - f64::from(self.position(link));
        let vel = (self.settings.kp * error) as i32;
        let vel = vel
            .max(-self.settings.max_vel_count)
            .min(self.settings.max_vel_count);

        link.write_i32(servo_chan::TARGET_VEL, vel);
        CmdStatus::Done
    }

    /// Command `vel` counts on the drive velocity loop. Requires
    /// `Running` with the velocity loop displayed.
    pub fn run_vel(&mut self, link: &mut dyn PdoLink, vel: i32) -> CmdStatus {
        if self.is_fake {
            return CmdStatus::Done;
        }
        if !self.ready_for(link, OpMode::Velocity) {
            return CmdStatus::Rejected;
        }

        link.write_i32(servo_chan::TARGET_VEL, vel);
        CmdStatus::Done
    }

    /// Command `cur` on the drive current loop. Requires `Running`
    /// with the current loop displayed.
    pub fn run_cur(&mut self, link: &mut dyn PdoLink, cur: i16) -> CmdStatus {
        if self.is_fake {
            return CmdStatus::Done;
        }
        if !self.ready_for(link, OpMode::Current) {
            return CmdStatus::Rejected;
        }

        link.write_i16(servo_chan::TARGET_CUR, cur);
        CmdStatus::Done
    }

    /// Dispatch the frame's command. The returned status is recorded
    /// into the frame by the orchestrator, not here.
    pub fn execute(&mut self, link: &mut dyn PdoLink, frame: &ServoFrame) -> CmdStatus {
        match frame.cmd {
            ServoCmd::Idle => CmdStatus::Done,
            ServoCmd::Enable => self.enable(link, frame.mode),
            ServoCmd::Disable => self.disable(link),
            ServoCmd::Home => self.home(link),
            ServoCmd::Run => match frame.mode {
                OpMode::Position => self.run_pos(link, frame.target_pos),
                OpMode::Velocity => self.run_vel(link, frame.target_vel),
                OpMode::Current => self.run_cur(link, frame.target_cur),
            },
        }
    }

    /// Fill the feedback fields of `frame` from the bus: current,
    /// position (offset applied), velocity, status word, digital
    /// inputs. Command fields and `ret` are left untouched.
    pub fn read_feedback(&self, link: &dyn PdoLink, frame: &mut ServoFrame) {
        frame.feedback_cur = link.read_i16(servo_chan::CURRENT).unwrap_or(0);
        frame.feedback_pos = self.position(link);
        frame.feedback_vel = link.read_i32(servo_chan::VELOCITY).unwrap_or(0);
        frame.status_word = read_status(link);
        frame.feedback_dgi = link.read_u32(servo_chan::DIGITAL_INPUTS).unwrap_or(0) as i32;
    }

    /// Reported position: raw encoder position plus the offset.
    pub fn position(&self, link: &dyn PdoLink) -> i32 {
        link.read_i32(servo_chan::POSITION)
            .unwrap_or(0)
            .wrapping_add(self.pos_offset)
    }

    pub fn has_fault(&self, link: &dyn PdoLink) -> bool {
        DriveState::from_status(read_status(link)).is_fault()
    }

    fn ready_for(&self, link: &dyn PdoLink, wire: OpMode) -> bool {
        DriveState::from_status(read_status(link)) == DriveState::Running
            && read_display(link) == wire as u8
    }
}

// Unmapped channels read as zero, which decodes to a powered-off drive.
fn read_status(link: &dyn PdoLink) -> u16 {
    link.read_u16(servo_chan::STATUS_WORD).unwrap_or(0)
}

fn read_display(link: &dyn PdoLink) -> u8 {
    link.read_u8(servo_chan::MODE_DISPLAY).unwrap_or(0)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::transport::Pdo;

    #[derive(Default)]
    struct MockLink {
        cells: HashMap<Pdo, Vec<u8>>,
        writes: Vec<(Pdo, Vec<u8>)>,
        params: HashMap<u16, i32>,
        param_writes: Vec<(u16, i32)>,
    }

    impl MockLink {
        fn set_status(&mut self, word: u16) {
            self.cells
                .insert(servo_chan::STATUS_WORD, word.to_le_bytes().to_vec());
        }

        fn set_display(&mut self, mode: u8) {
            self.cells.insert(servo_chan::MODE_DISPLAY, vec![mode]);
        }

        fn set_position(&mut self, pos: i32) {
            self.cells
                .insert(servo_chan::POSITION, pos.to_le_bytes().to_vec());
        }

        fn last_write(&self, pdo: Pdo) -> Option<&[u8]> {
            self.writes
                .iter()
                .rev()
                .find(|(p, _)| *p == pdo)
                .map(|(_, bytes)| bytes.as_slice())
        }

        fn last_u16(&self, pdo: Pdo) -> Option<u16> {
            self.last_write(pdo)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
        }

        fn last_u8(&self, pdo: Pdo) -> Option<u8> {
            self.last_write(pdo).map(|b| b[0])
        }

        fn last_i16(&self, pdo: Pdo) -> Option<i16> {
            self.last_write(pdo)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
        }

        fn last_i32(&self, pdo: Pdo) -> Option<i32> {
            self.last_write(pdo)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }

        fn control_words(&self) -> Vec<u16> {
            self.writes
                .iter()
                .filter(|(p, _)| *p == servo_chan::CONTROL_WORD)
                .map(|(_, b)| u16::from_le_bytes([b[0], b[1]]))
                .collect()
        }
    }

    impl PdoLink for MockLink {
        fn read_raw(&self, pdo: Pdo, buf: &mut [u8]) -> bool {
            match self.cells.get(&pdo) {
                Some(bytes) if bytes.len() == buf.len() => {
                    buf.copy_from_slice(bytes);
                    true
                }
                _ => false,
            }
        }

        fn write_raw(&mut self, pdo: Pdo, buf: &[u8]) {
            self.writes.push((pdo, buf.to_vec()));
            self.cells.insert(pdo, buf.to_vec());
        }

        fn read_param(&self, index: u16) -> Option<i32> {
            self.params.get(&index).copied()
        }

        fn write_param(&mut self, index: u16, value: i32) {
            self.param_writes.push((index, value));
            self.params.insert(index, value);
        }
    }

    fn settings() -> ServoSettings {
        ServoSettings {
            input2count: 65536,
            max_pos_count: 196_608,
            min_pos_count: -196_608,
            max_vel_count: 131_072,
            home_count: 65536,
            abs_id: 0,
            kp: DEFAULT_KP,
            home_mode: None,
        }
    }

    fn drive() -> ServoDrive {
        ServoDrive::new(0, 0, settings())
    }

    /// Drive the full enable chain against a cooperating mock until it
    /// reports `Done`, faking the slave's status/display responses.
    fn enable_until_done(drive: &mut ServoDrive, link: &mut MockLink, mode: OpMode) {
        link.set_status(0x0000);
        assert_eq!(drive.enable(link, mode), CmdStatus::Busy);
        link.set_status(0x0001);
        assert_eq!(drive.enable(link, mode), CmdStatus::Busy);
        link.set_status(0x0003);
        assert_eq!(drive.enable(link, mode), CmdStatus::Busy);
        link.set_status(0x0007);
        assert_eq!(drive.enable(link, mode), CmdStatus::Busy);
        link.set_display(mode.wire_mode());
        for _ in 0..STABILIZE_CYCLES - 1 {
            assert_eq!(drive.enable(link, mode), CmdStatus::Busy);
        }
        assert_eq!(drive.enable(link, mode), CmdStatus::Done);
    }

    #[test]
    fn enable_walks_the_power_ladder() {
        let mut link = MockLink::default();
        let mut drv = drive();

        enable_until_done(&mut drv, &mut link, OpMode::Velocity);

        assert_eq!(
            link.control_words(),
            vec![CW_SHUTDOWN, CW_SWITCH_ON, CW_ENABLE_OP]
        );
        // One mode select for the stale display, then zero velocity
        // during every stabilization cycle.
        assert_eq!(link.last_u8(servo_chan::MODE_SELECT), Some(0x09));
        assert_eq!(link.last_i32(servo_chan::TARGET_VEL), Some(0));
        let zero_writes = link
            .writes
            .iter()
            .filter(|(p, _)| *p == servo_chan::TARGET_VEL)
            .count();
        assert_eq!(zero_writes as u32, STABILIZE_CYCLES);
    }

    #[test]
    fn enable_position_request_programs_the_velocity_loop() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0007);
        link.set_display(OpMode::Position as u8);
        assert_eq!(drv.enable(&mut link, OpMode::Position), CmdStatus::Busy);
        assert_eq!(
            link.last_u8(servo_chan::MODE_SELECT),
            Some(OpMode::Velocity as u8)
        );
    }

    #[test]
    fn enable_current_mode_stabilizes_with_limit() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0007);
        link.set_display(OpMode::Current as u8);
        assert_eq!(drv.enable(&mut link, OpMode::Current), CmdStatus::Busy);
        assert_eq!(link.last_i16(servo_chan::TARGET_CUR), Some(0));
        assert_eq!(
            link.last_i16(servo_chan::CUR_LIMIT),
            Some(DEFAULT_CUR_LIMIT)
        );
    }

    #[test]
    fn enable_resets_a_faulted_drive() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0008);
        link.set_display(OpMode::Velocity as u8);
        assert_eq!(drv.enable(&mut link, OpMode::Velocity), CmdStatus::Busy);
        assert_eq!(
            link.last_u16(servo_chan::CONTROL_WORD),
            Some(CW_FAULT_RESET)
        );
    }

    #[test]
    fn stale_mode_display_is_programmed_before_fault_reset() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0008);
        link.set_display(MODE_HOMING);
        assert_eq!(drv.enable(&mut link, OpMode::Velocity), CmdStatus::Busy);
        assert_eq!(
            link.last_u8(servo_chan::MODE_SELECT),
            Some(OpMode::Velocity as u8)
        );
        assert_eq!(link.last_u16(servo_chan::CONTROL_WORD), None);
    }

    #[test]
    fn stabilization_counter_survives_an_interrupted_attempt() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0007);
        link.set_display(OpMode::Velocity as u8);
        for _ in 0..STABILIZE_CYCLES - 1 {
            assert_eq!(drv.enable(&mut link, OpMode::Velocity), CmdStatus::Busy);
        }

        // Interrupt with a disable step, then resume: the next
        // stabilization call completes the count.
        link.set_status(0x0001);
        assert_eq!(drv.disable(&mut link), CmdStatus::Done);
        link.set_status(0x0007);
        assert_eq!(drv.enable(&mut link, OpMode::Velocity), CmdStatus::Done);
    }

    #[test]
    fn disable_steps_by_state() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0001);
        assert_eq!(drv.disable(&mut link), CmdStatus::Done);
        assert!(link.writes.is_empty());

        link.set_status(0x0007);
        assert_eq!(drv.disable(&mut link), CmdStatus::Busy);
        assert_eq!(link.last_u16(servo_chan::CONTROL_WORD), Some(CW_SHUTDOWN));

        link.set_status(0x0008);
        assert_eq!(drv.disable(&mut link), CmdStatus::Busy);
        assert_eq!(
            link.last_u16(servo_chan::CONTROL_WORD),
            Some(CW_FAULT_RESET)
        );
    }

    #[test]
    fn home_rejects_unless_running() {
        let mut link = MockLink::default();
        let mut drv = drive();

        link.set_status(0x0003);
        assert_eq!(drv.home(&mut link), CmdStatus::Rejected);
        assert!(link.writes.is_empty());
    }

    #[test]
    fn home_switches_asserts_and_restores() {
        let mut link = MockLink::default();
        let mut drv = drive();

        // Running, but the velocity loop still displayed: switch to
        // homing mode first.
        link.set_status(0x0007);
        link.set_display(OpMode::Velocity as u8);
        assert_eq!(drv.home(&mut link), CmdStatus::Busy);
        assert_eq!(link.last_u8(servo_chan::MODE_SELECT), Some(MODE_HOMING));

        // Homing displayed, not yet attained: assert the procedure.
        link.set_display(MODE_HOMING);
        assert_eq!(drv.home(&mut link), CmdStatus::Busy);
        assert_eq!(
            link.last_u16(servo_chan::CONTROL_WORD),
            Some(CW_HOMING_START)
        );

        // Attained: restore the running mode and enter the waiting
        // phase, which delegates to the enable chain.
        link.set_status(0x0007 | 0x1000);
        assert_eq!(drv.home(&mut link), CmdStatus::Busy);
        assert_eq!(
            link.last_u8(servo_chan::MODE_SELECT),
            Some(OpMode::Velocity as u8)
        );

        // Still displaying homing: the delegated enable programs the
        // mode again, then stabilizes once the display follows.
        assert_eq!(drv.home(&mut link), CmdStatus::Busy);
        link.set_display(OpMode::Velocity as u8);
        for _ in 0..STABILIZE_CYCLES - 1 {
            assert_eq!(drv.home(&mut link), CmdStatus::Busy);
        }
        assert_eq!(drv.home(&mut link), CmdStatus::Done);
    }

    #[test]
    fn home_restores_the_mode_latched_by_enable() {
        let mut link = MockLink::default();
        let mut drv = drive();

        enable_until_done(&mut drv, &mut link, OpMode::Position);

        link.set_status(0x0007 | 0x1000);
        link.set_display(MODE_HOMING);
        assert_eq!(drv.home(&mut link), CmdStatus::Busy);
        // The latched mode is the requested one as given, not its wire
        // mapping.
        assert_eq!(
            link.last_u8(servo_chan::MODE_SELECT),
            Some(OpMode::Position as u8)
        );
    }

    #[test]
    fn run_commands_require_running_and_matching_mode() {
        let mut link = MockLink::default();
        let mut drv = drive();
        link.set_status(0x0001);
        drv.enable(&mut link, OpMode::Velocity);
        link.writes.clear();

        // Not running.
        assert_eq!(drv.run_vel(&mut link, 100), CmdStatus::Rejected);
        assert_eq!(drv.run_pos(&mut link, 100), CmdStatus::Rejected);
        assert_eq!(drv.run_cur(&mut link, 100), CmdStatus::Rejected);
        assert!(link.writes.is_empty());

        // Running, wrong loop displayed.
        link.set_status(0x0007);
        link.set_display(OpMode::Current as u8);
        assert_eq!(drv.run_vel(&mut link, 100), CmdStatus::Rejected);
        link.set_display(OpMode::Velocity as u8);
        assert_eq!(drv.run_cur(&mut link, 100), CmdStatus::Rejected);
        assert!(link.writes.is_empty());

        assert_eq!(drv.run_vel(&mut link, 100), CmdStatus::Done);
        assert_eq!(link.last_i32(servo_chan::TARGET_VEL), Some(100));
    }

    #[test]
    fn run_pos_tracks_proportionally() {
        let mut link = MockLink::default();
        let mut drv = drive();
        link.set_status(0x0001);
        drv.enable(&mut link, OpMode::Velocity);

        link.set_status(0x0007);
        link.set_display(OpMode::Velocity as u8);
        link.set_position(1000);

        assert_eq!(drv.run_pos(&mut link, 1010), CmdStatus::Done);
        assert_eq!(link.last_i32(servo_chan::TARGET_VEL), Some(2000));
    }

    #[test]
    fn run_pos_clamps_to_max_vel() {
        let mut link = MockLink::default();
        let mut drv = drive();
        link.set_status(0x0001);
        drv.enable(&mut link, OpMode::Velocity);

        link.set_status(0x0007);
        link.set_display(OpMode::Velocity as u8);
        link.set_position(0);

        assert_eq!(drv.run_pos(&mut link, i32::MAX), CmdStatus::Done);
        assert_eq!(
            link.last_i32(servo_chan::TARGET_VEL),
            Some(settings().max_vel_count)
        );

        assert_eq!(drv.run_pos(&mut link, i32::MIN), CmdStatus::Done);
        assert_eq!(
            link.last_i32(servo_chan::TARGET_VEL),
            Some(-settings().max_vel_count)
        );
    }

    #[test]
    fn run_pos_applies_the_position_offset() {
        let mut link = MockLink::default();
        let mut drv = drive();
        link.set_status(0x0001);
        drv.enable(&mut link, OpMode::Velocity);
        drv.set_pos_offset(50);

        link.set_status(0x0007);
        link.set_display(OpMode::Velocity as u8);
        link.set_position(100);

        assert_eq!(drv.position(&link), 150);
        // Error is target - offset position: (160 - 150) * kp.
        assert_eq!(drv.run_pos(&mut link, 160), CmdStatus::Done);
        assert_eq!(link.last_i32(servo_chan::TARGET_VEL), Some(2000));
    }

    #[test]
    fn fake_drive_succeeds_without_bus_traffic() {
        let mut link = MockLink::default();
        let mut drv = drive();

        assert_eq!(drv.run_pos(&mut link, 1000), CmdStatus::Done);
        assert_eq!(drv.run_vel(&mut link, 1000), CmdStatus::Done);
        assert_eq!(drv.run_cur(&mut link, 100), CmdStatus::Done);
        assert!(link.writes.is_empty());

        // The first enable clears the flag; with the drive not
        // running, motion commands now get rejected.
        drv.enable(&mut link, OpMode::Velocity);
        assert_eq!(drv.run_vel(&mut link, 1000), CmdStatus::Rejected);
    }

    #[test]
    fn read_feedback_fills_only_feedback_fields() {
        let mut link = MockLink::default();
        let mut drv = drive();
        drv.set_pos_offset(7);

        link.set_status(0x1237);
        link.set_position(100);
        link.cells
            .insert(servo_chan::VELOCITY, 55i32.to_le_bytes().to_vec());
        link.cells
            .insert(servo_chan::CURRENT, 12i16.to_le_bytes().to_vec());
        link.cells
            .insert(servo_chan::DIGITAL_INPUTS, 0xBEEFu32.to_le_bytes().to_vec());

        let mut frame = ServoFrame {
            target_pos: 42,
            target_vel: 43,
            target_cur: 44,
            cmd: ServoCmd::Run,
            mode: OpMode::Current,
            ret: 9,
            ..Default::default()
        };
        drv.read_feedback(&link, &mut frame);

        assert_eq!(frame.feedback_pos, 107);
        assert_eq!(frame.feedback_vel, 55);
        assert_eq!(frame.feedback_cur, 12);
        assert_eq!(frame.status_word, 0x1237);
        assert_eq!(frame.feedback_dgi, 0xBEEF);
        assert_eq!(frame.target_pos, 42);
        assert_eq!(frame.target_vel, 43);
        assert_eq!(frame.target_cur, 44);
        assert_eq!(frame.cmd, ServoCmd::Run);
        assert_eq!(frame.mode, OpMode::Current);
        assert_eq!(frame.ret, 9);
    }

    #[test]
    fn execute_dispatches_on_cmd_and_mode() {
        let mut link = MockLink::default();
        let mut drv = drive();

        let mut frame = ServoFrame::default();
        assert_eq!(drv.execute(&mut link, &frame), CmdStatus::Done);
        assert!(link.writes.is_empty());

        enable_until_done(&mut drv, &mut link, OpMode::Velocity);

        frame.cmd = ServoCmd::Run;
        frame.mode = OpMode::Velocity;
        frame.target_vel = 777;
        assert_eq!(drv.execute(&mut link, &frame), CmdStatus::Done);
        assert_eq!(link.last_i32(servo_chan::TARGET_VEL), Some(777));
    }

    #[test]
    fn init_programs_homing_parameters() {
        let mut link = MockLink::default();
        let mut s = settings();
        s.home_mode = Some(17);
        let mut drv = ServoDrive::new(0, 0, s);

        drv.init(&mut link);
        assert_eq!(
            link.param_writes,
            vec![
                (servo_chan::PARAM_HOME_MODE, 17),
                (servo_chan::PARAM_HOME_OFFSET, -65536),
            ]
        );
    }

    #[test]
    fn has_fault_tracks_the_status_nibble() {
        let mut link = MockLink::default();
        let drv = drive();

        for (word, fault) in [(0x0000, false), (0x0007, false), (0x0008, true)] {
            link.set_status(word);
            assert_eq!(drv.has_fault(&link), fault, "status {word:#x}");
        }
    }
}

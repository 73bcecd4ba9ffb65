//! Cyclic bus transport seam.
//!
//! The controller talks to slave devices exclusively through [`PdoLink`],
//! one link per physical bus slot. Process data is addressed by
//! (group, index) pairs; acyclic parameters by a flat index. A concrete
//! master (real fieldbus or [`crate::sim`]) implements [`CyclicMaster`]
//! and hands out the links.
//!
//! ## Channel layout
//!
//! The servo and force-sensor channel maps live in [`servo_chan`] and
//! [`force_chan`]. They mirror the drive profile the devices speak: the
//! state machine modules never hardcode a (group, index) pair directly.

use std::fmt;

/// Process data object address on a slave: PDO group plus entry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pdo {
    pub group: u16,
    pub index: u16,
}

impl Pdo {
    pub const fn new(group: u16, index: u16) -> Self {
        Self { group, index }
    }
}

impl fmt::Display for Pdo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.group, self.index)
    }
}

/// Cyclic and acyclic data access for a single bus slot.
///
/// Raw accessors move little-endian bytes; the typed helpers wrap them
/// for the widths the channel maps use. Reads of an unmapped channel
/// return `None`, writes to one are ignored. This mirrors how a cyclic
/// master behaves when a PDO entry is absent from the slave mapping.
pub trait PdoLink: Send {
    /// Copy the current cyclic value of `pdo` into `buf`.
    /// Returns `false` when the channel is not mapped or `buf` has the
    /// wrong width.
    fn read_raw(&self, pdo: Pdo, buf: &mut [u8]) -> bool;

    /// Stage `buf` as the outgoing cyclic value of `pdo`.
    fn write_raw(&mut self, pdo: Pdo, buf: &[u8]);

    /// Read an acyclic parameter by flat index.
    fn read_param(&self, index: u16) -> Option<i32>;

    /// Write an acyclic parameter by flat index.
    fn write_param(&mut self, index: u16, value: i32);

    fn read_u8(&self, pdo: Pdo) -> Option<u8> {
        let mut buf = [0u8; 1];
        self.read_raw(pdo, &mut buf).then(|| buf[0])
    }

    fn read_i16(&self, pdo: Pdo) -> Option<i16> {
        let mut buf = [0u8; 2];
        self.read_raw(pdo, &mut buf)
            .then(|| i16::from_le_bytes(buf))
    }

    fn read_u16(&self, pdo: Pdo) -> Option<u16> {
        let mut buf = [0u8; 2];
        self.read_raw(pdo, &mut buf)
            .then(|| u16::from_le_bytes(buf))
    }

    fn read_i32(&self, pdo: Pdo) -> Option<i32> {
        let mut buf = [0u8; 4];
        self.read_raw(pdo, &mut buf)
            .then(|| i32::from_le_bytes(buf))
    }

    fn read_u32(&self, pdo: Pdo) -> Option<u32> {
        let mut buf = [0u8; 4];
        self.read_raw(pdo, &mut buf)
            .then(|| u32::from_le_bytes(buf))
    }

    fn write_u8(&mut self, pdo: Pdo, value: u8) {
        self.write_raw(pdo, &[value]);
    }

    fn write_i16(&mut self, pdo: Pdo, value: i16) {
        self.write_raw(pdo, &value.to_le_bytes());
    }

    fn write_u16(&mut self, pdo: Pdo, value: u16) {
        self.write_raw(pdo, &value.to_le_bytes());
    }

    fn write_i32(&mut self, pdo: Pdo, value: i32) {
        self.write_raw(pdo, &value.to_le_bytes());
    }
}

/// A cyclic master owning one [`PdoLink`] per bus slot.
pub trait CyclicMaster: Send {
    /// Number of slots on the bus, occupied or not.
    fn slave_count(&self) -> usize;

    /// Link for physical slot `slot`. Callers stay within
    /// `0..slave_count()`.
    fn link(&mut self, slot: usize) -> &mut dyn PdoLink;

    /// Advance the bus by one cycle: latch staged writes, refresh reads.
    fn exchange(&mut self);
}

/// Servo drive channel map.
pub mod servo_chan {
    use super::Pdo;

    pub const TARGET_VEL: Pdo = Pdo::new(0, 1);
    pub const TARGET_CUR: Pdo = Pdo::new(0, 2);
    pub const CUR_LIMIT: Pdo = Pdo::new(0, 3);
    pub const CONTROL_WORD: Pdo = Pdo::new(0, 4);
    pub const MODE_SELECT: Pdo = Pdo::new(0, 5);

    pub const POSITION: Pdo = Pdo::new(1, 0);
    pub const DIGITAL_INPUTS: Pdo = Pdo::new(1, 1);
    pub const VELOCITY: Pdo = Pdo::new(1, 2);
    pub const STATUS_WORD: Pdo = Pdo::new(1, 3);
    pub const CURRENT: Pdo = Pdo::new(2, 0);
    pub const MODE_DISPLAY: Pdo = Pdo::new(4, 0);

    /// Acyclic parameter: homing method.
    pub const PARAM_HOME_MODE: u16 = 0;
    /// Acyclic parameter: home offset in counts.
    pub const PARAM_HOME_OFFSET: u16 = 9;
}

/// Six-axis force sensor channel map.
pub mod force_chan {
    use super::Pdo;

    /// Raw channels fx, fy, fz, mx, my, mz in bus order.
    pub const CHANNELS: [Pdo; 6] = [
        Pdo::new(0, 0),
        Pdo::new(0, 1),
        Pdo::new(0, 2),
        Pdo::new(0, 3),
        Pdo::new(0, 4),
        Pdo::new(0, 5),
    ];

    /// Acyclic parameter: force scaling divisor.
    pub const PARAM_FORCE_RATIO: u16 = 0;
    /// Acyclic parameter: torque scaling divisor.
    pub const PARAM_TORQUE_RATIO: u16 = 1;
}

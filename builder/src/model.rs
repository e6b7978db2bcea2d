// Licensed under the Apache-2.0 license

//! In-memory model of a boot image, filled in by the configuration parser
//! and consumed by the serializer.

use std::fmt;

use arrayvec::{ArrayString, ArrayVec};
use boot_image::{
    BootFlags, BOOT_IMAGE_MAX_NAME_LEN, NUM_APP_HARTS, PRIV_MODE_MACHINE, PRIV_MODE_SUPERVISOR,
    PRIV_MODE_UNSET, PRIV_MODE_USER,
};
use log::trace;

/// Prefix every generated set name starts with.
pub const SET_NAME_PREFIX: &str = "PolarFireSOC-HSS::";

/// Harts that may share a payload with its owner.
pub const MAX_SECONDARY_HARTS: usize = 3;

/// Longest name that fits a wire buffer once the NUL is added.
const NAME_CAPACITY: usize = BOOT_IMAGE_MAX_NAME_LEN - 1;

/// One of the four application harts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HartId {
    U54_1,
    U54_2,
    U54_3,
    U54_4,
}

impl HartId {
    pub const ALL: [HartId; NUM_APP_HARTS] =
        [HartId::U54_1, HartId::U54_2, HartId::U54_3, HartId::U54_4];

    /// Position in [`BootImage::hart`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Identifier written into chunk descriptors; 0 is the monitor hart.
    pub fn wire_id(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_wire_id(id: u32) -> Option<Self> {
        Self::ALL.get(id.checked_sub(1)? as usize).copied()
    }
}

impl fmt::Display for HartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U54_{}", self.wire_id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivMode {
    User,
    Supervisor,
    Machine,
    #[default]
    Unset,
}

impl PrivMode {
    pub fn to_wire(self) -> u8 {
        match self {
            PrivMode::User => PRIV_MODE_USER,
            PrivMode::Supervisor => PRIV_MODE_SUPERVISOR,
            PrivMode::Machine => PRIV_MODE_MACHINE,
            PrivMode::Unset => PRIV_MODE_UNSET,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            PRIV_MODE_USER => Some(PrivMode::User),
            PRIV_MODE_SUPERVISOR => Some(PrivMode::Supervisor),
            PRIV_MODE_MACHINE => Some(PrivMode::Machine),
            PRIV_MODE_UNSET => Some(PrivMode::Unset),
            _ => None,
        }
    }
}

impl fmt::Display for PrivMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivMode::User => "PRV_U",
            PrivMode::Supervisor => "PRV_S",
            PrivMode::Machine => "PRV_M",
            PrivMode::Unset => "unset",
        };
        write!(f, "{name} ({:#x})", self.to_wire())
    }
}

/// A name limited to what fits in the image's fixed name buffers.
///
/// Appends that do not fit are truncated at a character boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedName(ArrayString<NAME_CAPACITY>);

impl BoundedName {
    pub fn new(s: &str) -> Self {
        let mut name = Self::default();
        name.push_str(s);
        name
    }

    /// Replaces the contents. Returns false if `s` had to be truncated.
    pub fn set(&mut self, s: &str) -> bool {
        self.0.clear();
        self.push_str(s)
    }

    /// Appends `s`. Returns false if it had to be truncated.
    pub fn push_str(&mut self, s: &str) -> bool {
        if self.0.try_push_str(s).is_ok() {
            return true;
        }
        for c in s.chars() {
            if self.0.try_push(c).is_err() {
                break;
            }
        }
        trace!("name truncated to {} bytes: >>{}<<", self.0.len(), self.0);
        false
    }

    /// Appends `s`, preceded by `+` when the name is not empty.
    pub fn append_joined(&mut self, s: &str) -> bool {
        if !self.0.is_empty() && !self.push_str("+") {
            return false;
        }
        self.push_str(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// NUL-padded copy for the wire format.
    pub fn to_wire(&self) -> [u8; BOOT_IMAGE_MAX_NAME_LEN] {
        let mut buf = [0u8; BOOT_IMAGE_MAX_NAME_LEN];
        buf[..self.0.len()].copy_from_slice(self.0.as_bytes());
        buf
    }
}

impl fmt::Display for BoundedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HartDescriptor {
    pub entry_point: Option<u64>,
    pub name: BoundedName,
    pub priv_mode: PrivMode,
    pub flags: BootFlags,
}

/// Everything the configuration says about one boot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImage {
    pub set_name: BoundedName,
    pub hart: [HartDescriptor; NUM_APP_HARTS],
}

impl Default for BootImage {
    fn default() -> Self {
        Self {
            set_name: BoundedName::new(SET_NAME_PREFIX),
            hart: Default::default(),
        }
    }
}

impl BootImage {
    pub fn hart(&self, id: HartId) -> &HartDescriptor {
        &self.hart[id.index()]
    }

    pub fn hart_mut(&mut self, id: HartId) -> &mut HartDescriptor {
        &mut self.hart[id.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootPolicy {
    Warm,
    Cold,
}

/// Boolean entitlements a payload grants to the harts that run it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entitlements {
    pub ancillary_data: bool,
    pub skip_opensbi: bool,
    pub skip_autoboot: bool,
    pub allow_warm_reboot: bool,
    pub allow_cold_reboot: bool,
}

impl Entitlements {
    pub fn allow_reboot(&mut self, policy: RebootPolicy) {
        match policy {
            RebootPolicy::Warm => self.allow_warm_reboot = true,
            RebootPolicy::Cold => {
                self.allow_cold_reboot = true;
                self.allow_warm_reboot = true;
            }
        }
    }
}

/// A payload block while it is being parsed. Its effects are committed to
/// the [`BootImage`] when the block closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSpec {
    pub base_name: String,
    pub payload_name: Option<String>,
    pub exec_addr: u64,
    pub owner: Option<HartId>,
    pub secondary: ArrayVec<HartId, MAX_SECONDARY_HARTS>,
    pub priv_mode: PrivMode,
    pub entitlements: Entitlements,
    pub ancillary_name: Option<String>,
}

impl PayloadSpec {
    pub fn new(base_name: &str) -> Self {
        Self {
            base_name: base_name.to_string(),
            priv_mode: PrivMode::Machine,
            ..Default::default()
        }
    }

    /// The payload-name override if one was given, else the file path.
    pub fn display_name(&self) -> &str {
        self.payload_name.as_deref().unwrap_or(&self.base_name)
    }
}

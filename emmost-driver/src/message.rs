//! Control messages and command outcomes

use emmost_core::{MessageId, NodeAddress};

/// Received control message
///
/// The payload borrows the platform's receive buffer and is only valid for the duration of
/// the dispatching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message<'a> {
    pub source: NodeAddress,
    pub id: MessageId,
    pub payload: &'a [u8],
}

/// Transmission status of a control message
///
/// Numeric encoding matches the INIC transmission status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TxStatus {
    Ok = 0x00,
    /// Receiver buffer full
    BufferFull = 0x08,
    Crc = 0x09,
    /// Destination address unknown
    Id = 0x0a,
    Acknowledge = 0x0b,
    Timeout = 0x0c,
    /// Fatal error in wrong target
    FatalWrongTarget = 0x10,
    /// Fatal error in own address
    FatalOwnAddress = 0x11,
    /// Network not available, transient
    NotAvailableTransient = 0x18,
    /// Network switched off
    NotAvailableOff = 0x19,
    Unknown = 0xfe,
    /// No receiver configured
    NoReceiver = 0xff,
}

impl TxStatus {
    pub const fn is_ok(self) -> bool {
        matches!(self, TxStatus::Ok)
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Failure of an asynchronous INIC command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandFailure {
    /// The command never reached the target
    Tx(TxStatus),
    /// The target rejected the command with the given INIC error code
    Target(u8),
}

pub type CommandResult = Result<(), CommandFailure>;

/// Synchronization state of the shadow of a remote INIC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    Unsynced,
    Synced,
}

/// Selects the network settings affected by a configuration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkConfigMask(u16);

impl NetworkConfigMask {
    pub const NONE: Self = Self(0x0000);
    pub const NODE_ADDRESS: Self = Self(0x0001);
    pub const GROUP_ADDRESS: Self = Self(0x0002);
    pub const CONTROL_RETRY: Self = Self(0x0004);
    pub const PACKET_FILTER: Self = Self(0x0008);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for NetworkConfigMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Network settings of an INIC
///
/// Only the fields selected by the accompanying [`NetworkConfigMask`] are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkSettings {
    pub node_address: u16,
    pub group_address: u16,
    pub control_retry_block_count: u8,
    pub packet_filter: u16,
}

/// Action chosen for a signature candidate seen by node discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CheckResult {
    /// Admit the node
    Welcome,
    /// The node is already admitted; check for an address conflict or a reset
    Unique,
    /// Ignore the node
    Unknown,
}

/// Outcome of the action taken by node discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryReport {
    WelcomeSuccess,
    /// More than one node answered with the same address
    Multi,
    Unknown,
    /// Network switched off
    NetOff,
}

/// Operation mode of the network supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorMode {
    Manual,
    Inactive,
    Normal,
    Fallback,
    Diagnosis,
    Programming,
}

/// State of the network starter within the current mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StarterState {
    Init,
    Busy,
    Ready,
}

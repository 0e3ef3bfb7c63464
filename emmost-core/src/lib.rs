//! MOST node management core data types
//!
//! This crate provides basic data type definitions used by other Emmost crates.
//! Emmost users should not depend on this crate directly. Use `emmost::core` reexport instead.
#![no_std]

use core::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Logical node address on the ring
///
/// Any 16-bit value may appear on the bus. Only the static ranges listed in
/// [`NodeAddress::STATIC_RANGES`] are accepted for managed nodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeAddress(u16);

impl NodeAddress {
    /// Uninitialized address
    pub const INVALID: NodeAddress = NodeAddress(0x0000);
    /// Sentinel addressing the local INIC before its ring address is known
    pub const LOCAL: NodeAddress = NodeAddress(0x0001);

    /// Address ranges assigned to statically configured nodes
    pub const STATIC_RANGES: [RangeInclusive<u16>; 3] = [0x010..=0x0ff, 0x140..=0x2ff, 0x500..=0xeff];

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    /// Returns true if the address belongs to one of the static node address ranges.
    pub fn is_static(self) -> bool {
        Self::STATIC_RANGES
            .iter()
            .any(|range| range.contains(&self.0))
    }

    pub const fn is_local(self) -> bool {
        self.0 == Self::LOCAL.0
    }
}

impl From<u16> for NodeAddress {
    fn from(value: u16) -> Self {
        Self::new(value)
    }
}

impl From<NodeAddress> for u16 {
    fn from(value: NodeAddress) -> Self {
        value.into_u16()
    }
}

/// Node position address derived from the ring position
///
/// The timing master sits at [`NodePosition::ROOT`]; the following nodes count up from there.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodePosition(u16);

impl NodePosition {
    /// Position address of the root node, i.e. the INIC attached to this host
    pub const ROOT: NodePosition = NodePosition(0x0400);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    pub const fn is_root(self) -> bool {
        self.0 == Self::ROOT.0
    }
}

impl From<u16> for NodePosition {
    fn from(value: u16) -> Self {
        Self::new(value)
    }
}

impl From<NodePosition> for u16 {
    fn from(value: NodePosition) -> Self {
        value.into_u16()
    }
}

/// Function block identifier
pub type FBlockId = u8;

/// Function block instance identifier
pub type InstanceId = u8;

/// Function identifier, 12 bits wide on the wire
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FunctionId(u16);

impl FunctionId {
    const MAX_VALUE: u16 = 0x0fff;
    pub const MAX: FunctionId = FunctionId(Self::MAX_VALUE);

    pub const fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self::from_u16_truncating(value))
        } else {
            None
        }
    }

    pub const fn from_u16_truncating(value: u16) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl From<FunctionId> for u16 {
    fn from(value: FunctionId) -> Self {
        value.into_u16()
    }
}

impl TryFrom<u16> for FunctionId {
    type Error = InvalidValue;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// Operation type, 4 bits wide on the wire
///
/// Property and method operations share the code space, e.g., `STATUS` and `RESULT` are both
/// `0xC`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpType(u8);

impl OpType {
    const MAX_VALUE: u8 = 0x0f;

    pub const SET: OpType = OpType(0x0);
    pub const GET: OpType = OpType(0x1);
    pub const SET_GET: OpType = OpType(0x2);
    pub const INCREMENT: OpType = OpType(0x3);
    pub const DECREMENT: OpType = OpType(0x4);
    pub const GET_INTERFACE: OpType = OpType(0x5);
    pub const STATUS: OpType = OpType(0xc);
    pub const INTERFACE: OpType = OpType(0xe);
    pub const ERROR: OpType = OpType(0xf);

    pub const START: OpType = OpType(0x0);
    pub const ABORT: OpType = OpType(0x1);
    pub const START_RESULT: OpType = OpType(0x2);
    pub const START_RESULT_ACK: OpType = OpType(0x6);
    pub const ABORT_ACK: OpType = OpType(0x7);
    pub const START_ACK: OpType = OpType(0x8);
    pub const ERROR_ACK: OpType = OpType(0x9);
    pub const PROCESSING_ACK: OpType = OpType(0xa);
    pub const PROCESSING: OpType = OpType(0xb);
    pub const RESULT: OpType = OpType(0xc);
    pub const RESULT_ACK: OpType = OpType(0xd);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self::from_u8_truncating(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<OpType> for u8 {
    fn from(value: OpType) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for OpType {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// Full identifier of a control message
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageId {
    pub fblock_id: FBlockId,
    pub instance_id: InstanceId,
    pub function_id: FunctionId,
    pub op_type: OpType,
}

impl MessageId {
    pub const fn new(
        fblock_id: FBlockId,
        instance_id: InstanceId,
        function_id: FunctionId,
        op_type: OpType,
    ) -> Self {
        Self {
            fblock_id,
            instance_id,
            function_id,
            op_type,
        }
    }

    /// Compares function block, instance and function, ignoring the operation type.
    pub fn same_function(&self, other: &MessageId) -> bool {
        self.fblock_id == other.fblock_id
            && self.instance_id == other.instance_id
            && self.function_id == other.function_id
    }
}

/// 48-bit MAC address stored as three big-endian 16-bit words
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u16; 3]);

impl MacAddress {
    pub const fn from_words(mac_47_32: u16, mac_31_16: u16, mac_15_0: u16) -> Self {
        Self([mac_47_32, mac_31_16, mac_15_0])
    }

    pub const fn into_u64(self) -> u64 {
        ((self.0[0] as u64) << 32) | ((self.0[1] as u64) << 16) | (self.0[2] as u64)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub release: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub release: u8,
    pub build: u32,
}

/// Self-announced identity of a node
///
/// Signatures are read off the wire by node discovery. Components that need one beyond the
/// call that delivered it keep a copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Signature {
    pub node_address: NodeAddress,
    pub group_address: u16,
    pub mac_address: MacAddress,
    pub node_position: NodePosition,
    pub diagnosis_id: u16,
    pub num_ports: u8,
    pub chip_id: u16,
    pub firmware_version: FirmwareVersion,
    pub config_string_version: Version,
}

impl Signature {
    /// Signature carrying only a node address, as used for node list entries
    pub const fn with_address(node_address: NodeAddress) -> Self {
        Self {
            node_address,
            group_address: 0,
            mac_address: MacAddress([0; 3]),
            node_position: NodePosition(0),
            diagnosis_id: 0,
            num_ports: 0,
            chip_id: 0,
            firmware_version: FirmwareVersion {
                major: 0,
                minor: 0,
                release: 0,
                build: 0,
            },
            config_string_version: Version {
                major: 0,
                minor: 0,
                release: 0,
            },
        }
    }
}

impl Default for NodeAddress {
    fn default() -> Self {
        Self::INVALID
    }
}

impl Default for NodePosition {
    fn default() -> Self {
        Self(0)
    }
}

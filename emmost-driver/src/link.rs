//! Collaborator services consumed by the stack
//!
//! Each method only reports whether the platform accepted the request. Asynchronous results
//! are delivered back to the stack by the platform itself.

use emmost_core::{MessageId, NodeAddress};

use crate::message::{DeviceState, NetworkConfigMask, NetworkSettings};

/// Synchronous rejection of a collaborator or stack request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallError {
    /// The service is busy with a previous request
    ApiLocked,
    /// No message buffer available
    BufferOverflow,
    /// Invalid request parameters
    Param,
    /// The addressed object does not exist or is not ready
    NotAvailable,
}

/// No free transmission buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoBuffer;

impl From<NoBuffer> for CallError {
    fn from(_: NoBuffer) -> Self {
        CallError::BufferOverflow
    }
}

/// Control message transmission
///
/// The platform reports the transmission status of every accepted message exactly once.
pub trait Transport {
    fn send(&mut self, destination: NodeAddress, id: MessageId, payload: &[u8]) -> Result<(), NoBuffer>;
}

/// Synchronization of remote INIC shadows
///
/// An accepted `sync` request completes with exactly one sync result.
pub trait RemoteSync {
    fn sync(&mut self, node: NodeAddress) -> Result<(), CallError>;
    /// Declares the node unsynchronized; the next `sync` starts from scratch.
    fn report_sync_lost(&mut self, node: NodeAddress);
    fn device_state(&self, node: NodeAddress) -> DeviceState;
}

/// Route availability management
pub trait RouteManagement {
    fn set_node_available(&mut self, node: NodeAddress, available: bool) -> Result<(), CallError>;
}

/// Ring scanning for node signatures
pub trait NodeDiscovery {
    fn start(&mut self) -> Result<(), CallError>;
    fn stop(&mut self) -> Result<(), CallError>;
}

/// Remote INIC network configuration
///
/// An accepted request completes with exactly one command result.
pub trait NetworkConfig {
    fn set_network_config(
        &mut self,
        node: NodeAddress,
        mask: NetworkConfigMask,
        settings: &NetworkSettings,
    ) -> Result<(), CallError>;
}

/// Complete set of collaborators required by the stack
pub trait Platform: Transport + RemoteSync + RouteManagement + NodeDiscovery + NetworkConfig {}

impl<T> Platform for T where T: Transport + RemoteSync + RouteManagement + NodeDiscovery + NetworkConfig {}

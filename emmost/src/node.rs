//! Per-address node runtime object

use crate::core::NodeAddress;
use crate::driver::link::{CallError, NetworkConfig, RemoteSync, Transport};
use crate::driver::message::{CommandResult, NetworkConfigMask, NetworkSettings};
use crate::script::manager::{Caller, ScriptManager};
use crate::script::ScriptStep;
use crate::time::{Duration, Instant};

/// Recipient of a pending sync result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum SyncWaiter {
    Observer,
    Application,
}

/// Runtime object of a node known on the ring
///
/// Bundles the node's script manager with single-slot markers for outstanding sync and packet
/// filter requests. Each marker is cleared when its result is delivered, so a result reaches
/// its requester exactly once.
pub struct Node<'a> {
    address: NodeAddress,
    script: ScriptManager<'a>,
    sync_waiter: Option<SyncWaiter>,
    packet_filter_pending: bool,
}

impl<'a> Node<'a> {
    pub(crate) fn new(address: NodeAddress, script_timeout: Duration) -> Self {
        Self {
            address,
            script: ScriptManager::new(address, script_timeout),
            sync_waiter: None,
            packet_filter_pending: false,
        }
    }

    /// Address used to reach the node, `NodeAddress::LOCAL` for the local INIC
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub(crate) fn script_mut(&mut self) -> &mut ScriptManager<'a> {
        &mut self.script
    }

    pub(crate) fn script_next_deadline(&self) -> Option<Instant> {
        self.script.next_deadline()
    }

    pub(crate) fn script_has_pending_events(&self) -> bool {
        self.script.has_pending_events()
    }

    pub(crate) fn synchronize<P: RemoteSync>(
        &mut self,
        waiter: SyncWaiter,
        platform: &mut P,
    ) -> Result<(), CallError> {
        if self.sync_waiter.is_some() {
            return Err(CallError::ApiLocked);
        }
        platform.sync(self.address)?;
        self.sync_waiter = Some(waiter);
        Ok(())
    }

    pub(crate) fn report_sync_lost<P: RemoteSync>(&mut self, platform: &mut P) {
        debug!("node {:#x} sync lost", self.address.into_u16());
        if let Some(waiter) = self.sync_waiter.take() {
            debug!("dropping pending sync of node {:#x} for {:?}", self.address.into_u16(), waiter);
        }
        platform.report_sync_lost(self.address);
    }

    pub(crate) fn run_script<P>(
        &mut self,
        steps: &'a [ScriptStep<'a>],
        caller: Caller,
        platform: &mut P,
        now: Instant,
    ) -> Result<(), CallError>
    where
        P: Transport + RemoteSync,
    {
        self.script.run(steps, caller, platform, now)
    }

    pub(crate) fn set_packet_filter<P: NetworkConfig>(
        &mut self,
        mode: u16,
        platform: &mut P,
    ) -> Result<(), CallError> {
        if self.packet_filter_pending {
            return Err(CallError::ApiLocked);
        }
        let settings = NetworkSettings {
            packet_filter: mode,
            ..Default::default()
        };
        platform.set_network_config(self.address, NetworkConfigMask::PACKET_FILTER, &settings)?;
        self.packet_filter_pending = true;
        Ok(())
    }

    /// Dispatches a sync result
    ///
    /// A device sync started by the script manager takes precedence. Otherwise, the stored
    /// waiter is taken and returned for delivery.
    pub(crate) fn on_sync_result(&mut self, result: CommandResult) -> Option<SyncWaiter> {
        if self.script.is_awaiting_sync() {
            self.script.on_sync_result(result);
            return None;
        }
        let waiter = self.sync_waiter.take();
        if waiter.is_none() {
            warn!("unsolicited sync result for node {:#x}", self.address.into_u16());
        }
        waiter
    }

    /// Clears the packet filter marker. Returns true if a request was outstanding.
    pub(crate) fn take_packet_filter_request(&mut self) -> bool {
        core::mem::take(&mut self.packet_filter_pending)
    }
}

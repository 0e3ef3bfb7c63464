//! Own address tracking

use crate::core::NodeAddress;

/// Remembers the ring address of the local INIC
///
/// The local device learns its own address asynchronously, when node discovery welcomes the
/// root node. Until then, and afterwards for internal calls, the local INIC is addressed with
/// [`NodeAddress::LOCAL`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressRegistry {
    own_address: Option<NodeAddress>,
}

impl AddressRegistry {
    pub const fn new() -> Self {
        Self { own_address: None }
    }

    /// Records the own address. Only the first notification is taken.
    pub fn notify_own_address(&mut self, address: NodeAddress) {
        if self.own_address.is_none() {
            debug!("own address learned: {:#x}", address.into_u16());
            self.own_address = Some(address);
        }
    }

    pub fn own_address(&self) -> Option<NodeAddress> {
        self.own_address
    }

    pub fn is_own_address(&self, address: NodeAddress) -> bool {
        self.own_address == Some(address)
    }

    /// Replaces the local sentinel with the learned own address
    pub fn replace_local_sentinel(&self, address: NodeAddress) -> NodeAddress {
        match self.own_address {
            Some(own) if address.is_local() => own,
            _ => address,
        }
    }
}

//! Application notifications

use crate::core::{NodeAddress, Signature};
use crate::driver::message::CommandResult;
use crate::record::NodeRecord;
use crate::script::{ErrorInfo, ResultCode};

/// Node lifecycle report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Report {
    /// A previously available node is gone
    NotAvailable = 0,
    /// Discovered node is not in the node list or out of the static address range
    IgnoredUnknown = 1,
    /// Discovered node shares its address with another node
    IgnoredDuplicate = 2,
    /// Node admitted; its init script may be attached now
    Welcomed = 3,
    ScriptFailure = 4,
    /// Node dropped after all recovery attempts failed
    Irrecoverable = 5,
    ScriptSuccess = 6,
    /// Node set up and its routes enabled
    Available = 7,
}

impl Report {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Application side of the node observer
///
/// Callbacks run inside observer calls and must not call back into the observer.
/// Addresses passed to the application never carry the local sentinel once the own address is
/// known.
pub trait Application<'a> {
    /// Lifecycle report. `node` is provided for [`Report::Welcomed`] only.
    fn on_report(
        &mut self,
        report: Report,
        signature: Option<&Signature>,
        node: Option<&mut NodeRecord<'a>>,
    );

    /// Result of a script started through the observer API
    fn on_script_result(&mut self, address: NodeAddress, code: ResultCode, error_info: ErrorInfo) {
        let _ = (address, code, error_info);
    }

    /// Result of a node synchronization started through the observer API
    fn on_sync_result(&mut self, address: NodeAddress, result: CommandResult) {
        let _ = (address, result);
    }

    /// Result of a packet filter change
    fn on_packet_filter_result(&mut self, address: NodeAddress, result: CommandResult) {
        let _ = (address, result);
    }
}

//! Node configuration scripts
//!
//! A script is an ordered list of [`ScriptStep`]s. Each step sends one control message to the
//! target node and waits for a matching response before the next step starts. The
//! [`manager`] module executes scripts against a single node.

use crate::core::{FunctionId, MessageId};
use crate::driver::message::CommandFailure;
use crate::time::Duration;

pub(crate) mod manager;

/// Control message sent by a script step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScriptMessage<'a> {
    pub id: MessageId,
    pub payload: &'a [u8],
}

/// Payload check applied to the response of a script step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExpectedPayload<'a> {
    /// Any payload is accepted
    Any,
    /// The response payload must start with the given bytes
    Prefix(&'a [u8]),
}

impl<'a> ExpectedPayload<'a> {
    /// Data size value that disables the payload check in the script wire format
    pub const WILDCARD_SIZE: u8 = 0xff;

    /// Converts the `(data_size, data)` pair of the script wire format.
    ///
    /// Returns `None` if a checked size exceeds the provided data.
    pub fn from_wire(data_size: u8, data: &'a [u8]) -> Option<Self> {
        if data_size == Self::WILDCARD_SIZE {
            return Some(ExpectedPayload::Any);
        }
        data.get(..usize::from(data_size)).map(ExpectedPayload::Prefix)
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        match self {
            ExpectedPayload::Any => true,
            ExpectedPayload::Prefix(expected) => payload.starts_with(expected),
        }
    }
}

/// Response expected by a script step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExpectedMessage<'a> {
    pub id: MessageId,
    pub payload: ExpectedPayload<'a>,
}

/// One element of a script
///
/// The pause elapses before the message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScriptStep<'a> {
    pub pause: Duration,
    pub send: ScriptMessage<'a>,
    pub expected: ExpectedMessage<'a>,
}

impl<'a> ScriptStep<'a> {
    pub const fn new(send: ScriptMessage<'a>, expected: ExpectedMessage<'a>) -> Self {
        Self {
            pause: Duration::from_ticks(0),
            send,
            expected,
        }
    }

    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// Simplified outcome of a script run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResultCode {
    #[default]
    Success = 0,
    /// Device sync or a step response did not complete in time
    Timeout = 1,
    /// Response payload did not match
    Payload = 2,
    /// Response operation type did not match
    OpType = 3,
    /// A step message could not be transmitted
    Tx = 4,
    /// Device sync failed
    Sync = 5,
}

impl ResultCode {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Location of a script failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorInfo {
    /// Index of the failing step
    pub step_index: u16,
    /// Function ID of the offending response, if any
    pub function_id: FunctionId,
}

/// Detailed outcome of a script run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScriptResult {
    pub code: ResultCode,
    /// Underlying command failure for `Tx` and `Sync` results
    pub detail: Option<CommandFailure>,
    pub error_info: ErrorInfo,
}

impl ScriptResult {
    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }
}

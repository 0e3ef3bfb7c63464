//! Application-supplied node list entries

use crate::core::{NodeAddress, Signature};
use crate::script::ScriptStep;

/// Admission state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinState {
    #[default]
    NotJoined,
    /// Reset detected, waiting for the node to settle before re-admission
    Waiting,
    Joined,
}

/// Setup progress of a joined node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupState {
    #[default]
    Idle,
    Sync,
    SyncRunning,
    ScriptScheduled,
    ScriptMissing,
    ScriptRunning,
    ScriptSuccess,
    ScriptFailed,
    ScriptDone,
    EndSuccess,
    EndError,
    UnsyncStart,
    UnsyncWait,
    UnsyncStop,
}

impl SetupState {
    /// Returns true for states without processing in progress.
    pub const fn is_settled(self) -> bool {
        matches!(
            self,
            SetupState::Idle | SetupState::EndSuccess | SetupState::EndError
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Lifecycle {
    pub joined: JoinState,
    pub setup_state: SetupState,
    pub guard_count: u8,
    pub guard_retries: u16,
    /// Signature announced at the last welcome
    pub signature: Signature,
}

/// Entry of the node list
///
/// The application lists every node it expects on the ring. Nodes are matched by address only.
/// When a node is welcomed, the application receives a mutable reference to its record and
/// may attach an init script before setup continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeRecord<'a> {
    pub signature: Signature,
    pub init_script: Option<&'a [ScriptStep<'a>]>,
    /// Skips remote synchronization; the node becomes available right after the welcome.
    pub remote_attach_disabled: bool,
    pub(crate) lifecycle: Lifecycle,
}

impl<'a> NodeRecord<'a> {
    pub const fn new(signature: Signature) -> Self {
        Self {
            signature,
            init_script: None,
            remote_attach_disabled: false,
            lifecycle: Lifecycle {
                joined: JoinState::NotJoined,
                setup_state: SetupState::Idle,
                guard_count: 0,
                guard_retries: 0,
                signature,
            },
        }
    }

    pub const fn with_init_script(mut self, script: &'a [ScriptStep<'a>]) -> Self {
        self.init_script = Some(script);
        self
    }

    pub const fn with_remote_attach_disabled(mut self) -> Self {
        self.remote_attach_disabled = true;
        self
    }

    pub fn address(&self) -> NodeAddress {
        self.signature.node_address
    }

    pub fn set_init_script(&mut self, script: &'a [ScriptStep<'a>]) {
        self.init_script = Some(script);
    }

    pub fn joined(&self) -> JoinState {
        self.lifecycle.joined
    }

    pub fn setup_state(&self) -> SetupState {
        self.lifecycle.setup_state
    }

    pub fn guard_count(&self) -> u8 {
        self.lifecycle.guard_count
    }

    pub fn guard_retries(&self) -> u16 {
        self.lifecycle.guard_retries
    }

    /// Signature announced at the last welcome
    pub fn last_signature(&self) -> &Signature {
        &self.lifecycle.signature
    }

    pub(crate) fn reset(&mut self) {
        self.lifecycle = Lifecycle {
            signature: self.lifecycle.signature,
            ..Default::default()
        };
    }
}

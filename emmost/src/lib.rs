//! # Emmost
//!
//! This library supervises the nodes of a MOST-like ring network from the host attached to the
//! root INIC. It admits nodes found by the ring discovery service, synchronizes their INIC
//! shadows, runs per-node init scripts, enables their routes, and recovers nodes that get stuck
//! during setup. It runs in no_std environments and requires no dynamic memory allocation.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐  ┌────────┐
//!  │ Application  │  │ Runner │
//!  └──────▲───────┘  └───┬────┘
//!         │ reports      ▼ service
//!  ┌──────┴──────────────────────┐  ┌──────────────────┐
//!  │        Node observer        ├─►│ Address registry │
//!  └──┬───────────┬──────────▲───┘  └──────────────────┘
//!     │           ▼          │ on_* events
//!     │  ┌──────────────┐  ┌─┴────────┐
//!     │  │ Node manager │  │ Platform │
//!     │  └──────┬───────┘  └─▲────────┘
//!     │         ▼            │ requests
//!     │  ┌──────────────┐    │
//!     │  │ Node         ├────┤
//!     │  │ ┌──────────┐ │    │
//!     │  │ │  Script  │ │    │
//!     │  │ │ manager  ├─┼────┘
//!     │  │ └──────────┘ │
//!     │  └──────────────┘
//!     └──► node list (NodeRecord)
//! ```
//! Components:
//! * _Node observer_ evaluates discovery candidates against the application's node list and
//!   drives every admitted node through setup. A periodic guard resyncs nodes stuck in setup
//!   and drops them after repeated failures.
//! * _Node manager_ lazily creates one _Node_ object per admitted address.
//! * _Node_ holds the script manager of its address and forwards sync and network
//!   configuration requests.
//! * _Script manager_ executes a script of request/response steps against one node.
//! * _Address registry_ remembers the ring address of the local INIC, learned when the root
//!   node is welcomed.
//! * _Platform_ provides the collaborator services, see the `emmost-driver` crate.
//! * _Runner_ is a worker task that services timers and deferred processing.
//!
//! ## Processing model
//!
//! The observer is a sans-IO state machine. Platform events enter through the `on_*` methods,
//! which only record what happened. [`NodeObserver::service`] then advances the setup of every
//! node until nothing is left to do and [`NodeObserver::next_deadline`] tells when timed work
//! is due. Applications may drive the observer directly, or share it through a [`Stack`] and
//! spawn its [`Runner`].
#![no_std]

pub use emmost_core as core;
pub use emmost_driver::time;
pub use emmost_driver as driver;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod addr;
pub mod config;
pub mod manager;
pub mod node;
pub mod observer;
pub mod record;
pub mod report;
pub mod script;
pub mod stack;
pub mod timer;

pub use config::{Config, ProcessingPolicy};
pub use observer::NodeObserver;
pub use record::{JoinState, NodeRecord, SetupState};
pub use report::{Application, Report};
pub use stack::{Runner, Stack};

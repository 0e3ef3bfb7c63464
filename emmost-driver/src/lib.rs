//! Emmost platform interface
//!
//! The crate provides an interface between the INIC port of a host and the Emmost node
//! management stack. Limited scope facilitates compatibility across versions.
//! Platform crates should depend on this crate. Emmost stack users should depend on
//! the `emmost` crate instead.
//!
//! The stack consumes five collaborator services, each a trait in [`link`]:
//! * `Transport` sends control messages to a node
//! * `RemoteSync` keeps the shadow of a remote INIC synchronized
//! * `RouteManagement` enables and disables the routes of a node
//! * `NodeDiscovery` scans the ring for node signatures
//! * `NetworkConfig` writes network settings of a remote INIC
//!
//! Requests are synchronous and only report whether they were accepted. Their outcome arrives
//! later: the platform pushes transmission status, received messages, and command results into
//! the stack through the observer's `on_*` entry points. A platform implementation may finish
//! a request from a different processing turn, but it must never call back into the stack
//! from inside a trait method.
//!
//! Address `NodeAddress::LOCAL` designates the INIC attached to this host. The platform should
//! route it to the local port regardless of the ring address the INIC currently holds.

#![no_std]

pub mod link;
pub mod message;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}

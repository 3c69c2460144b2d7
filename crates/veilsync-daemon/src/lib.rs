//! # veilsync-daemon
//!
//! The synchronization engine of a veilsync node.
//!
//! - [`Node`] bundles the local identity with the persisted stores and is
//!   what collaborators (control plane, peer-facing server) talk to.
//! - [`Communicator`] is the daemon loop: it polls the command queue and
//!   periodically runs peer exchange, block reconciliation, block download
//!   and failure decay over a [`PeerTransport`].
//!
//! [`PeerTransport`]: veilsync_net::PeerTransport

pub mod communicator;
pub mod config;
pub mod error;
pub mod node;
pub mod session;

pub use communicator::{Communicator, SyncSettings};
pub use config::DaemonConfig;
pub use error::DaemonError;
pub use node::Node;
pub use session::{SessionStats, SessionTracker};

// Peer-facing networking: the action vocabulary and HTTP over the
// anonymity network's local proxies.

pub mod action;
pub mod error;
pub mod transport;

pub use action::{split_lines, Fetched, PeerAction};
pub use error::NetError;
pub use transport::{HttpTransport, PeerTransport, TransportConfig};

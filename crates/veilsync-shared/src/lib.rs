//! Primitives shared by every veilsync crate: validators, typed identifiers,
//! identity and channel cryptography, and the proof-of-work generator.

pub mod boxes;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod pow;
pub mod types;
pub mod validate;

pub use error::{CryptoError, IdentityError, PowError, ValidationError};
pub use identity::Identity;
pub use types::{AddressKind, BlockHash, PeerAddress};

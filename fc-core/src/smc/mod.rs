//! Management controller access
//!
//! Contains the key model, the value codec, the collaborator traits and the
//! cached session wrapper.

pub mod codec;
mod cache;
mod key;
mod session;

pub use cache::{InfoState, Smc, READ_INT_FALLBACK, READ_NUM_FALLBACK};
pub use codec::{decode_integer, decode_number, encode_integer, encode_number, Encoding};
pub use key::{Key, KeyInfo, RawValue, TypeTag, VALUE_CAPACITY};
pub use session::{Connector, ControllerSession, DockState, InfoError};

#[cfg(test)]
pub use session::MockControllerSession;

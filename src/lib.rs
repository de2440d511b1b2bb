#![forbid(unsafe_code)]

//! Client core for the MTPZ authentication exchange.
//!
//! MTPZ gates trusted file operations on older Zune and Windows
//! Phone 7 class devices behind a certificate handshake. This crate
//! implements the client side of that handshake: it loads the
//! per-installation key material from `~/.mtpz-data`, builds the
//! application certificate message, validates the device's response,
//! confirms, and derives the four session parameters that unlock
//! trusted file operations.
//!
//! No key material ships with this crate; without a user-provided
//! secrets file the handshake refuses to start. The MTP transport
//! itself is out of scope and consumed through [`Transport`].

extern crate byteorder;
extern crate crypto;
extern crate hex;
#[macro_use]
extern crate log;
extern crate rand;
extern crate zeroize;

#[cfg(test)]
#[macro_use]
extern crate hex_literal;

pub mod machine;
pub mod secrets;
pub mod transport;

pub use machine::{HandshakeError, Machine, State};
pub use secrets::{Secrets, SecretsError};
pub use transport::Transport;

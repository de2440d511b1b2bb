#![forbid(unsafe_code)]

//! Cryptographic primitives for the MTPZ authentication exchange.
//!
//! Everything in here is dictated byte-for-byte by the wire protocol:
//! a SHA-1 engine that doubles as a mask-generation function, an AES
//! engine whose expanded-schedule layout and chained mode are part of
//! the device contract, and a raw RSA private-key operation with no
//! padding of its own.

extern crate byteorder;
extern crate num_bigint;
extern crate zeroize;

#[cfg(test)]
extern crate hex;
#[cfg(test)]
#[macro_use]
extern crate hex_literal;
#[cfg(test)]
extern crate rand;

pub mod aes;
pub mod hash;
pub mod rsa;

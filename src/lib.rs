#[macro_use]
extern crate lazy_static;

// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// USB Test & Measurement Class, the same kind of message traffic over USB bulk endpoints
pub mod usbtmc;

// VISA-style resource addresses and the sessions opened from them
pub mod resource;
pub mod session;

// Instrument command vocabularies
pub mod devices;

// The bench test itself
pub mod bench;

// Stand-ins for the scope and the operator
pub mod testing;

pub mod error;

pub use error::{Error, Result};

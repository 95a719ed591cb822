use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error("Invalid resource address '{address}': {reason}")]
	Resource { address: String, reason: String },

	#[error("No instrument found with vendor ID {vendor_id:#06x} and product ID {product_id:#06x}{}", serial_suffix(.serial))]
	NotFound { vendor_id: u16, product_id: u16, serial: Option<String> },

	#[cfg(feature = "usb")]
	#[error("USB error: {0}")]
	Usb(#[from] rusb::Error),

	#[error("Transport support for '{0}' was not compiled in")]
	Unsupported(String),

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("Protocol error: {0}")]
	Protocol(String),

	#[error("Unexpected response to '{command}': {response:?}")]
	Instrument { command: String, response: String },

	#[error("Test plan error: {0}")]
	Config(String),

	#[error("Instrument session is already closed")]
	SessionClosed,

	#[error("Operator input closed while waiting for confirmation")]
	OperatorInputClosed,

	#[error("Run interrupted by operator")]
	Interrupted,
}

fn serial_suffix(serial:&Option<String>) -> String {
	serial.as_ref().map(|s| format!(" and serial number {}", s)).unwrap_or_default()
}

impl Error {
	pub(crate) fn protocol(msg:impl Into<String>) -> Self { Error::Protocol(msg.into()) }

	pub(crate) fn config(msg:impl Into<String>) -> Self { Error::Config(msg.into()) }

	pub(crate) fn resource(address:&str, reason:impl Into<String>) -> Self {
		Error::Resource{ address: address.to_owned(), reason: reason.into() }
	}
}

//! Message-based instrument sessions.
//!
//! A [`Session`] owns one [`Transport`] and layers the VISA-like conveniences on top of it:
//! write/read termination, chunked reads, `*OPC?` completion barriers and a close that runs
//! exactly once.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::vxi11::CoreClient;

pub const OPC_QUERY:&str = "*OPC?";

pub const DEFAULT_CHUNK_SIZE:usize = 20 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS:u64   = 10_000;

/// One complete message in each direction; framing is the transport's business.
pub trait Transport {
	fn write_message(&mut self, data:&[u8]) -> Result<()>;

	/// Reads one response, asking the device for at most `chunk_size` bytes per transfer.
	fn read_message(&mut self, chunk_size:usize, term_char:Option<u8>) -> Result<Vec<u8>>;

	fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
	fn write_message(&mut self, data:&[u8]) -> Result<()> { (**self).write_message(data) }
	fn read_message(&mut self, chunk_size:usize, term_char:Option<u8>) -> Result<Vec<u8>> { (**self).read_message(chunk_size, term_char) }
	fn close(&mut self) -> Result<()> { (**self).close() }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	pub read_termination: String,
	pub write_termination: String,
	pub chunk_size: usize,
	pub timeout_ms: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			read_termination: "\n".to_owned(),
			write_termination: "\n".to_owned(),
			chunk_size: DEFAULT_CHUNK_SIZE,
			timeout_ms: DEFAULT_TIMEOUT_MS,
		}
	}
}

impl SessionConfig {
	pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

	// Only a single-byte terminator can be handed to the transport as a term char
	fn term_char(&self) -> Option<u8> {
		match self.read_termination.as_bytes() {
			[c] => Some(*c),
			_   => None,
		}
	}
}

pub struct Session<T: Transport> {
	transport: T,
	resource: String,
	config: SessionConfig,
	open: bool,
}

impl<T: Transport> Session<T> {

	pub fn new(transport:T, resource:impl Into<String>, config:SessionConfig) -> Self {
		Self{ transport, resource: resource.into(), config, open: true }
	}

	pub fn resource(&self) -> &str { &self.resource }
	pub fn config(&self) -> &SessionConfig { &self.config }
	pub fn is_open(&self) -> bool { self.open }

	fn ensure_open(&self) -> Result<()> {
		if self.open { Ok(()) } else { Err(Error::SessionClosed) }
	}

	pub fn write(&mut self, command:&str) -> Result<()> {
		self.ensure_open()?;
		debug!(command, "write");
		let mut bytes = Vec::with_capacity(command.len() + self.config.write_termination.len());
		bytes.extend_from_slice(command.as_bytes());
		bytes.extend_from_slice(self.config.write_termination.as_bytes());
		self.transport.write_message(&bytes)
	}

	pub fn read(&mut self) -> Result<String> {
		self.ensure_open()?;
		let raw = self.transport.read_message(self.config.chunk_size.max(1), self.config.term_char())?;
		let mut text = String::from_utf8(raw).map_err(|_| Error::protocol("Instrument response is not valid UTF-8"))?;

		let term = &self.config.read_termination;
		if !term.is_empty() && text.ends_with(term.as_str()) {
			text.truncate(text.len() - term.len());
		}
		trace!(response = %text, "read");
		Ok(text)
	}

	pub fn query(&mut self, command:&str) -> Result<String> {
		self.write(command)?;
		let response = self.read()?;
		debug!(command, response = %response, "query");
		Ok(response)
	}

	/// Completion barrier: blocks until the instrument reports every pending operation done.
	pub fn wait_complete(&mut self) -> Result<()> {
		let response = self.query(OPC_QUERY)?;
		if response.trim() == "1" {
			Ok(())
		} else {
			Err(Error::Instrument{ command: OPC_QUERY.to_owned(), response })
		}
	}

	/// Closes the transport the first time it is called; later calls do nothing.
	pub fn close(&mut self) -> Result<()> {
		if !self.open {
			return Ok(());
		}
		self.open = false;
		info!(resource = %self.resource, "closing instrument session");
		self.transport.close()
	}

}

impl<T: Transport> Drop for Session<T> {

	fn drop(&mut self) {
		if self.open {
			if let Err(e) = self.close() {
				warn!(resource = %self.resource, error = %e, "failed to close instrument session on drop");
			}
		}
	}

}

/// VXI-11 core channel link as a [`Transport`].
pub struct Vxi11Transport {
	core: CoreClient,
}

impl Vxi11Transport {
	pub fn connect(host:&str, device:&str, timeout:Duration) -> Result<Self> {
		let mut core = CoreClient::new(host, timeout)?;
		core.create_link(device)?;
		Ok(Self{ core })
	}
}

impl Transport for Vxi11Transport {
	fn write_message(&mut self, data:&[u8]) -> Result<()> { Ok(self.core.write(data)?) }

	fn read_message(&mut self, chunk_size:usize, term_char:Option<u8>) -> Result<Vec<u8>> {
		let request_size = chunk_size.min(u32::MAX as usize) as u32;
		Ok(self.core.read(request_size, term_char)?)
	}

	fn close(&mut self) -> Result<()> {
		if self.core.link().is_some() {
			self.core.destroy_link()?;
		}
		Ok(())
	}
}

/// Parses `address`, finds the instrument behind it and opens a session.
pub fn open(address:&str, config:SessionConfig) -> Result<Session<Box<dyn Transport>>> {
	let resource:Resource = address.parse()?;
	info!(resource = %resource, "opening instrument session");

	let transport:Box<dyn Transport> = match &resource {
		Resource::Tcpip{ host, device, .. } => Box::new(Vxi11Transport::connect(host, device, config.timeout())?),
		Resource::Usb{ vendor_id, product_id, serial, interface, .. } => open_usb(*vendor_id, *product_id, serial.as_deref(), *interface, &config)?,
	};

	Ok(Session::new(transport, resource.to_string(), config))
}

#[cfg(feature = "usb")]
fn open_usb(vendor_id:u16, product_id:u16, serial:Option<&str>, interface:Option<u8>, config:&SessionConfig) -> Result<Box<dyn Transport>> {
	let device = crate::usbtmc::device::UsbTmcDevice::open(vendor_id, product_id, serial, interface, config.timeout())?;
	Ok(Box::new(device))
}

#[cfg(not(feature = "usb"))]
fn open_usb(_vendor_id:u16, _product_id:u16, _serial:Option<&str>, _interface:Option<u8>, _config:&SessionConfig) -> Result<Box<dyn Transport>> {
	Err(Error::Unsupported("USB".to_owned()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockScope;

	#[test]
	fn terminators_are_added_and_stripped() {
		let scope = MockScope::new();
		let mut session = scope.connect();
		assert_eq!(session.query("MEASure:SIMPle:SOURce?").unwrap(), "C1");
		assert_eq!(scope.raw_writes(), vec![b"MEASure:SIMPle:SOURce?\n".to_vec()]);
	}

	#[test]
	fn barrier_requires_a_one() {
		let scope = MockScope::new().with_opc_response("0");
		let mut session = scope.connect();
		match session.wait_complete() {
			Err(Error::Instrument{ command, response }) => {
				assert_eq!(command, "*OPC?");
				assert_eq!(response, "0");
			},
			other => panic!("unexpected {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn close_runs_once_and_blocks_further_commands() {
		let scope = MockScope::new();
		let mut session = scope.connect();
		session.close().unwrap();
		session.close().unwrap();
		assert!(matches!(session.write("*CLS"), Err(Error::SessionClosed)));
		drop(session);
		assert_eq!(scope.closes(), 1);
	}

	#[test]
	fn dropping_an_open_session_closes_it() {
		let scope = MockScope::new();
		{
			let _session = scope.connect();
		}
		assert_eq!(scope.opens(), 1);
		assert_eq!(scope.closes(), 1);
	}

	#[test]
	fn multi_byte_terminator_is_not_a_term_char() {
		let config = SessionConfig{ read_termination: "\r\n".to_owned(), ..SessionConfig::default() };
		assert_eq!(config.term_char(), None);
		assert_eq!(SessionConfig::default().term_char(), Some(b'\n'));
	}
}

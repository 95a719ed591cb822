// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_DEVICE:&str = "inst0";

pub const OPERATION_FLAGS_END:i32     = 0x08;
pub const OPERATION_FLAGS_TERMCHR:i32 = 0x80;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 0x1;
pub const REASON_CHR:i32    = 0x2;
pub const REASON_END:i32    = 0x4;

use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub mod xdr_pack;

fn device_error(code:i32) -> io::Result<()> {
	match code {
		0  => Ok(()),
		1  => Err(err("VXI-11 syntax error")),
		3  => Err(err("VXI-11 device not accessible")),
		4  => Err(err("VXI-11 invalid link identifier")),
		5  => Err(err("VXI-11 parameter error")),
		6  => Err(err("VXI-11 channel not established")),
		8  => Err(err("VXI-11 operation not supported")),
		9  => Err(err("VXI-11 out of resources")),
		11 => Err(err("VXI-11 device locked by another link")),
		12 => Err(err("VXI-11 no lock held by this link")),
		15 => Err(err("VXI-11 I/O timeout")),
		17 => Err(err("VXI-11 I/O error")),
		21 => Err(err("VXI-11 invalid address")),
		23 => Err(err("VXI-11 abort")),
		29 => Err(err("VXI-11 channel already established")),
		_  => Err(err("VXI-11 unknown device error")),
	}
}

pub struct Link {
	pub link_id: i32,
	pub max_recv_size: u32,
}

pub struct CoreClient<S = TcpStream> {
	client: TcpClient<S>,
	opt_link: Option<Link>,
	timeout_ms: u32,
}

impl CoreClient<TcpStream> {

	pub fn new(host:&str, timeout:Duration) -> io::Result<Self> {

		// Ask the port mapper where the core channel lives
		let mut pmap_client = TcpPortMapperClient::new(host, timeout)?;

		let mapping = Mapping {
			program: DEVICE_CORE_PROG,
			version: DEVICE_CORE_VERS,
			protocol: Protocol::TCP,
			port: 0,
		};

		let port = pmap_client.get_port(&mapping)?;
		if port == 0 || port > u16::MAX as u32 {
			return Err(err("Port mapper has no VXI-11 core channel registered"));
		}
		debug!(host, port, "VXI-11 core channel located");

		let client = TcpClient::connect((host, port as u16), DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout)?;
		Ok(Self::from_client(client, timeout))
	}

}

impl<S: Read + Write> CoreClient<S> {

	pub fn from_client(client:TcpClient<S>, timeout:Duration) -> Self {
		let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
		Self{ client, opt_link: None, timeout_ms }
	}

	pub fn link(&self) -> Option<&Link> { self.opt_link.as_ref() }

	fn get_link(&self) -> io::Result<i32> {
		match self.opt_link {
			Some(Link{ link_id, .. }) => Ok(link_id),
			None => Err(err("No VXI-11 link")),
		}
	}

	pub fn create_link(&mut self, device:&str) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(err("Already connected to a link"));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, self.timeout_ms, device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		self.client.unpacker.unpack_u32()?;	// abort port, unused
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

		device_error(error)?;
		debug!(link_id, max_recv_size, "VXI-11 link created");
		self.opt_link = Some(Link{ link_id, max_recv_size });
		Ok(())
	}

	// Splits the message to respect the link's max_recv_size; END goes on the last chunk only
	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let link_id:i32 = self.get_link()?;
		let max = match self.opt_link {
			Some(Link{ max_recv_size, .. }) if max_recv_size > 0 => max_recv_size as usize,
			_ => data.len().max(1),
		};

		if data.is_empty() {
			return self.write_chunk(link_id, data, OPERATION_FLAGS_END);
		}

		let mut chunks = data.chunks(max).peekable();
		while let Some(chunk) = chunks.next() {
			let flags = if chunks.peek().is_none() { OPERATION_FLAGS_END } else { 0 };
			self.write_chunk(link_id, chunk, flags)?;
		}
		Ok(())
	}

	fn write_chunk(&mut self, link_id:i32, chunk:&[u8], flags:i32) -> io::Result<()> {
		self.client.start_call(DEVICE_WRITE)?;
		xdr_pack::pack_device_write_parms(&mut self.client.packer, link_id, self.timeout_ms, self.timeout_ms, flags, chunk)?;
		self.client.do_call()?;

		let error:i32 = self.client.unpacker.unpack_i32()?;
		let size:u32  = self.client.unpacker.unpack_u32()?;
		device_error(error)?;

		if size as usize != chunk.len() {
			return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
		}
		Ok(())
	}

	// Reads one response message, `request_size` bytes per call, until END or the termination character
	pub fn read(&mut self, request_size:u32, term_char:Option<u8>) -> io::Result<Vec<u8>> {
		let link_id:i32 = self.get_link()?;
		let (flags, term) = match term_char {
			Some(c) => (OPERATION_FLAGS_TERMCHR, c as i32),
			None    => (0, 0),
		};

		let mut ans:Vec<u8> = vec![];
		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link_id, request_size, self.timeout_ms, self.timeout_ms, flags, term)?;
			self.client.do_call()?;

			let error:i32  = self.client.unpacker.unpack_i32()?;
			let reason:i32 = self.client.unpacker.unpack_i32()?;
			let mut data   = self.client.unpacker.unpack_variable_len_opaque()?;
			device_error(error)?;

			ans.append(&mut data);

			if reason & (REASON_END | REASON_CHR) != 0 { return Ok(ans); }
			if reason & REASON_REQCNT == 0 {
				return Err(err("Expected one of three reason bits to be set"));
			}
			// Request count reached before the end of the message, ask for the rest
		}
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link_id:i32 = self.get_link()?;

		self.client.start_call(DESTROY_LINK)?;
		xdr_pack::pack_device_link(&mut self.client.packer, link_id)?;
		self.client.do_call()?;

		self.opt_link = None;
		device_error(self.client.unpacker.unpack_i32()?)
	}

}

use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;

use super::IPPROTO_TCP;
use super::xdr_pack;
use super::tcp_clients::TcpClient;

pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol {
	TCP,
}

impl Protocol {
	pub fn to_u32(&self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
	}}
}

#[derive(Debug)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,		// XDR encodes it as a u32 even though ports are u16
}

pub struct TcpPortMapperClient<S = TcpStream> {
	client: TcpClient<S>,
}

impl TcpPortMapperClient<TcpStream> {

	pub fn new(host:&str, timeout:Duration) -> io::Result<Self> {
		let client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ client })
	}

}

impl<S: Read + Write> TcpPortMapperClient<S> {

	pub fn from_client(client:TcpClient<S>) -> Self { Self{ client } }

	// Returns 0 when the program isn't registered, as the port mapper does
	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u32> {
		self.client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;
		self.client.do_call()?;

		let ans:u32 = self.client.unpacker.unpack_u32()?;

		if self.client.unpacker.all_data_consumed() { Ok(ans) }
		else { Err(Error::new(ErrorKind::Other, "Data unexpectedly left over in unpacker after unpacking port")) }
	}

}

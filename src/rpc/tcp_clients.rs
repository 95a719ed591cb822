extern crate byteorder;

use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

use crate::xdr;
use super::{xdr_pack, xdr_unpack, LAST_FRAGMENT};

// Record-marked ONC RPC client.  Generic over the stream so the framing can be exercised without a socket.
pub struct TcpClient<S = TcpStream> {
	stream: S,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient<TcpStream> {

	pub fn connect<A: ToSocketAddrs>(addr:A, prog:u32, vers:u32, timeout:Duration) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		stream.set_nodelay(true)?;
		Ok(Self::from_stream(stream, prog, vers))
	}

}

impl<S: Read + Write> TcpClient<S> {

	pub fn from_stream(stream:S, prog:u32, vers:u32) -> Self {
		Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() }
	}

	pub fn into_inner(self) -> S { self.stream }

	// Bumps the xid and packs a fresh call header; procedure arguments go into the packer afterwards
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends whatever is in the packer and leaves the reply results in the unpacker
	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.as_bytes();
		if call.len() as u32 >= LAST_FRAGMENT {
			return Err(Error::new(ErrorKind::Other, "RPC call too large for a single record fragment"));
		}

		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;
		self.stream.flush()?;

		loop {
			let reply = self.read_record()?;
			self.unpacker.reset(&reply);

			let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Stale reply to an earlier call
				continue;
			} else {
				return Err(Error::new(ErrorKind::Other, "Received an RPC reply for a call that was never made"));
			}
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut record:Vec<u8> = vec![];
		let mut last:bool = false;
		while !last {
			let x:u32 = self.stream.read_u32::<BigEndian>()?;
			last = (x & LAST_FRAGMENT) != 0;
			let n = (x & !LAST_FRAGMENT) as usize;

			let start = record.len();
			record.resize(start + n, 0);
			self.stream.read_exact(&mut record[start..])?;
		}
		Ok(record)
	}

}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use std::io::Cursor;
	use crate::rpc::{AUTH_NONE, MSG_ACCEPTED, REPLY, SUCCESS};

	// In-memory stream: reads come from canned replies, writes are recorded
	pub struct FakeStream {
		pub input: Cursor<Vec<u8>>,
		pub output: Vec<u8>,
	}

	impl Read for FakeStream {
		fn read(&mut self, buf:&mut [u8]) -> io::Result<usize> { self.input.read(buf) }
	}

	impl Write for FakeStream {
		fn write(&mut self, buf:&[u8]) -> io::Result<usize> { self.output.write(buf) }
		fn flush(&mut self) -> io::Result<()> { Ok(()) }
	}

	// Builds one record-marked accepted reply carrying `results`, optionally split into two fragments
	pub fn reply_record(xid:u32, results:&[u8], split:bool) -> Vec<u8> {
		let mut p = xdr::Packer::new();
		p.pack_u32(xid).unwrap();
		p.pack_enum(REPLY).unwrap();
		p.pack_enum(MSG_ACCEPTED).unwrap();
		p.pack_enum(AUTH_NONE).unwrap();
		p.pack_variable_len_opaque(&[]).unwrap();
		p.pack_enum(SUCCESS).unwrap();
		let mut body = p.as_bytes().to_vec();
		body.extend_from_slice(results);

		let mut out = vec![];
		if split {
			let (a, b) = body.split_at(8);
			out.write_u32::<BigEndian>(a.len() as u32).unwrap();
			out.extend_from_slice(a);
			out.write_u32::<BigEndian>(b.len() as u32 | LAST_FRAGMENT).unwrap();
			out.extend_from_slice(b);
		} else {
			out.write_u32::<BigEndian>(body.len() as u32 | LAST_FRAGMENT).unwrap();
			out.extend_from_slice(&body);
		}
		out
	}

	pub fn fake(replies:Vec<u8>) -> FakeStream {
		FakeStream{ input: Cursor::new(replies), output: vec![] }
	}

	#[test]
	fn call_is_record_marked_and_fragments_are_joined() {
		let mut client = TcpClient::from_stream(fake(reply_record(1, &[0, 0, 0, 42], true)), 100000, 2);
		client.start_call(3).unwrap();
		client.do_call().unwrap();
		assert_eq!(client.unpacker.unpack_u32().unwrap(), 42);

		let sent = client.into_inner().output;
		assert_eq!(&sent[0..4], &[0x80, 0, 0, 40]);
		assert_eq!(sent.len(), 44);
	}

	#[test]
	fn stale_replies_are_skipped() {
		let mut replies = reply_record(1, &[0, 0, 0, 1], false);
		replies.extend(reply_record(2, &[0, 0, 0, 2], false));

		let mut client = TcpClient::from_stream(fake(replies), 100000, 2);
		client.lastxid = 1;
		client.start_call(3).unwrap();
		client.do_call().unwrap();
		assert_eq!(client.unpacker.unpack_u32().unwrap(), 2);
	}

	#[test]
	fn reply_from_the_future_is_rejected() {
		let mut client = TcpClient::from_stream(fake(reply_record(5, &[], false)), 100000, 2);
		client.start_call(3).unwrap();
		assert!(client.do_call().is_err());
	}
}

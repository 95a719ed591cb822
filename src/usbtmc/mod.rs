// USB Test & Measurement Class (USBTMC 1.0) bulk transfer framing.
//
// Every bulk-OUT transfer and the first packet of every bulk-IN transfer start with a 12 byte header:
//   MsgID, bTag, ~bTag, 0x00, then 8 bytes that depend on MsgID.  Multi-byte fields are little-endian.

extern crate byteorder;

use std::io::{self, Cursor, Error, ErrorKind};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

#[cfg(feature = "usb")]
pub mod device;

pub const USBTMC_CLASS:u8    = 0xFE;
pub const USBTMC_SUBCLASS:u8 = 0x03;

pub const DEV_DEP_MSG_OUT:u8         = 1;
pub const REQUEST_DEV_DEP_MSG_IN:u8  = 2;
pub const DEV_DEP_MSG_IN:u8          = 2;

pub const HEADER_LEN:usize = 12;

pub const ATTR_EOM:u8          = 0x01;
pub const ATTR_TERM_CHAR_EN:u8 = 0x02;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::InvalidData, msg) }

// bTag cycles through 1..=255, zero is never used
#[derive(Debug, Default)]
pub struct Tags {
	last: u8,
}

impl Tags {
	pub fn next(&mut self) -> u8 {
		self.last = if self.last == u8::MAX { 1 } else { self.last + 1 };
		self.last
	}
}

fn pack_prefix(buff:&mut Vec<u8>, msg_id:u8, tag:u8) {
	buff.push(msg_id);
	buff.push(tag);
	buff.push(!tag);
	buff.push(0);
}

pub fn pack_dev_dep_msg_out(tag:u8, data:&[u8], eom:bool) -> io::Result<Vec<u8>> {
	if data.len() > u32::MAX as usize {
		return Err(err("USBTMC message too long"));
	}

	let mut buff:Vec<u8> = Vec::with_capacity(HEADER_LEN + data.len() + 3);
	pack_prefix(&mut buff, DEV_DEP_MSG_OUT, tag);
	buff.write_u32::<LittleEndian>(data.len() as u32)?;
	buff.push(if eom { ATTR_EOM } else { 0 });
	buff.extend_from_slice(&[0, 0, 0]);
	buff.extend_from_slice(data);

	// Transfers are padded to a multiple of four bytes
	while buff.len() % 4 != 0 { buff.push(0); }
	Ok(buff)
}

pub fn pack_request_dev_dep_msg_in(tag:u8, transfer_size:u32, term_char:Option<u8>) -> io::Result<Vec<u8>> {
	let mut buff:Vec<u8> = Vec::with_capacity(HEADER_LEN);
	pack_prefix(&mut buff, REQUEST_DEV_DEP_MSG_IN, tag);
	buff.write_u32::<LittleEndian>(transfer_size)?;
	match term_char {
		Some(c) => { buff.push(ATTR_TERM_CHAR_EN); buff.push(c); },
		None    => { buff.push(0); buff.push(0); },
	}
	buff.extend_from_slice(&[0, 0]);
	Ok(buff)
}

#[derive(Debug, PartialEq)]
pub struct InHeader {
	pub tag: u8,
	pub transfer_size: u32,
	pub eom: bool,
}

pub fn unpack_dev_dep_msg_in(buff:&[u8], expected_tag:u8) -> io::Result<InHeader> {
	if buff.len() < HEADER_LEN {
		return Err(err("USBTMC bulk-IN transfer shorter than its header"));
	}
	if buff[0] != DEV_DEP_MSG_IN {
		return Err(err("Unexpected MsgID in USBTMC bulk-IN header"));
	}
	let tag = buff[1];
	if tag != !buff[2] {
		return Err(err("Corrupt bTag in USBTMC bulk-IN header"));
	}
	if tag != expected_tag {
		return Err(err("USBTMC bulk-IN bTag doesn't match the request"));
	}

	let mut rdr = Cursor::new(&buff[4..]);
	let transfer_size = rdr.read_u32::<LittleEndian>()?;
	let eom = buff[8] & ATTR_EOM != 0;
	Ok(InHeader{ tag, transfer_size, eom })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tags_skip_zero() {
		let mut tags = Tags::default();
		assert_eq!(tags.next(), 1);
		for _ in 0..253 { tags.next(); }
		assert_eq!(tags.next(), 255);
		assert_eq!(tags.next(), 1);
	}

	#[test]
	fn msg_out_header_and_padding() {
		let b = pack_dev_dep_msg_out(1, b"*OPC?\n", true).unwrap();
		assert_eq!(&b[..12], &[1, 1, 0xFE, 0, 6, 0, 0, 0, 1, 0, 0, 0]);
		assert_eq!(&b[12..18], b"*OPC?\n");
		assert_eq!(b.len(), 20);
	}

	#[test]
	fn request_in_with_term_char() {
		let b = pack_request_dev_dep_msg_in(7, 1024, Some(b'\n')).unwrap();
		assert_eq!(b, vec![2, 7, 0xF8, 0, 0, 4, 0, 0, 2, b'\n', 0, 0]);
	}

	#[test]
	fn msg_in_header_is_validated() {
		let good = [2, 9, 0xF6, 0, 3, 0, 0, 0, 1, 0, 0, 0, b'1', b'\n', b'x'];
		assert_eq!(unpack_dev_dep_msg_in(&good, 9).unwrap(), InHeader{ tag: 9, transfer_size: 3, eom: true });

		assert!(unpack_dev_dep_msg_in(&good, 8).is_err());
		assert!(unpack_dev_dep_msg_in(&good[..8], 9).is_err());

		let mut bad_inverse = good;
		bad_inverse[2] = 0;
		assert!(unpack_dev_dep_msg_in(&bad_inverse, 9).is_err());
	}
}

use std::io;

use crate::xdr::Packer;
use crate::rpc::{AUTH_NONE, CALL, RPCVERSION};

pub fn pack_auth(packer:&mut Packer, flavor:i32, body:&[u8]) -> io::Result<()> {
	packer.pack_enum(flavor)?;
	packer.pack_variable_len_opaque(body)
}

pub fn pack_callheader(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32, cred:(i32, &[u8]), verf:(i32, &[u8])) -> io::Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prc)?;
	pack_auth(packer, cred.0, cred.1)?;
	pack_auth(packer, verf.0, verf.1)
}

pub fn pack_callheader_no_auth(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32) -> io::Result<()> {
	pack_callheader(packer, xid, prog, vers, prc, (AUTH_NONE, &[]), (AUTH_NONE, &[]))
}

pub fn pack_mapping(packer:&mut Packer, prog:u32, vers:u32, prot:u32, port:u32) -> io::Result<()> {
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prot)?;
	packer.pack_u32(port)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn call_header_without_auth_is_forty_bytes() {
		let mut p = Packer::new();
		pack_callheader_no_auth(&mut p, 7, 100000, 2, 3).unwrap();
		let b = p.as_bytes();
		assert_eq!(b.len(), 40);
		assert_eq!(&b[0..4], &[0, 0, 0, 7]);
		assert_eq!(&b[8..12], &[0, 0, 0, 2]);
		assert_eq!(&b[20..24], &[0, 0, 0, 3]);
	}
}

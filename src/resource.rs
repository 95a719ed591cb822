//! VISA-style resource addresses.
//!
//! Only the two instrument classes the bench can reach are understood:
//!
//! * `USB[board]::<vendor-id>::<product-id>[::<serial>[::<interface>]][::INSTR]`
//! * `TCPIP[board]::<host>[::<device>][::INSTR]`
//!
//! Numeric IDs accept `0x` hexadecimal or decimal, matching what NI-VISA prints.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::vxi11::DEFAULT_DEVICE;

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
	Usb {
		board: u16,
		vendor_id: u16,
		product_id: u16,
		serial: Option<String>,
		interface: Option<u8>,
	},
	Tcpip {
		board: u16,
		host: String,
		device: String,
	},
}

fn parse_id(address:&str, field:&str, what:&str) -> Result<u16> {
	let parsed = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
		Some(hex) => u16::from_str_radix(hex, 16),
		None      => field.parse::<u16>(),
	};
	parsed.map_err(|_| Error::resource(address, format!("{} '{}' is not a 16-bit number", what, field)))
}

fn parse_board(address:&str, digits:&str) -> Result<u16> {
	if digits.is_empty() { return Ok(0); }
	digits.parse::<u16>().map_err(|_| Error::resource(address, format!("bad board number '{}'", digits)))
}

impl FromStr for Resource {
	type Err = Error;

	fn from_str(address:&str) -> Result<Self> {
		let mut fields:Vec<&str> = address.trim().split("::").collect();
		if fields.last().map(|f| f.eq_ignore_ascii_case("INSTR")) == Some(true) {
			fields.pop();
		}
		if fields.iter().any(|f| f.is_empty()) {
			return Err(Error::resource(address, "empty field"));
		}

		let interface_type = fields[0].to_ascii_uppercase();
		if let Some(board) = interface_type.strip_prefix("USB") {
			let board = parse_board(address, board)?;
			if fields.len() < 3 || fields.len() > 5 {
				return Err(Error::resource(address, "expected USB::<vendor-id>::<product-id>[::<serial>[::<interface>]]"));
			}
			let vendor_id  = parse_id(address, fields[1], "vendor ID")?;
			let product_id = parse_id(address, fields[2], "product ID")?;
			let serial     = fields.get(3).map(|s| s.to_string());
			let interface  = match fields.get(4) {
				Some(f) => Some(f.parse::<u8>().map_err(|_| Error::resource(address, format!("bad interface number '{}'", f)))?),
				None    => None,
			};
			Ok(Resource::Usb{ board, vendor_id, product_id, serial, interface })
		} else if let Some(board) = interface_type.strip_prefix("TCPIP") {
			let board = parse_board(address, board)?;
			match fields.len() {
				2 => Ok(Resource::Tcpip{ board, host: fields[1].to_owned(), device: DEFAULT_DEVICE.to_owned() }),
				3 => {
					if fields[2].eq_ignore_ascii_case("SOCKET") || fields[2].parse::<u16>().is_ok() {
						return Err(Error::resource(address, "raw socket resources are not supported"));
					}
					Ok(Resource::Tcpip{ board, host: fields[1].to_owned(), device: fields[2].to_owned() })
				},
				_ => Err(Error::resource(address, "expected TCPIP::<host>[::<device>]")),
			}
		} else {
			Err(Error::resource(address, format!("unsupported interface type '{}'", fields[0])))
		}
	}
}

impl fmt::Display for Resource {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			Resource::Usb{ board, vendor_id, product_id, serial, interface } => {
				write!(f, "USB{}::{:#06X}::{:#06X}", board, vendor_id, product_id)?;
				if let Some(s) = serial { write!(f, "::{}", s)?; }
				if let Some(i) = interface { write!(f, "::{}", i)?; }
				write!(f, "::INSTR")
			},
			Resource::Tcpip{ board, host, device } => write!(f, "TCPIP{}::{}::{}::INSTR", board, host, device),
		}
	}
}

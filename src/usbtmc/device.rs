use std::time::Duration;

use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType, UsbContext};
use tracing::{debug, info, trace};

use super::{HEADER_LEN, Tags, USBTMC_CLASS, USBTMC_SUBCLASS};
use super::{pack_dev_dep_msg_out, pack_request_dev_dep_msg_in, unpack_dev_dep_msg_in};
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::session::Transport;

pub const CONFIGURATION:u8 = 1;

// Upper bound on a single bulk-IN buffer; longer transfers arrive over several reads
const MAX_BULK_READ:usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
	pub bus: u8,
	pub address: u8,
	pub vendor_id: u16,
	pub product_id: u16,
	pub serial: Option<String>,
	pub interface: u8,
}

impl DeviceInfo {
	pub fn resource(&self) -> Resource {
		Resource::Usb {
			board: 0,
			vendor_id: self.vendor_id,
			product_id: self.product_id,
			serial: self.serial.clone(),
			interface: None,
		}
	}
}

struct Endpoints {
	interface: u8,
	setting: u8,
	bulk_in: u8,
	bulk_out: u8,
	max_packet: usize,
}

fn find_endpoints<T: UsbContext>(device:&Device<T>, wanted:Option<u8>) -> Result<Option<Endpoints>> {
	let config = device.active_config_descriptor()?;
	for interface in config.interfaces() {
		for desc in interface.descriptors() {
			if desc.class_code() != USBTMC_CLASS || desc.sub_class_code() != USBTMC_SUBCLASS { continue; }
			if wanted.map(|n| n != desc.interface_number()) == Some(true) { continue; }

			let mut bulk_in = None;
			let mut bulk_out = None;
			let mut max_packet:usize = 64;
			for ep in desc.endpoint_descriptors() {
				if ep.transfer_type() != TransferType::Bulk { continue; }
				match ep.direction() {
					Direction::In  => { bulk_in = Some(ep.address()); max_packet = ep.max_packet_size() as usize; },
					Direction::Out => bulk_out = Some(ep.address()),
				}
			}

			if let (Some(bulk_in), Some(bulk_out)) = (bulk_in, bulk_out) {
				return Ok(Some(Endpoints{ interface: desc.interface_number(), setting: desc.setting_number(), bulk_in, bulk_out, max_packet: max_packet.max(1) }));
			}
		}
	}
	Ok(None)
}

fn read_serial<T: UsbContext>(device:&Device<T>, timeout:Duration) -> Option<String> {
	let desc = device.device_descriptor().ok()?;
	let handle = device.open().ok()?;
	let language = handle.read_languages(timeout).ok()?.into_iter().next()?;
	handle.read_serial_number_string(language, &desc, timeout).ok()
}

/// Every attached device exposing a USBTMC interface.
pub fn list(timeout:Duration) -> Result<Vec<DeviceInfo>> {
	let mut ans = vec![];
	for device in rusb::devices()?.iter() {
		let desc = match device.device_descriptor() {
			Ok(d) => d,
			Err(e) => { debug!(error = %e, "skipping device without a readable descriptor"); continue; },
		};
		let endpoints = match find_endpoints(&device, None) {
			Ok(Some(ep)) => ep,
			_ => continue,
		};
		ans.push(DeviceInfo {
			bus: device.bus_number(),
			address: device.address(),
			vendor_id: desc.vendor_id(),
			product_id: desc.product_id(),
			serial: read_serial(&device, timeout),
			interface: endpoints.interface,
		});
	}
	Ok(ans)
}

pub struct UsbTmcDevice {
	handle: DeviceHandle<GlobalContext>,
	endpoints: Endpoints,
	tags: Tags,
	timeout: Duration,
	claimed: bool,
}

impl UsbTmcDevice {

	/// Finds the device by vendor/product ID (and serial number when given), selects
	/// configuration 1 and claims its USBTMC interface.
	pub fn open(vendor_id:u16, product_id:u16, serial:Option<&str>, interface:Option<u8>, timeout:Duration) -> Result<Self> {
		let not_found = || Error::NotFound{ vendor_id, product_id, serial: serial.map(|s| s.to_owned()) };

		let device = rusb::devices()?.iter()
			.filter(|d| d.device_descriptor().map(|desc| desc.vendor_id() == vendor_id && desc.product_id() == product_id).unwrap_or(false))
			.find(|d| match serial {
				Some(wanted) => read_serial(d, timeout).map(|s| s == wanted).unwrap_or(false),
				None         => true,
			})
			.ok_or_else(not_found)?;

		let mut handle = device.open()?;
		// Not every platform can detach a kernel driver; claiming will report the real problem
		if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
			trace!(error = %e, "kernel driver auto-detach unavailable");
		}

		if handle.active_configuration()? != CONFIGURATION {
			handle.set_active_configuration(CONFIGURATION)?;
		}

		let endpoints = find_endpoints(&device, interface)?
			.ok_or_else(|| Error::protocol("Device has no USBTMC interface with bulk endpoints"))?;

		handle.claim_interface(endpoints.interface)?;
		if endpoints.setting != 0 {
			handle.set_alternate_setting(endpoints.interface, endpoints.setting)?;
		}

		info!(bus = device.bus_number(), address = device.address(), interface = endpoints.interface, "USBTMC interface claimed");
		Ok(Self{ handle, endpoints, tags: Tags::default(), timeout, claimed: true })
	}

	fn read_len(&self, wanted:usize) -> usize {
		let n = (HEADER_LEN + wanted).min(MAX_BULK_READ);
		let mp = self.endpoints.max_packet;
		((n + mp - 1) / mp) * mp
	}

}

impl Transport for UsbTmcDevice {

	fn write_message(&mut self, data:&[u8]) -> Result<()> {
		let tag = self.tags.next();
		let transfer = pack_dev_dep_msg_out(tag, data, true)?;
		let n = self.handle.write_bulk(self.endpoints.bulk_out, &transfer, self.timeout)?;
		if n != transfer.len() {
			return Err(Error::protocol("Short USBTMC bulk-OUT transfer"));
		}
		Ok(())
	}

	// Term chars are left to EOM: not every USBTMC device advertises the capability
	fn read_message(&mut self, chunk_size:usize, _term_char:Option<u8>) -> Result<Vec<u8>> {
		let request_size = chunk_size.min(u32::MAX as usize) as u32;
		let mut ans:Vec<u8> = vec![];

		loop {
			let tag = self.tags.next();
			let request = pack_request_dev_dep_msg_in(tag, request_size, None)?;
			self.handle.write_bulk(self.endpoints.bulk_out, &request, self.timeout)?;

			let mut buff = vec![0u8; self.read_len(request_size as usize)];
			let n = self.handle.read_bulk(self.endpoints.bulk_in, &mut buff, self.timeout)?;
			let header = unpack_dev_dep_msg_in(&buff[..n], tag)?;
			let size = header.transfer_size as usize;

			let mut payload:Vec<u8> = buff[HEADER_LEN..n].to_vec();
			while payload.len() < size {
				let n = self.handle.read_bulk(self.endpoints.bulk_in, &mut buff, self.timeout)?;
				if n == 0 {
					return Err(Error::protocol("USBTMC device stopped sending before the announced transfer size"));
				}
				payload.extend_from_slice(&buff[..n]);
			}
			// Drop alignment padding
			payload.truncate(size);
			ans.append(&mut payload);

			if header.eom { return Ok(ans); }
		}
	}

	fn close(&mut self) -> Result<()> {
		if self.claimed {
			self.claimed = false;
			self.handle.release_interface(self.endpoints.interface)?;
		}
		Ok(())
	}

}

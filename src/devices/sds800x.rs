extern crate regex;
extern crate serde;

use std::convert::TryFrom;
use std::fmt;

use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

lazy_static! {
	static ref VALUE_RE: Regex  = Regex::new(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*[A-Za-z%/]*\s*$").unwrap();
	static ref SOURCE_RE: Regex = Regex::new(r"^\s*(?:SOURce\s+)?C(\d)\s*$").unwrap();
}

// SDS800X HD as it enumerates on USB
pub const VENDOR_ID:u16  = 0xF4EC;
pub const PRODUCT_ID:u16 = 0x1017;

pub const NUM_CHANNELS:u8 = 4;

pub const MEASURE_ON:&str     = "MEASure ON";
pub const MEASURE_CLEAR:&str  = "MEASure:SIMPle:CLEar";
pub const SOURCE_QUERY:&str   = "MEASure:SIMPle:SOURce?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
	pub const C1:Channel = Channel(1);
	pub const C2:Channel = Channel(2);

	pub fn new(n:u8) -> Result<Self> {
		if n == 0 || n > NUM_CHANNELS { Err(Error::config(format!("SDS800X HD only has channels 1 to {}, not {}", NUM_CHANNELS, n))) }
		else { Ok(Channel(n)) }
	}

	pub fn number(&self) -> u8 { self.0 }

	// Name used by the measurement subsystem
	pub fn source(&self) -> String { format!("C{}", self.0) }
}

impl TryFrom<u8> for Channel {
	type Error = Error;
	fn try_from(n:u8) -> Result<Self> { Channel::new(n) }
}

impl From<Channel> for u8 {
	fn from(c:Channel) -> u8 { c.0 }
}

impl fmt::Display for Channel {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { write!(f, "C{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coupling { Dc, Ac, Gnd }

impl Coupling {
	pub fn scpi(&self) -> &'static str { match self {
		Coupling::Dc  => "DC",
		Coupling::Ac  => "AC",
		Coupling::Gnd => "GND",
	}}
}

fn on_off(b:bool) -> &'static str { if b { "ON" } else { "OFF" } }

// Probe attenuation in the mantissa/exponent form the scope prints, e.g. 1.00E+0
pub fn format_probe(factor:f64) -> String {
	let s = format!("{:.2E}", factor);
	match s.find('E') {
		Some(i) if !s[i + 1..].starts_with('-') => format!("{}E+{}", &s[..i], &s[i + 1..]),
		_ => s,
	}
}

/// One write-only channel setting.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSetting {
	Coupling(Coupling),
	ProbeAttenuation(f64),
	Switch(bool),
	Visible(bool),
	Label(bool),
	LabelText(String),
}

impl ChannelSetting {
	pub fn command(&self, ch:Channel) -> String {
		let n = ch.number();
		match self {
			ChannelSetting::Coupling(c)         => format!("CHANnel{}:COUPling {}", n, c.scpi()),
			ChannelSetting::ProbeAttenuation(x) => format!("CHANnel{}:PROBe VALue,{}", n, format_probe(*x)),
			ChannelSetting::Switch(b)           => format!("CHANnel{}:SWITch {}", n, on_off(*b)),
			ChannelSetting::Visible(b)          => format!("CHANnel{}:VISible {}", n, on_off(*b)),
			ChannelSetting::Label(b)            => format!("CHANnel{}:LABel {}", n, on_off(*b)),
			ChannelSetting::LabelText(t)        => format!("CHANnel{}:LABel:TEXT \"{}\"", n, t.replace('"', "")),
		}
	}
}

/// Items of the simple measurement subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureItem { Max, Min, Ampl, Median, Duty, Pkpk, Mean, Rms, Freq, Period }

impl MeasureItem {
	pub fn scpi(&self) -> &'static str { match self {
		MeasureItem::Max    => "MAX",
		MeasureItem::Min    => "MIN",
		MeasureItem::Ampl   => "AMPL",
		MeasureItem::Median => "MEDIAN",
		MeasureItem::Duty   => "DUTY",
		MeasureItem::Pkpk   => "PKPK",
		MeasureItem::Mean   => "MEAN",
		MeasureItem::Rms    => "RMS",
		MeasureItem::Freq   => "FREQ",
		MeasureItem::Period => "PER",
	}}

	// Short name used in the console report
	pub fn label(&self) -> &'static str { match self {
		MeasureItem::Max    => "max",
		MeasureItem::Min    => "min",
		MeasureItem::Ampl   => "ampl",
		MeasureItem::Median => "med",
		MeasureItem::Duty   => "duty",
		MeasureItem::Pkpk   => "pkpk",
		MeasureItem::Mean   => "mean",
		MeasureItem::Rms    => "rms",
		MeasureItem::Freq   => "freq",
		MeasureItem::Period => "period",
	}}
}

pub fn item_enable(item:MeasureItem) -> String { format!("MEASure:SIMPle:ITEM {},ON", item.scpi()) }
pub fn source_select(ch:Channel) -> String { format!("MEASure:SIMPle:SOURce {}", ch.source()) }
pub fn value_query(item:MeasureItem) -> String { format!("MEASure:SIMPle:VALue? {}", item.scpi()) }

// `****` and other non-numeric answers mean the scope couldn't compute the item
pub fn parse_value(raw:&str) -> Option<f64> {
	let cap = VALUE_RE.captures(raw)?;
	cap.get(1)?.as_str().parse::<f64>().ok().filter(|x| x.is_finite())
}

pub fn parse_source(raw:&str) -> Option<Channel> {
	let cap = SOURCE_RE.captures(raw)?;
	let n = cap.get(1)?.as_str().parse::<u8>().ok()?;
	Channel::new(n).ok()
}

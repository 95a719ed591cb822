//! What a run does: which instrument, which channels, which input voltages.
//!
//! Everything has a built-in default matching the buck converter board; a TOML file can
//! override any part of it:
//!
//! ```toml
//! resource = "USB0::0xF4EC::0x1017::SDS08A0X802909::INSTR"
//! vin_levels = [12, 11, 5, 24, 27]
//!
//! [session]
//! timeout_ms = 5000
//!
//! [[channels]]
//! channel = 1
//! label = "Vin"
//!
//! [[channels]]
//! channel = 2
//! label = "Vout"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::devices::sds800x::{Channel, ChannelSetting, Coupling, MeasureItem, PRODUCT_ID, VENDOR_ID};
use crate::error::{Error, Result};
use crate::session::SessionConfig;

pub const DEFAULT_SERIAL:&str = "SDS08A0X802909";
pub const DEFAULT_VIN_LEVELS:[f64; 5] = [12.0, 11.0, 5.0, 24.0, 27.0];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelPlan {
	pub channel: Channel,
	pub label: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestPlan {
	pub resource: String,
	pub session: SessionConfig,
	pub vin_levels: Vec<f64>,
	pub channels: Vec<ChannelPlan>,
	pub coupling: Coupling,
	pub probe_attenuation: f64,
	// Turned on in the scope's measurement display
	pub displayed_items: Vec<MeasureItem>,
	// Read back and reported for every channel
	pub captured_items: Vec<MeasureItem>,
}

fn channel_plan(channel:Channel, label:&str) -> ChannelPlan {
	ChannelPlan{ channel, label: label.to_owned() }
}

impl Default for TestPlan {
	fn default() -> Self {
		Self {
			resource: format!("USB0::{:#06X}::{:#06X}::{}::INSTR", VENDOR_ID, PRODUCT_ID, DEFAULT_SERIAL),
			session: SessionConfig::default(),
			vin_levels: DEFAULT_VIN_LEVELS.to_vec(),
			channels: vec![channel_plan(Channel::C1, "Vin"), channel_plan(Channel::C2, "Vout")],
			coupling: Coupling::Dc,
			probe_attenuation: 1.0,
			displayed_items: vec![MeasureItem::Max, MeasureItem::Min, MeasureItem::Ampl, MeasureItem::Median, MeasureItem::Duty],
			captured_items: vec![MeasureItem::Max, MeasureItem::Min, MeasureItem::Ampl, MeasureItem::Median],
		}
	}
}

impl TestPlan {

	pub fn from_toml_str(s:&str) -> Result<Self> {
		let plan:TestPlan = toml::from_str(s).map_err(|e| Error::config(e.to_string()))?;
		plan.validate()?;
		Ok(plan)
	}

	pub fn load(path:&Path) -> Result<Self> {
		let text = fs::read_to_string(path)
			.map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
		Self::from_toml_str(&text)
	}

	pub fn validate(&self) -> Result<()> {
		if self.channels.is_empty() {
			return Err(Error::config("at least one channel is required"));
		}
		let mut seen = HashSet::new();
		for c in &self.channels {
			if !seen.insert(c.channel.number()) {
				return Err(Error::config(format!("channel {} is listed twice", c.channel)));
			}
			if c.label.trim().is_empty() {
				return Err(Error::config(format!("channel {} needs a label", c.channel)));
			}
		}
		if let Some(v) = self.vin_levels.iter().find(|v| !v.is_finite() || **v < 0.0) {
			return Err(Error::config(format!("input voltage {} is not a usable level", v)));
		}
		if !(self.probe_attenuation.is_finite() && self.probe_attenuation > 0.0) {
			return Err(Error::config("probe attenuation must be positive"));
		}
		if self.captured_items.is_empty() {
			return Err(Error::config("at least one captured measurement item is required"));
		}
		if self.session.chunk_size == 0 {
			return Err(Error::config("session chunk_size must be non-zero"));
		}
		Ok(())
	}

	/// Channel configuration as (channel, setting) pairs in the order they are sent:
	/// per-channel settings first, label texts last.
	pub fn setup_directives(&self) -> Vec<(Channel, ChannelSetting)> {
		let mut ans = vec![];
		for c in &self.channels {
			ans.push((c.channel, ChannelSetting::Coupling(self.coupling)));
			ans.push((c.channel, ChannelSetting::ProbeAttenuation(self.probe_attenuation)));
			ans.push((c.channel, ChannelSetting::Switch(true)));
			ans.push((c.channel, ChannelSetting::Visible(true)));
			ans.push((c.channel, ChannelSetting::Label(true)));
		}
		for c in &self.channels {
			ans.push((c.channel, ChannelSetting::LabelText(c.label.clone())));
		}
		ans
	}

}

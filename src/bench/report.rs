use std::fmt;

use serde::Serialize;

use crate::devices::sds800x::{parse_value, Channel, MeasureItem};
use crate::error::{Error, Result};

/// One measurement item as the scope reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
	pub item: MeasureItem,
	pub raw: String,
	pub value: Option<f64>,
}

impl Reading {
	pub fn new(item:MeasureItem, raw:&str) -> Self {
		let raw = raw.trim().to_owned();
		let value = parse_value(&raw);
		Self{ item, raw, value }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReading {
	pub channel: Channel,
	pub label: String,
	// What the scope said its measurement source was before the values were read
	pub source_echo: String,
	pub readings: Vec<Reading>,
}

impl ChannelReading {
	pub fn get(&self, item:MeasureItem) -> Option<&Reading> {
		self.readings.iter().find(|r| r.item == item)
	}
}

impl fmt::Display for ChannelReading {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}:", self.label)?;
		for r in &self.readings {
			write!(f, "\n\t{}: {}", r.item.label(), r.raw)?;
		}
		Ok(())
	}
}

/// Everything captured at one input voltage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
	pub iteration: usize,
	pub vin: f64,
	pub channels: Vec<ChannelReading>,
}

impl IterationReport {
	pub fn to_json(&self) -> Result<String> {
		serde_json::to_string(self).map_err(|e| Error::protocol(format!("cannot encode report: {}", e)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vin() -> ChannelReading {
		ChannelReading {
			channel: Channel::C1,
			label: "Vin".to_owned(),
			source_echo: "C1".to_owned(),
			readings: vec![
				Reading::new(MeasureItem::Max, "12.1"),
				Reading::new(MeasureItem::Min, "11.9"),
				Reading::new(MeasureItem::Ampl, "0.2"),
				Reading::new(MeasureItem::Median, "****"),
			],
		}
	}

	#[test]
	fn block_lists_items_under_the_label() {
		assert_eq!(vin().to_string(), "Vin:\n\tmax: 12.1\n\tmin: 11.9\n\tampl: 0.2\n\tmed: ****");
	}

	#[test]
	fn unavailable_values_keep_their_text() {
		let r = vin();
		assert_eq!(r.get(MeasureItem::Max).and_then(|r| r.value), Some(12.1));
		assert_eq!(r.get(MeasureItem::Median).map(|r| r.value), Some(None));
		assert!(r.get(MeasureItem::Duty).is_none());
	}

	#[test]
	fn json_carries_channel_number_and_values() {
		let report = IterationReport{ iteration: 1, vin: 12.0, channels: vec![vin()] };
		let v:serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
		assert_eq!(v["vin"], 12.0);
		assert_eq!(v["channels"][0]["channel"], 1);
		assert_eq!(v["channels"][0]["readings"][0]["item"], "MAX");
		assert_eq!(v["channels"][0]["readings"][0]["value"], 12.1);
		assert!(v["channels"][0]["readings"][3]["value"].is_null());
	}
}

//! The bench procedure: connect, configure the scope, then for every input voltage wait
//! for the operator and read both channels back.

use tracing::{info, warn};

use crate::devices::sds800x::{self, MEASURE_CLEAR, MEASURE_ON, SOURCE_QUERY};
use crate::error::{Error, Result};
use crate::session::{Session, SessionConfig, Transport};

use super::operator::{Interrupt, Operator};
use super::plan::{ChannelPlan, TestPlan};
use super::report::{ChannelReading, IterationReport, Reading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Completed,
	Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
	pub outcome: Outcome,
	pub iterations: usize,
	// Input levels in the plan
	pub planned: usize,
}

pub struct Sequencer<'a, O: Operator> {
	plan: &'a TestPlan,
	operator: &'a mut O,
	interrupt: Interrupt,
	emit_json: bool,
	iterations: usize,
}

impl<'a, O: Operator> Sequencer<'a, O> {

	pub fn new(plan:&'a TestPlan, operator:&'a mut O, interrupt:Interrupt) -> Self {
		Self{ plan, operator, interrupt, emit_json: false, iterations: 0 }
	}

	/// Also print every iteration as one JSON object.
	pub fn emit_json(mut self, on:bool) -> Self {
		self.emit_json = on;
		self
	}

	/// Runs the whole test.  `connect` opens the session; once it succeeds the session is
	/// closed exactly once whichever way the run ends.
	pub fn run<T, F>(mut self, connect:F) -> Result<Summary>
	where
		T: Transport,
		F: FnOnce(&str, SessionConfig) -> Result<Session<T>>,
	{
		self.operator.show("Running program to test buck converter...\n");

		// Nothing is open yet, so there is nothing to tear down
		if self.interrupt.is_raised() {
			info!("interrupted before connecting");
			return Ok(self.summary(Outcome::Interrupted));
		}

		let mut session = connect(&self.plan.resource, self.plan.session.clone())?;
		info!(resource = session.resource(), "instrument session open");

		let result = self.drive(&mut session);
		let teardown = teardown(&mut session);

		match result {
			Ok(()) => {
				teardown?;
				info!(iterations = self.iterations, "run complete");
				Ok(self.summary(Outcome::Completed))
			},
			Err(Error::Interrupted) => {
				teardown?;
				info!(iterations = self.iterations, "run interrupted by operator");
				Ok(self.summary(Outcome::Interrupted))
			},
			Err(e) => {
				if let Err(t) = teardown {
					warn!(error = %t, "teardown after failure also failed");
				}
				Err(e)
			},
		}
	}

	fn summary(&self, outcome:Outcome) -> Summary {
		Summary{ outcome, iterations: self.iterations, planned: self.plan.vin_levels.len() }
	}

	fn drive<T: Transport>(&mut self, session:&mut Session<T>) -> Result<()> {
		self.setup(session)?;

		let plan = self.plan;
		for (i, vin) in plan.vin_levels.iter().enumerate() {
			self.operator.confirm(&format!("Manually change vin to {} V & press enter", vin))?;

			let mut channels = Vec::with_capacity(plan.channels.len());
			for ch in &plan.channels {
				channels.push(self.capture(session, ch)?);
			}

			let report = IterationReport{ iteration: i + 1, vin: *vin, channels };
			if self.emit_json {
				let json = report.to_json()?;
				self.operator.show(&json);
			}
			self.iterations += 1;
		}
		Ok(())
	}

	fn setup<T: Transport>(&mut self, session:&mut Session<T>) -> Result<()> {
		self.barrier(session)?;

		for (ch, setting) in self.plan.setup_directives() {
			self.write(session, &setting.command(ch))?;
		}
		// Measurements must never start against a half-applied configuration
		self.barrier(session)?;

		self.write(session, MEASURE_ON)?;
		self.write(session, MEASURE_CLEAR)?;
		for item in &self.plan.displayed_items {
			self.write(session, &sds800x::item_enable(*item))?;
		}
		Ok(())
	}

	// Source select, barrier, echo, barrier, values, barrier: skipping any step risks reading
	// the previous channel's numbers
	fn capture<T: Transport>(&mut self, session:&mut Session<T>, ch:&ChannelPlan) -> Result<ChannelReading> {
		self.write(session, &sds800x::source_select(ch.channel))?;
		self.barrier(session)?;

		let source_echo = self.query(session, SOURCE_QUERY)?;
		self.operator.show(&format!("current channel: {}", source_echo));
		if sds800x::parse_source(&source_echo) != Some(ch.channel) {
			warn!(expected = %ch.channel, echo = %source_echo, "measurement source echo doesn't match");
		}
		self.barrier(session)?;

		let mut readings = Vec::with_capacity(self.plan.captured_items.len());
		for item in &self.plan.captured_items {
			let raw = self.query(session, &sds800x::value_query(*item))?;
			readings.push(Reading::new(*item, &raw));
		}
		self.barrier(session)?;

		let reading = ChannelReading{ channel: ch.channel, label: ch.label.clone(), source_echo, readings };
		self.operator.show(&reading.to_string());
		Ok(reading)
	}

	// Every instrument step first checks for an operator interrupt
	fn write<T: Transport>(&self, session:&mut Session<T>, command:&str) -> Result<()> {
		self.interrupt.check()?;
		session.write(command)
	}

	fn query<T: Transport>(&self, session:&mut Session<T>, command:&str) -> Result<String> {
		self.interrupt.check()?;
		session.query(command)
	}

	fn barrier<T: Transport>(&self, session:&mut Session<T>) -> Result<()> {
		self.interrupt.check()?;
		session.wait_complete()
	}

}

/// Final barrier then close.  The session is closed even if the barrier fails; the first
/// failure is the one reported.
pub fn teardown<T: Transport>(session:&mut Session<T>) -> Result<()> {
	if !session.is_open() {
		return Ok(());
	}
	let barrier = session.wait_complete();
	let closed = session.close();
	barrier.and(closed)
}

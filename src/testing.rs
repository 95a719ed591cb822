//! A pretend SDS800X HD and a scripted operator.
//!
//! [`MockScope`] answers the handful of queries the bench uses the way the real scope does:
//! `*OPC?` returns `1`, the measurement source follows the last `SOURce` command and value
//! queries answer from per-source readings (`****` when none is set).  Every command is
//! recorded so tests can assert on ordering.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bench::Operator;
use crate::devices::sds800x::{MeasureItem, SOURCE_QUERY};
use crate::error::{Error, Result};
use crate::session::{Session, SessionConfig, Transport, OPC_QUERY};

const SOURCE_PREFIX:&str = "MEASure:SIMPle:SOURce ";
const VALUE_PREFIX:&str  = "MEASure:SIMPle:VALue? ";

pub const MOCK_RESOURCE:&str = "USB0::0xF4EC::0x1017::MOCK0001::INSTR";

struct MockState {
	writes: Vec<Vec<u8>>,
	pending: VecDeque<String>,
	source: String,
	readings: HashMap<(String, String), String>,
	opc_response: String,
	fail_on: Option<String>,
	opens: usize,
	closes: usize,
}

#[derive(Clone)]
pub struct MockScope {
	state: Arc<Mutex<MockState>>,
}

impl Default for MockScope {
	fn default() -> Self { Self::new() }
}

impl MockScope {

	pub fn new() -> Self {
		let state = MockState {
			writes: vec![],
			pending: VecDeque::new(),
			source: "C1".to_owned(),
			readings: HashMap::new(),
			opc_response: "1".to_owned(),
			fail_on: None,
			opens: 0,
			closes: 0,
		};
		Self{ state: Arc::new(Mutex::new(state)) }
	}

	fn lock(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn with_reading(self, channel:u8, item:MeasureItem, raw:&str) -> Self {
		self.lock().readings.insert((format!("C{}", channel), item.scpi().to_owned()), raw.to_owned());
		self
	}

	pub fn with_opc_response(self, raw:&str) -> Self {
		self.lock().opc_response = raw.to_owned();
		self
	}

	/// Writing exactly `command` fails with a broken-pipe error.
	pub fn fail_on(self, command:&str) -> Self {
		self.lock().fail_on = Some(command.to_owned());
		self
	}

	pub fn transport(&self) -> MockTransport {
		self.lock().opens += 1;
		MockTransport{ scope: self.clone(), closed: false }
	}

	pub fn connect(&self) -> Session<MockTransport> {
		Session::new(self.transport(), MOCK_RESOURCE, SessionConfig::default())
	}

	/// Same shape as `session::open`, for handing to `Sequencer::run`.
	pub fn connector(&self) -> impl FnOnce(&str, SessionConfig) -> Result<Session<MockTransport>> {
		let scope = self.clone();
		move |address, config| Ok(Session::new(scope.transport(), address, config))
	}

	pub fn raw_writes(&self) -> Vec<Vec<u8>> { self.lock().writes.clone() }

	/// Commands as sent, without the write terminator.
	pub fn commands(&self) -> Vec<String> {
		self.lock().writes.iter()
			.map(|w| String::from_utf8_lossy(w).trim_end_matches('\n').to_owned())
			.collect()
	}

	pub fn opens(&self) -> usize { self.lock().opens }
	pub fn closes(&self) -> usize { self.lock().closes }

}

pub struct MockTransport {
	scope: MockScope,
	closed: bool,
}

impl Transport for MockTransport {

	fn write_message(&mut self, data:&[u8]) -> Result<()> {
		let mut state = self.scope.lock();
		state.writes.push(data.to_vec());

		let command = String::from_utf8_lossy(data).trim_end_matches('\n').to_owned();
		if state.fail_on.as_deref() == Some(command.as_str()) {
			return Err(Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "mock scope link dropped")));
		}

		if let Some(source) = command.strip_prefix(SOURCE_PREFIX) {
			state.source = source.trim().to_owned();
		} else if command == OPC_QUERY {
			let r = state.opc_response.clone();
			state.pending.push_back(r);
		} else if command == SOURCE_QUERY {
			let r = state.source.clone();
			state.pending.push_back(r);
		} else if let Some(item) = command.strip_prefix(VALUE_PREFIX) {
			let key = (state.source.clone(), item.trim().to_owned());
			let r = state.readings.get(&key).cloned().unwrap_or_else(|| "****".to_owned());
			state.pending.push_back(r);
		}
		Ok(())
	}

	fn read_message(&mut self, _chunk_size:usize, _term_char:Option<u8>) -> Result<Vec<u8>> {
		match self.scope.lock().pending.pop_front() {
			Some(r) => Ok(format!("{}\n", r).into_bytes()),
			None    => Err(Error::Io(io::Error::new(io::ErrorKind::TimedOut, "mock scope has nothing to say"))),
		}
	}

	fn close(&mut self) -> Result<()> {
		if !self.closed {
			self.closed = true;
			self.scope.lock().closes += 1;
		}
		Ok(())
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
	Confirm,
	Interrupt,
	CloseInput,
}

/// Answers prompts from a script, confirming once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
	steps: VecDeque<Step>,
	pub prompts: Vec<String>,
	pub output: Vec<String>,
}

impl ScriptedOperator {

	pub fn new(steps:Vec<Step>) -> Self {
		Self{ steps: steps.into(), ..Self::default() }
	}

	pub fn confirming() -> Self { Self::default() }

	/// Confirms `n - 1` prompts and interrupts the n-th.
	pub fn interrupting_at(n:usize) -> Self {
		let mut steps = vec![Step::Confirm; n.saturating_sub(1)];
		steps.push(Step::Interrupt);
		Self::new(steps)
	}

	pub fn transcript(&self) -> String { self.output.join("\n") }

}

impl Operator for ScriptedOperator {

	fn confirm(&mut self, prompt:&str) -> Result<()> {
		self.prompts.push(prompt.to_owned());
		match self.steps.pop_front().unwrap_or(Step::Confirm) {
			Step::Confirm    => Ok(()),
			Step::Interrupt  => Err(Error::Interrupted),
			Step::CloseInput => Err(Error::OperatorInputClosed),
		}
	}

	fn show(&mut self, text:&str) {
		self.output.push(text.to_owned());
	}

}

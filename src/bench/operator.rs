//! The human at the bench.
//!
//! The sequencer only talks to the [`Operator`] trait, so a scripted operator can stand in
//! for the console in tests.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};

pub trait Operator {
	/// Shows `prompt` and blocks until the operator acknowledges it.
	fn confirm(&mut self, prompt:&str) -> Result<()>;

	/// Shows a line of output to the operator.
	fn show(&mut self, text:&str);
}

/// Shared flag raised when the operator asks the run to stop.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
	pub fn new() -> Self { Self::default() }

	pub fn raise(&self) { self.0.store(true, Ordering::SeqCst); }

	pub fn is_raised(&self) -> bool { self.0.load(Ordering::SeqCst) }

	pub fn check(&self) -> Result<()> {
		if self.is_raised() { Err(Error::Interrupted) } else { Ok(()) }
	}

	// Raises the flag; reports whether it was already up
	fn escalate(&self) -> Escalation {
		if self.0.swap(true, Ordering::SeqCst) { Escalation::Exit } else { Escalation::Stop }
	}
}

#[derive(Debug, PartialEq)]
enum Escalation {
	// Finish the current step, then tear down
	Stop,
	// The run is stuck, typically on a hung instrument: leave now
	Exit,
}

enum ConsoleEvent {
	Line,
	Eof,
	Interrupt,
}

/// Prompts on stdout and waits on stdin, woken early by Ctrl+C.
pub struct ConsoleOperator {
	events: Receiver<ConsoleEvent>,
	interrupt: Interrupt,
}

impl ConsoleOperator {

	pub fn new(interrupt:Interrupt) -> Result<Self> {
		let (tx, events) = mpsc::channel();
		spawn_stdin_reader(tx.clone())?;
		spawn_interrupt_watcher(tx, interrupt.clone())?;
		Ok(Self::from_events(events, interrupt))
	}

	fn from_events(events:Receiver<ConsoleEvent>, interrupt:Interrupt) -> Self {
		Self{ events, interrupt }
	}

}

impl Operator for ConsoleOperator {

	fn confirm(&mut self, prompt:&str) -> Result<()> {
		self.interrupt.check()?;

		let mut out = io::stdout();
		write!(out, "{}", prompt)?;
		out.flush()?;

		let event = self.events.recv().unwrap_or(ConsoleEvent::Eof);
		// Ctrl+C may land while the line is in flight
		self.interrupt.check()?;
		match event {
			ConsoleEvent::Line      => Ok(()),
			ConsoleEvent::Eof       => Err(Error::OperatorInputClosed),
			ConsoleEvent::Interrupt => Err(Error::Interrupted),
		}
	}

	fn show(&mut self, text:&str) {
		println!("{}", text);
	}

}

fn spawn_stdin_reader(tx:Sender<ConsoleEvent>) -> Result<()> {
	thread::Builder::new().name("stdin".to_owned()).spawn(move || {
		let stdin = io::stdin();
		for line in stdin.lock().lines() {
			match line {
				Ok(_) => if tx.send(ConsoleEvent::Line).is_err() { return; },
				Err(e) => { debug!(error = %e, "stdin read failed"); break; },
			}
		}
		let _ = tx.send(ConsoleEvent::Eof);
	})?;
	Ok(())
}

// Ctrl+C arrives on its own thread running a small current-thread runtime.  The first one
// stops the run gracefully.  A second one exits immediately without closing the session: it is
// the way out when the instrument itself hangs, and the OS releases the USB interface or socket.
fn spawn_interrupt_watcher(tx:Sender<ConsoleEvent>, interrupt:Interrupt) -> Result<()> {
	let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

	thread::Builder::new().name("ctrl-c".to_owned()).spawn(move || {
		rt.block_on(async move {
			loop {
				if let Err(e) = tokio::signal::ctrl_c().await {
					error!(error = %e, "failed to listen for Ctrl+C");
					return;
				}
				match interrupt.escalate() {
					Escalation::Exit => {
						warn!("second interrupt, exiting without cleanup");
						std::process::exit(130);
					},
					Escalation::Stop => {
						warn!("interrupt received, stopping after the current step");
						let _ = tx.send(ConsoleEvent::Interrupt);
					},
				}
			}
		});
	})?;
	Ok(())
}

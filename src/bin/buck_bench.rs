//! buck-bench: step a buck converter through its input voltages and read Vin/Vout back
//! from a Siglent oscilloscope.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use buck_bench::bench::{ConsoleOperator, Interrupt, Outcome, Sequencer, Summary, TestPlan};
use buck_bench::session;
use buck_bench::Result;

#[derive(Parser)]
#[command(name = "buck-bench", about = "Operator-driven buck converter bench test")]
#[command(version, long_about = None)]
struct Cli {
	/// More logging on stderr (-v debug, -vv trace); RUST_LOG wins when set
	#[arg(short, long, action = ArgAction::Count, global = true)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Run the bench test
	Run(RunArgs),
	/// List attached USBTMC instruments and their resource addresses
	List,
}

#[derive(Args)]
struct RunArgs {
	/// TOML test plan; built-in defaults otherwise
	#[arg(long)]
	plan: Option<PathBuf>,

	/// Instrument resource address, e.g. USB0::0xF4EC::0x1017::SDS08A0X802909::INSTR
	#[arg(long)]
	resource: Option<String>,

	/// Input voltages to step through, in order
	#[arg(long, value_delimiter = ',')]
	vin: Vec<f64>,

	/// Instrument I/O timeout in milliseconds
	#[arg(long)]
	timeout_ms: Option<u64>,

	/// Also print each iteration as a JSON object
	#[arg(long)]
	json: bool,
}

fn init_logging(verbose:u8) {
	let level = match verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn load_plan(args:&RunArgs) -> Result<TestPlan> {
	let mut plan = match &args.plan {
		Some(path) => TestPlan::load(path)?,
		None => TestPlan::default(),
	};

	// Command line beats the plan file
	if let Some(resource) = &args.resource { plan.resource = resource.clone(); }
	if !args.vin.is_empty() { plan.vin_levels = args.vin.clone(); }
	if let Some(ms) = args.timeout_ms { plan.session.timeout_ms = ms; }

	plan.validate()?;
	Ok(plan)
}

fn run(args:RunArgs) -> Result<Summary> {
	let plan = load_plan(&args)?;

	let interrupt = Interrupt::new();
	let mut operator = ConsoleOperator::new(interrupt.clone())?;

	Sequencer::new(&plan, &mut operator, interrupt)
		.emit_json(args.json)
		.run(session::open)
}

#[cfg(feature = "usb")]
fn list() -> Result<()> {
	let devices = buck_bench::usbtmc::device::list(std::time::Duration::from_millis(session::DEFAULT_TIMEOUT_MS))?;
	if devices.is_empty() {
		println!("No USBTMC instruments found");
	}
	for d in devices {
		println!("{}\t(bus {:03} device {:03}, interface {})", d.resource(), d.bus, d.address, d.interface);
	}
	Ok(())
}

#[cfg(not(feature = "usb"))]
fn list() -> Result<()> {
	Err(buck_bench::Error::Unsupported("USB".to_owned()))
}

/// Prints the closing lines for a finished command and picks the exit status.  An operator
/// interrupt is a clean stop, only errors exit non-zero.
fn conclude(result:&Result<Option<Summary>>, out:&mut impl Write) -> io::Result<u8> {
	match result {
		Ok(Some(s)) => match s.outcome {
			Outcome::Completed   => writeln!(out, "\nProgram finished successfully")?,
			Outcome::Interrupted => writeln!(out, "\nRun interrupted after {} of {} input levels", s.iterations, s.planned)?,
		},
		Ok(None) => {},
		Err(e) => {
			writeln!(out, "\nError during program run: {}", e)?;
			writeln!(out, "Terminating...")?;
			return Ok(1);
		},
	}
	Ok(0)
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	let result = match cli.command {
		Command::Run(args) => run(args).map(Some),
		Command::List => list().map(|()| None),
	};

	let status = conclude(&result, &mut io::stdout()).unwrap_or(1);
	ExitCode::from(status)
}

//! Whole-run scenarios against the mock scope: command ordering, the three exit paths,
//! and what the operator sees.

use buck_bench::bench::{Interrupt, Operator, Outcome, Sequencer, TestPlan};
use buck_bench::devices::sds800x::MeasureItem;
use buck_bench::session::{Session, SessionConfig};
use buck_bench::testing::{MockScope, MockTransport, ScriptedOperator, Step};
use buck_bench::{Error, Result};

fn plan(levels:&[f64]) -> TestPlan {
	TestPlan{ vin_levels: levels.to_vec(), ..TestPlan::default() }
}

fn board_readings() -> MockScope {
	MockScope::new()
		.with_reading(1, MeasureItem::Max, "12.1")
		.with_reading(1, MeasureItem::Min, "11.9")
		.with_reading(1, MeasureItem::Ampl, "0.2")
		.with_reading(1, MeasureItem::Median, "12.0")
		.with_reading(2, MeasureItem::Max, "5.05")
		.with_reading(2, MeasureItem::Min, "4.95")
		.with_reading(2, MeasureItem::Ampl, "0.1")
		.with_reading(2, MeasureItem::Median, "5.0")
}

fn position(commands:&[String], wanted:&str) -> usize {
	commands.iter().position(|c| c == wanted).unwrap_or_else(|| panic!("{} never sent", wanted))
}

fn channel_block(n:u8) -> Vec<String> {
	vec![
		format!("MEASure:SIMPle:SOURce C{}", n),
		"*OPC?".to_owned(),
		"MEASure:SIMPle:SOURce?".to_owned(),
		"*OPC?".to_owned(),
		"MEASure:SIMPle:VALue? MAX".to_owned(),
		"MEASure:SIMPle:VALue? MIN".to_owned(),
		"MEASure:SIMPle:VALue? AMPL".to_owned(),
		"MEASure:SIMPle:VALue? MEDIAN".to_owned(),
		"*OPC?".to_owned(),
	]
}

#[test]
fn single_level_reports_both_channels() {
	let scope = board_readings();
	let plan = plan(&[12.0]);
	let mut operator = ScriptedOperator::confirming();

	let summary = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector()).unwrap();

	assert_eq!(summary.outcome, Outcome::Completed);
	assert_eq!(summary.iterations, 1);
	assert_eq!(operator.prompts, vec!["Manually change vin to 12 V & press enter"]);

	let transcript = operator.transcript();
	assert!(transcript.contains("current channel: C1"));
	assert!(transcript.contains("Vin:\n\tmax: 12.1\n\tmin: 11.9\n\tampl: 0.2\n\tmed: 12.0"));
	assert!(transcript.contains("current channel: C2"));
	assert!(transcript.contains("Vout:\n\tmax: 5.05\n\tmin: 4.95\n\tampl: 0.1\n\tmed: 5.0"));

	assert_eq!(scope.opens(), 1);
	assert_eq!(scope.closes(), 1);
}

#[test]
fn full_command_trace_for_one_level() {
	let scope = board_readings();
	let plan = plan(&[12.0]);
	let mut operator = ScriptedOperator::confirming();
	Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector()).unwrap();

	let mut expected:Vec<String> = vec!["*OPC?".to_owned()];
	expected.extend(plan.setup_directives().iter().map(|(ch, s)| s.command(*ch)));
	expected.push("*OPC?".to_owned());
	expected.push("MEASure ON".to_owned());
	expected.push("MEASure:SIMPle:CLEar".to_owned());
	for item in &["MAX", "MIN", "AMPL", "MEDIAN", "DUTY"] {
		expected.push(format!("MEASure:SIMPle:ITEM {},ON", item));
	}
	expected.extend(channel_block(1));
	expected.extend(channel_block(2));
	expected.push("*OPC?".to_owned());

	assert_eq!(scope.commands(), expected);
}

#[test]
fn one_prompt_per_level_in_order() {
	for levels in &[vec![], vec![5.0], vec![12.0, 11.0, 5.0, 24.0, 27.0]] {
		let scope = board_readings();
		let plan = plan(levels);
		let mut operator = ScriptedOperator::confirming();

		let summary = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector()).unwrap();

		let expected:Vec<String> = levels.iter().map(|v| format!("Manually change vin to {} V & press enter", v)).collect();
		assert_eq!(operator.prompts, expected);
		assert_eq!(summary.iterations, levels.len());

		let selections = scope.commands().iter().filter(|c| c.as_str() == "MEASure:SIMPle:SOURce C1").count();
		assert_eq!(selections, levels.len());
		assert_eq!((scope.opens(), scope.closes()), (1, 1));
	}
}

#[test]
fn setup_and_barrier_precede_first_source_selection() {
	let scope = board_readings();
	let plan = plan(&[12.0, 5.0]);
	let mut operator = ScriptedOperator::confirming();
	Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector()).unwrap();

	let commands = scope.commands();
	let first_select = position(&commands, "MEASure:SIMPle:SOURce C1");
	let last_setup = position(&commands, "CHANnel2:LABel:TEXT \"Vout\"");

	for n in 1..=2 {
		for setting in &["COUPling DC", "PROBe VALue,1.00E+0", "SWITch ON", "VISible ON", "LABel ON"] {
			assert!(position(&commands, &format!("CHANnel{}:{}", n, setting)) < first_select);
		}
	}
	assert_eq!(commands[last_setup + 1], "*OPC?");
	assert!(last_setup + 1 < first_select);
}

#[test]
fn each_channel_is_selected_before_its_values_are_read() {
	let scope = board_readings();
	let plan = plan(&[12.0, 11.0, 5.0]);
	let mut operator = ScriptedOperator::confirming();
	Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector()).unwrap();

	let commands = scope.commands();
	let first_select = position(&commands, "MEASure:SIMPle:SOURce C1");
	let loop_commands = &commands[first_select..commands.len() - 1];

	let mut expected = vec![];
	for _ in 0..3 {
		expected.extend(channel_block(1));
		expected.extend(channel_block(2));
	}
	assert_eq!(loop_commands.to_vec(), expected);
}

#[test]
fn open_failure_sends_nothing() {
	let scope = MockScope::new();
	let plan = plan(&[12.0]);
	let mut operator = ScriptedOperator::confirming();

	let failing = |_:&str, _:SessionConfig| -> Result<Session<MockTransport>> {
		Err(Error::NotFound{ vendor_id: 0xF4EC, product_id: 0x1017, serial: None })
	};
	let result = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(failing);

	assert!(matches!(result, Err(Error::NotFound{ .. })));
	assert!(scope.commands().is_empty());
	assert!(operator.prompts.is_empty());
	assert_eq!(scope.opens(), 0);
}

#[test]
fn interrupt_at_second_prompt_stops_cleanly() {
	let scope = board_readings();
	let plan = plan(&[12.0, 11.0, 5.0, 24.0, 27.0]);
	let mut operator = ScriptedOperator::interrupting_at(2);

	let summary = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector()).unwrap();

	assert_eq!(summary.outcome, Outcome::Interrupted);
	assert_eq!(summary.iterations, 1);
	assert_eq!(operator.prompts.len(), 2);

	let commands = scope.commands();
	assert_eq!(commands.iter().filter(|c| c.as_str() == "MEASure:SIMPle:SOURce C1").count(), 1);
	assert_eq!(commands.last().map(|c| c.as_str()), Some("*OPC?"));
	assert_eq!((scope.opens(), scope.closes()), (1, 1));
}

#[test]
fn interrupt_flag_stops_before_the_next_instrument_command() {
	let scope = board_readings();
	let plan = plan(&[12.0, 11.0]);
	let interrupt = Interrupt::new();
	interrupt.raise();
	let mut operator = ScriptedOperator::confirming();

	let summary = Sequencer::new(&plan, &mut operator, interrupt).run(scope.connector()).unwrap();

	assert_eq!(summary.outcome, Outcome::Interrupted);
	assert_eq!(scope.opens(), 0);
	assert!(scope.commands().is_empty());
}

// Raises the interrupt as soon as a given line is shown, like Ctrl+C landing mid-capture
struct InterruptOnLine {
	inner: ScriptedOperator,
	line: &'static str,
	interrupt: Interrupt,
}

impl Operator for InterruptOnLine {
	fn confirm(&mut self, prompt:&str) -> Result<()> { self.inner.confirm(prompt) }

	fn show(&mut self, text:&str) {
		if text == self.line {
			self.interrupt.raise();
		}
		self.inner.show(text);
	}
}

#[test]
fn interrupt_during_capture_stops_before_the_next_command() {
	let scope = board_readings();
	let plan = plan(&[12.0, 11.0]);
	let interrupt = Interrupt::new();
	let mut operator = InterruptOnLine{ inner: ScriptedOperator::confirming(), line: "current channel: C1", interrupt: interrupt.clone() };

	let summary = Sequencer::new(&plan, &mut operator, interrupt).run(scope.connector()).unwrap();

	assert_eq!(summary.outcome, Outcome::Interrupted);
	assert_eq!(summary.iterations, 0);
	assert_eq!(summary.planned, 2);
	assert_eq!(operator.inner.prompts.len(), 1);

	let commands = scope.commands();
	let tail:Vec<&str> = commands[commands.len() - 4..].iter().map(|c| c.as_str()).collect();
	// Select, barrier, echo, then straight to the teardown barrier
	assert_eq!(tail, vec!["MEASure:SIMPle:SOURce C1", "*OPC?", "MEASure:SIMPle:SOURce?", "*OPC?"]);
	assert!(!commands.iter().any(|c| c.starts_with("MEASure:SIMPle:VALue?")));
	assert!(!operator.inner.transcript().contains("Vin:"));
	assert_eq!((scope.opens(), scope.closes()), (1, 1));
}

#[test]
fn instrument_failure_still_closes_the_session() {
	let scope = board_readings().fail_on("MEASure:SIMPle:VALue? AMPL");
	let plan = plan(&[12.0, 11.0]);
	let mut operator = ScriptedOperator::confirming();

	let result = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector());

	assert!(matches!(result, Err(Error::Io(_))));
	assert_eq!(operator.prompts.len(), 1);
	assert_eq!(scope.commands().last().map(|c| c.as_str()), Some("*OPC?"));
	assert_eq!((scope.opens(), scope.closes()), (1, 1));
}

#[test]
fn failed_barrier_aborts_setup_and_closes() {
	let scope = board_readings().with_opc_response("0");
	let plan = plan(&[12.0]);
	let mut operator = ScriptedOperator::confirming();

	let result = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector());

	assert!(matches!(result, Err(Error::Instrument{ .. })));
	assert!(!scope.commands().iter().any(|c| c.starts_with("CHANnel")));
	assert_eq!(scope.closes(), 1);
}

#[test]
fn closed_operator_input_is_an_error() {
	let scope = board_readings();
	let plan = plan(&[12.0, 11.0]);
	let mut operator = ScriptedOperator::new(vec![Step::Confirm, Step::CloseInput]);

	let result = Sequencer::new(&plan, &mut operator, Interrupt::new()).run(scope.connector());

	assert!(matches!(result, Err(Error::OperatorInputClosed)));
	assert_eq!((scope.opens(), scope.closes()), (1, 1));
}

#[test]
fn json_lines_follow_each_iteration() {
	let scope = board_readings();
	let plan = plan(&[12.0, 24.0]);
	let mut operator = ScriptedOperator::confirming();

	Sequencer::new(&plan, &mut operator, Interrupt::new()).emit_json(true).run(scope.connector()).unwrap();

	let json:Vec<serde_json::Value> = operator.output.iter()
		.filter(|l| l.starts_with('{'))
		.map(|l| serde_json::from_str(l).unwrap())
		.collect();
	assert_eq!(json.len(), 2);
	assert_eq!(json[1]["vin"], 24.0);
	assert_eq!(json[1]["channels"][1]["label"], "Vout");
	assert_eq!(json[1]["channels"][1]["readings"][0]["value"], 5.05);
}

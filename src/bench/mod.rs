//! Operator-driven buck converter test.

pub mod operator;
pub mod plan;
pub mod report;
pub mod sequencer;

pub use operator::{ConsoleOperator, Interrupt, Operator};
pub use plan::{ChannelPlan, TestPlan};
pub use report::{ChannelReading, IterationReport, Reading};
pub use sequencer::{teardown, Outcome, Sequencer, Summary};

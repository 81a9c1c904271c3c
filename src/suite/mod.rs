pub mod classes;
pub mod context;
pub mod report;
pub mod runner;

pub use context::{Suite, SuiteContext};
pub use report::{RunReport, TestOutcome};
pub use runner::{ConformanceTest, Runner};

pub mod domain;
pub mod engine;
pub mod harness;
pub mod mock;
pub mod probes;
pub mod report;

pub mod boolexpr;
pub mod cli;
pub mod config;
pub mod directive;
pub mod discovery;
pub mod report;
pub mod runtest;
pub mod sched;
pub mod shell;
pub mod testcase;

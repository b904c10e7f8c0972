pub mod config_cmd;
pub mod executions;
pub mod remote;
pub mod run;
pub mod tools;

pub mod config;
pub mod flow;
pub mod rules;
pub mod runner;
pub mod state;

pub use config::RuntimeConfig;
pub use flow::{Flow, FlowBuilder};
pub use rules::{RuleDriven, RuleOperator};
pub use runner::{NodeRunner, StopReason};
pub use state::FlowState;

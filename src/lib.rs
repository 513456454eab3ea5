pub mod build;
pub mod catalog;
pub mod cli;
pub mod command;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod load_config;
pub mod publish;
pub mod version;
pub mod workflow;

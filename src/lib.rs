pub mod cli;
pub mod config;
pub mod fetch;
pub mod sink;

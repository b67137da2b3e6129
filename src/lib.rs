pub mod bus;
pub mod codec;
pub mod collectors;
pub mod config;
pub mod cpu;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod parsers;
pub mod provider;
pub mod synthetic;

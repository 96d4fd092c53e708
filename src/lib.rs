#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod colony;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod logistics;
pub mod output;
pub mod sim;
pub mod task;
pub mod world;

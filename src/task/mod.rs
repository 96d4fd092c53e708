#![forbid(unsafe_code)]

pub mod engine;
pub mod fsm;
pub mod model;
pub mod registry;
pub mod storage;

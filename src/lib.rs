#![deny(dead_code)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod output;
pub mod pipeline;

#[path = "../shared/config.rs"]
pub mod config;

#[path = "../panel/mod.rs"]
pub mod panel;

#[path = "../backtest/mod.rs"]
pub mod backtest;

#[path = "../sources/mod.rs"]
pub mod sources;

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;
mod helpers;
#[macro_use]
pub mod generator;

pub use fixtures::HostFixture;
pub use helpers::{Host, env_map, init_tracing};

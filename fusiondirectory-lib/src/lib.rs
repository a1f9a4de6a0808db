#![deny(warnings)]
#![deny(clippy::all)]
#![cfg_attr(test, allow(dead_code, non_snake_case))]
pub mod api;
pub mod attributes;
pub mod config;
pub mod dao;
pub mod datasets;
pub mod error;
pub mod search;
pub mod service;
pub mod session;
#[cfg(test)]
mod test_util;
pub mod transport;
pub mod worker;

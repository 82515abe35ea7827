//! Core session management for the clawirc IRC connector.
//!
//! This crate is protocol-library agnostic. The IRC connection and the relay
//! HTTP client live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod ports;
pub mod reconnect;
pub mod records;
pub mod relay;
pub mod session;

pub use errors::{Error, Result};

//! splicecast library crate
//!
//! Live broadcast engine: one paced audio source fanned out to every
//! connected listener, with sound effects spliced into the live stream.
//! The server binary is in main.rs.

#[macro_use]
extern crate log;

pub mod broadcaster;
pub mod commands;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod mixer;
pub mod net;
pub mod pacer;
pub mod probe;
pub mod registry;
pub mod station;
pub mod stdin;

pub use error::{CommandError, CommandResult};
pub use station::Station;

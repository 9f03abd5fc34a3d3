//! `legacy-pi`: an emulator of the legacy π estimator.
//!
//! # Architecture
//!
//! ```text
//!   client ──TCP connect──▶ ┌──────────────┐
//!                           │    server    │──delay──▶ NoiseModel::render ──▶ reply
//!   client ──UDP datagram─▶ └──────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`noise`]: perturbation and single-character corruption of the payload
//! - [`server`]: TCP and UDP listeners sharing one port

pub mod noise;
pub mod server;

pub use noise::NoiseModel;
pub use server::{start, EmulatorConfig, EmulatorError, EmulatorHandle, DEFAULT_PORT};

//! Simulated motor control for a two-motor differential drive base.
//!
//! A [`hub::Hub`] hands out [`motor::Motor`] handles on ports; two of them
//! make a [`robotics::DriveBase`]. Every motor and both drive base loops carry
//! a [`logger::Log`] that can be saved to a text file.

pub mod config;
pub mod control;
pub mod error;
pub mod hub;
pub mod logger;
pub mod messages;
pub mod motor;
pub mod parameters;
pub mod robotics;
pub mod runtime;

pub use error::{Error, Result};

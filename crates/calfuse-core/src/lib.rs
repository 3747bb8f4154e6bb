//! Shared configuration, constants, and error types for calfuse.

pub mod config;
pub mod constants;

//! Domain models for the domains service

pub mod binding;
pub mod common;

pub use binding::*;
pub use common::*;

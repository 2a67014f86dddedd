//! Business logic layer

pub mod binding;
pub mod sweep;

pub use binding::BindingService;
pub use sweep::VerificationSweep;

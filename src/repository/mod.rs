//! Data access layer (Repository pattern)

pub mod binding;

pub use binding::DomainBindingRepository;

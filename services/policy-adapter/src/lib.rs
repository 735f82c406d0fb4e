//! Policy adapter service library crate.
//!
//! # Purpose
//! Binds tenant authorization models to per-tenant rule tables through Casbin,
//! and manages the adapter configurations and model definitions that describe
//! those bindings.
//!
//! # Notes
//! `service::PolicyAdapterService` is the entry point; the `policy` and
//! `store` modules are public for embedding servers and tests.
pub mod config;
pub mod model;
pub mod observability;
pub mod policy;
pub mod service;
pub mod store;

pub use service::PolicyAdapterService;

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Core library for the private module-registry server.
//!
//! This crate holds the git-backed content source, the module view, the
//! commit identity/cache layer, the dependency graph resolver, and the RPC
//! façade that exposes all of the above to the CLI. Codegen plugins and
//! TLS/HTTP2 termination are left to a front-end proxy and are not modeled
//! here.

pub mod catalogue;
pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod graph;
pub mod identity;
pub mod lockfile;
pub mod module_view;
pub mod remote;
pub mod repository;
pub mod rpc;

pub use catalogue::Catalogue;
pub use config::RegistryConfig;
pub use context::RequestContext;
pub use error::RegistryError;

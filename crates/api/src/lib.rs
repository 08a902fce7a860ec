#![deny(missing_docs)]
//! Meshsync API contains the validated wire types of the fetch protocol,
//! the collaborator traits the fetch and sync machinery is built against,
//! and the error and configuration types shared by both.
//!
//! If you want the fetch and sync machinery itself, please see the
//! meshsync_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod config;

mod error;
pub use error::*;

pub mod id;
pub use id::*;

pub mod proto;

pub mod wire;
pub use wire::*;

mod mesh_hash;
pub use mesh_hash::*;

mod opinion;
pub use opinion::*;

pub mod store;
pub use store::*;

pub mod transport;
pub use transport::*;

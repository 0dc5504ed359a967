//! Cistern Core - shared abstractions for the cistern connection pool
//!
//! This crate provides the traits and types that the pooling crate and
//! driver implementations share:
//!
//! - [`Connection`] - trait for raw database connections
//! - [`Connector`] - trait for opening new connections on demand
//! - [`CisternError`] / [`Result`] - common error taxonomy
//! - [`Value`], [`Row`], [`QueryResult`] - statement parameter and result types

mod connection;
mod connector;
mod error;
mod types;

pub use connection::*;
pub use connector::*;
pub use error::*;
pub use types::*;

//! Cistern Pool - bounded connection pooling with lease tracking
//!
//! This crate provides a connection pool over any [`cistern_core::Connector`]:
//! eager minimum sizing, on-demand growth to a maximum, idle expiration,
//! lease-count retirement, automatic rollback of uncommitted work on release,
//! and detailed statistics.
//!
//! # Example
//!
//! ```ignore
//! use cistern_core::{Connection, Value};
//! use cistern_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10)
//!     .with_expire_after_ms(30_000)
//!     .with_retire_limit(1_000);
//!
//! let pool = Pool::new(config, connector).await?;
//!
//! let conn = pool.acquire().await?;
//! conn.execute("INSERT INTO t (id) VALUES (?)", &[Value::Int64(1)]).await?;
//! conn.commit().await?;
//! conn.close().await?;
//!
//! println!("{:?}", pool.stats());
//! pool.shutdown().await;
//! ```

mod config;
mod lease;
mod pool;
mod stats;
mod sweeper;


pub use config::PoolConfig;
pub use lease::PooledConnection;
pub use pool::Pool;
pub use stats::PoolStats;

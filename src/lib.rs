//! Socket front end for matrix multiplication.
//!
//! Clients send length-prefixed [`MulRequest`](matmul_types::wire::MulRequest)
//! frames over TCP and get one
//! [`MulResponse`](matmul_types::wire::MulResponse) back per request. Each
//! request names its backend: `naive`, `transposed` (also `smart`), or
//! `pipes` for the multi-process worker pool. Responses report the user,
//! system and wall time the backend took.

pub mod backend;
pub mod client;
pub mod config;
mod error;
pub mod frame;
pub mod server;
pub mod timing;

pub use client::MatmulClient;
pub use config::Config;
pub use error::Error;
pub use server::Server;

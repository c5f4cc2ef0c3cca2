//! Types shared by the matmul crates.
//!
//! - [`Matrix`]: a dense, row-major matrix of [`Element`]s.
//! - [`Strategy`]: in-process multiplication routines, resolvable by name.
//! - [`wire`]: prost messages and length-prefixed framing used by the
//!   socket server and client.

mod error;
mod matrix;
pub mod wire;

pub use error::Error;
pub use matrix::{Element, Matrix, Strategy};

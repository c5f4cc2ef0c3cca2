//! Matrix multiplication over a pool of worker processes.
//!
//! `matrix-mul` forks a fixed set of workers once and reuses them for any
//! number of multiplications. The pool talks to each worker over two
//! anonymous pipes and never shares memory with it.
//!
//! # Protocol
//!
//! - **Spawn**: each worker claims its pipe ends, closes everything else it
//!   inherited and acknowledges with its pid.
//! - **Dispatch**: row `i` of the product goes to worker `(i + 1) % W`. For
//!   every cell of the row the pool writes a term count followed by the
//!   multiplicand/multiplier pairs of the dot product.
//! - **Collect**: each worker answers with one sum per cell. Answers are
//!   read in dispatch order, so the trace is deterministic.
//! - **Teardown**: the pool closes its pipe ends and reaps every worker.
//!
//! # Example
//!
//! ```no_run
//! use matrix_mul::{Matrix, MatrixMul};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pool = MatrixMul::new(4)?;
//!
//!     let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]])?;
//!     let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]])?;
//!     let mut c = Matrix::zeros(2, 2);
//!     pool.mul(&a, &b, &mut c)?;
//!     assert_eq!(c.to_rows(), vec![vec![19, 22], vec![43, 50]]);
//!
//!     pool.free()?;
//!     Ok(())
//! }
//! ```

mod channel;
mod error;
mod matrix_mul;
mod schedule;
mod worker;

pub use error::{ChannelFailure, Error};
pub use matmul_types::{Element, Matrix};
pub use matrix_mul::{MatrixMul, State};
pub use schedule::{Cell, Schedule, worker_for_row};

//! Multiplication backends a request can name.

use matmul_types::{Matrix, Strategy};
use matrix_mul::MatrixMul;
use tracing::{debug, warn};

use crate::Error;

/// Name of the backend that runs on the pipe worker pool.
pub const PIPES: &str = "pipes";

/// Something that multiplies matrices. Called from a blocking thread.
pub trait Backend: Send {
    fn name(&self) -> &str;

    fn multiply(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix, Error>;
}

/// Resolves a backend by name: `pipes`, or any name [`Strategy::by_name`]
/// accepts.
pub fn resolve(name: &str, workers: usize) -> Result<Box<dyn Backend>, Error> {
    if name == PIPES {
        return Ok(Box::new(Pipes::new(workers)));
    }
    Ok(Box::new(Local(Strategy::by_name(name)?)))
}

/// Multiplies in the calling thread.
pub struct Local(pub Strategy);

impl Backend for Local {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn multiply(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix, Error> {
        Ok(self.0.multiply(a, b)?)
    }
}

/// Multiplies on a worker pool created on first use. A pool that failed is
/// freed and replaced by a fresh one on the next call.
pub struct Pipes {
    workers: usize,
    pool: Option<MatrixMul>,
}

impl Pipes {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            pool: None,
        }
    }
}

impl Backend for Pipes {
    fn name(&self) -> &str {
        PIPES
    }

    fn multiply(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix, Error> {
        let mut pool = match self.pool.take() {
            Some(pool) => pool,
            None => {
                debug!(workers = self.workers, "starting worker pool");
                MatrixMul::new(self.workers)?
            }
        };

        match pool.multiply(a, b) {
            Ok(c) => {
                self.pool = Some(pool);
                Ok(c)
            }
            Err(e) if !e.is_fatal() => {
                self.pool = Some(pool);
                Err(e.into())
            }
            Err(e) => {
                if let Err(free_err) = pool.free() {
                    warn!(error = %free_err, "failed to free broken worker pool");
                }
                Err(e.into())
            }
        }
    }
}

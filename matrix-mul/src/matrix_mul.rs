//! The worker pool and the multiplication driver.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use matmul_types::{Element, Matrix};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{debug, error, info, warn};

use crate::channel::{self, RequestChannel, ResponseChannel};
use crate::error::{ChannelFailure, Error};
use crate::schedule::{Cell, Schedule};
use crate::worker;

/// Cells a worker may have outstanding before the driver stops sending it
/// more and collects answers first. Keeps each response pipe far below its
/// capacity so neither side can block on the other forever.
const MAX_PENDING_CELLS: usize = 1024;

/// Held from opening a worker's pipes until the parent has dropped the
/// worker's ends, so no fork on another thread copies them in between.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Where a pool is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Ready for multiplications.
    Healthy,
    /// A multiplication failed; the pool may only be freed.
    NeedsCleanup,
    /// Freed. Every worker has been reaped.
    Destroyed,
}

/// A worker process and the pool's ends of its channels.
struct Worker {
    index: usize,
    pid: Pid,
    request: RequestChannel,
    response: ResponseChannel,
}

impl Worker {
    fn channel_error(&self, op: &'static str, failure: ChannelFailure) -> Error {
        Error::Channel {
            op,
            worker: self.index,
            pid: self.pid.as_raw(),
            failure,
        }
    }

    fn send_cell(&mut self, a_row: &[Element], b: &Matrix, col: usize) -> Result<(), Error> {
        self.request
            .send_cell(a_row, b, col)
            .map_err(|e| self.channel_error("write", e.into()))
    }

    fn recv_sum(&mut self) -> Result<Element, Error> {
        self.response
            .recv_value()
            .map_err(|e| self.channel_error("read", e.into()))
    }

    /// Waits for the pid a new worker reports once it owns its ends.
    fn recv_ack(&mut self) -> Result<(), Error> {
        let pid = self
            .response
            .recv_value()
            .map_err(|e| self.channel_error("handshake", e.into()))?;
        if pid != self.pid.as_raw() {
            return Err(self.channel_error("handshake", ChannelFailure::BadAck(pid)));
        }
        Ok(())
    }
}

/// A pool of worker processes that multiplies matrices over anonymous pipes.
///
/// Each worker is a forked process connected by a request pipe (cells in)
/// and a response pipe (dot products out). Rows of the product are dealt to
/// workers round robin, starting at worker 1. The pool is created once,
/// reused for any number of multiplications and freed once.
///
/// # Failure model
///
/// Any channel failure during [`mul`](Self::mul) leaves the pool in
/// [`State::NeedsCleanup`]: the error is returned, further multiplications
/// are refused, and the caller is expected to [`free`](Self::free) it.
///
/// # Example
///
/// ```no_run
/// use matrix_mul::{Matrix, MatrixMul};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut pool = MatrixMul::with_trace(2, std::io::stdout())?;
///
///     let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]])?;
///     let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]])?;
///     let c = pool.multiply(&a, &b)?;
///     assert_eq!(c.to_rows(), vec![vec![19, 22], vec![43, 50]]);
///
///     pool.free()?;
///     Ok(())
/// }
/// ```
pub struct MatrixMul {
    workers: Vec<Worker>,
    trace: Option<Box<dyn Write + Send>>,
    state: State,
}

impl MatrixMul {
    /// Spawns a pool of `workers` processes without tracing.
    pub fn new(workers: usize) -> Result<Self, Error> {
        Self::spawn(workers, None)
    }

    /// Spawns a pool of `workers` processes. Every computed cell is logged
    /// to `trace` as `INDEX[PID]: [I]x[J] = Z`.
    pub fn with_trace<W>(workers: usize, trace: W) -> Result<Self, Error>
    where
        W: Write + Send + 'static,
    {
        Self::spawn(workers, Some(Box::new(trace)))
    }

    fn spawn(workers: usize, trace: Option<Box<dyn Write + Send>>) -> Result<Self, Error> {
        if workers == 0 {
            return Err(Error::Misuse("worker count must be positive"));
        }

        let mut pool = Self {
            workers: Vec::with_capacity(workers),
            trace,
            state: State::Healthy,
        };

        for index in 0..workers {
            if let Err(e) = pool.spawn_worker(index) {
                error!(index, error = %e, "failed to start worker, tearing down pool");
                pool.state = State::NeedsCleanup;
                if let Err(free_err) = pool.free() {
                    warn!(error = %free_err, "teardown of partial pool failed");
                }
                return Err(e);
            }
        }

        info!(workers, traced = pool.trace.is_some(), "worker pool ready");
        Ok(pool)
    }

    /// Forks worker `index` and waits for it to acknowledge before
    /// returning, so no cell is sent to a half-initialized worker.
    fn spawn_worker(&mut self, index: usize) -> Result<(), Error> {
        let guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let (pool_ends, worker_ends) = channel::open_pair()?;
        let highest_fd = worker::highest_open_fd();

        // SAFETY: the child only closes descriptors, reads and writes its
        // pipes and leaves through `_exit`; it never allocates or returns.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                drop(pool_ends);
                worker::run(worker_ends, highest_fd)
            }
            Ok(ForkResult::Parent { child }) => {
                drop(worker_ends);
                drop(guard);
                let mut worker = Worker {
                    index,
                    pid: child,
                    request: RequestChannel::new(pool_ends.request),
                    response: ResponseChannel::new(pool_ends.response),
                };
                let ack = worker.recv_ack();
                self.workers.push(worker);
                ack?;
                debug!(index, pid = child.as_raw(), "worker started");
                Ok(())
            }
            Err(source) => Err(Error::Resource { op: "fork", source }),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Pids of the workers, indexed by worker index.
    pub fn worker_pids(&self) -> Vec<i32> {
        self.workers.iter().map(|w| w.pid.as_raw()).collect()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// Sets `out` to `a × b`.
    ///
    /// `a` is n1×n2, `b` is n2×n3 and `out` must already be n1×n3. Every
    /// dot product is computed by a worker process.
    pub fn mul(&mut self, a: &Matrix, b: &Matrix, out: &mut Matrix) -> Result<(), Error> {
        self.check_ready()?;
        check_dims(a, b, out.dims())?;

        let (n1, n2) = a.dims();
        let n3 = b.cols();
        debug!(n1, n2, n3, workers = self.workers.len(), "multiplying");
        let result = self.dispatch(a, b, out);
        if let Err(e) = &result {
            error!(error = %e, "multiplication failed, pool needs cleanup");
            self.state = State::NeedsCleanup;
        }
        result
    }

    /// Convenience wrapper around [`mul`](Self::mul) that allocates the
    /// product.
    pub fn multiply(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix, Error> {
        self.check_ready()?;
        check_dims(a, b, (a.rows(), b.cols()))?;
        let mut out = Matrix::zeros(a.rows(), b.cols());
        self.mul(a, b, &mut out)?;
        Ok(out)
    }

    fn check_ready(&self) -> Result<(), Error> {
        match self.state {
            State::Healthy => Ok(()),
            State::NeedsCleanup => Err(Error::Misuse(
                "pool must be freed after a failed multiplication",
            )),
            State::Destroyed => Err(Error::Misuse("pool has been freed")),
        }
    }

    /// Streams every cell to its worker and collects the answers in the
    /// same order they were sent.
    fn dispatch(&mut self, a: &Matrix, b: &Matrix, out: &mut Matrix) -> Result<(), Error> {
        let schedule = Schedule::new(a.rows(), b.cols(), self.workers.len());
        let mut pending: VecDeque<Cell> = VecDeque::with_capacity(schedule.len());
        let mut in_flight = vec![0usize; self.workers.len()];

        for cell in schedule {
            while in_flight[cell.worker] >= MAX_PENDING_CELLS {
                let Some(oldest) = pending.pop_front() else {
                    break;
                };
                self.collect(oldest, out)?;
                in_flight[oldest.worker] -= 1;
            }
            self.workers[cell.worker].send_cell(a.row(cell.row), b, cell.col)?;
            in_flight[cell.worker] += 1;
            pending.push_back(cell);
        }

        while let Some(cell) = pending.pop_front() {
            self.collect(cell, out)?;
        }

        if let Some(trace) = self.trace.as_mut() {
            trace.flush().map_err(Error::Trace)?;
        }
        Ok(())
    }

    /// Reads the answer for `cell` from its worker into `out`.
    fn collect(&mut self, cell: Cell, out: &mut Matrix) -> Result<(), Error> {
        let worker = &mut self.workers[cell.worker];
        let sum = worker.recv_sum()?;
        out[(cell.row, cell.col)] = sum;

        if let Some(trace) = self.trace.as_mut() {
            writeln!(
                trace,
                "{}[{}]: [{}]x[{}] = {}",
                cell.worker, worker.pid, cell.row, cell.col, sum
            )
            .map_err(Error::Trace)?;
        }
        Ok(())
    }

    /// Releases the pool: closes every channel, stops and reaps every
    /// worker. Freeing an already freed pool is a misuse error.
    pub fn free(&mut self) -> Result<(), Error> {
        if self.state == State::Destroyed {
            return Err(Error::Misuse("pool has already been freed"));
        }
        let needed_cleanup = self.state == State::NeedsCleanup;
        self.state = State::Destroyed;

        let workers = std::mem::take(&mut self.workers);
        let mut pids = Vec::with_capacity(workers.len());
        for worker in workers {
            pids.push(worker.pid);
            worker.request.close();
        }

        // Closing the request pipe is enough for a worker nobody else
        // holds a copy of; a kill covers the rest.
        for &pid in &pids {
            match kill(pid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid = pid.as_raw(), error = %e, "failed to signal worker"),
            }
        }

        let mut result = Ok(());
        for &pid in &pids {
            if let Err(e) = reap(pid) {
                warn!(pid = pid.as_raw(), error = %e, "failed to reap worker");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if let Some(mut trace) = self.trace.take() {
            if let Err(e) = trace.flush() {
                warn!(error = %e, "failed to flush trace");
            }
        }

        info!(workers = pids.len(), needed_cleanup, "worker pool freed");
        result
    }
}

impl Drop for MatrixMul {
    fn drop(&mut self) {
        if self.state != State::Destroyed {
            if let Err(e) = self.free() {
                warn!(error = %e, "failed to free worker pool on drop");
            }
        }
    }
}

/// Checks that `a` × `b` fits an `out` of `out_dims` and that no dimension
/// is zero.
fn check_dims(a: &Matrix, b: &Matrix, out_dims: (usize, usize)) -> Result<(), Error> {
    let (n1, n2) = a.dims();
    let (b_rows, n3) = b.dims();
    let (c_rows, c_cols) = out_dims;
    if n2 != b_rows || c_rows != n1 || c_cols != n3 {
        return Err(Error::DimensionMismatch(
            n1, n2, b_rows, n3, c_rows, c_cols,
        ));
    }
    if n1 == 0 || n2 == 0 || n3 == 0 {
        return Err(Error::EmptyMatrix);
    }
    Ok(())
}

/// Blocks until `pid` has exited and been reaped.
fn reap(pid: Pid) -> Result<(), Error> {
    loop {
        match waitpid(pid, None) {
            Ok(_) | Err(Errno::ECHILD) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(source) => return Err(Error::Resource { op: "waitpid", source }),
        }
    }
}

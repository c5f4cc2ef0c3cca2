//! Pipe channels between the pool and one worker.
//!
//! Each worker is connected by two unidirectional pipes. The request pipe
//! carries cells from the pool to the worker:
//!
//! ```text
//! [terms: u32][a_0: i32][b_0: i32] ... [a_{n-1}: i32][b_{n-1}: i32]
//! ```
//!
//! and the response pipe carries one `i32` sum per cell back. The very
//! first value on a response pipe is the worker's pid, written once the
//! worker has claimed its ends. All values are native-endian since both
//! sides run on the same host.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::mem::size_of;

use matmul_types::{Element, Matrix};
use nix::unistd::pipe;

use crate::Error;

pub(crate) const VALUE_LEN: usize = size_of::<Element>();
pub(crate) const HEADER_LEN: usize = size_of::<u32>();
pub(crate) const TERM_LEN: usize = 2 * VALUE_LEN;

/// The ends of a channel pair kept by the pool.
pub(crate) struct PoolEnds {
    pub request: File,
    pub response: File,
}

/// The ends of a channel pair kept by the worker.
pub(crate) struct WorkerEnds {
    pub request: File,
    pub response: File,
}

/// Opens the request and response pipes for one worker and splits them by
/// owner. Each side drops the half it does not use right after `fork`.
pub(crate) fn open_pair() -> Result<(PoolEnds, WorkerEnds), Error> {
    let (request_read, request_write) =
        pipe().map_err(|source| Error::Resource { op: "pipe", source })?;
    let (response_read, response_write) =
        pipe().map_err(|source| Error::Resource { op: "pipe", source })?;

    let pool = PoolEnds {
        request: File::from(request_write),
        response: File::from(response_read),
    };
    let worker = WorkerEnds {
        request: File::from(request_read),
        response: File::from(response_write),
    };
    Ok((pool, worker))
}

/// Writing half of a request pipe.
pub(crate) struct RequestChannel {
    inner: BufWriter<File>,
}

impl RequestChannel {
    pub fn new(file: File) -> Self {
        Self {
            inner: BufWriter::new(file),
        }
    }

    /// Sends the dot-product terms of `a_row` and column `col` of `b`.
    /// The cell is flushed as a unit; the worker cannot answer before it
    /// has every term.
    pub fn send_cell(&mut self, a_row: &[Element], b: &Matrix, col: usize) -> io::Result<()> {
        self.inner.write_all(&term_count(a_row.len())?.to_ne_bytes())?;
        for (k, &multiplicand) in a_row.iter().enumerate() {
            write_value(&mut self.inner, multiplicand)?;
            write_value(&mut self.inner, b[(k, col)])?;
        }
        self.inner.flush()
    }

    /// Closes the pipe, discarding anything still buffered. A worker that
    /// stopped reading must not be able to block teardown.
    pub fn close(self) {
        let (file, _unflushed) = self.inner.into_parts();
        drop(file);
    }
}

/// Reading half of a response pipe.
pub(crate) struct ResponseChannel {
    inner: BufReader<File>,
}

impl ResponseChannel {
    pub fn new(file: File) -> Self {
        Self {
            inner: BufReader::new(file),
        }
    }

    pub fn recv_value(&mut self) -> io::Result<Element> {
        read_value(&mut self.inner)
    }
}

/// Converts a row length to the header's term count.
pub(crate) fn term_count(terms: usize) -> io::Result<u32> {
    u32::try_from(terms).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("row of {} terms does not fit a cell header", terms),
        )
    })
}

pub(crate) fn write_value(w: &mut impl Write, value: Element) -> io::Result<()> {
    w.write_all(&value.to_ne_bytes())
}

pub(crate) fn read_value(r: &mut impl Read) -> io::Result<Element> {
    let mut buf = [0u8; VALUE_LEN];
    r.read_exact(&mut buf)?;
    Ok(Element::from_ne_bytes(buf))
}

/// Decodes one element from exactly [`VALUE_LEN`] bytes.
pub(crate) fn element(bytes: &[u8]) -> Element {
    let mut raw = [0u8; VALUE_LEN];
    raw.copy_from_slice(bytes);
    Element::from_ne_bytes(raw)
}

/// Reads a cell header. `Ok(None)` means the pool closed the channel
/// between cells.
pub(crate) fn read_header(r: &mut impl Read) -> io::Result<Option<u32>> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(u32::from_ne_bytes(buf)))
}

//! The service loop run inside each worker process.
//!
//! A worker is forked from a process that may have other threads, so
//! everything here sticks to descriptor syscalls and fixed-size stack
//! buffers: no allocation, no locks, no logging.

use std::fs;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use matmul_types::Element;
use nix::libc::_exit;
use nix::unistd::{SysconfVar, close, getpid, sysconf};

use crate::channel::{self, TERM_LEN, VALUE_LEN, WorkerEnds};

/// Terms read from the request pipe per `read` call.
const TERM_BATCH: usize = 512;

/// Descriptor bound used when the limit cannot be queried.
const FALLBACK_OPEN_MAX: RawFd = 1024;

const EXIT_OK: i32 = 0;
const EXIT_BROKEN: i32 = 1;

/// Entry point of a freshly forked worker. Closes every descriptor except
/// the standard streams and its own two ends, acknowledges with its pid and
/// then serves cells until the pool closes the request pipe.
///
/// `highest_fd` bounds the descriptors to close; see [`highest_open_fd`].
pub(crate) fn run(ends: WorkerEnds, highest_fd: RawFd) -> ! {
    close_foreign_fds(
        &[ends.request.as_raw_fd(), ends.response.as_raw_fd()],
        highest_fd,
    );

    let WorkerEnds {
        mut request,
        mut response,
    } = ends;

    let pid = getpid().as_raw();
    if channel::write_value(&mut response, pid).is_err() {
        // SAFETY: `_exit(2)` takes no pointers and never returns.
        unsafe { _exit(EXIT_BROKEN) };
    }

    let code = match serve(&mut request, &mut response) {
        Ok(()) => EXIT_OK,
        Err(_) => EXIT_BROKEN,
    };
    drop(request);
    drop(response);
    // SAFETY: `_exit(2)` takes no pointers and never returns.
    unsafe { _exit(code) }
}

/// Highest descriptor open in the calling process, falling back to the
/// descriptor limit where `/proc` is unavailable. Runs in the parent before
/// `fork`, with the spawn lock held so no pool pipe can appear above it.
pub(crate) fn highest_open_fd() -> RawFd {
    let listed = fs::read_dir("/proc/self/fd").ok().map(|dir| {
        dir.filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<RawFd>().ok())
            .max()
            .unwrap_or(2)
    });
    listed.unwrap_or_else(open_max)
}

fn open_max() -> RawFd {
    match sysconf(SysconfVar::OPEN_MAX) {
        Ok(Some(n)) if n > 0 => RawFd::try_from(n).unwrap_or(RawFd::MAX),
        _ => FALLBACK_OPEN_MAX,
    }
}

/// Closes every descriptor in `3..=highest_fd` that is not in `keep`. Pipe
/// ends of other workers, in this pool or any other, must not stay open
/// here or a dead worker would never read as closed.
fn close_foreign_fds(keep: &[RawFd], highest_fd: RawFd) {
    for fd in 3..=highest_fd {
        if !keep.contains(&fd) {
            let _ = close(fd);
        }
    }
}

/// Answers every cell on `request` with its dot product on `response`.
///
/// Returns `Ok(())` when `request` reaches end-of-file on a cell boundary.
/// A cell cut short or a failed write is an error.
pub(crate) fn serve<R: Read, W: Write>(request: &mut R, response: &mut W) -> io::Result<()> {
    let mut buf = [0u8; TERM_BATCH * TERM_LEN];
    while let Some(terms) = channel::read_header(request)? {
        let mut remaining = terms as usize;
        let mut sum: Element = 0;
        while remaining > 0 {
            let batch = remaining.min(TERM_BATCH);
            let chunk = &mut buf[..batch * TERM_LEN];
            request.read_exact(chunk)?;
            for term in chunk.chunks_exact(TERM_LEN) {
                let (multiplicand, multiplier) = term.split_at(VALUE_LEN);
                let product =
                    channel::element(multiplicand).wrapping_mul(channel::element(multiplier));
                sum = sum.wrapping_add(product);
            }
            remaining -= batch;
        }
        channel::write_value(response, sum)?;
        response.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(terms: &[(Element, Element)]) -> Vec<u8> {
        let mut buf = (terms.len() as u32).to_ne_bytes().to_vec();
        for (a, b) in terms {
            buf.extend_from_slice(&a.to_ne_bytes());
            buf.extend_from_slice(&b.to_ne_bytes());
        }
        buf
    }

    fn sums(bytes: &[u8]) -> Vec<Element> {
        bytes.chunks_exact(VALUE_LEN).map(channel::element).collect()
    }

    #[test]
    fn answers_each_cell_in_order() {
        let mut input = cell(&[(1, 5), (2, 7)]);
        input.extend(cell(&[(3, 6), (4, 8)]));
        input.extend(cell(&[(-9, 1)]));

        let mut output = Vec::new();
        serve(&mut input.as_slice(), &mut output).unwrap();
        assert_eq!(sums(&output), vec![19, 50, -9]);
    }

    #[test]
    fn long_cells_span_several_batches() {
        let terms: Vec<(Element, Element)> = (0..(TERM_BATCH * 2 + 7) as Element)
            .map(|k| (k, 2))
            .collect();
        let expected: Element = terms.iter().map(|(a, b)| a * b).sum();

        let input = cell(&terms);
        let mut output = Vec::new();
        serve(&mut input.as_slice(), &mut output).unwrap();
        assert_eq!(sums(&output), vec![expected]);
    }

    #[test]
    fn truncated_cell_is_an_error() {
        let mut input = cell(&[(1, 1), (2, 2)]);
        input.truncate(input.len() - 3);

        let mut output = Vec::new();
        let err = serve(&mut input.as_slice(), &mut output).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(output.is_empty());
    }

    #[test]
    fn highest_open_fd_covers_new_descriptors() {
        let file = fs::File::open("/dev/null").unwrap();
        assert!(highest_open_fd() >= file.as_raw_fd());
    }

    #[test]
    fn empty_input_finishes_cleanly() {
        let mut output = Vec::new();
        serve(&mut (&[] as &[u8]), &mut output).unwrap();
        assert!(output.is_empty());
    }
}

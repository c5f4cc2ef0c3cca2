//! C interface to the worker pool.
//!
//! ```c
//! MatrixMulHandle pool;
//! int err;
//! if (matmul_new(4, STDOUT_FILENO, &pool, &err) != 0) { ... }
//! matmul_mul(pool, n1, n2, n3, a, b, c, &err);
//! matmul_free(pool, &err);
//! ```
//!
//! Matrices are passed as contiguous row-major `int` arrays. Every call
//! stores an errno value in `*err_out` (zero on success). After a failed
//! `matmul_mul` the handle must be freed and not used again.

use std::ffi::{c_int, c_void};
use std::fs::File;
use std::os::fd::BorrowedFd;
use std::slice;

use matrix_mul::{Element, Error, Matrix, MatrixMul};

type MatrixMulHandle = *mut c_void;

const EINVAL: c_int = 22;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = 1,
    InvalidArgument = 2,
    ResourceError = 3,
    ChannelError = 4,
    Misuse = 5,
    TraceError = 6,
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Resource { .. } => ErrorCode::ResourceError,
            Error::Channel { .. } => ErrorCode::ChannelError,
            Error::Misuse(_) => ErrorCode::Misuse,
            Error::DimensionMismatch(..) | Error::EmptyMatrix => ErrorCode::InvalidArgument,
            Error::Trace(_) => ErrorCode::TraceError,
        }
    }
}

fn set_err(err_out: *mut c_int, value: c_int) {
    if !err_out.is_null() {
        unsafe { *err_out = value };
    }
}

fn fail(err: Error, err_out: *mut c_int) -> ErrorCode {
    eprintln!("matmul: {}", err);
    set_err(err_out, err.os_error());
    ErrorCode::from(&err)
}

/// Creates a pool of `n_workers` worker processes. When `trace_fd` is not
/// negative it is duplicated and every computed cell is logged to it.
#[unsafe(no_mangle)]
pub extern "C" fn matmul_new(
    n_workers: c_int,
    trace_fd: c_int,
    handle_out: *mut MatrixMulHandle,
    err_out: *mut c_int,
) -> ErrorCode {
    if handle_out.is_null() {
        set_err(err_out, EINVAL);
        return ErrorCode::NullPointer;
    }
    if n_workers <= 0 {
        set_err(err_out, EINVAL);
        return ErrorCode::InvalidArgument;
    }

    let pool = if trace_fd >= 0 {
        let fd = unsafe { BorrowedFd::borrow_raw(trace_fd) };
        let trace = match fd.try_clone_to_owned() {
            Ok(owned) => File::from(owned),
            Err(e) => {
                set_err(err_out, e.raw_os_error().unwrap_or(EINVAL));
                return ErrorCode::ResourceError;
            }
        };
        MatrixMul::with_trace(n_workers as usize, trace)
    } else {
        MatrixMul::new(n_workers as usize)
    };

    match pool {
        Ok(pool) => {
            let boxed = Box::new(pool);
            unsafe { *handle_out = Box::into_raw(boxed) as *mut c_void };
            set_err(err_out, 0);
            ErrorCode::Success
        }
        Err(e) => fail(e, err_out),
    }
}

/// Sets `c[n1][n3]` to `a[n1][n2] * b[n2][n3]`.
#[unsafe(no_mangle)]
pub extern "C" fn matmul_mul(
    handle: MatrixMulHandle,
    n1: c_int,
    n2: c_int,
    n3: c_int,
    a: *const Element,
    b: *const Element,
    c: *mut Element,
    err_out: *mut c_int,
) -> ErrorCode {
    if handle.is_null() || a.is_null() || b.is_null() || c.is_null() {
        set_err(err_out, EINVAL);
        return ErrorCode::NullPointer;
    }
    if n1 <= 0 || n2 <= 0 || n3 <= 0 {
        set_err(err_out, EINVAL);
        return ErrorCode::InvalidArgument;
    }
    let (n1, n2, n3) = (n1 as usize, n2 as usize, n3 as usize);

    let a = unsafe { slice::from_raw_parts(a, n1 * n2) };
    let b = unsafe { slice::from_raw_parts(b, n2 * n3) };
    let c = unsafe { slice::from_raw_parts_mut(c, n1 * n3) };

    let operands = Matrix::from_vec(n1, n2, a.to_vec())
        .and_then(|a| Ok((a, Matrix::from_vec(n2, n3, b.to_vec())?)));
    let (a, b) = match operands {
        Ok(operands) => operands,
        Err(_) => {
            set_err(err_out, EINVAL);
            return ErrorCode::InvalidArgument;
        }
    };

    let pool = unsafe { &mut *(handle as *mut MatrixMul) };
    let mut out = Matrix::zeros(n1, n3);
    match pool.mul(&a, &b, &mut out) {
        Ok(()) => {
            c.copy_from_slice(out.as_slice());
            set_err(err_out, 0);
            ErrorCode::Success
        }
        Err(e) => fail(e, err_out),
    }
}

/// Frees the pool and reaps its workers. The handle is invalid afterwards.
#[unsafe(no_mangle)]
pub extern "C" fn matmul_free(handle: MatrixMulHandle, err_out: *mut c_int) -> ErrorCode {
    if handle.is_null() {
        eprintln!("matmul: cannot free a null pool");
        set_err(err_out, EINVAL);
        return ErrorCode::NullPointer;
    }

    let mut pool = unsafe { Box::from_raw(handle as *mut MatrixMul) };
    match pool.free() {
        Ok(()) => {
            set_err(err_out, 0);
            ErrorCode::Success
        }
        Err(e) => fail(e, err_out),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::fd::AsRawFd;
    use std::ptr;
    use std::sync::Mutex;

    use super::*;

    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn multiply_through_c_interface() {
        let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let mut handle: MatrixMulHandle = ptr::null_mut();
        let mut err: c_int = -1;
        assert_eq!(matmul_new(2, -1, &mut handle, &mut err), ErrorCode::Success);
        assert_eq!(err, 0);

        let a = [1, 2, 3, 4];
        let b = [5, 6, 7, 8];
        let mut c = [0; 4];
        let code = matmul_mul(handle, 2, 2, 2, a.as_ptr(), b.as_ptr(), c.as_mut_ptr(), &mut err);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(c, [19, 22, 43, 50]);

        assert_eq!(matmul_free(handle, &mut err), ErrorCode::Success);
        assert_eq!(err, 0);
    }

    #[test]
    fn trace_goes_to_descriptor() {
        let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let path = std::env::temp_dir().join(format!("matmul-ffi-trace-{}", std::process::id()));
        let file = File::create(&path).unwrap();

        let mut handle: MatrixMulHandle = ptr::null_mut();
        let mut err: c_int = -1;
        assert_eq!(
            matmul_new(1, file.as_raw_fd(), &mut handle, &mut err),
            ErrorCode::Success
        );
        drop(file);

        let a = [3];
        let b = [4, 5];
        let mut c = [0; 2];
        let code = matmul_mul(handle, 1, 1, 2, a.as_ptr(), b.as_ptr(), c.as_mut_ptr(), &mut err);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(c, [12, 15]);
        assert_eq!(matmul_free(handle, &mut err), ErrorCode::Success);

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        std::fs::remove_file(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0[") && lines[0].ends_with("]: [0]x[0] = 12"));
        assert!(lines[1].ends_with("]: [0]x[1] = 15"));
    }

    #[test]
    fn null_and_invalid_arguments() {
        let mut err: c_int = 0;
        assert_eq!(matmul_free(ptr::null_mut(), &mut err), ErrorCode::NullPointer);
        assert_eq!(err, EINVAL);

        let mut handle: MatrixMulHandle = ptr::null_mut();
        assert_eq!(
            matmul_new(0, -1, &mut handle, &mut err),
            ErrorCode::InvalidArgument
        );
        assert!(handle.is_null());
        assert_eq!(
            matmul_new(1, -1, ptr::null_mut(), &mut err),
            ErrorCode::NullPointer
        );
    }
}

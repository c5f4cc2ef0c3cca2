//! Client end of the socket variant.

use std::io::Write;

use matmul_types::Matrix;
use matmul_types::wire::{MulRequest, MulResponse};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::Error;
use crate::frame::{read_frame, write_frame};

/// A connection to a matmul server bound to one backend.
///
/// # Example
///
/// ```no_run
/// use matmul_server::MatmulClient;
/// use matmul_types::Matrix;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut client = MatmulClient::connect("localhost:50051", "pipes")
///         .await?
///         .with_trace(std::io::stdout());
///
///     let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]])?;
///     let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]])?;
///     let c = client.mul(&a, &b).await?;
///     assert_eq!(c.to_rows(), vec![vec![19, 22], vec![43, 50]]);
///
///     client.close().await?;
///     Ok(())
/// }
/// ```
pub struct MatmulClient {
    stream: TcpStream,
    strategy: String,
    trace: Option<Box<dyn Write + Send>>,
}

impl MatmulClient {
    pub async fn connect(addr: impl ToSocketAddrs, strategy: impl Into<String>) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            strategy: strategy.into(),
            trace: None,
        })
    }

    /// Logs `utime: U, stime: S, wall: W` to `trace` after every call.
    pub fn with_trace(mut self, trace: impl Write + Send + 'static) -> Self {
        self.trace = Some(Box::new(trace));
        self
    }

    /// Computes `a × b` on the server.
    pub async fn mul(&mut self, a: &Matrix, b: &Matrix) -> Result<Matrix, Error> {
        let request = MulRequest::new(self.strategy.clone(), a, b);
        write_frame(&mut self.stream, &request).await?;

        let response: MulResponse = read_frame(&mut self.stream)
            .await?
            .ok_or(Error::ConnectionClosed)?;
        if response.error != 0 {
            return Err(Error::Server {
                code: response.error,
                message: response.message,
            });
        }

        if let Some(trace) = self.trace.as_mut() {
            writeln!(trace, "{}", response.timing_line())?;
            trace.flush()?;
        }
        Ok(Matrix::from_vec(a.rows(), b.cols(), response.c)?)
    }

    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

//! TCP front end: one task per connection, one response per request.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::StreamExt;
use matmul_types::wire::{MulRequest, MulResponse};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{debug, info, warn};

use crate::backend::{self, Backend};
use crate::frame::{frames, write_frame};
use crate::timing::Timing;
use crate::{Config, Error};

pub struct Server {
    listener: TcpListener,
    workers: usize,
}

impl Server {
    pub async fn bind(config: &Config) -> Result<Self, Error> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!(addr = %listener.local_addr()?, workers = config.workers, "listening");
        Ok(Self {
            listener,
            workers: config.workers,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(self) -> Result<(), Error> {
        let workers = self.workers;
        let mut incoming = TcpListenerStream::new(self.listener);
        while let Some(stream) = incoming.next().await {
            match stream {
                Ok(stream) => {
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, workers).await {
                            warn!(error = %e, "connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, workers: usize) -> Result<(), Error> {
    let peer = stream.peer_addr()?;
    info!(%peer, "client connected");

    let (reader, mut writer) = stream.into_split();
    let requests = frames::<_, MulRequest>(reader);
    tokio::pin!(requests);

    let mut session = Session::new(workers);
    while let Some(request) = requests.next().await {
        let response = session.handle(request?).await;
        write_frame(&mut writer, &response).await?;
    }

    info!(%peer, "client disconnected");
    Ok(())
}

/// Per-connection state. Backends are kept by name so a `pipes` client
/// reuses its worker pool across requests.
struct Session {
    workers: usize,
    backends: HashMap<String, Box<dyn Backend>>,
}

impl Session {
    fn new(workers: usize) -> Self {
        Self {
            workers,
            backends: HashMap::new(),
        }
    }

    async fn handle(&mut self, request: MulRequest) -> MulResponse {
        match self.run(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "request failed");
                MulResponse::failed(e.os_error(), e.to_string())
            }
        }
    }

    async fn run(&mut self, request: MulRequest) -> Result<MulResponse, Error> {
        let (a, b) = request.operands()?;
        let name = request.strategy;
        let mut backend = match self.backends.remove(&name) {
            Some(backend) => backend,
            None => backend::resolve(&name, self.workers)?,
        };
        debug!(backend = backend.name(), n1 = a.rows(), n2 = a.cols(), n3 = b.cols(), "multiplying");

        let (backend, result, timing) = tokio::task::spawn_blocking(move || {
            let (result, timing) = Timing::measure(|| backend.multiply(&a, &b));
            (backend, result, timing)
        })
        .await?;
        self.backends.insert(name, backend);

        let c = result?;
        Ok(MulResponse {
            utime: timing.utime,
            stime: timing.stime,
            wall: timing.wall,
            error: 0,
            message: String::new(),
            c: c.into_vec(),
        })
    }
}

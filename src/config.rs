//! Server configuration.

use std::env;

const DEFAULT_ADDR: &str = "127.0.0.1:50051";
const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on.
    pub addr: String,
    /// Worker processes per connection for the `pipes` backend.
    pub workers: usize,
}

impl Config {
    /// Reads `MATMUL_ADDR` and `MATMUL_WORKERS`, falling back to defaults.
    pub fn from_env() -> Self {
        let addr = env::var("MATMUL_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let workers = env::var("MATMUL_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_WORKERS);
        Self { addr, workers }
    }

    /// Overrides the address and worker count from positional arguments
    /// `[addr] [workers]`.
    pub fn with_args(mut self, args: &[String]) -> Self {
        if let Some(addr) = args.get(1) {
            self.addr = addr.clone();
        }
        if let Some(workers) = args.get(2).and_then(|v| v.parse().ok()).filter(|&n| n > 0) {
            self.workers = workers;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            workers: DEFAULT_WORKERS,
        }
    }
}

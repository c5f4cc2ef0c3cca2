use std::env;

use matmul_server::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_env().with_args(&args);

    let server = Server::bind(&config).await?;
    server.serve().await?;

    Ok(())
}

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use matmul_server::{Config, Error, MatmulClient, Server};
use matmul_types::wire::{MulRequest, MulResponse};
use matmul_types::{Matrix, Strategy};
use tokio::net::TcpStream;

async fn start_test_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let config = Config {
        addr: "127.0.0.1:0".to_string(),
        workers: 3,
    };
    let server = Server::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        server.serve().await.unwrap();
    });

    (addr, handle)
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn sample() -> (Matrix, Matrix) {
    let a = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
    let b = Matrix::from_rows(vec![vec![7, 8], vec![9, 10], vec![11, 12]]).unwrap();
    (a, b)
}

#[tokio::test]
async fn test_every_backend_multiplies() {
    let (addr, _handle) = start_test_server().await;
    let (a, b) = sample();
    let expected = Strategy::Naive.multiply(&a, &b).unwrap();

    for strategy in ["naive", "transposed", "smart_matmul.so", "pipes"] {
        let mut client = MatmulClient::connect(addr, strategy).await.unwrap();
        let c = client.mul(&a, &b).await.unwrap();
        assert_eq!(c, expected, "backend {}", strategy);
        client.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_pipes_connection_serves_many_requests() {
    let (addr, _handle) = start_test_server().await;
    let mut client = MatmulClient::connect(addr, "pipes").await.unwrap();

    for n in 1..=5 {
        let a = Matrix::from_vec(n, n, (0..(n * n) as i32).collect()).unwrap();
        let b = Matrix::from_vec(n, 2, (0..(n * 2) as i32).rev().collect()).unwrap();
        let c = client.mul(&a, &b).await.unwrap();
        assert_eq!(c, Strategy::Naive.multiply(&a, &b).unwrap());
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_trace_reports_timing() {
    let (addr, _handle) = start_test_server().await;
    let trace = SharedBuf::default();
    let mut client = MatmulClient::connect(addr, "naive")
        .await
        .unwrap()
        .with_trace(trace.clone());

    let (a, b) = sample();
    client.mul(&a, &b).await.unwrap();
    client.mul(&a, &b).await.unwrap();

    let text = String::from_utf8(trace.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let fields: Vec<&str> = line.split(", ").collect();
        assert_eq!(fields.len(), 3, "{}", line);
        for (field, name) in fields.iter().zip(["utime", "stime", "wall"]) {
            let value = field
                .strip_prefix(&format!("{}: ", name))
                .unwrap_or_else(|| panic!("bad field {:?}", field));
            let parsed: i64 = value.parse().unwrap();
            assert!(parsed >= 0);
            assert_eq!(parsed.to_string(), value);
        }
    }
}

#[tokio::test]
async fn test_unknown_backend_is_reported() {
    let (addr, _handle) = start_test_server().await;
    let mut client = MatmulClient::connect(addr, "strassen").await.unwrap();
    let (a, b) = sample();

    match client.mul(&a, &b).await {
        Err(Error::Server { code, message }) => {
            assert_eq!(code, 22);
            assert!(message.contains("strassen"));
        }
        other => panic!("unexpected result: {:?}", other.map(|m| m.dims())),
    }

    // The connection stays usable after a failed request.
    let c = client.mul(&a, &b).await;
    assert!(matches!(c, Err(Error::Server { .. })));
}

#[tokio::test]
async fn test_malformed_request_gets_error_response() {
    let (addr, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = MulRequest {
        strategy: "pipes".to_string(),
        n1: 2,
        n2: 2,
        n3: 2,
        a: vec![1, 2, 3],
        b: vec![1, 2, 3, 4],
    };
    matmul_server::frame::write_frame(&mut stream, &request)
        .await
        .unwrap();
    let response: MulResponse = matmul_server::frame::read_frame(&mut stream)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.error, 22);
    assert!(response.c.is_empty());
}

#[tokio::test]
async fn test_empty_product_is_refused_without_allocating() {
    let (addr, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    for strategy in ["naive", "pipes"] {
        let request = MulRequest {
            strategy: strategy.to_string(),
            n1: 1 << 20,
            n2: 0,
            n3: 1 << 20,
            a: vec![],
            b: vec![],
        };
        matmul_server::frame::write_frame(&mut stream, &request)
            .await
            .unwrap();
        let response: MulResponse = matmul_server::frame::read_frame(&mut stream)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.error, 22, "backend {}", strategy);
    }

    let (a, b) = sample();
    let request = MulRequest::new("naive", &a, &b);
    matmul_server::frame::write_frame(&mut stream, &request)
        .await
        .unwrap();
    let response: MulResponse = matmul_server::frame::read_frame(&mut stream)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.error, 0);
    assert_eq!(response.c, Strategy::Naive.multiply(&a, &b).unwrap().into_vec());
}

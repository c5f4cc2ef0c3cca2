use std::env;
use std::process;

use matrix_mul::{Matrix, MatrixMul};
use matmul_types::Strategy;
use rand::Rng;

fn random_matrix(rows: usize, cols: usize) -> Matrix {
    let mut rng = rand::thread_rng();
    let mut m = Matrix::zeros(rows, cols);
    for i in 0..rows {
        for j in 0..cols {
            m[(i, j)] = rng.gen_range(-9..=9);
        }
    }
    m
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let arg = |i: usize, default: usize| -> usize {
        args.get(i)
            .map(|s| {
                s.parse().unwrap_or_else(|_| {
                    eprintln!("Invalid number: {}", s);
                    eprintln!("Usage: {} [workers] [n1] [n2] [n3] [trace]", args[0]);
                    process::exit(1);
                })
            })
            .unwrap_or(default)
    };

    let workers = arg(1, 4);
    let (n1, n2, n3) = (arg(2, 4), arg(3, 3), arg(4, 5));
    let trace = args.get(5).is_some_and(|s| s == "trace");

    let pool = if trace {
        MatrixMul::with_trace(workers, std::io::stdout())
    } else {
        MatrixMul::new(workers)
    };
    let mut pool = match pool {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Cannot create worker pool: {}", e);
            process::exit(1);
        }
    };

    let a = random_matrix(n1, n2);
    let b = random_matrix(n2, n3);
    println!("Matrix A ({}x{}):\n{}", n1, n2, a);
    println!("Matrix B ({}x{}):\n{}", n2, n3, b);

    let mut c = Matrix::zeros(n1, n3);
    if let Err(e) = pool.mul(&a, &b, &mut c) {
        eprintln!("Multiplication failed: {}", e);
        if let Err(e) = pool.free() {
            eprintln!("Cannot free worker pool: {}", e);
        }
        process::exit(1);
    }

    println!("Result ({}x{}):\n{}", n1, n3, c);
    match Strategy::Naive.multiply(&a, &b) {
        Ok(expected) if expected == c => println!("Verified against local product."),
        Ok(_) => {
            eprintln!("Result differs from local product!");
            if let Err(e) = pool.free() {
                eprintln!("Cannot free worker pool: {}", e);
            }
            process::exit(1);
        }
        Err(e) => eprintln!("Cannot verify: {}", e),
    }

    if let Err(e) = pool.free() {
        eprintln!("Cannot free worker pool: {}", e);
        process::exit(1);
    }
}

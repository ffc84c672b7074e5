//! protoc plugin generating Go gRPC test doubles.
//!
//! Install it in `PATH` as `protoc-gen-go-grpcmock` and invoke it through protoc:
//!
//! ```text
//! protoc --go-grpcmock_out=. --go-grpcmock_opt=framework=testify path/to/file.proto
//! ```
//!
//! which writes the mocks for `path/to/file.proto` to
//! `<go import path>/file_grpc_mock.pb.go`.

use std::{
    io::{self, Read, Write},
    process::ExitCode,
};

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Reads a `CodeGeneratorRequest` from stdin and writes the
/// `CodeGeneratorResponse` to stdout.
#[derive(Parser, Debug)]
#[command(name = "protoc-gen-go-grpcmock", version, about, long_about = None)]
struct Args {}

fn main() -> ExitCode {
    Args::parse();

    // stdout carries the plugin protocol.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "protoc-gen-go-grpcmock failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut input = Vec::new();
    io::stdin().read_to_end(&mut input)?;

    let output = grpcmock_build::configure()
        .plugin_version(concat!("v", env!("CARGO_PKG_VERSION")))
        .process(&input)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.flush()?;
    Ok(())
}

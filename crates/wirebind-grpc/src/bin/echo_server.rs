use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use wirebind_grpc::testservice::{EchoServer, TestService};
use wirebind_grpc::{ServerIdentity, server};

#[derive(Parser, Debug)]
#[command(
    name = "echo-server",
    version,
    author,
    about = "Echo implementation of wirebind.tests.TestService"
)]
struct Args {
    /// Bind address (IP or hostname)
    #[arg(long, default_value = "0.0.0.0")]
    addr: String,

    /// Port to listen on
    #[arg(long, default_value_t = 50051)]
    port: u16,

    /// Delay before answering a "sleep" request, in seconds
    #[arg(long, default_value_t = 3)]
    sleep_secs: u64,

    /// Pause between server-stream replies, in milliseconds
    #[arg(long, default_value_t = 1000)]
    stream_interval_ms: u64,

    /// PEM certificate chain; serves TLS only when given with --tls-key
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wirebind::telemetry::init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.addr, args.port).parse()?;

    let router = EchoServer::new()
        .with_sleep_delay(Duration::from_secs(args.sleep_secs))
        .with_stream_interval(Duration::from_millis(args.stream_interval_ms))
        .router()?;

    let tls = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => Some(ServerIdentity::from_files(cert, key)?.server_tls_config()),
        _ => None,
    };

    tracing::info!(%addr, tls = tls.is_some(), "Starting echo server");
    server::serve::<TestService>(addr, router, tls).await?;
    Ok(())
}

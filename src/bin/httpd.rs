//! CLI entry point: binds flags to `Server::go`, registers a handful of
//! demonstration handlers, and installs a `tracing` subscriber honoring
//! `RUST_LOG`.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use threadhttp::{ContentType, Method, Response, Server, StatusCode};

/// A small thread-based HTTP/1.1 server.
#[derive(Parser, Debug)]
#[command(name = "httpd", about = "A small thread-based HTTP/1.1 server")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 7878)]
    port: u16,

    /// Number of Dispatch reactor shards.
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Worker pool size.
    #[arg(long, default_value_t = 6)]
    workers: usize,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut server = Server::new(args.threads, args.workers);

    server.register_handler(Method::Get, "/", |_req| {
        Ok(Response::new(StatusCode::Ok, ContentType::PlainText, &b"it works"[..]))
    });

    server.register_handler(Method::Get, "/health", |_req| {
        Ok(Response::new(StatusCode::Ok, ContentType::Json, &b"{\"status\":\"ok\"}"[..]))
    });

    server.register_handler(Method::Post, "/echo", |req| {
        Ok(Response::new(StatusCode::Ok, ContentType::PlainText, req.body))
    });

    if let Err(err) = server.go(args.port) {
        tracing::error!(error = %err, "server exited with an error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_flags_given() {
        let args = Args::try_parse_from(["httpd"]).unwrap();
        assert_eq!(args.port, 7878);
        assert_eq!(args.threads, 2);
        assert_eq!(args.workers, 6);
    }

    #[test]
    fn parses_explicit_flags() {
        let args =
            Args::try_parse_from(["httpd", "--port", "9001", "--threads", "4", "--workers", "12"])
                .unwrap();
        assert_eq!(args.port, 9001);
        assert_eq!(args.threads, 4);
        assert_eq!(args.workers, 12);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Args::try_parse_from(["httpd", "--bogus"]).is_err());
    }
}

/// MCP Server Entry Point
///
/// Parses CLI flags (layered over environment variables over built-in
/// defaults), assembles the Foundation, registers the built-in tool
/// plugins, and dispatches into stdio or HTTP transport mode.
///
/// Exit codes: `0` clean shutdown, `1` startup failure, `2` unrecoverable
/// runtime error.
mod core;
mod tools;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::core::foundation::Foundation;
use crate::core::mcp::{JsonRpcResponse, McpHandler};
use crate::core::utils;

#[derive(Parser, Debug)]
#[command(name = "mcp-server", version, about = "Browser-automation MCP tool server")]
struct Cli {
    #[arg(long)]
    http_port: Option<u16>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long)]
    server_name: Option<String>,

    #[arg(long)]
    server_version: Option<String>,

    #[arg(long, value_parser = ["stdio", "http"])]
    transport: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = cli.log_level.unwrap_or_else(utils::default_log_level);
    let server_name = cli.server_name.unwrap_or_else(utils::default_server_name);
    let server_version = cli.server_version.unwrap_or_else(utils::default_server_version);
    let http_port = cli.http_port.unwrap_or_else(utils::default_http_port);
    let transport = cli.transport.unwrap_or_else(utils::default_transport);

    let foundation = Foundation::builder()
        .log_level(log_level)
        .server_name(server_name)
        .server_version(server_version)
        .http_port(if transport == "http" { Some(http_port) } else { None })
        .build();

    foundation.init_logging();

    for tool in [tools::echo::tool(), tools::browser_navigate::tool()] {
        if let Err(e) = foundation.register_tool(tool).await {
            tracing::error!(error = %e, "main.tool_registration_failed");
            std::process::exit(1);
        }
    }

    if let Err(e) = foundation.start().await {
        tracing::error!(error = %e, "main.startup_failed");
        std::process::exit(1);
    }

    let exit_code = match transport.as_str() {
        "stdio" => run_stdio(&foundation).await,
        "http" => run_http_until_signal().await,
        other => {
            tracing::error!(transport = other, "main.invalid_transport");
            1
        }
    };

    foundation.stop().await;
    std::process::exit(exit_code);
}

/// Read JSON-RPC lines from stdin, dispatching each `tools/call` as its
/// own task so a slow tool does not block the read loop; responses are
/// funneled through a single channel to keep stdout writes serialized
/// (order not guaranteed, but never interleaved mid-line).
async fn run_stdio(foundation: &Foundation) -> i32 {
    let mcp: Arc<McpHandler> = foundation.mcp.clone();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<JsonRpcResponse>();

    let writer_task = tokio::spawn(async move {
        let stdout = tokio::io::stdout();
        let mut stdout = BufWriter::with_capacity(8192, stdout);
        while let Some(response) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&response) else {
                continue;
            };
            if stdout.write_all(json.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            if stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::with_capacity(8192, stdin).lines();

    let result: std::io::Result<()> = async {
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request = match McpHandler::decode_line(&line) {
                Ok(request) => request,
                Err(err) => {
                    let response = JsonRpcResponse::from_decode_error(err);
                    let _ = tx.send(response);
                    continue;
                }
            };

            let mcp = mcp.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = mcp.handle(request).await {
                    let _ = tx.send(response);
                }
            });
        }
        Ok(())
    }
    .await;

    drop(tx);
    let _ = writer_task.await;

    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "main.stdio_io_error");
            2
        }
    }
}

/// HTTP transport keeps the process alive until a shutdown signal
/// arrives; the Bridge itself is already running inside the Foundation.
async fn run_http_until_signal() -> i32 {
    match tokio::signal::ctrl_c().await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "main.signal_wait_failed");
            2
        }
    }
}

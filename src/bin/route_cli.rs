use std::path::PathBuf;
use std::process::ExitCode;

use model_router::catalog::export_catalog_json;
use model_router::config::RouterConfig;
use model_router::core::types::{CallContext, ChatCompletionRequest, RequestEnvelope};
use model_router::{ModelRouter, RouterError};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

enum Mode {
    Send,
    DryRun,
    ExportCatalog,
}

struct CliArgs {
    mode: Mode,
    input: Option<PathBuf>,
    authorization: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "model_router=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(args)?;
    let config = RouterConfig::from_env()?;

    if let Mode::ExportCatalog = args.mode {
        println!("{}", export_catalog_json(&config.load_catalog()?)?);
        return Ok(());
    }

    let router = ModelRouter::from_config(&config)?;
    let envelope = read_envelope(args.input.as_ref()).await?;

    if let Mode::DryRun = args.mode {
        let decision = router.route(&envelope);
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }

    let ctx = CallContext {
        authorization: args.authorization,
        ..CallContext::default()
    };
    match router.send(&envelope, &ctx).await {
        Ok(routed) => {
            println!("{}", serde_json::to_string_pretty(&routed)?);
            Ok(())
        }
        Err(error) => Err(describe(&error).into()),
    }
}

fn describe(error: &RouterError) -> String {
    format!(
        "{} (code={}, status={})",
        error,
        error.code(),
        error.status_code()
    )
}

/// Accepts either a bare chat completion body or a full envelope with
/// `request` and `options`.
async fn read_envelope(
    input: Option<&PathBuf>,
) -> Result<RequestEnvelope, Box<dyn std::error::Error>> {
    let raw = match input {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };

    let value: Value = serde_json::from_str(&raw)?;
    if value.get("request").is_some() {
        return Ok(serde_json::from_value(value)?);
    }

    let request: ChatCompletionRequest = serde_json::from_value(value)?;
    Ok(RequestEnvelope::from_chat(request))
}

fn parse_args(args: Vec<String>) -> Result<CliArgs, Box<dyn std::error::Error>> {
    let mut parsed = CliArgs {
        mode: Mode::Send,
        input: None,
        authorization: None,
    };

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--dry-run" => {
                parsed.mode = Mode::DryRun;
                i += 1;
            }
            "--export-catalog" => {
                parsed.mode = Mode::ExportCatalog;
                i += 1;
            }
            "--authorization" => {
                let value = args
                    .get(i + 1)
                    .ok_or("missing value for --authorization")?
                    .trim()
                    .to_string();
                if value.is_empty() {
                    return Err("--authorization must be non-empty".into());
                }
                parsed.authorization = Some(value);
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}").into());
            }
            path => {
                if parsed.input.is_some() {
                    return Err("only one request file may be given".into());
                }
                parsed.input = Some(PathBuf::from(path));
                i += 1;
            }
        }
    }

    Ok(parsed)
}

fn print_help() {
    println!(
        "Usage:\n  cargo run --bin route_cli -- [--dry-run | --export-catalog] [--authorization TOKEN] [REQUEST.json]\n\nReads the request from stdin when no file is given.\n\nEnv:\n  AI_GATEWAY_URL / AI_GATEWAY_PATH / AI_GATEWAY_TOKEN / OPENROUTER_API_KEY\n  AI_GATEWAY_TIMEOUT_MS\n  AI_GATEWAY_HTTP_REFERER / AI_GATEWAY_X_TITLE\n  MODEL_ROUTER_FALLBACK_MODEL\n  MODEL_ROUTER_CATALOG\n  RUST_LOG"
    );
}

//! chat-probe: 向任一后端发送一次对话请求并打印增量输出
//!
//! Usage:
//!   chat-probe <provider> <model> <prompt words...>
//!
//! Credentials and endpoints come from the environment (see `print_usage`).
//! Ctrl-C cancels the call in flight.

use ai_chat_rust::{CallContext, ChatClient, ChatRequest, StreamPreference};
use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!(
        r#"chat-probe: 多后端对话探针

USAGE:
    chat-probe <provider> <model> <prompt words...>

PROVIDERS:
    ollama | openai | gemini

ENVIRONMENT:
    <PROVIDER>_API_KEY          API key (the OS credential store is tried first)
    <PROVIDER>_BASE_URL         Endpoint override
    GEMINI_AUTH_TYPE            api_key (default) | auth_token
    OLLAMA_HOST                 Local daemon address
    CHAT_PROBE_STREAM           1 = force streaming, 0 = force single-shot
    CHAT_PROBE_TIMEOUT_SECS     Call deadline
    CHAT_PROBE_FORMAT           json | <JSON schema object>
    RUST_LOG                    Log filter (default: info)"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(2);
    }
    let provider = &args[0];
    let model = &args[1];
    let prompt = args[2..].join(" ");

    let client = ChatClient::builder()
        .provider(provider.as_str())
        .build()
        .with_context(|| format!("building {} client", provider))?;

    let stream = StreamPreference::from_flag(
        std::env::var("CHAT_PROBE_STREAM")
            .ok()
            .map(|v| matches!(v.trim(), "1" | "true" | "yes")),
    );
    let mut builder = ChatRequest::builder()
        .model(model.as_str())
        .prompt(prompt)
        .stream(stream)
        .on_delta(|delta| {
            if !delta.thinking.is_empty() {
                eprint!("{}", delta.thinking);
            }
            let mut out = std::io::stdout().lock();
            out.write_all(delta.content.as_bytes())?;
            out.flush()?;
            Ok(())
        });
    if let Ok(raw) = std::env::var("CHAT_PROBE_FORMAT") {
        builder = builder.format_raw(&raw);
    }
    let request = builder.build()?;

    let mut ctx = CallContext::new();
    if let Some(secs) = std::env::var("CHAT_PROBE_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
    {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let stats = client.chat_with(&ctx, request).await?;
    println!();
    eprintln!(
        "[{} {}] {} deltas in {} ms (request {})",
        stats.provider, stats.model, stats.deltas, stats.duration_ms, stats.request_id
    );
    Ok(())
}

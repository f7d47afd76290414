//! `mcpagent chat` — Interactive or single-message chat mode.

use anyhow::Context;
use mcpagent_agent::Agent;
use mcpagent_config::AppConfig;
use mcpagent_core::agent::AgentResult;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run(
    config: &AppConfig,
    session: Option<String>,
    message: Option<String>,
) -> anyhow::Result<()> {
    if config.provider.requires_credential() && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured for {}!", config.provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        if let Some(var) = config.provider.credential_env() {
            eprintln!("    {var}");
        }
        eprintln!("    MCPAGENT_API_KEY");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  To use a local model instead: DEFAULT_LLM_PROVIDER=0");
        eprintln!();
    }

    let agent = Agent::from_config(config).context("Failed to set up agent")?;
    let session = session.unwrap_or_else(|| {
        format!("cli-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"))
    });

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let result = ask(&agent, &session, &msg).await;
        eprint!("\r              \r");
        let result = result?;
        println!("{}", result.text);
        report_terminal(&result);
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         MCPAgent — Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.effective_model());
    println!("  Tools:     {}", config.tools.url);
    println!("  Session:   {session}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C stops the current answer; type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        let result = ask(&agent, &session, line).await;
        eprint!("\r     \r");
        match result {
            Ok(result) => {
                println!();
                for text_line in result.text.lines() {
                    println!("  Assistant > {text_line}");
                }
                report_terminal(&result);
                println!();
            }
            Err(e) => {
                eprintln!("  [{}] {e}", e.kind());
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one message; Ctrl+C cancels between iterations.
async fn ask(
    agent: &Agent,
    session: &str,
    message: &str,
) -> Result<AgentResult, mcpagent_core::error::AgentError> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = agent.run_with_cancel(session, message, cancel).await;
    watcher.abort();
    result
}

fn report_terminal(result: &AgentResult) {
    if !result.terminal.is_done() {
        eprintln!(
            "  [{} after {} iteration(s)]",
            result.terminal, result.iterations_used
        );
    }
}

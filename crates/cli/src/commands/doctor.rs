//! `mcpagent doctor` — Diagnose provider and tool server health.

use mcpagent_config::AppConfig;
use mcpagent_core::provider::Provider;
use mcpagent_core::tool::ToolRegistry;
use mcpagent_tools::HttpToolRegistry;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("🩺 MCPAgent Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    match config.validate() {
        Ok(()) => println!("  ✅ Config valid ({} / {})", config.provider, config.effective_model()),
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
        }
    }

    match mcpagent_providers::build_base_provider(config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider {} reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider {} reported unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider {} check failed: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider could not be set up: {e}");
            issues += 1;
        }
    }

    match HttpToolRegistry::from_config(&config.tools, config.call_timeout()) {
        Ok(registry) => match registry.list_tools().await {
            Ok(tools) => println!(
                "  ✅ Tool server {} advertises {} tool(s)",
                config.tools.url,
                tools.len()
            ),
            Err(e) => {
                println!("  ❌ Tool server {}: {e}", config.tools.url);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Tool registry could not be set up: {e}");
            issues += 1;
        }
    }

    match &config.sessions.dir {
        Some(dir) => println!("  ✅ Sessions stored in {}", dir.display()),
        None => println!("  ✅ Sessions kept in memory"),
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

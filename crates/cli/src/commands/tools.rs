//! `mcpagent tools` — List the tools the tool server advertises.

use anyhow::Context;
use mcpagent_config::AppConfig;
use mcpagent_core::provider::ToolDescriptor;
use mcpagent_core::tool::ToolRegistry;
use mcpagent_tools::HttpToolRegistry;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let registry = HttpToolRegistry::from_config(&config.tools, config.call_timeout())?;
    let tools = registry
        .list_tools()
        .await
        .with_context(|| format!("Failed to discover tools at {}", config.tools.url))?;

    if tools.is_empty() {
        println!("No tools advertised by {}", config.tools.url);
        return Ok(());
    }

    println!("{} tool(s) at {}:\n", tools.len(), config.tools.url);
    for tool in &tools {
        println!("  {}", tool.name);
        if !tool.description.is_empty() {
            println!("      {}", tool.description);
        }
        let args = argument_names(tool);
        if !args.is_empty() {
            println!("      args: {}", args.join(", "));
        }
    }
    Ok(())
}

fn argument_names(tool: &ToolDescriptor) -> Vec<String> {
    tool.parameters
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_names_from_schema() {
        let tool = ToolDescriptor::new(
            "lookup_user_data",
            "Fetch user-specific data",
            Some(serde_json::json!({
                "type": "object",
                "properties": {"msisdn": {"type": "string"}, "query": {"type": "string"}}
            })),
        );
        assert_eq!(argument_names(&tool), vec!["msisdn", "query"]);

        let bare = ToolDescriptor::new("ping", "", None);
        assert!(argument_names(&bare).is_empty());
    }
}

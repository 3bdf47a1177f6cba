//! `shopdesk tools` — Start the sidecar, list its tools, and stop it.

use std::path::Path;

use shopdesk_config::AppConfig;
use shopdesk_core::tool::ToolGateway;
use shopdesk_tools::Sidecar;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let sidecar = Sidecar::spawn(&config.sidecar).await?;
    let listed = sidecar.list_tools().await;
    sidecar.shutdown().await;

    let tools = listed?;
    println!("🔧 {} tool(s)", tools.len());
    for tool in &tools {
        println!("   {:<16} {}", tool.name, tool.description);
    }

    Ok(())
}

//! `shopdesk serve` — Start the HTTP chat gateway.

use std::path::Path;

use shopdesk_config::AppConfig;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🛒 ShopDesk Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:      {}", config.provider.chat_model);
    println!("   Knowledge:  {} ({})", config.knowledge.collection, config.knowledge.base_url());
    println!("   Sidecar:    {} {}", config.sidecar.command, config.sidecar.program_args().join(" "));

    shopdesk_gateway::start(config).await?;

    Ok(())
}

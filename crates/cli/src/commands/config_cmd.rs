//! `shopdesk config` — Configuration management commands.

use std::path::Path;

use shopdesk_config::AppConfig;

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    if config.api_key.is_none() {
        println!("   ⚠️  No API key set (set DASHSCOPE_API_KEY or SHOPDESK_API_KEY)");
    }

    println!();
    println!("   Model:      {}", config.provider.chat_model);
    println!("   Embedding:  {}", config.provider.embedding_model);
    println!("   Knowledge:  {} @ {}", config.knowledge.collection, config.knowledge.base_url());
    println!("   Shop URL:   {}", config.sidecar.shop_url);
    println!("   Gateway:    {}:{}", config.gateway.host, config.gateway.port);
    println!("   Mode:       {:?}", config.assistant.mode);

    Ok(())
}

pub fn print_default() {
    print!("{}", AppConfig::default_toml());
}

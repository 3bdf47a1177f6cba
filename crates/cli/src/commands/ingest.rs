//! `shopdesk ingest` — Load knowledge documents into the vector store.

use std::path::Path;
use std::sync::Arc;

use shopdesk_config::AppConfig;
use shopdesk_core::retrieval::KnowledgeDocument;
use shopdesk_knowledge::ChromaClient;
use shopdesk_providers::DashScopeProvider;
use tracing::info;

pub async fn run(config_path: Option<&Path>, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let documents = parse_documents(&raw).map_err(|e| format!("Invalid documents file {}: {e}", file.display()))?;
    if documents.is_empty() {
        println!("Nothing to ingest: {} holds no documents", file.display());
        return Ok(());
    }

    let provider = Arc::new(DashScopeProvider::from_config(config.require_api_key()?, &config.provider)?);
    let store = ChromaClient::new(&config.knowledge, provider, config.provider.embedding_model.clone())?;

    let collection = store.ensure_collection().await?;
    info!(collection, documents = documents.len(), "Ingesting knowledge documents");

    let added = store.add_documents(&documents).await?;
    println!(
        "📚 Added {added} document(s) to '{}' ({})",
        config.knowledge.collection,
        config.knowledge.base_url()
    );

    Ok(())
}

/// Parse a JSON array of documents, rejecting blank ids and duplicate ids.
pub fn parse_documents(raw: &str) -> Result<Vec<KnowledgeDocument>, String> {
    let documents: Vec<KnowledgeDocument> = serde_json::from_str(raw).map_err(|e| e.to_string())?;

    let mut seen = std::collections::HashSet::new();
    for doc in &documents {
        if doc.id.trim().is_empty() {
            return Err("document with an empty id".into());
        }
        if !seen.insert(doc.id.as_str()) {
            return Err(format!("duplicate document id '{}'", doc.id));
        }
    }
    Ok(documents)
}

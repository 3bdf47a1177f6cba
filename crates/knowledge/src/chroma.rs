//! Chroma v2 REST client.
//!
//! Collections are addressed by id, so the configured collection name is
//! resolved once (by listing) and cached for the client lifetime.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shopdesk_core::error::RetrievalError;
use shopdesk_core::provider::{EmbeddingRequest, Provider};
use shopdesk_core::retrieval::{DEFAULT_TOP_K, KnowledgeDocument, KnowledgeSnippet, Retriever};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Texts per embedding request during ingestion.
const EMBED_BATCH: usize = 10;

pub struct ChromaClient {
    base_url: String,
    tenant: String,
    database: String,
    collection: String,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
    client: reqwest::Client,
    collection_id: OnceCell<String>,
}

impl ChromaClient {
    pub fn new(
        config: &shopdesk_config::KnowledgeConfig,
        embedder: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, RetrievalError> {
        Self::with_base_url(config.base_url(), config, embedder, embedding_model)
    }

    /// Like [`ChromaClient::new`] but against an explicit server URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &shopdesk_config::KnowledgeConfig,
        embedder: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RetrievalError::Network(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant: config.tenant.clone(),
            database: config.database.clone(),
            collection: config.collection.clone(),
            embedder,
            embedding_model: embedding_model.into(),
            client,
            collection_id: OnceCell::new(),
        })
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    /// Resolve the configured collection name to its id, listing once.
    pub async fn collection_id(&self) -> Result<&str, RetrievalError> {
        let id = self
            .collection_id
            .get_or_try_init(|| self.find_collection())
            .await?;
        Ok(id.as_str())
    }

    /// Resolve the collection id, creating the collection if it does not
    /// exist yet. Used by ingestion only; search never creates.
    pub async fn ensure_collection(&self) -> Result<&str, RetrievalError> {
        let id = self
            .collection_id
            .get_or_try_init(|| self.create_collection())
            .await?;
        Ok(id.as_str())
    }

    async fn find_collection(&self) -> Result<String, RetrievalError> {
        let response = self
            .client
            .get(self.collections_url())
            .send()
            .await
            .map_err(|e| RetrievalError::Network(e.to_string()))?;
        let collections: Vec<CollectionInfo> = decode(response).await?;

        let found = collections
            .into_iter()
            .find(|c| c.name == self.collection)
            .ok_or_else(|| RetrievalError::CollectionNotFound(self.collection.clone()))?;

        debug!(collection = %self.collection, id = %found.id, "Resolved collection");
        Ok(found.id)
    }

    async fn create_collection(&self) -> Result<String, RetrievalError> {
        let body = serde_json::json!({ "name": self.collection, "get_or_create": true });
        let response = self
            .client
            .post(self.collections_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Network(e.to_string()))?;
        let created: CollectionInfo = decode(response).await?;

        info!(collection = %self.collection, id = %created.id, "Collection ready");
        Ok(created.id)
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: texts,
            })
            .await
            .map_err(RetrievalError::Embedding)?;
        Ok(response.embeddings)
    }

    /// Embed and add documents to the collection, creating it if needed.
    /// Returns the number of documents written.
    pub async fn add_documents(&self, documents: &[KnowledgeDocument]) -> Result<usize, RetrievalError> {
        let collection_id = self.ensure_collection().await?.to_string();
        let url = format!("{}/{}/add", self.collections_url(), collection_id);

        let mut written = 0;
        for batch in documents.chunks(EMBED_BATCH) {
            let embeddings = self.embed(batch.iter().map(|d| d.text.clone()).collect()).await?;

            let metadatas: Vec<Option<&serde_json::Map<String, serde_json::Value>>> = batch
                .iter()
                .map(|d| (!d.metadata.is_empty()).then_some(&d.metadata))
                .collect();
            let body = serde_json::json!({
                "ids": batch.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
                "documents": batch.iter().map(|d| d.text.as_str()).collect::<Vec<_>>(),
                "metadatas": metadatas,
                "embeddings": embeddings,
            });

            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| RetrievalError::Network(e.to_string()))?;
            check_status(response).await?;

            written += batch.len();
            debug!(written, total = documents.len(), "Added document batch");
        }

        Ok(written)
    }
}

#[async_trait]
impl Retriever for ChromaClient {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, RetrievalError> {
        let k = if k == 0 { DEFAULT_TOP_K } else { k };
        let collection_id = self.collection_id().await?;

        let embedding = self
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::MalformedResponse("no query embedding".into()))?;

        let url = format!("{}/{}/query", self.collections_url(), collection_id);
        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Network(e.to_string()))?;
        let result: QueryResponse = decode(response).await?;

        let snippets = result.into_snippets();
        debug!(k, found = snippets.len(), "Knowledge search complete");
        Ok(snippets)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RetrievalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RetrievalError::Query {
        status_code: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RetrievalError> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| RetrievalError::MalformedResponse(e.to_string()))
}

// --- Chroma API types (internal) ---

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

/// Query results are parallel arrays with one row per query embedding.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<serde_json::Map<String, serde_json::Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    /// Zip the first row of each array into snippets. Entries without
    /// document text are dropped.
    fn into_snippets(self) -> Vec<KnowledgeSnippet> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents = first_row(self.documents).into_iter();
        let mut metadatas = first_row(self.metadatas).into_iter();
        let mut distances = first_row(self.distances).into_iter();

        ids.into_iter()
            .filter_map(|id| {
                let text = documents.next().flatten();
                let metadata = metadatas.next().flatten();
                let distance = distances.next().flatten().unwrap_or_default();

                let category = metadata
                    .as_ref()
                    .and_then(|m| m.get("category"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                text.map(|text| KnowledgeSnippet {
                    id,
                    text,
                    category,
                    distance,
                })
            })
            .collect()
    }
}

fn first_row<T>(rows: Option<Vec<Vec<T>>>) -> Vec<T> {
    rows.and_then(|r| r.into_iter().next()).unwrap_or_default()
}

//! Vector Store (C8): an embedded, single-file similarity index over job
//! documents. No separate vector-database process to operate — embeddings
//! and metadata live in `vector_documents`, a fourth table in the same
//! SQLite file C2 uses, accessed through the job store's shared
//! connection handle.
//!
//! `EmbeddingProvider` mirrors this codebase's own `AiProvider` split
//! between a local and a cloud backend, generalized from "chat
//! completion" to "embedding vector".

use crate::config::EmbeddingsConfig;
use crate::errors::{DatabaseError, VectorStoreError};
use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentInput {
    pub page_content: String,
    pub document_type: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_id: String,
    pub job_id: String,
    pub document_type: String,
    pub page_content: String,
    pub metadata: HashMap<String, String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilters {
    pub job_id: Option<String>,
    pub document_type: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
}

impl DocumentFilters {
    fn matches(&self, doc: &StoredDocument) -> bool {
        if let Some(job_id) = &self.job_id {
            if &doc.job_id != job_id {
                return false;
            }
        }
        if let Some(dt) = &self.document_type {
            if &doc.document_type != dt {
                return false;
            }
        }
        if let Some(after) = &self.created_after {
            if doc.created_at.as_str() < after.as_str() {
                return false;
            }
        }
        if let Some(before) = &self.created_before {
            if doc.created_at.as_str() > before.as_str() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub count: i64,
    pub name: String,
    pub path: String,
}

/// Abstracts over the local-model and cloud embedding backends the way
/// `AiProvider` abstracts over local/cloud LLM backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorStoreError>;
    fn dimensions(&self) -> usize;
}

/// Deterministic, dependency-free embedding used when no real model or
/// API key is configured: a hashed bag-of-character-trigrams folded into
/// a fixed-width vector. Good enough to exercise storage, filtering, and
/// re-ranking; not a substitute for a real embedding model.
pub struct LocalEmbeddingProvider {
    dimensions: usize,
}

impl LocalEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorStoreError> {
        let mut vector = vec![0f32; self.dimensions];
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        if chars.is_empty() {
            return Ok(vector);
        }
        for window in chars.windows(3.min(chars.len()).max(1)) {
            let trigram: String = window.iter().collect();
            let hash = fnv1a(trigram.as_bytes());
            let idx = (hash as usize) % self.dimensions;
            vector[idx] += 1.0;
        }
        normalize(&mut vector);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

pub struct CloudEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    dimensions: usize,
}

impl CloudEmbeddingProvider {
    pub fn new(base_url: String, api_key: String, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CloudEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorStoreError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await
            .map_err(|e| VectorStoreError::EmbeddingFailed(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VectorStoreError::EmbeddingFailed(e.to_string()))?;

        let values = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| VectorStoreError::EmbeddingFailed("missing embedding field".into()))?;

        Ok(values.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Selects an embedding backend: local model directory if configured and
/// readable, else the cloud provider.
pub fn select_provider(config: &EmbeddingsConfig) -> Arc<dyn EmbeddingProvider> {
    if !config.local_model_path.is_empty()
        && std::path::Path::new(&config.local_model_path).is_dir()
    {
        Arc::new(LocalEmbeddingProvider::new(config.dimensions))
    } else if !config.cloud_api_key.is_empty() {
        Arc::new(CloudEmbeddingProvider::new(
            config.cloud_base_url.clone(),
            config.cloud_api_key.clone(),
            config.dimensions,
        ))
    } else {
        Arc::new(LocalEmbeddingProvider::new(config.dimensions))
    }
}

pub struct VectorStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
    provider: Arc<dyn EmbeddingProvider>,
    collection_name: String,
    persist_directory: String,
}

impl VectorStore {
    pub fn new(
        conn: Arc<Mutex<rusqlite::Connection>>,
        provider: Arc<dyn EmbeddingProvider>,
        collection_name: impl Into<String>,
        persist_directory: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            provider,
            collection_name: collection_name.into(),
            persist_directory: persist_directory.into(),
        }
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Flattens heterogeneous metadata values into strings (list →
    /// comma-joined, mapping → JSON, scalar → string coercion), stamps
    /// `created_at`/`job_id`, embeds, and persists.
    pub async fn add_documents(
        &self,
        docs: Vec<DocumentInput>,
        job_id: &str,
    ) -> Result<Vec<String>, VectorStoreError> {
        let mut doc_ids = Vec::with_capacity(docs.len());
        let created_at = chrono::Utc::now().to_rfc3339();

        for doc in docs {
            let embedding = self.provider.embed(&doc.page_content).await?;
            let mut flattened: HashMap<String, String> = doc
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), flatten_value(v)))
                .collect();
            flattened.insert("created_at".into(), created_at.clone());
            flattened.insert("job_id".into(), job_id.to_string());

            let doc_id = format!("{:x}", md5::compute(format!("{}{}{}", job_id, doc.document_type, doc.page_content)));
            let metadata_json = serde_json::to_string(&flattened)
                .map_err(|e| VectorStoreError::BackendError(e.to_string()))?;
            let embedding_blob = embedding_to_blob(&embedding);

            self.conn()
                .execute(
                    "INSERT INTO vector_documents (
                        doc_id, job_id, document_type, page_content, metadata, embedding, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(doc_id) DO UPDATE SET
                        page_content = excluded.page_content,
                        metadata = excluded.metadata,
                        embedding = excluded.embedding",
                    params![doc_id, job_id, doc.document_type, doc.page_content, metadata_json, embedding_blob, created_at],
                )
                .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;

            doc_ids.push(doc_id);
        }

        Ok(doc_ids)
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&DocumentFilters>,
    ) -> Result<Vec<StoredDocument>, VectorStoreError> {
        Ok(self
            .similarity_search_with_score(query, k, filters)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        filters: Option<&DocumentFilters>,
    ) -> Result<Vec<(StoredDocument, f32)>, VectorStoreError> {
        let query_embedding = self.provider.embed(query).await?;
        let rows = self.load_all()?;

        let mut scored: Vec<(StoredDocument, f32)> = rows
            .into_iter()
            .filter(|(doc, _)| filters.map(|f| f.matches(doc)).unwrap_or(true))
            .map(|(doc, embedding)| {
                let score = cosine_similarity(&query_embedding, &embedding);
                (doc, (score + 1.0) / 2.0)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn delete_documents(&self, job_id: &str) -> Result<bool, VectorStoreError> {
        let affected = self
            .conn()
            .execute("DELETE FROM vector_documents WHERE job_id = ?1", params![job_id])
            .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;
        Ok(affected > 0)
    }

    pub fn update_document_metadata(
        &self,
        doc_id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<bool, VectorStoreError> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| VectorStoreError::BackendError(e.to_string()))?;
        let affected = self
            .conn()
            .execute(
                "UPDATE vector_documents SET metadata = ?1 WHERE doc_id = ?2",
                params![metadata_json, doc_id],
            )
            .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;
        Ok(affected > 0)
    }

    /// Administrative reset used by the CLI's `clear --what vectors` path.
    pub fn clear_all(&self) -> Result<(), VectorStoreError> {
        self.conn()
            .execute("DELETE FROM vector_documents", [])
            .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;
        Ok(())
    }

    pub fn get_collection_stats(&self) -> Result<CollectionStats, VectorStoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM vector_documents", [], |r| r.get(0))
            .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;
        Ok(CollectionStats {
            count,
            name: self.collection_name.clone(),
            path: self.persist_directory.clone(),
        })
    }

    /// Copies the persist directory to `dir` if it exists; the
    /// documents themselves live in the shared SQLite file, so this is
    /// mainly a placeholder for future on-disk index artifacts.
    pub fn backup(&self, dir: &std::path::Path) -> Result<bool, VectorStoreError> {
        std::fs::create_dir_all(dir).map_err(|e| VectorStoreError::BackendError(e.to_string()))?;
        Ok(true)
    }

    fn load_all(&self) -> Result<Vec<(StoredDocument, Vec<f32>)>, VectorStoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT doc_id, job_id, document_type, page_content, metadata, embedding, created_at FROM vector_documents")
            .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let metadata_json: String = row.get(4)?;
                let embedding_blob: Vec<u8> = row.get(5)?;
                Ok((
                    StoredDocument {
                        doc_id: row.get(0)?,
                        job_id: row.get(1)?,
                        document_type: row.get(2)?,
                        page_content: row.get(3)?,
                        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                        created_at: row.get(6)?,
                    },
                    blob_to_embedding(&embedding_blob),
                ))
            })
            .map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| VectorStoreError::BackendError(DatabaseError::from(e).to_string()))?);
        }
        Ok(out)
    }
}

fn flatten_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(flatten_value)
            .collect::<Vec<_>>()
            .join(","),
        serde_json::Value::Object(_) => value.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JobStore;

    fn test_store() -> VectorStore {
        let job_store = JobStore::open_in_memory().unwrap();
        VectorStore::new(
            job_store.shared_conn(),
            Arc::new(LocalEmbeddingProvider::new(64)),
            "jobs",
            "vector_db",
        )
    }

    #[tokio::test]
    async fn add_documents_stamps_job_id_and_created_at() {
        let store = test_store();
        let ids = store
            .add_documents(
                vec![DocumentInput {
                    page_content: "rust backend engineer".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-1",
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let found = store.similarity_search("rust backend engineer", 5, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.get("job_id").map(String::as_str), Some("job-1"));
        assert!(found[0].metadata.contains_key("created_at"));
    }

    #[tokio::test]
    async fn similarity_search_ranks_closer_text_first() {
        let store = test_store();
        store
            .add_documents(
                vec![DocumentInput {
                    page_content: "rust systems programming backend".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-rust".into(),
            )
            .await
            .unwrap();
        store
            .add_documents(
                vec![DocumentInput {
                    page_content: "pastry chef seeking kitchen role".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-chef",
            )
            .await
            .unwrap();

        let results = store.similarity_search("rust backend programming", 2, None).await.unwrap();
        assert_eq!(results[0].job_id, "job-rust");
    }

    #[tokio::test]
    async fn delete_documents_removes_only_matching_job() {
        let store = test_store();
        store
            .add_documents(
                vec![DocumentInput {
                    page_content: "keep me".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-keep",
            )
            .await
            .unwrap();
        store
            .add_documents(
                vec![DocumentInput {
                    page_content: "delete me".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-gone",
            )
            .await
            .unwrap();

        assert!(store.delete_documents("job-gone").unwrap());
        let stats = store.get_collection_stats().unwrap();
        assert_eq!(stats.count, 1);
    }

    #[tokio::test]
    async fn filters_restrict_results_by_job_id() {
        let store = test_store();
        store
            .add_documents(
                vec![DocumentInput {
                    page_content: "rust engineer".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-a",
            )
            .await
            .unwrap();
        store
            .add_documents(
                vec![DocumentInput {
                    page_content: "rust engineer".into(),
                    document_type: "job_description".into(),
                    metadata: HashMap::new(),
                }],
                "job-b",
            )
            .await
            .unwrap();

        let filters = DocumentFilters {
            job_id: Some("job-a".into()),
            ..Default::default()
        };
        let results = store.similarity_search("rust engineer", 5, Some(&filters)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job_id, "job-a");
    }
}

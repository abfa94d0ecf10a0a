//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! Chunk ids are UUIDs, so they map directly onto Qdrant point ids.
//!
//! # Example
//!
//! ```rust,ignore
//! use pdf_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("pdf_documents", 384).await?;
//! store.upsert("pdf_documents", &chunks).await?;
//! let results = store.similarity_search_with_score("pdf_documents", &query_embedding, 4).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collections use cosine distance. Chunk text and position metadata are
/// stored as point payload.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        error!(backend = "qdrant", error = %e, "qdrant request failed");
        RagError::VectorStoreError { backend: "qdrant".to_string(), message: e.to_string() }
    }

    fn payload(chunk: &Chunk) -> Result<Payload> {
        let metadata: Map<String, Value> =
            chunk.metadata.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
        let value = json!({
            "text": chunk.text,
            "source": chunk.source,
            "page": chunk.page,
            "chunk_index": chunk.chunk_index,
            "start_index": chunk.start_index,
            "document_id": chunk.document_id,
            "metadata": metadata,
        });
        Payload::try_from(value).map_err(Self::map_err)
    }

    fn string(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn integer(payload: &HashMap<String, QdrantValue>, key: &str) -> i64 {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(n)) => *n,
            Some(Kind::DoubleValue(d)) => *d as i64,
            _ => 0,
        }
    }

    fn chunk_from_payload(id: String, payload: &HashMap<String, QdrantValue>) -> Chunk {
        let metadata = match payload.get("metadata").and_then(|v| v.kind.as_ref()) {
            Some(Kind::StructValue(s)) => s
                .fields
                .iter()
                .filter_map(|(k, v)| match &v.kind {
                    Some(Kind::StringValue(s)) => Some((k.clone(), s.clone())),
                    _ => None,
                })
                .collect(),
            _ => HashMap::new(),
        };

        Chunk {
            id,
            text: Self::string(payload, "text"),
            embedding: Vec::new(),
            source: Self::string(payload, "source"),
            page: u32::try_from(Self::integer(payload, "page")).unwrap_or_default(),
            chunk_index: usize::try_from(Self::integer(payload, "chunk_index")).unwrap_or_default(),
            start_index: usize::try_from(Self::integer(payload, "start_index")).unwrap_or_default(),
            metadata,
            document_id: Self::string(payload, "document_id"),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.client.collection_exists(name).await.map_err(Self::map_err)? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn collection_dimensions(&self, name: &str) -> Result<Option<usize>> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(None);
        }
        let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                VectorsConfigKind::Params(params) => Some(params.size as usize),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        Ok(size)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|chunk| {
                Ok(PointStruct::new(chunk.id.clone(), chunk.embedding.clone(), Self::payload(chunk)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn similarity_search_with_score(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), k as u64).with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let id = scored
                    .id
                    .as_ref()
                    .and_then(|pid| match &pid.point_id_options {
                        Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
                        Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                        None => None,
                    })
                    .unwrap_or_default();
                SearchResult { chunk: Self::chunk_from_payload(id, &scored.payload), score: scored.score }
            })
            .collect();

        Ok(results)
    }
}

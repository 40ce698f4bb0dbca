//! Capability seams between the matching pipeline and its backends.
//!
//! The pipeline depends only on these traits; one concrete implementation
//! exists per backend ([`embedding::OpenAiEmbedder`](crate::embedding::OpenAiEmbedder),
//! [`storage::SupabaseStorage`](crate::storage::SupabaseStorage),
//! [`index::QdrantIndex`](crate::index::QdrantIndex),
//! [`store::PgStore`](crate::store::PgStore)). Tests swap in in-memory
//! fakes behind the same seams.
//!
//! All traits are object-safe and `Send + Sync` so handles can be shared
//! across concurrently executing request flows as `Arc<dyn ...>`.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    FoundItem, LostReport, NewFoundItem, NewLostReport, NewMatch, StorageLocator, VectorHit,
};

/// Caption and embedding produced from one image.
#[derive(Debug, Clone)]
pub struct ImageEmbedding {
    /// Natural-language description of the item (bounded length).
    pub caption: String,
    /// Fixed-dimensionality embedding of the caption.
    pub vector: Vec<f32>,
}

/// Turns an image into a caption plus a semantic embedding.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// Identifier of the embedding model, recorded as the match `method`.
    fn model_name(&self) -> &str;

    /// Identifier of the captioning model, recorded on the found item.
    fn caption_model(&self) -> &str;

    /// Caption the image and embed the caption text.
    ///
    /// The returned vector must have the dimensionality configured for the
    /// vector index collection; a mismatch is a configuration error, not a
    /// per-call condition to handle.
    async fn embed_image(&self, bytes: &[u8]) -> Result<ImageEmbedding>;
}

/// Turns free text into a semantic embedding.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Identifier of the embedding model, recorded as the match `method`.
    fn model_name(&self) -> &str;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Persists raw image bytes and returns a retrievable reference.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under a name derived from `filename`.
    ///
    /// Implementations embed a uniqueness token in the stored name so
    /// concurrent uploads of identically-named files never collide.
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StorageLocator>;
}

/// Upsert and filtered similarity search over embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent: re-upserting an id replaces its vector and payload.
    async fn upsert(&self, id: Uuid, vector: &[f32], payload: serde_json::Value) -> Result<()>;

    /// Return at most `top_k` nearest vectors whose payload matches every
    /// `(key, value)` clause in `filter`, ordered by score descending.
    /// An empty result is not an error.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &[(String, String)],
    ) -> Result<Vec<VectorHit>>;
}

/// Durable record of found items, lost reports, and match links.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert a found item and return its generated id.
    async fn insert_found_item(&self, item: &NewFoundItem) -> Result<Uuid>;

    async fn get_found_item(&self, id: Uuid) -> Result<Option<FoundItem>>;

    /// Insert a lost report and return its generated id.
    async fn insert_lost_report(&self, report: &NewLostReport) -> Result<Uuid>;

    async fn get_lost_report(&self, id: Uuid) -> Result<Option<LostReport>>;

    /// Insert match rows all-or-nothing within one transaction.
    ///
    /// Inserting an empty batch is a no-op, not an error.
    async fn insert_matches(&self, matches: &[NewMatch]) -> Result<()>;
}

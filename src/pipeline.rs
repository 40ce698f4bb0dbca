//! The cross-store matching pipeline.
//!
//! Coordinates the object store, embedding provider, relational store, and
//! vector index to ingest a submission and produce ranked candidate matches
//! in the request path. Both ingestion flows are straight-line sagas:
//!
//! ```text
//! found:  upload → caption+embed → insert row → upsert vector
//!              → search (type = lost)  → record matches → respond
//! lost:            embed description → insert row → upsert vector
//!              → search (type = found) → record matches → respond
//! ```
//!
//! Ordering matters: a submission is persisted before it is indexed, so it
//! is never searchable before it is durably stored; the opposite-type filter
//! excludes the vector just written, so a submission can never match itself
//! or anything of its own type.
//!
//! Any failure up to and including the search aborts the flow with a
//! [`PipelineError`]. Recording matches is best-effort enrichment: if the
//! bulk insert fails, the computed matches are still returned and the
//! failure is logged as a warning ([`MatchRecording::Failed`]). Accepted
//! consistency gaps (orphaned blob on early abort, stored-but-unsearchable
//! row on index failure, unrecorded matches) are deliberate; there is no
//! compensation or outbox here.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{ItemKind, NewFoundItem, NewLostReport, NewMatch, StorageLocator, VectorHit};
use crate::traits::{ImageEmbedder, ItemStore, ObjectStore, TextEmbedder, VectorIndex};

/// Whether the match rows for a response were durably recorded.
///
/// `Failed` is the non-fatal persistence warning: the caller still gets the
/// computed matches, only their durability is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRecording {
    Ok,
    Failed,
}

/// One ranked candidate match: the opposite-side id, its similarity score,
/// and a snapshot of its indexed payload.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub id: Uuid,
    pub score: f32,
    pub payload: serde_json::Value,
}

impl From<VectorHit> for MatchCandidate {
    fn from(hit: VectorHit) -> Self {
        Self {
            id: hit.id,
            score: hit.score,
            payload: hit.payload,
        }
    }
}

/// Result of ingesting a found item.
#[derive(Debug, Clone, Serialize)]
pub struct FoundIngest {
    pub item_id: Uuid,
    pub locator: StorageLocator,
    pub matches: Vec<MatchCandidate>,
    pub match_recording: MatchRecording,
}

/// Result of ingesting a lost report.
#[derive(Debug, Clone, Serialize)]
pub struct LostIngest {
    pub report_id: Uuid,
    pub matches: Vec<MatchCandidate>,
    pub match_recording: MatchRecording,
}

/// The matching pipeline, holding injected handles to the four backends.
///
/// Holds no cross-request mutable state; many submissions may run through
/// one `Pipeline` concurrently, each as its own sequential flow.
pub struct Pipeline {
    images: Arc<dyn ImageEmbedder>,
    texts: Arc<dyn TextEmbedder>,
    objects: Arc<dyn ObjectStore>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn ItemStore>,
    default_top_k: usize,
}

impl Pipeline {
    pub fn new(
        images: Arc<dyn ImageEmbedder>,
        texts: Arc<dyn TextEmbedder>,
        objects: Arc<dyn ObjectStore>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn ItemStore>,
        default_top_k: usize,
    ) -> Self {
        Self {
            images,
            texts,
            objects,
            index,
            store,
            default_top_k,
        }
    }

    /// Ingest a found-item photo and return its ranked lost-report matches.
    pub async fn ingest_found_item(
        &self,
        image: &[u8],
        filename: &str,
        location_hint: &str,
        top_k: Option<usize>,
    ) -> Result<FoundIngest, PipelineError> {
        let locator = self
            .objects
            .upload(image, filename)
            .await
            .map_err(PipelineError::Storage)?;

        let embedding = self
            .images
            .embed_image(image)
            .await
            .map_err(PipelineError::Embedding)?;

        let item_id = self
            .store
            .insert_found_item(&NewFoundItem {
                finder_user_id: None,
                image_bucket: locator.bucket.clone(),
                image_path: locator.path.clone(),
                caption_text: embedding.caption.clone(),
                caption_model: Some(self.images.caption_model().to_string()),
                found_at: None,
                location_hint: Some(location_hint.to_string()),
            })
            .await
            .map_err(PipelineError::Persistence)?;

        let payload = serde_json::json!({
            "type": ItemKind::Found.as_str(),
            "image_bucket": locator.bucket,
            "image_path": locator.path,
            "location_hint": location_hint,
        });
        self.index
            .upsert(item_id, &embedding.vector, payload)
            .await
            .map_err(PipelineError::Index)?;

        let hits = self
            .search_opposite(&embedding.vector, ItemKind::Found, top_k)
            .await?;

        let new_matches: Vec<NewMatch> = hits
            .iter()
            .map(|hit| NewMatch {
                found_item_id: item_id,
                lost_report_id: hit.id,
                score: hit.score as f64,
                method: Some(self.images.model_name().to_string()),
            })
            .collect();
        let match_recording = self.record_matches(&new_matches).await;

        info!(
            item_id = %item_id,
            matches = hits.len(),
            "ingested found item"
        );

        Ok(FoundIngest {
            item_id,
            locator,
            matches: hits.into_iter().map(MatchCandidate::from).collect(),
            match_recording,
        })
    }

    /// Ingest a lost-item description and return its ranked found-item matches.
    ///
    /// A blank description is rejected here, before any side effect, so
    /// non-HTTP callers get the same guarantee as the HTTP surface.
    pub async fn ingest_lost_report(
        &self,
        description: &str,
        location_hint: &str,
        top_k: Option<usize>,
    ) -> Result<LostIngest, PipelineError> {
        if description.trim().is_empty() {
            return Err(PipelineError::Invalid(
                "description must not be empty".to_string(),
            ));
        }

        let vector = self
            .texts
            .embed_text(description)
            .await
            .map_err(PipelineError::Embedding)?;

        let report_id = self
            .store
            .insert_lost_report(&NewLostReport {
                reporter_user_id: None,
                description_text: description.to_string(),
                lost_at: None,
                location_hint: Some(location_hint.to_string()),
            })
            .await
            .map_err(PipelineError::Persistence)?;

        let payload = serde_json::json!({
            "type": ItemKind::Lost.as_str(),
            "location_hint": location_hint,
        });
        self.index
            .upsert(report_id, &vector, payload)
            .await
            .map_err(PipelineError::Index)?;

        let hits = self
            .search_opposite(&vector, ItemKind::Lost, top_k)
            .await?;

        let new_matches: Vec<NewMatch> = hits
            .iter()
            .map(|hit| NewMatch {
                found_item_id: hit.id,
                lost_report_id: report_id,
                score: hit.score as f64,
                method: Some(self.texts.model_name().to_string()),
            })
            .collect();
        let match_recording = self.record_matches(&new_matches).await;

        info!(
            report_id = %report_id,
            matches = hits.len(),
            "ingested lost report"
        );

        Ok(LostIngest {
            report_id,
            matches: hits.into_iter().map(MatchCandidate::from).collect(),
            match_recording,
        })
    }

    /// Search the index for the top-K nearest vectors of the opposite type.
    async fn search_opposite(
        &self,
        vector: &[f32],
        kind: ItemKind,
        top_k: Option<usize>,
    ) -> Result<Vec<VectorHit>, PipelineError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let filter = vec![("type".to_string(), kind.opposite().as_str().to_string())];

        self.index
            .search(vector, top_k, &filter)
            .await
            .map_err(PipelineError::Index)
    }

    /// Durably record the computed matches, best-effort.
    async fn record_matches(&self, matches: &[NewMatch]) -> MatchRecording {
        match self.store.insert_matches(matches).await {
            Ok(()) => MatchRecording::Ok,
            Err(e) => {
                warn!(error = %e, count = matches.len(), "failed to record matches");
                MatchRecording::Failed
            }
        }
    }
}

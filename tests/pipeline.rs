//! End-to-end pipeline tests over in-memory backends.
//!
//! Each capability trait gets a small in-memory fake; the pipeline under
//! test is the real one. The stub embedder derives a deterministic vector
//! from the submission text (the "caption" of an image is its raw bytes
//! read as UTF-8), so a found photo and a lost description with identical
//! words embed to identical vectors and rank at the top.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use reclaim::error::PipelineError;
use reclaim::index::cosine_similarity;
use reclaim::models::{
    FoundItem, FoundStatus, LostReport, LostStatus, NewFoundItem, NewLostReport, NewMatch,
    StorageLocator, VectorHit,
};
use reclaim::pipeline::{MatchRecording, Pipeline};
use reclaim::traits::{
    ImageEmbedder, ImageEmbedding, ItemStore, ObjectStore, TextEmbedder, VectorIndex,
};

const DIMS: usize = 8;

fn vec_from_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for (i, b) in text.bytes().enumerate() {
        v[i % DIMS] += (b as f32) / 255.0;
    }
    // Never the zero vector, even for empty input.
    v[0] += 1.0;
    v
}

// ============ Fakes ============

struct StubEmbedder {
    fail: AtomicBool,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding provider unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ImageEmbedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embed-1"
    }

    fn caption_model(&self) -> &str {
        "stub-caption-1"
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<ImageEmbedding> {
        self.check()?;
        let caption = String::from_utf8_lossy(bytes).to_string();
        let vector = vec_from_text(&caption);
        Ok(ImageEmbedding { caption, vector })
    }
}

#[async_trait]
impl TextEmbedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embed-1"
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.check()?;
        Ok(vec_from_text(text))
    }
}

struct MemoryObjects {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail: AtomicBool,
}

impl MemoryObjects {
    fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StorageLocator> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("upload rejected");
        }
        let path = format!("{}_{}", Uuid::new_v4(), filename);
        self.objects
            .write()
            .unwrap()
            .insert(path.clone(), bytes.to_vec());
        Ok(StorageLocator {
            bucket: "test-bucket".to_string(),
            path: path.clone(),
            public_url: format!("memory://test-bucket/{}", path),
        })
    }
}

struct MemoryIndex {
    points: RwLock<HashMap<Uuid, (Vec<f32>, serde_json::Value)>>,
}

impl MemoryIndex {
    fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, id: Uuid, vector: &[f32], payload: serde_json::Value) -> Result<()> {
        self.points
            .write()
            .unwrap()
            .insert(id, (vector.to_vec(), payload));
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &[(String, String)],
    ) -> Result<Vec<VectorHit>> {
        let points = self.points.read().unwrap();
        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|(_, (_, payload))| {
                filter.iter().all(|(key, value)| {
                    payload.get(key).and_then(|v| v.as_str()) == Some(value.as_str())
                })
            })
            .map(|(id, (v, payload))| VectorHit {
                id: *id,
                score: cosine_similarity(vector, v),
                payload: payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

struct MemoryStore {
    found: RwLock<HashMap<Uuid, FoundItem>>,
    lost: RwLock<HashMap<Uuid, LostReport>>,
    matches: RwLock<Vec<NewMatch>>,
    fail_matches: AtomicBool,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            found: RwLock::new(HashMap::new()),
            lost: RwLock::new(HashMap::new()),
            matches: RwLock::new(Vec::new()),
            fail_matches: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn insert_found_item(&self, item: &NewFoundItem) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.found.write().unwrap().insert(
            id,
            FoundItem {
                id,
                finder_user_id: item.finder_user_id,
                image_bucket: item.image_bucket.clone(),
                image_path: item.image_path.clone(),
                caption_text: item.caption_text.clone(),
                caption_model: item.caption_model.clone(),
                found_at: item.found_at,
                location_hint: item.location_hint.clone(),
                status: FoundStatus::Active,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_found_item(&self, id: Uuid) -> Result<Option<FoundItem>> {
        Ok(self.found.read().unwrap().get(&id).cloned())
    }

    async fn insert_lost_report(&self, report: &NewLostReport) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.lost.write().unwrap().insert(
            id,
            LostReport {
                id,
                reporter_user_id: report.reporter_user_id,
                description_text: report.description_text.clone(),
                lost_at: report.lost_at,
                location_hint: report.location_hint.clone(),
                status: LostStatus::Open,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_lost_report(&self, id: Uuid) -> Result<Option<LostReport>> {
        Ok(self.lost.read().unwrap().get(&id).cloned())
    }

    async fn insert_matches(&self, matches: &[NewMatch]) -> Result<()> {
        if self.fail_matches.load(Ordering::SeqCst) {
            bail!("matches table unavailable");
        }
        self.matches.write().unwrap().extend_from_slice(matches);
        Ok(())
    }
}

// ============ Harness ============

struct Harness {
    pipeline: Pipeline,
    embedder: Arc<StubEmbedder>,
    objects: Arc<MemoryObjects>,
    index: Arc<MemoryIndex>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let embedder = Arc::new(StubEmbedder::new());
    let objects = Arc::new(MemoryObjects::new());
    let index = Arc::new(MemoryIndex::new());
    let store = Arc::new(MemoryStore::new());

    let pipeline = Pipeline::new(
        embedder.clone(),
        embedder.clone(),
        objects.clone(),
        index.clone(),
        store.clone(),
        5,
    );

    Harness {
        pipeline,
        embedder,
        objects,
        index,
        store,
    }
}

// ============ Tests ============

#[tokio::test]
async fn test_lost_report_with_empty_index_returns_no_matches() {
    let h = harness();

    let result = h
        .pipeline
        .ingest_lost_report("black leather wallet", "gym", None)
        .await
        .unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(result.match_recording, MatchRecording::Ok);

    // The report itself is stored and indexed with the configured dims.
    let report = h
        .store
        .get_lost_report(result.report_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.description_text, "black leather wallet");
    assert_eq!(report.status, LostStatus::Open);

    let points = h.index.points.read().unwrap();
    let (vector, payload) = points.get(&result.report_id).unwrap();
    assert_eq!(vector.len(), DIMS);
    assert_eq!(payload["type"], "lost");
    assert_eq!(payload["location_hint"], "gym");
}

#[tokio::test]
async fn test_found_item_matches_prior_lost_report() {
    let h = harness();

    let lost = h
        .pipeline
        .ingest_lost_report("black leather wallet", "gym", None)
        .await
        .unwrap();

    let image = b"black leather wallet";
    let result = h
        .pipeline
        .ingest_found_item(image, "wallet.jpg", "lobby", None)
        .await
        .unwrap();

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].id, lost.report_id);
    assert!(result.matches[0].score > 0.99);
    assert_eq!(result.matches[0].payload["type"], "lost");
    assert_eq!(result.match_recording, MatchRecording::Ok);

    // Relational row: active, captioned, with the location hint.
    let item = h
        .store
        .get_found_item(result.item_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, FoundStatus::Active);
    assert_eq!(item.caption_text, "black leather wallet");
    assert_eq!(item.caption_model.as_deref(), Some("stub-caption-1"));
    assert_eq!(item.location_hint.as_deref(), Some("lobby"));
    assert_eq!(item.image_path, result.locator.path);

    // Vector record: same id, found-side payload.
    let points = h.index.points.read().unwrap();
    let (_, payload) = points.get(&result.item_id).unwrap();
    assert_eq!(payload["type"], "found");
    assert_eq!(payload["location_hint"], "lobby");

    // Locator dereferences to the original bytes.
    let objects = h.objects.objects.read().unwrap();
    assert_eq!(objects.get(&result.locator.path).unwrap(), image);

    // Match row links the two sides with the embedding model as method.
    let matches = h.store.matches.read().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].found_item_id, result.item_id);
    assert_eq!(matches[0].lost_report_id, lost.report_id);
    assert_eq!(matches[0].method.as_deref(), Some("stub-embed-1"));
    assert!(matches[0].score.is_finite());
}

#[tokio::test]
async fn test_blank_description_rejected_before_side_effects() {
    let h = harness();

    for description in ["", "   ", "\n\t"] {
        let err = h
            .pipeline
            .ingest_lost_report(description, "gym", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Invalid(_)));
    }

    // Rejected before any side effect: no row, no vector, no matches.
    assert!(h.store.lost.read().unwrap().is_empty());
    assert!(h.index.points.read().unwrap().is_empty());
    assert!(h.store.matches.read().unwrap().is_empty());
}

#[tokio::test]
async fn test_embedding_failure_aborts_before_persistence() {
    let h = harness();
    h.embedder.fail.store(true, Ordering::SeqCst);

    let err = h
        .pipeline
        .ingest_found_item(b"img1", "item.jpg", "unknown", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Embedding(_)));

    // No row, no vector, no matches. The uploaded blob is the accepted leak.
    assert!(h.store.found.read().unwrap().is_empty());
    assert!(h.index.points.read().unwrap().is_empty());
    assert!(h.store.matches.read().unwrap().is_empty());
    assert_eq!(h.objects.objects.read().unwrap().len(), 1);
}

#[tokio::test]
async fn test_storage_failure_aborts_with_nothing_persisted() {
    let h = harness();
    h.objects.fail.store(true, Ordering::SeqCst);

    let err = h
        .pipeline
        .ingest_found_item(b"img1", "item.jpg", "unknown", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));

    assert!(h.objects.objects.read().unwrap().is_empty());
    assert!(h.store.found.read().unwrap().is_empty());
    assert!(h.index.points.read().unwrap().is_empty());
}

#[tokio::test]
async fn test_match_recording_failure_is_non_fatal() {
    let h = harness();

    for description in ["red wallet", "brown wallet", "black wallet"] {
        h.pipeline
            .ingest_lost_report(description, "unknown", None)
            .await
            .unwrap();
    }

    h.store.fail_matches.store(true, Ordering::SeqCst);

    let result = h
        .pipeline
        .ingest_found_item(b"black wallet", "wallet.jpg", "lobby", None)
        .await
        .unwrap();

    // The caller still gets all three computed matches.
    assert_eq!(result.matches.len(), 3);
    assert_eq!(result.match_recording, MatchRecording::Failed);
    assert!(h.store.matches.read().unwrap().is_empty());
}

#[tokio::test]
async fn test_top_k_default_and_override() {
    let h = harness();

    for i in 0..7 {
        h.pipeline
            .ingest_lost_report(&format!("umbrella number {}", i), "unknown", None)
            .await
            .unwrap();
    }

    let default = h
        .pipeline
        .ingest_found_item(b"umbrella", "umbrella.jpg", "lobby", None)
        .await
        .unwrap();
    assert_eq!(default.matches.len(), 5);

    let narrow = h
        .pipeline
        .ingest_found_item(b"umbrella", "umbrella.jpg", "lobby", Some(2))
        .await
        .unwrap();
    assert_eq!(narrow.matches.len(), 2);
}

#[tokio::test]
async fn test_results_are_ranked_by_score_descending() {
    let h = harness();

    for description in ["blue umbrella", "silver laptop", "blue umbrella with stripes"] {
        h.pipeline
            .ingest_lost_report(description, "unknown", None)
            .await
            .unwrap();
    }

    let result = h
        .pipeline
        .ingest_found_item(b"blue umbrella", "u.jpg", "lobby", None)
        .await
        .unwrap();

    assert_eq!(result.matches.len(), 3);
    for pair in result.matches.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(result.matches[0].score > 0.99);
}

#[tokio::test]
async fn test_matches_never_link_same_type_entities() {
    let h = harness();

    // Seed both sides.
    for description in ["green backpack", "phone with cracked screen"] {
        h.pipeline
            .ingest_lost_report(description, "unknown", None)
            .await
            .unwrap();
    }
    for image in [&b"green backpack"[..], &b"set of keys"[..]] {
        h.pipeline
            .ingest_found_item(image, "item.jpg", "unknown", None)
            .await
            .unwrap();
    }

    let probe = h
        .pipeline
        .ingest_lost_report("green backpack", "park", None)
        .await
        .unwrap();

    let found_ids: Vec<Uuid> = h.store.found.read().unwrap().keys().copied().collect();
    assert!(!probe.matches.is_empty());
    for m in &probe.matches {
        assert!(found_ids.contains(&m.id));
        assert_ne!(m.id, probe.report_id);
        assert_eq!(m.payload["type"], "found");
    }

    // Every recorded match row resolves to one found- and one lost-side id.
    let lost_ids: Vec<Uuid> = h.store.lost.read().unwrap().keys().copied().collect();
    for m in h.store.matches.read().unwrap().iter() {
        assert!(found_ids.contains(&m.found_item_id));
        assert!(lost_ids.contains(&m.lost_report_id));
    }
}

#[tokio::test]
async fn test_duplicate_submissions_create_distinct_records() {
    let h = harness();

    let first = h
        .pipeline
        .ingest_found_item(b"img1", "photo.jpg", "lobby", None)
        .await
        .unwrap();
    let second = h
        .pipeline
        .ingest_found_item(b"img1", "photo.jpg", "lobby", None)
        .await
        .unwrap();

    assert_ne!(first.item_id, second.item_id);
    assert_ne!(first.locator.path, second.locator.path);
    assert_eq!(h.store.found.read().unwrap().len(), 2);
    assert_eq!(h.index.points.read().unwrap().len(), 2);
}

#[tokio::test]
async fn test_upsert_replaces_vector_for_same_id() {
    let index = MemoryIndex::new();
    let id = Uuid::new_v4();
    let payload = serde_json::json!({ "type": "lost" });

    let v1 = vec![1.0, 0.0, 0.0];
    let v2 = vec![0.0, 1.0, 0.0];

    index.upsert(id, &v1, payload.clone()).await.unwrap();
    index.upsert(id, &v2, payload).await.unwrap();

    assert_eq!(index.points.read().unwrap().len(), 1);

    let filter = vec![("type".to_string(), "lost".to_string())];
    let hits = index.search(&v2, 5, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 1.0).abs() < 1e-6);

    // The old vector no longer matches.
    let hits_old = index.search(&v1, 5, &filter).await.unwrap();
    assert!(hits_old[0].score.abs() < 1e-6);
}

#[tokio::test]
async fn test_search_honors_filter_and_top_k_contract() {
    let index = MemoryIndex::new();
    for i in 0..4 {
        let kind = if i % 2 == 0 { "found" } else { "lost" };
        index
            .upsert(
                Uuid::new_v4(),
                &[1.0, i as f32],
                serde_json::json!({ "type": kind }),
            )
            .await
            .unwrap();
    }

    let filter = vec![("type".to_string(), "lost".to_string())];
    let hits = index.search(&[1.0, 1.0], 1, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload["type"], "lost");

    let no_such = vec![("type".to_string(), "misplaced".to_string())];
    assert!(index.search(&[1.0, 1.0], 5, &no_such).await.unwrap().is_empty());
}

//! Vector index client.
//!
//! Speaks the Qdrant REST API directly over reqwest. One collection holds
//! both found- and lost-side vectors, disambiguated by the `type` payload
//! field; searches filter on it with a `must` conjunction of exact matches.
//! Scores are cosine similarity (higher = more similar).
//!
//! # Environment Variables
//!
//! - `QDRANT_API_KEY` — optional; sent as the `api-key` header when set.

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::models::VectorHit;
use crate::traits::VectorIndex;

/// Qdrant-backed vector index.
pub struct QdrantIndex {
    url: String,
    api_key: Option<String>,
    collection: String,
    client: reqwest::Client,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key: std::env::var("QDRANT_API_KEY").ok(),
            collection: config.collection.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.url, self.collection, suffix)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Create the collection if it does not exist (cosine distance, fixed
    /// dimensionality). Called once at startup; a dimensionality change
    /// requires recreating the collection out of band.
    pub async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let exists = self
            .request(self.client.get(self.collection_url("")))
            .send()
            .await?
            .status()
            .is_success();
        if exists {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": dims, "distance": "Cosine" }
        });

        let response = self
            .request(self.client.put(self.collection_url("")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            // Lost a create race: another instance made it first.
            if body_text.contains("already exists") {
                return Ok(());
            }
            bail!("Failed to create collection ({}): {}", status, body_text);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, id: Uuid, vector: &[f32], payload: serde_json::Value) -> Result<()> {
        let body = serde_json::json!({
            "points": [{ "id": id, "vector": vector, "payload": payload }]
        });

        let response = self
            .request(self.client.put(self.collection_url("/points?wait=true")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Vector upsert failed ({}): {}", status, body_text);
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &[(String, String)],
    ) -> Result<Vec<VectorHit>> {
        let body = search_body(vector, top_k, filter);

        let response = self
            .request(self.client.post(self.collection_url("/points/search")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Vector search failed ({}): {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_hits(&json)
    }
}

/// Build the search request body: `must`-conjunction exact-match filter,
/// payload included, at most `top_k` results.
fn search_body(vector: &[f32], top_k: usize, filter: &[(String, String)]) -> serde_json::Value {
    let mut body = serde_json::json!({
        "vector": vector,
        "limit": top_k,
        "with_payload": true,
    });

    if !filter.is_empty() {
        let must: Vec<serde_json::Value> = filter
            .iter()
            .map(|(key, value)| {
                serde_json::json!({ "key": key, "match": { "value": value } })
            })
            .collect();
        body["filter"] = serde_json::json!({ "must": must });
    }

    body
}

/// Parse the `result` array of a search response into [`VectorHit`]s.
fn parse_hits(json: &serde_json::Value) -> Result<Vec<VectorHit>> {
    let result = json
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid search response: missing result array"))?;

    let mut hits = Vec::with_capacity(result.len());
    for item in result {
        let id = item
            .get("id")
            .and_then(|i| i.as_str())
            .and_then(|i| Uuid::parse_str(i).ok())
            .ok_or_else(|| anyhow::anyhow!("Invalid search response: missing or non-uuid id"))?;
        let score = item.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
        let payload = item
            .get("payload")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        hits.push(VectorHit { id, score, payload });
    }
    Ok(hits)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths. Used by the in-memory index fakes in tests and kept
/// here as the reference for the index's score semantics.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_with_filter() {
        let filter = vec![("type".to_string(), "lost".to_string())];
        let body = search_body(&[0.1, 0.2], 5, &filter);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["with_payload"], true);
        assert_eq!(body["filter"]["must"][0]["key"], "type");
        assert_eq!(body["filter"]["must"][0]["match"]["value"], "lost");
    }

    #[test]
    fn test_search_body_without_filter() {
        let body = search_body(&[0.1], 3, &[]);
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn test_parse_hits() {
        let id = Uuid::new_v4();
        let json = serde_json::json!({
            "result": [
                { "id": id.to_string(), "score": 0.91, "payload": { "type": "lost" } }
            ]
        });
        let hits = parse_hits(&json).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert!((hits[0].score - 0.91).abs() < 1e-6);
        assert_eq!(hits[0].payload["type"], "lost");
    }

    #[test]
    fn test_parse_hits_missing_result() {
        let json = serde_json::json!({ "status": "error" });
        assert!(parse_hits(&json).is_err());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}

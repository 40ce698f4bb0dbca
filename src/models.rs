//! Core data models for the lost-and-found matching backend.
//!
//! These types represent the found items, lost reports, and match links that
//! flow through the ingestion and matching pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a found item.
///
/// Mutated by claim/archive workflows outside the matching pipeline;
/// the pipeline only ever creates items as [`FoundStatus::Active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoundStatus {
    Active,
    Claimed,
    Archived,
}

impl FoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoundStatus::Active => "active",
            FoundStatus::Claimed => "claimed",
            FoundStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(FoundStatus::Active),
            "claimed" => Some(FoundStatus::Claimed),
            "archived" => Some(FoundStatus::Archived),
            _ => None,
        }
    }
}

/// Lifecycle status of a lost report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LostStatus {
    Open,
    Resolved,
    Archived,
}

impl LostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LostStatus::Open => "open",
            LostStatus::Resolved => "resolved",
            LostStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(LostStatus::Open),
            "resolved" => Some(LostStatus::Resolved),
            "archived" => Some(LostStatus::Archived),
            _ => None,
        }
    }
}

/// Which side of the lost-and-found domain an indexed vector belongs to.
///
/// Stored as the `type` field of every vector payload and used as the
/// opposite-side filter during candidate search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Found,
    Lost,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Found => "found",
            ItemKind::Lost => "lost",
        }
    }

    /// The side this kind is matched against.
    pub fn opposite(&self) -> Self {
        match self {
            ItemKind::Found => ItemKind::Lost,
            ItemKind::Lost => ItemKind::Found,
        }
    }
}

/// A found item row as persisted in `found_items`.
#[derive(Debug, Clone, Serialize)]
pub struct FoundItem {
    pub id: Uuid,
    pub finder_user_id: Option<Uuid>,
    pub image_bucket: String,
    pub image_path: String,
    pub caption_text: String,
    pub caption_model: Option<String>,
    pub found_at: Option<DateTime<Utc>>,
    pub location_hint: Option<String>,
    pub status: FoundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when the pipeline creates a found item.
///
/// The store assigns the id, `active` status, and server timestamps.
#[derive(Debug, Clone)]
pub struct NewFoundItem {
    pub finder_user_id: Option<Uuid>,
    pub image_bucket: String,
    pub image_path: String,
    pub caption_text: String,
    pub caption_model: Option<String>,
    pub found_at: Option<DateTime<Utc>>,
    pub location_hint: Option<String>,
}

/// A lost report row as persisted in `lost_reports`.
#[derive(Debug, Clone, Serialize)]
pub struct LostReport {
    pub id: Uuid,
    pub reporter_user_id: Option<Uuid>,
    pub description_text: String,
    pub lost_at: Option<DateTime<Utc>>,
    pub location_hint: Option<String>,
    pub status: LostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when the pipeline creates a lost report.
#[derive(Debug, Clone)]
pub struct NewLostReport {
    pub reporter_user_id: Option<Uuid>,
    pub description_text: String,
    pub lost_at: Option<DateTime<Utc>>,
    pub location_hint: Option<String>,
}

/// A match link between one found item and one lost report.
///
/// Created only by the pipeline after a similarity search; immutable once
/// written. Many matches may reference the same found item or lost report.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub found_item_id: Uuid,
    pub lost_report_id: Uuid,
    pub score: f64,
    pub method: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for one match row in a bulk insert.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub found_item_id: Uuid,
    pub lost_report_id: Uuid,
    pub score: f64,
    pub method: Option<String>,
}

/// Reference to an uploaded image: bucket + path, plus the derived
/// publicly resolvable URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLocator {
    pub bucket: String,
    pub path: String,
    pub public_url: String,
}

/// A scored hit returned from the vector index, ordered by score descending.
#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: serde_json::Value,
}

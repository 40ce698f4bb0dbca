//! Relational store backed by Postgres.
//!
//! Append-only inserts plus id lookups for the three entities. Ids are
//! generated app-side with `Uuid::new_v4()` so the vector index can key
//! its records by the same value. The bulk match insert is all-or-nothing
//! within one transaction, independent of the rest of the pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::models::{
    FoundItem, FoundStatus, LostReport, LostStatus, NewFoundItem, NewLostReport, NewMatch,
};
use crate::traits::ItemStore;

/// Postgres implementation of [`ItemStore`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn insert_found_item(&self, item: &NewFoundItem) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO found_items (
                id, finder_user_id, image_bucket, image_path,
                caption_text, caption_model, found_at, location_hint, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(item.finder_user_id)
        .bind(&item.image_bucket)
        .bind(&item.image_path)
        .bind(&item.caption_text)
        .bind(&item.caption_model)
        .bind(item.found_at)
        .bind(&item.location_hint)
        .bind(FoundStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert found item")?;

        Ok(id)
    }

    async fn get_found_item(&self, id: Uuid) -> Result<Option<FoundItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, finder_user_id, image_bucket, image_path,
                   caption_text, caption_model, found_at, location_hint, status,
                   created_at, updated_at
            FROM found_items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get found item {}", id))?;

        row.map(|row| {
            let status: String = row.try_get("status")?;
            Ok(FoundItem {
                id: row.try_get("id")?,
                finder_user_id: row.try_get("finder_user_id")?,
                image_bucket: row.try_get("image_bucket")?,
                image_path: row.try_get("image_path")?,
                caption_text: row.try_get("caption_text")?,
                caption_model: row.try_get("caption_model")?,
                found_at: row.try_get("found_at")?,
                location_hint: row.try_get("location_hint")?,
                status: FoundStatus::parse(&status)
                    .ok_or_else(|| anyhow::anyhow!("Unknown found item status: {}", status))?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn insert_lost_report(&self, report: &NewLostReport) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO lost_reports (
                id, reporter_user_id, description_text, lost_at, location_hint, status
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(report.reporter_user_id)
        .bind(&report.description_text)
        .bind(report.lost_at)
        .bind(&report.location_hint)
        .bind(LostStatus::Open.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert lost report")?;

        Ok(id)
    }

    async fn get_lost_report(&self, id: Uuid) -> Result<Option<LostReport>> {
        let row = sqlx::query(
            r#"
            SELECT id, reporter_user_id, description_text, lost_at, location_hint, status,
                   created_at, updated_at
            FROM lost_reports
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get lost report {}", id))?;

        row.map(|row| {
            let status: String = row.try_get("status")?;
            Ok(LostReport {
                id: row.try_get("id")?,
                reporter_user_id: row.try_get("reporter_user_id")?,
                description_text: row.try_get("description_text")?,
                lost_at: row.try_get("lost_at")?,
                location_hint: row.try_get("location_hint")?,
                status: LostStatus::parse(&status)
                    .ok_or_else(|| anyhow::anyhow!("Unknown lost report status: {}", status))?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn insert_matches(&self, matches: &[NewMatch]) -> Result<()> {
        if matches.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for m in matches {
            sqlx::query(
                r#"
                INSERT INTO matches (id, found_item_id, lost_report_id, score, method)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(m.found_item_id)
            .bind(m.lost_report_id)
            .bind(m.score)
            .bind(&m.method)
            .execute(&mut *tx)
            .await
            .context("Failed to insert match")?;
        }

        tx.commit().await.context("Failed to commit matches")?;
        Ok(())
    }
}

//! Idempotent schema creation.
//!
//! Run by `reclaimd init`. Creates the three tables with their status check
//! constraints and the foreign keys between matches and both entity tables.

use anyhow::Result;
use sqlx::postgres::PgPool;

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS found_items (
            id UUID PRIMARY KEY,
            finder_user_id UUID,
            image_bucket TEXT NOT NULL,
            image_path TEXT NOT NULL,
            caption_text TEXT NOT NULL,
            caption_model TEXT,
            found_at TIMESTAMPTZ,
            location_hint TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            CONSTRAINT found_items_status_check
                CHECK (status IN ('active', 'claimed', 'archived'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lost_reports (
            id UUID PRIMARY KEY,
            reporter_user_id UUID,
            description_text TEXT NOT NULL,
            lost_at TIMESTAMPTZ,
            location_hint TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            CONSTRAINT lost_reports_status_check
                CHECK (status IN ('open', 'resolved', 'archived'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id UUID PRIMARY KEY,
            found_item_id UUID NOT NULL REFERENCES found_items(id),
            lost_report_id UUID NOT NULL REFERENCES lost_reports(id),
            score DOUBLE PRECISION NOT NULL,
            method TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_found_item_id ON matches(found_item_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_lost_report_id ON matches(lost_report_id)")
        .execute(pool)
        .await?;

    Ok(())
}

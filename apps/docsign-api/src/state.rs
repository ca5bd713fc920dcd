//! Application state for DocSign API

use std::sync::Arc;

use anyhow::Result;
use docsign_core::{CompletionOrchestrator, HttpFetcher};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::blob::{BlobFetcher, LocalBlobStore};
use crate::config::Config;
use crate::email::Mailer;

pub type Completion = CompletionOrchestrator<BlobFetcher, Arc<LocalBlobStore>, Arc<Mailer>>;

pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub blobs: Arc<LocalBlobStore>,
    pub mailer: Arc<Mailer>,
    pub completion: Completion,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_url = config.database_url();
        tracing::info!("Connecting to database: {}", db_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        Self::with_pool(pool, config).await
    }

    /// Build state around an existing pool, running migrations first
    pub async fn with_pool(pool: SqlitePool, config: Config) -> Result<Self> {
        Self::run_migrations(&pool).await?;

        let blobs = Arc::new(LocalBlobStore::new(
            config.data_dir.clone(),
            &config.public_base_url,
        ));
        let mailer = Arc::new(Mailer::new(
            config.resend_api_key.clone(),
            config.mail_from.clone(),
        ));
        let fetcher = BlobFetcher::new(
            Arc::clone(&blobs),
            HttpFetcher::new(config.fetch_timeout()),
        );
        let completion =
            CompletionOrchestrator::new(fetcher, Arc::clone(&blobs), Arc::clone(&mailer));

        Ok(Self {
            db: pool,
            config,
            blobs,
            mailer,
            completion,
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS envelopes (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                owner_name TEXT NOT NULL DEFAULT '',
                owner_email TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                signing_mode TEXT NOT NULL DEFAULT 'parallel',
                pdf_url TEXT,
                pdf_key TEXT,
                pdf_sha256 TEXT,
                page_count INTEGER NOT NULL DEFAULT 1,
                signed_pdf_url TEXT,
                signed_pdf_key TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                envelope_id TEXT NOT NULL REFERENCES envelopes(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                token TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                signed_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fields (
                id TEXT PRIMARY KEY,
                envelope_id TEXT NOT NULL REFERENCES envelopes(id) ON DELETE CASCADE,
                recipient_id TEXT NOT NULL,
                page INTEGER NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                width REAL NOT NULL,
                height REAL NOT NULL,
                field_type TEXT NOT NULL,
                required INTEGER NOT NULL DEFAULT 1,
                value TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Indexes for fast lookups
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_envelopes_owner ON envelopes(owner_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_recipients_envelope ON recipients(envelope_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fields_envelope ON fields(envelope_id)")
            .execute(pool)
            .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}

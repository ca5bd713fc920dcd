//! Runtime configuration, from flags or the environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "docsign-api")]
#[command(about = "DocSign envelope and signing API")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// SQLite connection string; defaults to `docsign.db` inside the data dir
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Root directory of the local blob store
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Externally reachable base URL of this server, used in blob URLs
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:3001")]
    pub public_base_url: String,

    /// Base URL of the signing frontend, used in signing links
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:5173")]
    pub frontend_url: String,

    /// Resend API key; email is skipped when unset
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Sender address for outgoing email
    #[arg(long, env = "MAIL_FROM", default_value = "DocSign <noreply@docsign.local>")]
    pub mail_from: String,

    /// Deadline for fetching a source document
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "30")]
    pub fetch_timeout_secs: u64,

    /// Largest accepted PDF upload, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "20971520")]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite:{}?mode=rwc",
                self.data_dir.join("docsign.db").display()
            )
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Request body limit: base64 inflates uploads by a third
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes / 3 * 4 + 64 * 1024
    }

    pub fn signing_url(&self, token: &str) -> String {
        format!("{}/sign/{}", self.frontend_url.trim_end_matches('/'), token)
    }
}

//! CLI arguments, directory layout and server defaults.

use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 16 * 1024 * 1024;
pub const PROGRESS_FILE_NAME: &str = "progress.json";
pub const INDEX_FILE_NAME: &str = "index.html";
pub const ASSETS_DIR: &str = "assets";
pub const DATA_DIR: &str = "data";
pub const PUBLIC_DIR: &str = "public";
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "progress-drive", version, about = "Local study progress server")]
pub struct Args {
    #[arg(
        short = 'r',
        long,
        env = "PROGRESS_ROOT",
        help = "Project root containing index.html, assets/, data/ and public/"
    )]
    pub root: Option<PathBuf>,
    #[arg(
        short = 'b',
        long = "bind",
        env = "PROGRESS_BIND",
        default_value = DEFAULT_BIND,
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PROGRESS_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "PROGRESS_CORS_ORIGINS",
        default_value = "*",
        help = "Comma separated CORS origins (* allows any)"
    )]
    pub cors_origins: String,
    #[arg(
        long,
        env = "PROGRESS_MAX_UPLOAD_SIZE",
        default_value_t = DEFAULT_MAX_UPLOAD_SIZE,
        help = "Max request body size in bytes for progress writes and imports"
    )]
    pub max_upload_size: usize,
}

/// Directory roots resolved once at startup.
#[derive(Clone, Debug)]
pub struct ProjectPaths {
    pub project: PathBuf,
    pub assets: PathBuf,
    pub data: PathBuf,
    pub public: PathBuf,
}

impl ProjectPaths {
    /// Derives `assets/`, `data/` and `public/` under `project`.
    pub fn new(project: PathBuf) -> Self {
        Self {
            assets: project.join(ASSETS_DIR),
            data: project.join(DATA_DIR),
            public: project.join(PUBLIC_DIR),
            project,
        }
    }

    /// Uses the configured root, or the parent of the directory holding the
    /// running executable.
    pub fn resolve(root: Option<&Path>) -> io::Result<Self> {
        if let Some(root) = root {
            return Ok(Self::new(std::path::absolute(root)?));
        }
        let exe = std::env::current_exe()?;
        let base = exe
            .parent()
            .ok_or_else(|| io::Error::other("executable has no parent directory"))?;
        let project = base.parent().unwrap_or(base);
        Ok(Self::new(project.to_path_buf()))
    }

    /// Creates the data root (and parents) if it is missing.
    pub async fn ensure_data_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.data).await
    }

    pub fn index_file(&self) -> PathBuf {
        self.project.join(INDEX_FILE_NAME)
    }

    pub fn progress_file(&self) -> PathBuf {
        self.data.join(PROGRESS_FILE_NAME)
    }
}

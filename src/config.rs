use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_bucket: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked media upload & streaming gateway")]
pub struct Args {
    /// Host to bind to (overrides MEDIAVAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIAVAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// S3-compatible endpoint URL (overrides S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Region passed to the object store client (overrides S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Bucket holding uploaded objects (overrides S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,
}

impl AppConfig {
    /// Read configuration from environment variables with defaults.
    ///
    /// The credential defaults match a local MinIO-style development
    /// deployment; production deployments must override them.
    pub fn from_env() -> Result<Self> {
        let host = env::var("MEDIAVAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = match env::var("MEDIAVAULT_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing MEDIAVAULT_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 8085,
            Err(err) => return Err(err).context("reading MEDIAVAULT_PORT"),
        };

        Ok(Self {
            host,
            port,
            s3_endpoint: env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".into()),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            s3_bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "uploads".into()),
            s3_access_key: env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "admin".into()),
            s3_secret_key: env::var("S3_SECRET_KEY").unwrap_or_else(|_| "strongpassword".into()),
        })
    }

    /// Parse environment variables + CLI args into the final AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        let mut cfg = Self::from_env()?;

        // --- Merge CLI overrides ---
        if let Some(host) = args.host {
            cfg.host = host;
        }
        if let Some(port) = args.port {
            cfg.port = port;
        }
        if let Some(endpoint) = args.s3_endpoint {
            cfg.s3_endpoint = endpoint;
        }
        if let Some(region) = args.s3_region {
            cfg.s3_region = region;
        }
        if let Some(bucket) = args.s3_bucket {
            cfg.s3_bucket = bucket;
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

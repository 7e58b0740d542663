//! Command-line and environment configuration for the sno2 server.

use std::path::PathBuf;

use clap::Parser;

use crate::errors::{AppError, AppResult};
use crate::models::RECORDS_PER_PAGE;
use crate::storage::S3Settings;

pub const DEFAULT_BIND: &str = "127.0.0.1:9000";
pub const DEFAULT_DATABASE: &str = "./sno2.sqlite";
pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10_485_760;

/// Back office for analysts, desks, notes, users and groups.
///
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "sno2", version, about)]
pub struct Cli {
    /// HTTP bind address [env: SNO2_BIND] [default: 127.0.0.1:9000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// SQLite database file [env: SNO2_DATABASE] [default: ./sno2.sqlite]
    #[arg(long, short = 'd')]
    pub database: Option<PathBuf>,

    /// Directory for the rolling JSON log [env: SNO2_LOG_DIR] [default: ./logs]
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Bucket for uploaded files [env: AWS_S3_BUCKET]
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Bucket region [env: AWS_REGION] [default: us-east-1]
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Alternative S3-compatible endpoint [env: AWS_S3_ENDPOINT]
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Largest accepted upload in bytes [env: SNO2_MAX_UPLOAD_BYTES] [default: 10485760]
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database: PathBuf,
    pub log_dir: PathBuf,
    pub s3_bucket: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub max_upload_bytes: u64,
    pub page_size: u32,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            s3_bucket: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_region: None,
            s3_endpoint: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            page_size: RECORDS_PER_PAGE,
            admin_username: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> AppResult<Self> {
        Self::from_cli_and_lookup(cli, |key| std::env::var(key).ok())
    }

    pub fn from_cli_and_lookup<F>(cli: Cli, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = cli
            .bind
            .or_else(|| env("SNO2_BIND"))
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let database = cli
            .database
            .or_else(|| env("SNO2_DATABASE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

        let log_dir = cli
            .log_dir
            .or_else(|| env("SNO2_LOG_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        let max_upload_bytes = match cli.max_upload_bytes {
            Some(bytes) => bytes,
            None => match env("SNO2_MAX_UPLOAD_BYTES") {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    AppError::Config(format!("SNO2_MAX_UPLOAD_BYTES must be a byte count, got '{}'", raw))
                })?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
        };

        Ok(Self {
            bind_addr,
            database,
            log_dir,
            s3_bucket: cli.s3_bucket.or_else(|| env("AWS_S3_BUCKET")),
            s3_access_key: env("AWS_ACCESS_KEY"),
            s3_secret_key: env("AWS_SECRET_KEY"),
            s3_region: cli.s3_region.or_else(|| env("AWS_REGION")),
            s3_endpoint: cli.s3_endpoint.or_else(|| env("AWS_S3_ENDPOINT")),
            max_upload_bytes,
            page_size: RECORDS_PER_PAGE,
            admin_username: env("SNO2_ADMIN_USERNAME"),
            admin_password: env("SNO2_ADMIN_PASSWORD"),
        })
    }

    /// Complete S3 settings, or the list of missing variables.
    pub fn s3_settings(&self) -> Result<S3Settings, String> {
        let mut missing = Vec::new();
        if self.s3_bucket.is_none() {
            missing.push("AWS_S3_BUCKET");
        }
        if self.s3_access_key.is_none() {
            missing.push("AWS_ACCESS_KEY");
        }
        if self.s3_secret_key.is_none() {
            missing.push("AWS_SECRET_KEY");
        }
        match (&self.s3_bucket, &self.s3_access_key, &self.s3_secret_key) {
            (Some(bucket), Some(access_key), Some(secret_key)) => Ok(S3Settings {
                bucket: bucket.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                region: self.s3_region.clone(),
                endpoint: self.s3_endpoint.clone(),
            }),
            _ => Err(format!("{} not set", missing.join(", "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Config, DEFAULT_BIND, DEFAULT_MAX_UPLOAD_BYTES};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_cli_or_env() {
        let config = Config::from_cli_and_lookup(Cli::default(), lookup(&[])).expect("config");
        assert_eq!(config.bind_addr, DEFAULT_BIND);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.s3_settings().expect_err("disabled"), "AWS_S3_BUCKET, AWS_ACCESS_KEY, AWS_SECRET_KEY not set");
    }

    #[test]
    fn cli_takes_precedence_over_env() {
        let cli = Cli {
            bind: Some("0.0.0.0:8080".to_string()),
            database: Some(PathBuf::from("/tmp/cli.sqlite")),
            ..Cli::default()
        };
        let env = lookup(&[
            ("SNO2_BIND", "127.0.0.1:1"),
            ("SNO2_DATABASE", "/tmp/env.sqlite"),
            ("SNO2_MAX_UPLOAD_BYTES", "2048"),
            ("AWS_S3_BUCKET", "sno2-files"),
            ("AWS_ACCESS_KEY", "key"),
            ("AWS_SECRET_KEY", "secret"),
        ]);
        let config = Config::from_cli_and_lookup(cli, env).expect("config");
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.database, PathBuf::from("/tmp/cli.sqlite"));
        assert_eq!(config.max_upload_bytes, 2048);
        let settings = config.s3_settings().expect("s3 configured");
        assert_eq!(settings.bucket, "sno2-files");
        assert_eq!(settings.region(), "us-east-1");
    }

    #[test]
    fn rejects_malformed_upload_limit() {
        let error = Config::from_cli_and_lookup(Cli::default(), lookup(&[("SNO2_MAX_UPLOAD_BYTES", "ten")]))
            .expect_err("invalid");
        assert!(error.to_string().starts_with("CONFIG"));
    }
}

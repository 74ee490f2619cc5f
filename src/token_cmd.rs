//! CLI entry point for `pagewise token`.

use anyhow::{bail, Result};

use crate::auth;
use crate::config::Config;
use crate::db;

/// Mint an API token and print it. The plaintext appears exactly once here;
/// the database keeps only a digest.
pub async fn run_token_create(config: &Config, user: &str) -> Result<()> {
    if user.trim().is_empty() {
        bail!("user must not be empty");
    }

    let pool = db::connect(config).await?;
    let token = auth::create_token(&pool, user).await?;

    println!("token for {}:", user);
    println!("  {}", token);
    println!("shown once; only a digest is stored");

    pool.close().await;
    Ok(())
}

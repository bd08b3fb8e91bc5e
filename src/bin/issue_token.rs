//! Issues a bearer token for local testing.
//!
//! ```text
//! issue-token <user-uuid> <role> [ttl-seconds]
//! ```
//!
//! Signs with `JWT_SECRET` (or the development secret) from the same
//! environment the server reads.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};

use healthpal::api::auth::JwtKeys;
use healthpal::config::HealthPalConfig;
use healthpal::domain::{Role, UserId};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(sub), Some(role)) = (args.next(), args.next()) else {
        bail!("usage: issue-token <user-uuid> <role> [ttl-seconds]");
    };

    let user: uuid::Uuid = sub.parse().context("user id must be a UUID")?;
    let role: Role = role.parse()?;
    let config = HealthPalConfig::from_env()?;
    let ttl = match args.next() {
        Some(raw) => raw.parse().context("ttl must be a number of seconds")?,
        None => config.jwt_ttl_secs,
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_secs();
    let keys = JwtKeys::from_secret(config.jwt_secret.as_bytes());
    let token = keys.issue(UserId::from_uuid(user), role, now, ttl)?;
    println!("{token}");
    Ok(())
}

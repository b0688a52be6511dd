use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const DEFAULT_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_STALLED_AFTER_SECS: i64 = 300;

/// Gateway configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`BANTER_ADDR`).
    pub addr: String,
    /// Root directory for stored attachment bytes (`BANTER_UPLOAD_DIR`).
    pub upload_dir: PathBuf,
    /// How long an anonymous connection may linger (`BANTER_AUTH_TIMEOUT_SECS`).
    pub auth_timeout: Duration,
    /// Period of the stalled-upload sweep (`BANTER_SWEEP_INTERVAL_SECS`).
    pub sweep_interval: Duration,
    /// Age after which an Uploading record counts as stalled
    /// (`BANTER_STALLED_AFTER_SECS`).
    pub stalled_after_ms: i64,
    /// Dev convenience: users created at startup, `BANTER_SEED_USERS` as
    /// comma-separated `id:tenant:display name` triples.
    pub seed_users: Vec<SeedUser>,
}

#[derive(Debug, Clone)]
pub struct SeedUser {
    pub id: String,
    pub tenant_id: String,
    pub display_name: String,
}

impl Config {
    pub fn from_env() -> Self {
        let addr = std::env::var("BANTER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let upload_dir = std::env::var("BANTER_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("banter-uploads"));
        let auth_timeout =
            Duration::from_secs(env_parse("BANTER_AUTH_TIMEOUT_SECS", DEFAULT_AUTH_TIMEOUT_SECS));
        let sweep_interval = Duration::from_secs(env_parse(
            "BANTER_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        ));
        let stalled_after_ms =
            env_parse("BANTER_STALLED_AFTER_SECS", DEFAULT_STALLED_AFTER_SECS) * 1000;
        let seed_users = std::env::var("BANTER_SEED_USERS")
            .map(|raw| parse_seed_users(&raw))
            .unwrap_or_default();

        Self {
            addr,
            upload_dir,
            auth_timeout,
            sweep_interval,
            stalled_after_ms,
            seed_users,
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("ignoring unparsable {}={}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_seed_users(raw: &str) -> Vec<SeedUser> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(tenant_id), Some(display_name))
                    if !id.is_empty() && !tenant_id.is_empty() =>
                {
                    Some(SeedUser {
                        id: id.to_string(),
                        tenant_id: tenant_id.to_string(),
                        display_name: display_name.to_string(),
                    })
                }
                _ => {
                    warn!("ignoring malformed seed user entry: {}", entry);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_users_parsed() {
        let users = parse_seed_users("alice:t1:Alice Smith,bob:t1:Bob, broken , x:y:Z");
        assert_eq!(users.len(), 3);
        assert_eq!(users[0].id, "alice");
        assert_eq!(users[0].display_name, "Alice Smith");
        assert_eq!(users[1].display_name, "Bob");
        assert_eq!(users[2].tenant_id, "y");
    }

    #[test]
    fn test_seed_users_empty_input() {
        assert!(parse_seed_users("").is_empty());
        assert!(parse_seed_users(" , ,").is_empty());
    }
}

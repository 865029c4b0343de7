use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{actions, domain::CategoryId, errors::Error, Result};

/// Typed process configuration, loaded once at startup from the environment
/// (with `.env` fallback for local runs).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub bot_username: String,
    pub admin_ids: Vec<i64>,

    // Storage
    pub database_url: String,
    /// Upper bound on waiting for the storage engine; expiry surfaces as a
    /// `Persistence` error rather than an unbounded stall.
    pub query_timeout: Duration,

    // Delivery pacing and UI limits
    pub send_delay: Duration,
    pub button_label_max_length: usize,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let bot_username = env_str("BOT_USERNAME")
            .map(|s| s.trim().trim_start_matches('@').to_string())
            .unwrap_or_default();
        if bot_username.is_empty() {
            return Err(Error::Config(
                "BOT_USERNAME environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_admin_ids(env_str("ADMIN_IDS"));
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "ADMIN_IDS environment variable is required (comma- or space-separated numeric ids)"
                    .to_string(),
            ));
        }

        let database_url =
            env_str("DATABASE_URL").unwrap_or_else(|| "sqlite://data/csb.db".to_string());
        let query_timeout = Duration::from_millis(env_u64("QUERY_TIMEOUT_MS").unwrap_or(5_000));

        let send_delay = Duration::from_millis(env_u64("SEND_DELAY_MS").unwrap_or(500));
        let button_label_max_length = env_usize("BUTTON_LABEL_MAX_LENGTH").unwrap_or(30);

        let audit_log_path =
            PathBuf::from(env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/csb-audit.log".to_string()));
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            bot_username,
            admin_ids,
            database_url,
            query_timeout,
            send_delay,
            button_label_max_length,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Shareable first-contact link for a category.
    pub fn category_link(&self, id: &CategoryId) -> String {
        format!(
            "https://t.me/{}?start={}",
            self.bot_username,
            actions::deep_link_payload(id)
        )
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

/// Accepts `"1,2,3"` as well as `"1 2 3"` (and mixtures).
fn parse_admin_ids(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .replace(' ', ",")
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_ids_accept_commas_spaces_and_mixtures() {
        assert_eq!(
            parse_admin_ids(Some("123456789,987654321".to_string())),
            vec![123456789, 987654321]
        );
        assert_eq!(
            parse_admin_ids(Some("123456789 987654321".to_string())),
            vec![123456789, 987654321]
        );
        assert_eq!(
            parse_admin_ids(Some(" 1, 2 3 ,".to_string())),
            vec![1, 2, 3]
        );
        assert!(parse_admin_ids(Some("not-a-number".to_string())).is_empty());
        assert!(parse_admin_ids(None).is_empty());
    }
}

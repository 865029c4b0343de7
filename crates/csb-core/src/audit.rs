//! Append-only audit trail for privileged operations.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::UserId, Result};

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    /// A privileged mutation that went through (category created, files
    /// committed, something deleted).
    pub fn admin_action(user: UserId, action: &str, category_id: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "admin_action".to_string(),
            user_id: user.0,
            action: Some(action.to_string()),
            category_id: category_id.map(|s| s.to_string()),
            authorized: None,
            error: None,
        }
    }

    /// An authorization check outcome worth keeping (denials, mostly).
    pub fn auth(user: UserId, authorized: bool) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "auth".to_string(),
            user_id: user.0,
            action: None,
            category_id: None,
            authorized: Some(authorized),
            error: None,
        }
    }

    pub fn error(user: UserId, context: &str, error: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "error".to_string(),
            user_id: user.0,
            action: Some(context.to_string()),
            category_id: None,
            authorized: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: AuditEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push_str(&event.timestamp);
        out.push(' ');
        out.push_str(&event.event);
        out.push_str(" user=");
        out.push_str(&event.user_id.to_string());
        if let Some(action) = &event.action {
            out.push_str(" action=");
            out.push_str(action);
        }
        if let Some(id) = &event.category_id {
            out.push_str(" category=");
            out.push_str(id);
        }
        if let Some(authorized) = event.authorized {
            out.push_str(" authorized=");
            out.push_str(if authorized { "yes" } else { "no" });
        }
        if let Some(err) = &event.error {
            out.push_str(" error=");
            out.push_str(err);
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.log"))
    }

    #[test]
    fn json_mode_writes_one_parseable_line_per_event() {
        let log = AuditLogger::new(tmp_file("csb-audit-json"), true);
        log.write(AuditEvent::admin_action(
            UserId(1),
            "create_category",
            Some("a1b2c3d4"),
        ))
        .unwrap();
        log.write(AuditEvent::auth(UserId(2), false)).unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(v.get("timestamp").is_some());
        }
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn plain_mode_mentions_the_action() {
        let log = AuditLogger::new(tmp_file("csb-audit-plain"), false);
        log.write(AuditEvent::error(UserId(3), "commit", "disk on fire"))
            .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("user=3"));
        assert!(written.contains("error=disk on fire"));
        let _ = std::fs::remove_file(log.path());
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

const SESSION_FILE: &str = "session.json";

/// The signed-in identity. Every store call takes one, so item ownership
/// always comes from here and never from user-supplied fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user_id: String,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[tracing::instrument(skip(data_dir))]
    pub fn current(data_dir: &Path) -> CoreResult<Self> {
        let path = session_path(data_dir);
        if !path.exists() {
            debug!(file = %path.display(), "no session file");
            return Err(CoreError::Unauthenticated);
        }

        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Err(CoreError::Unauthenticated);
        }
        let session: Session = serde_json::from_str(&raw)?;
        if session.user_id.trim().is_empty() {
            return Err(CoreError::Unauthenticated);
        }
        Ok(session)
    }

    #[tracing::instrument(skip(data_dir, now))]
    pub fn sign_in(data_dir: &Path, user_id: &str, now: DateTime<Utc>) -> CoreResult<Self> {
        let user_id = user_id.trim();
        if user_id.is_empty() || user_id.chars().any(char::is_whitespace) {
            return Err(CoreError::invalid(
                "user",
                user_id,
                "must be a single non-empty word",
            ));
        }

        let session = Session {
            user_id: user_id.to_string(),
            signed_in_at: now,
        };
        fs::create_dir_all(data_dir)?;
        fs::write(session_path(data_dir), serde_json::to_string_pretty(&session)?)?;
        info!(user = %session.user_id, "signed in");
        Ok(session)
    }

    /// Returns whether a session was present.
    #[tracing::instrument(skip(data_dir))]
    pub fn sign_out(data_dir: &Path) -> CoreResult<bool> {
        let path = session_path(data_dir);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!("signed out");
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn for_user(user_id: &str) -> Self {
        Session {
            user_id: user_id.to_string(),
            signed_in_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE)
}

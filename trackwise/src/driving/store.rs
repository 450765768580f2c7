//! Session store adapters.
//!
//! - [`JsonFileSessionStore`] writes one pretty-printed JSON file per session
//! - [`MemorySessionStore`] keeps sessions in memory (replay and tests)

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::session::{DrivingSession, SessionId};
use crate::error::StoreError;
use crate::ports::{BoxFuture, SessionStore};

/// Stores each finished session as `<dir>/<session id>.json`.
///
/// Files are written to a temporary name and renamed into place, so a reader
/// never sees a partial session.
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    dir: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location under the platform data directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("trackwise").join("sessions"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(id.as_str())))
    }

    /// Read a previously saved session.
    pub async fn load(&self, id: &SessionId) -> Result<DrivingSession, StoreError> {
        let bytes = tokio::fs::read(self.session_path(id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write(&self, session: &DrivingSession) -> Result<(), StoreError> {
        if session.is_active {
            return Err(StoreError::Rejected(format!(
                "session {} is still active",
                session.id
            )));
        }

        let body = serde_json::to_vec_pretty(session)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.session_path(&session.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), "Session written");
        Ok(())
    }
}

impl SessionStore for JsonFileSessionStore {
    fn save<'a>(&'a self, session: &'a DrivingSession) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.write(session))
    }
}

/// Keep file names to a portable character set.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// A [`SessionStore`] that keeps sessions in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<Vec<DrivingSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> Vec<DrivingSession> {
        self.sessions.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn save<'a>(&'a self, session: &'a DrivingSession) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.sessions.lock().push(session.clone());
            Ok(())
        })
    }
}

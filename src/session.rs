// Session persistence: a tiny JSON record in the user's home directory that
// lets one CLI invocation reuse the cookies obtained by an earlier `login`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".mathemcli";
const SESSION_FILE: &str = "session.json";

/// Authentication record stored between invocations. Treat it as a
/// credential: the file is only ever readable by its owner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub csrf_token: String,
    pub email: String,
}

/// Reads and writes the [`Session`] record at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// `~/.mathemcli/session.json`, or `$MATHEMCLI_HOME/session.json` when
    /// that variable is set.
    pub fn default_location() -> Result<Self> {
        let dir = match std::env::var_os("MATHEMCLI_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir().ok_or(Error::NoHomeDir)?.join(CONFIG_DIR),
        };
        Ok(Self::at(dir.join(SESSION_FILE)))
    }

    /// Store backed by an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when nothing has been saved yet. A file that exists
    /// but cannot be read or parsed is an error.
    pub fn load(&self) -> Result<Option<Session>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no saved session");
                return Ok(None);
            }
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let session = serde_json::from_str(&data).map_err(|source| Error::SessionFormat {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "loaded session");
        Ok(Some(session))
    }

    /// Write the session next to the target first and rename it into place,
    /// so an interrupted write leaves the previous file intact.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)?;
        }

        let data = serde_json::to_string_pretty(session).map_err(|source| {
            Error::SessionFormat {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp = self.path.with_extension("json.tmp");
        write_private_file(&tmp, data.as_bytes())?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(&self.path, e));
        }

        tracing::debug!(path = %self.path.display(), "saved session");
        Ok(())
    }

    /// Remove the saved session. Removing a session that does not exist is
    /// not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "cleared session");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| Error::io(dir, e))?;
    }
    Ok(())
}

fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| Error::io(path, e))?;

    // `mode` only applies on creation; tighten a leftover temp file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::io(path, e))?;
    }

    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Session {
        Session {
            session_id: "s3ss10n".into(),
            csrf_token: "csrf-abc".into(),
            email: "a@b.com".into(),
        }
    }

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::at(dir.path().join(CONFIG_DIR).join(SESSION_FILE))
    }

    #[test]
    fn load_without_file_is_no_session() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).load().unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
    }

    #[test]
    fn saved_file_uses_documented_field_names() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["session_id"], "s3ss10n");
        assert_eq!(value["csrf_token"], "csrf-abc");
        assert_eq!(value["email"], "a@b.com");
        assert!(raw.contains('\n'), "expected indented JSON");
    }

    #[test]
    fn save_overwrites_previous_session() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();

        let rotated = Session {
            session_id: "rotated".into(),
            ..sample()
        };
        store.save(&rotated).unwrap();
        assert_eq!(store.load().unwrap(), Some(rotated));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::at(dir.path().join(SESSION_FILE));
        fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::SessionFormat { .. }), "got {err:?}");
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be cannot be read as a file.
        let store = SessionStore::at(dir.path());
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "got {err:?}");
    }

    #[test]
    fn clear_missing_file_succeeds() {
        let dir = TempDir::new().unwrap();
        store_in(&dir).clear().unwrap();
    }

    #[test]
    fn clear_removes_saved_session() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn session_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();

        let file_mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        let dir_mode = fs::metadata(store.path().parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}

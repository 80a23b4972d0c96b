//! Unique file names for uploads.
//!
//! Each upload lands in its own file, named after a fresh v4 UUID so two
//! concurrent uploads can never collide.  The UUID doubles as the id the
//! library database uses for the track.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Where an upload will be written and the id it is known by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    /// Full destination path, `<dir>/<unique_id><suffix>`.
    pub file_name: PathBuf,
    /// Identifier without directory or suffix.
    pub unique_id: String,
}

impl UploadName {
    /// Builds a name from an explicit id.
    pub fn new(dir: impl AsRef<Path>, unique_id: impl Into<String>, suffix: &str) -> Self {
        let unique_id = unique_id.into();
        let file_name = dir.as_ref().join(format!("{unique_id}{suffix}"));
        Self {
            file_name,
            unique_id,
        }
    }
}

/// Stateless generator of [`UploadName`]s.
pub struct NameGenerator;

impl NameGenerator {
    /// Returns a fresh name `<dir>/<uuid><suffix>`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use audioserver_core::domain::names::NameGenerator;
    ///
    /// let name = NameGenerator::create("/var/audioserver/mp3", ".mp3");
    /// assert!(name.file_name.to_string_lossy().ends_with(".mp3"));
    /// assert_eq!(name.unique_id.len(), 36);
    /// ```
    pub fn create(dir: impl AsRef<Path>, suffix: &str) -> UploadName {
        UploadName::new(dir, Uuid::new_v4().to_string(), suffix)
    }
}

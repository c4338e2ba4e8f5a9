use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::clients::entities::{Playlist, Track};
use crate::clients::errors::{Error, Result};

/// Default file name of the collection, relative to the working directory
pub const DEFAULT_COLLECTION_FILE: &str = "spotify_collection.json";

/// Locally collected API data. Every field is filled lazily and used instead
/// of an API call once present.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub date_collected: Option<DateTime<Local>>,
    pub playlists: Option<Vec<Playlist>>,
    #[serde(default)]
    pub playlist_tracks: HashMap<String, Vec<Track>>,
    #[serde(default)]
    pub playlist_descriptions: HashMap<String, Option<String>>,
    pub saved_tracks: Option<Vec<Track>>,
}

impl Collection {
    #[must_use]
    pub fn is_collected(&self) -> bool {
        self.date_collected.is_some()
    }
}

pub struct CollectionStorage {
    path: PathBuf,
}

impl CollectionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CollectionStorage { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // Returns None when nothing was collected yet
    pub async fn load(&self) -> Result<Option<Collection>> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!("No collected data found in {:?}", self.path);
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        match serde_json::from_str(&contents) {
            Ok(collection) => {
                debug!("Loaded collected data from {:?}", self.path);
                Ok(Some(collection))
            }
            Err(e) => {
                debug!("Failed to parse collected data: {e}");
                Err(Error::CorruptCollection {
                    path: self.path.clone(),
                })
            }
        }
    }

    pub async fn store(&self, collection: &Collection) -> Result<()> {
        let contents = serde_json::to_string_pretty(collection)?;
        tokio::fs::write(&self.path, contents).await?;
        debug!("Stored collected data in {:?}", self.path);
        Ok(())
    }
}

use std::path::PathBuf;

use rspotify::{ClientError, model::IdError};
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Spotify error: {0}")]
    SpotifyError(#[from] ClientError),

    #[error("Invalid Spotify id: {0}")]
    InvalidId(#[from] IdError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("File {path:?} with collected data is corrupt. Please remove it.")]
    CorruptCollection { path: PathBuf },

    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Playlist {0:?} not found")]
    PlaylistNotFound(String),

    #[error("Single playlist expected for {name:?}, but multiple were found: {candidates:?}")]
    AmbiguousPlaylist {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Cannot resolve playlists. Missing: {missing:?}, ambiguous: {ambiguous:?}")]
    UnresolvedPlaylists {
        missing: Vec<String>,
        ambiguous: Vec<String>,
    },

    #[error(
        "Playlist {0:?} already exists: either choose different name or use --allow-replace/--allow-append"
    )]
    TargetExists(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

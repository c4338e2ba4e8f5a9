/// Data entities for tracks, artists and playlists
pub mod entities;
/// Error types and result aliases
pub mod errors;
/// Local cache of collected API data
pub mod local_storage;
/// Spotify API client
pub mod spotify;

use async_trait::async_trait;

pub use local_storage::{Collection, CollectionStorage};
pub use spotify::SpotifyClient;

use entities::{Playlist, Track};
use errors::Result;

/// Maximum number of tracks the API accepts in one write call
pub const WRITE_PAGE_SIZE: usize = 100;

/// Operations on the streaming service the playlist manager relies on.
///
/// All listing methods return fully paginated results.
#[async_trait(?Send)]
pub trait MusicService {
    /// Playlists owned or followed by the current user
    async fn current_playlists(&self) -> Result<Vec<Playlist>>;

    /// Tracks of a playlist, in playlist order
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Description of a playlist, `None` when it has none
    async fn playlist_description(&self, playlist_id: &str) -> Result<Option<String>>;

    /// Tracks from the user's Liked Songs
    async fn saved_tracks(&self) -> Result<Vec<Track>>;

    /// Create a private playlist for the current user
    async fn create_playlist(&self, name: &str, description: &str) -> Result<Playlist>;

    /// Replace every track of a playlist. At most [`WRITE_PAGE_SIZE`] ids.
    async fn replace_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;

    /// Append tracks to a playlist. At most [`WRITE_PAGE_SIZE`] ids.
    async fn add_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;
}

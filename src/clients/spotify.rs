use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use log::{debug, trace};
use rspotify::{
    AuthCodeSpotify, Config, Credentials, OAuth,
    model::{
        FullPlaylist, FullTrack, PlayableId, PlayableItem, PlaylistId, PlaylistItem,
        SavedTrack, SimplifiedPlaylist, TrackId, UserId,
    },
    prelude::*,
};
use tokio::sync::OnceCell;

use crate::clients::{
    MusicService,
    entities::{Artist, Playlist, Track},
    errors::{Error, Result},
};

const DEFAULT_REDIRECT_URI: &str = "https://127.0.0.1:8000/";
const DEFAULT_SCOPES: &[&str] = &[
    "user-library-read",
    "user-library-modify",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-top-read",
];

// Local files have no id and episodes are not tracks, both are skipped
fn track_from_full(track: FullTrack) -> Option<Track> {
    let id = track.id?;
    let artist = track
        .artists
        .into_iter()
        .next()
        .map_or_else(|| "Unknown artist".to_string(), |a| a.name);
    Some(Track {
        id: id.id().to_string(),
        name: track.name,
        artist: Artist { name: artist },
    })
}

fn track_from_item(item: PlaylistItem) -> Option<Track> {
    match item.track {
        Some(PlayableItem::Track(track)) => track_from_full(track),
        _ => None,
    }
}

impl From<SimplifiedPlaylist> for Playlist {
    fn from(p: SimplifiedPlaylist) -> Playlist {
        Playlist {
            id: p.id.id().to_string(),
            name: p.name,
            owner_id: p.owner.id.id().to_string(),
            total_tracks: p.tracks.total,
        }
    }
}

impl From<FullPlaylist> for Playlist {
    fn from(p: FullPlaylist) -> Playlist {
        Playlist {
            id: p.id.id().to_string(),
            name: p.name,
            owner_id: p.owner.id.id().to_string(),
            total_tracks: p.tracks.total,
        }
    }
}

/// Credentials and OAuth settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl SpotifySettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Reads RSPOTIFY_* keys through `lookup`, empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (Some(client_id), Some(client_secret)) =
            (get("RSPOTIFY_CLIENT_ID"), get("RSPOTIFY_CLIENT_SECRET"))
        else {
            return Err(Error::ConfigurationError(
                "RSPOTIFY_CLIENT_ID and RSPOTIFY_CLIENT_SECRET must be configured in environment"
                    .into(),
            ));
        };
        let redirect_uri =
            get("RSPOTIFY_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let scopes = match get("RSPOTIFY_SCOPES") {
            Some(value) => value
                .split(':')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        };

        Ok(SpotifySettings {
            client_id,
            client_secret,
            redirect_uri,
            scopes,
        })
    }
}

pub struct SpotifyClient {
    pub spotify: AuthCodeSpotify,
    user: OnceCell<UserId<'static>>,
}

impl SpotifyClient {
    pub fn new(spotify: AuthCodeSpotify) -> Self {
        SpotifyClient {
            spotify,
            user: OnceCell::new(),
        }
    }

    // Create a SpotifyClient from environment variables or raise a configuration error
    pub fn try_default() -> Result<Self> {
        Ok(Self::with_settings(SpotifySettings::from_env()?))
    }

    #[must_use]
    pub fn with_settings(settings: SpotifySettings) -> Self {
        let creds = Credentials::new(&settings.client_id, &settings.client_secret);
        let oauth = OAuth {
            redirect_uri: settings.redirect_uri,
            scopes: settings.scopes.into_iter().collect(),
            ..Default::default()
        };

        let cache_path = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp")) // Fallback to /tmp if cache directory can't be determined
            .join(".playlist_manager_token_cache");

        let spotify = AuthCodeSpotify::with_config(
            creds,
            oauth,
            Config {
                token_cached: true,
                token_refreshing: true,
                cache_path,
                ..Default::default()
            },
        );

        Self::new(spotify)
    }

    // Authorize the Spotify client via CLI prompt and OAuth flow.
    // Runs once, on the first call that needs the API.
    async fn user_id(&self) -> Result<&UserId<'static>> {
        self.user.get_or_try_init(|| self.authorize_client()).await
    }

    async fn authorize_client(&self) -> Result<UserId<'static>> {
        debug!("Starting Spotify authorization ...");
        let url = self.spotify.get_authorize_url(false)?;
        // This function requires the `cli` feature enabled.
        self.spotify.prompt_for_token(&url).await?;
        let user = self.spotify.me().await?;
        debug!("Authenticated as user: {:?}", user.display_name);
        trace!("Current user data: {user:?}");
        Ok(user.id)
    }
}

fn playable_ids(track_ids: &[String]) -> Result<Vec<PlayableId<'_>>> {
    track_ids
        .iter()
        .map(|id| Ok(PlayableId::Track(TrackId::from_id(id.as_str())?)))
        .collect()
}

#[async_trait(?Send)]
impl MusicService for SpotifyClient {
    async fn current_playlists(&self) -> Result<Vec<Playlist>> {
        self.user_id().await?;
        let playlists: Vec<Playlist> = self
            .spotify
            .current_user_playlists()
            .map_ok(Playlist::from)
            .try_collect()
            .await?;
        debug!("Fetched {} playlists", playlists.len());
        Ok(playlists)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.user_id().await?;
        let id = PlaylistId::from_id(playlist_id)?;
        let items: Vec<PlaylistItem> = self
            .spotify
            .playlist_items(id, None, None)
            .try_collect()
            .await?;
        let tracks: Vec<Track> = items.into_iter().filter_map(track_from_item).collect();
        debug!("Fetched {} tracks of playlist {playlist_id}", tracks.len());
        Ok(tracks)
    }

    async fn playlist_description(&self, playlist_id: &str) -> Result<Option<String>> {
        self.user_id().await?;
        let id = PlaylistId::from_id(playlist_id)?;
        let playlist = self.spotify.playlist(id, None, None).await?;
        Ok(playlist.description.filter(|d| !d.is_empty()))
    }

    // Fetch tracks from Spotify Liked Songs default playlist
    async fn saved_tracks(&self) -> Result<Vec<Track>> {
        self.user_id().await?;
        let saved: Vec<SavedTrack> = self
            .spotify
            .current_user_saved_tracks(None)
            .try_collect()
            .await?;
        let tracks: Vec<Track> = saved
            .into_iter()
            .filter_map(|s| track_from_full(s.track))
            .collect();
        debug!("Fetched {} saved tracks", tracks.len());
        Ok(tracks)
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<Playlist> {
        let user_id = self.user_id().await?.clone();
        let created = self
            .spotify
            .user_playlist_create(user_id, name, Some(false), None, Some(description))
            .await?;
        trace!("Raw playlist data: {created:?}");
        Ok(Playlist::from(created))
    }

    async fn replace_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.user_id().await?;
        let id = PlaylistId::from_id(playlist_id)?;
        self.spotify
            .playlist_replace_items(id, playable_ids(track_ids)?)
            .await?;
        Ok(())
    }

    async fn add_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.user_id().await?;
        let id = PlaylistId::from_id(playlist_id)?;
        self.spotify
            .playlist_add_items(id, playable_ids(track_ids)?, None)
            .await?;
        Ok(())
    }
}

//! Playlist manager - set operations over Spotify playlists
//!
//! This library fetches playlists and liked tracks from Spotify, combines them
//! (intersection, union, difference, membership counting) and writes the
//! result back as a new or existing playlist.

/// Client modules for interacting with Spotify and the local collection
pub mod clients;
/// Commands run against a music service
pub mod manager;
/// Set operations over lists of track ids
pub mod playlist_set;

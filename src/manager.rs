use std::collections::{HashMap, HashSet};

use chrono::Local;
use log::{Level, debug, error, info, log, log_enabled, trace};

use crate::clients::{
    Collection, CollectionStorage, MusicService, WRITE_PAGE_SIZE,
    entities::{Playlist, Track},
    errors::{Error, Result},
};
use crate::playlist_set::{self, MembershipIndex, anchored_regex};

/// Name used in descriptions of generated playlists
pub const PROGRAM_NAME: &str = "playlist-manager";

/// What to do when the target playlist already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingTarget {
    #[default]
    Reject,
    Replace,
    Append,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub dry_run: bool,
    pub existing_target: ExistingTarget,
}

#[derive(Debug, Clone, Default)]
pub struct CounterOptions {
    pub min_playlists: u32,
    /// Defaults to `min_playlists`
    pub max_playlists: Option<u32>,
    pub ignored_name_regex: Option<String>,
    pub ignored_description_regex: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotInPlaylistsOptions {
    pub checked_playlists: Vec<String>,
    pub checked_playlists_name_regex: Option<String>,
    /// Liked Songs are used when unset
    pub source_playlist: Option<String>,
}

/// A row of `show-playlists`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub playlist: Playlist,
    pub track_count: usize,
    pub description: Option<String>,
}

enum Resolved {
    Found(Playlist),
    Missing,
    Ambiguous(Vec<Playlist>),
}

// Playlist the results are written to, checked before any heavy work
struct Target {
    name: String,
    existing: Option<Playlist>,
}

enum WriteStep {
    Create,
    Replace(String),
    Append(String),
}

pub struct PlaylistManager<S> {
    service: S,
    storage: CollectionStorage,
    collection: Collection,
    membership: MembershipIndex,
    processed: HashSet<String>,
    tracks: HashMap<String, Track>,
    write: WriteOptions,
}

impl<S: MusicService> PlaylistManager<S> {
    pub async fn new(service: S, storage: CollectionStorage, write: WriteOptions) -> Result<Self> {
        let collection = match storage.load().await? {
            Some(collection) => {
                info!(
                    "Collected data found in {:?} so no API calls will be made",
                    storage.path()
                );
                if let Some(date) = collection.date_collected {
                    info!("Data was collected on {}", date.to_rfc3339());
                }
                collection
            }
            None => Collection::default(),
        };

        Ok(PlaylistManager {
            service,
            storage,
            collection,
            membership: MembershipIndex::new(),
            processed: HashSet::new(),
            tracks: HashMap::new(),
            write,
        })
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    async fn playlists(&mut self) -> Result<Vec<Playlist>> {
        if let Some(playlists) = &self.collection.playlists {
            trace!("Using collected data for playlists");
            return Ok(playlists.clone());
        }
        let playlists = self.service.current_playlists().await?;
        self.collection.playlists = Some(playlists.clone());
        Ok(playlists)
    }

    async fn playlist_tracks(&mut self, playlist_id: &str) -> Result<Vec<Track>> {
        let tracks = if let Some(tracks) = self.collection.playlist_tracks.get(playlist_id) {
            trace!("Using collected data for tracks of {playlist_id}");
            tracks.clone()
        } else {
            let tracks = self.service.playlist_tracks(playlist_id).await?;
            self.collection
                .playlist_tracks
                .insert(playlist_id.to_string(), tracks.clone());
            tracks
        };
        self.remember(&tracks);
        Ok(tracks)
    }

    async fn playlist_description(&mut self, playlist_id: &str) -> Result<Option<String>> {
        if let Some(description) = self.collection.playlist_descriptions.get(playlist_id) {
            return Ok(description.clone());
        }
        let description = self.service.playlist_description(playlist_id).await?;
        self.collection
            .playlist_descriptions
            .insert(playlist_id.to_string(), description.clone());
        Ok(description)
    }

    async fn saved_tracks(&mut self) -> Result<Vec<Track>> {
        let tracks = if let Some(tracks) = &self.collection.saved_tracks {
            trace!("Using collected data for saved tracks");
            tracks.clone()
        } else {
            let tracks = self.service.saved_tracks().await?;
            self.collection.saved_tracks = Some(tracks.clone());
            tracks
        };
        self.remember(&tracks);
        Ok(tracks)
    }

    fn remember(&mut self, tracks: &[Track]) {
        for track in tracks {
            self.tracks
                .entry(track.id.clone())
                .or_insert_with(|| track.clone());
        }
    }

    // Records which tracks the playlist holds, once per run
    async fn process_playlist(&mut self, playlist: &Playlist) -> Result<()> {
        if self.processed.contains(&playlist.id) {
            return Ok(());
        }
        let tracks = self.playlist_tracks(&playlist.id).await?;
        self.membership.record(&playlist.id, &tracks);
        self.processed.insert(playlist.id.clone());
        Ok(())
    }

    async fn run_collects(&mut self, level: Level) -> Result<()> {
        for playlist in self.playlists().await? {
            self.process_playlist(&playlist).await?;
            self.playlist_description(&playlist.id).await?;
            log!(
                level,
                "Collected or processed playlist {:?} (id={})",
                playlist.name,
                playlist.id
            );
        }
        self.saved_tracks().await?;
        log!(level, "Collected or processed saved tracks");
        Ok(())
    }

    async fn resolve(&mut self, name_or_id: &str) -> Result<Resolved> {
        let playlists = self.playlists().await?;
        if let Some(playlist) = playlists.iter().find(|p| p.id == name_or_id) {
            return Ok(Resolved::Found(playlist.clone()));
        }
        let mut candidates: Vec<Playlist> = playlists
            .into_iter()
            .filter(|p| p.name == name_or_id)
            .collect();
        Ok(match candidates.len() {
            0 => Resolved::Missing,
            1 => Resolved::Found(candidates.remove(0)),
            _ => Resolved::Ambiguous(candidates),
        })
    }

    async fn find_single_playlist(&mut self, name_or_id: &str) -> Result<Option<Playlist>> {
        match self.resolve(name_or_id).await? {
            Resolved::Found(playlist) => Ok(Some(playlist)),
            Resolved::Missing => Ok(None),
            Resolved::Ambiguous(candidates) => {
                log_ambiguous(&[(name_or_id.to_string(), candidates.clone())]);
                Err(Error::AmbiguousPlaylist {
                    name: name_or_id.to_string(),
                    candidates: candidates.into_iter().map(|p| p.id).collect(),
                })
            }
        }
    }

    async fn single_playlist(&mut self, name_or_id: &str) -> Result<Playlist> {
        self.find_single_playlist(name_or_id)
            .await?
            .ok_or_else(|| Error::PlaylistNotFound(name_or_id.to_string()))
    }

    // Resolves every name, reporting all missing and ambiguous ones together.
    // Result is deduplicated by playlist id.
    async fn resolve_all(&mut self, names_or_ids: &[String]) -> Result<Vec<Playlist>> {
        let mut found: Vec<Playlist> = Vec::new();
        let mut missing = Vec::new();
        let mut ambiguous = Vec::new();

        for name_or_id in playlist_set::dedup(names_or_ids) {
            match self.resolve(&name_or_id).await? {
                Resolved::Found(playlist) => {
                    if !found.iter().any(|p| p.id == playlist.id) {
                        found.push(playlist);
                    }
                }
                Resolved::Missing => missing.push(name_or_id),
                Resolved::Ambiguous(candidates) => ambiguous.push((name_or_id, candidates)),
            }
        }

        if !missing.is_empty() {
            error!(
                "Cannot run as some playlists cannot be found: {}",
                missing.join(", ")
            );
        }
        if !ambiguous.is_empty() {
            log_ambiguous(&ambiguous);
        }
        if !missing.is_empty() || !ambiguous.is_empty() {
            return Err(Error::UnresolvedPlaylists {
                missing,
                ambiguous: ambiguous.into_iter().map(|(name, _)| name).collect(),
            });
        }
        Ok(found)
    }

    async fn validate_target(&mut self, name: &str) -> Result<Target> {
        let existing = self.find_single_playlist(name).await?;
        if existing.is_some() && self.write.existing_target == ExistingTarget::Reject {
            error!(
                "Playlist {name:?} already exists: either choose different name or use \
                 --allow-replace/--allow-append"
            );
            return Err(Error::TargetExists(name.to_string()));
        }
        Ok(Target {
            name: name.to_string(),
            existing,
        })
    }

    async fn populate_target(
        &mut self,
        target: &Target,
        track_ids: &[String],
        description: &str,
    ) -> Result<()> {
        if track_ids.is_empty() {
            info!("No tracks matching criteria were found");
            return Ok(());
        }

        info!(
            "Going to add {} tracks to playlist {:?}",
            track_ids.len(),
            target.name
        );
        if log_enabled!(Level::Debug) {
            for id in track_ids {
                match self.tracks.get(id) {
                    Some(track) => debug!(" * {}", track.display()),
                    None => debug!(" * {id}"),
                }
            }
        }

        let step = match (&target.existing, self.write.existing_target) {
            (None, _) => WriteStep::Create,
            (Some(p), ExistingTarget::Replace) => {
                debug!(
                    "Playlist {:?} already exists and tracks in it will be replaced",
                    target.name
                );
                WriteStep::Replace(p.id.clone())
            }
            (Some(p), ExistingTarget::Append) => {
                debug!(
                    "Playlist {:?} already exists and tracks will be appended to it",
                    target.name
                );
                WriteStep::Append(p.id.clone())
            }
            (Some(_), ExistingTarget::Reject) => {
                return Err(Error::TargetExists(target.name.clone()));
            }
        };

        if self.write.dry_run {
            if matches!(step, WriteStep::Create) {
                info!("Skipped playlist creation because of the dry-run");
            }
            info!("Not adding anything because dry run was requested");
            return Ok(());
        }

        let (playlist_id, replace_first) = match step {
            WriteStep::Create => {
                let created = self
                    .service
                    .create_playlist(&target.name, description)
                    .await?;
                info!("Created playlist {:?} (id={})", created.name, created.id);
                (created.id, false)
            }
            WriteStep::Replace(id) => (id, true),
            WriteStep::Append(id) => (id, false),
        };

        trace!(
            "Adding {} tracks to playlist {}",
            track_ids.len(),
            target.name
        );
        for (page, chunk) in track_ids.chunks(WRITE_PAGE_SIZE).enumerate() {
            if page == 0 && replace_first {
                self.service
                    .replace_playlist_tracks(&playlist_id, chunk)
                    .await?;
            } else {
                self.service.add_playlist_tracks(&playlist_id, chunk).await?;
            }
        }
        Ok(())
    }

    /// Every playlist with its track count. Descriptions are fetched only
    /// when `with_descriptions` is set.
    pub async fn show_playlists(&mut self, with_descriptions: bool) -> Result<Vec<PlaylistSummary>> {
        let mut summaries = Vec::new();
        for playlist in self.playlists().await? {
            let track_count = self.playlist_tracks(&playlist.id).await?.len();
            let description = if with_descriptions {
                self.playlist_description(&playlist.id).await?
            } else {
                None
            };
            summaries.push(PlaylistSummary {
                playlist,
                track_count,
                description,
            });
        }
        Ok(summaries)
    }

    /// Fetch all playlists, their tracks and descriptions and the saved
    /// tracks, then store them in the collection file.
    pub async fn collect(&mut self) -> Result<()> {
        self.collection = Collection::default();
        self.membership.clear();
        self.processed.clear();

        self.run_collects(Level::Info).await?;
        self.collection.date_collected = Some(Local::now());
        self.storage.store(&self.collection).await?;

        info!(
            "Playlists and tracks are collected to {:?}",
            self.storage.path()
        );
        debug!(
            "Collected {} playlists and {} saved tracks",
            self.collection.playlists.as_ref().map_or(0, Vec::len),
            self.collection.saved_tracks.as_ref().map_or(0, Vec::len)
        );
        Ok(())
    }

    /// Tracks present in all given playlists. Returns the ids written.
    pub async fn intersect(&mut self, names_or_ids: &[String], target: &str) -> Result<Vec<String>> {
        if playlist_set::dedup(names_or_ids).len() < 2 {
            error!("Intersecting 1 playlist with itself does nothing, so skipped");
            return Ok(Vec::new());
        }
        let target = self.validate_target(target).await?;
        let playlists = self.resolve_all(names_or_ids).await?;
        if playlists.len() < 2 {
            error!("Intersecting 1 playlist with itself does nothing, so skipped");
            return Ok(Vec::new());
        }

        info!("Going to intersect following playlists:");
        let lists = self.track_lists(&playlists).await?;
        let result = playlist_set::intersection(&lists);
        let description = format!(
            "Generated with {PROGRAM_NAME} by intersecting playlists: {}",
            names_or_ids.join(", ")
        );
        self.populate_target(&target, &result, &description).await?;
        Ok(result)
    }

    /// Tracks present in any of the given playlists. Returns the ids written.
    pub async fn union(&mut self, names_or_ids: &[String], target: &str) -> Result<Vec<String>> {
        let target = self.validate_target(target).await?;
        let playlists = self.resolve_all(names_or_ids).await?;

        info!("Going to merge following playlists:");
        let lists = self.track_lists(&playlists).await?;
        let result = playlist_set::union(&lists);
        let description = format!(
            "Generated with {PROGRAM_NAME} by merging playlists: {}",
            names_or_ids.join(", ")
        );
        self.populate_target(&target, &result, &description).await?;
        Ok(result)
    }

    /// Tracks of `base` missing from every `subtracted` playlist
    pub async fn difference(
        &mut self,
        base: &str,
        subtracted: &[String],
        target: &str,
    ) -> Result<Vec<String>> {
        let target = self.validate_target(target).await?;
        let base_playlist = self.single_playlist(base).await?;
        let subtracted_playlists = self.resolve_all(subtracted).await?;

        info!(
            "Going to subtract following playlists from {:?}:",
            base_playlist.name
        );
        let base_tracks = playlist_set::track_ids(&self.playlist_tracks(&base_playlist.id).await?);
        let lists = self.track_lists(&subtracted_playlists).await?;
        let result = playlist_set::difference(&base_tracks, &lists);
        let description = format!(
            "Generated with {PROGRAM_NAME} by subtracting playlists {} from {base}",
            subtracted.join(", ")
        );
        self.populate_target(&target, &result, &description).await?;
        Ok(result)
    }

    async fn track_lists(&mut self, playlists: &[Playlist]) -> Result<Vec<Vec<String>>> {
        let mut lists = Vec::with_capacity(playlists.len());
        for playlist in playlists {
            let tracks = self.playlist_tracks(&playlist.id).await?;
            info!(
                " * id: {}, name: {:?}, num_tracks: {}",
                playlist.id,
                playlist.name,
                tracks.len()
            );
            lists.push(playlist_set::track_ids(&tracks));
        }
        Ok(lists)
    }

    /// Saved tracks that are in between `min` and `max` playlists,
    /// not counting ignored playlists. Returns the ids written.
    pub async fn playlist_counter(&mut self, options: &CounterOptions, target: &str) -> Result<Vec<String>> {
        let min = options.min_playlists;
        let max = options.max_playlists.unwrap_or(min);
        if min > max {
            error!("`--max-playlists` cannot be less than `--min-playlists`");
            return Err(Error::InvalidArguments(
                "`--max-playlists` cannot be less than `--min-playlists`".into(),
            ));
        }
        let ignored_name = anchored_regex(options.ignored_name_regex.as_deref())?;
        let ignored_description = anchored_regex(options.ignored_description_regex.as_deref())?;

        let target = self.validate_target(target).await?;
        if self.collection.is_collected() {
            self.run_collects(Level::Trace).await?;
        } else {
            info!("Will run `collect` command before running counter");
            self.collect().await?;
        }

        let playlists_by_id: HashMap<String, Playlist> = self
            .playlists()
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for track in self.saved_tracks().await? {
            if !seen.insert(track.id.clone()) {
                continue;
            }
            let display = track.display();
            debug!("Processing track: {display:?}");

            let containing: Vec<String> = self
                .membership
                .playlists_of(&track.id)
                .into_iter()
                .map(String::from)
                .collect();
            // Tracks that are in no playlist at all always match
            if containing.is_empty() {
                debug!("Track {display:?} is not in any playlist");
                matched.push(track.id);
                continue;
            }
            let mut count: u32 = 0;
            for playlist_id in containing {
                let Some(playlist) = playlists_by_id.get(&playlist_id) else {
                    continue;
                };
                if ignored_name.as_ref().is_some_and(|re| re.is_match(&playlist.name)) {
                    debug!(
                        "Ignored playlist {:?} for track {display:?} because of name.",
                        playlist.name
                    );
                    continue;
                }
                if let Some(re) = &ignored_description {
                    let description = self.playlist_description(&playlist_id).await?;
                    if re.is_match(description.as_deref().unwrap_or_default()) {
                        debug!(
                            "Ignored playlist {:?} for track {display:?} because of description.",
                            playlist.name
                        );
                        continue;
                    }
                }
                count += 1;
            }

            if (min..=max).contains(&count) {
                matched.push(track.id);
            }
        }

        let description = format!(
            "Generated with {PROGRAM_NAME} by counting playlists number for each saved track"
        );
        self.populate_target(&target, &matched, &description).await?;
        Ok(matched)
    }

    /// Tracks of the source (Liked Songs by default) that are not in any
    /// checked playlist. Returns the ids written.
    pub async fn not_in_playlists(
        &mut self,
        options: &NotInPlaylistsOptions,
        target: &str,
    ) -> Result<Vec<String>> {
        let name_regex = anchored_regex(options.checked_playlists_name_regex.as_deref())?;
        if options.checked_playlists.is_empty() && name_regex.is_none() {
            error!("Either `checked_playlists` or `--checked-playlists-name-regex` is required");
            return Err(Error::InvalidArguments(
                "either checked playlists or --checked-playlists-name-regex is required".into(),
            ));
        }

        let target = self.validate_target(target).await?;
        let all_playlists = self.playlists().await?;

        let mut checked: Vec<Playlist> = Vec::new();
        for name in &options.checked_playlists {
            checked.push(self.single_playlist(name).await?);
        }
        if let Some(re) = &name_regex {
            checked.extend(all_playlists.into_iter().filter(|p| re.is_match(&p.name)));
        }
        let mut checked_ids = HashSet::new();
        checked.retain(|p| checked_ids.insert(p.id.clone()));
        for playlist in &checked {
            self.process_playlist(playlist).await?;
        }

        let names: Vec<String> = checked
            .iter()
            .map(|p| format!("{:?} (id={})", p.name, p.id))
            .collect();
        info!(
            "Going to find tracks not present in next playlists: {}",
            names.join(", ")
        );

        let source = if let Some(source) = &options.source_playlist {
            debug!("Going over tracks from {source:?}");
            let playlist = self.single_playlist(source).await?;
            self.playlist_tracks(&playlist.id).await?
        } else {
            debug!("Going over tracks from Liked/Saved list");
            self.saved_tracks().await?
        };

        debug!("Processing {} track(s)...", source.len());
        let mut matched = Vec::new();
        for track in &source {
            let is_new = !self.membership.is_in_any(&track.id, &checked_ids);
            let action = if is_new { "to be added" } else { "skipped" };
            trace!(" * {}: {action}", track.display());
            if is_new {
                matched.push(track.id.clone());
            }
        }
        let matched = playlist_set::dedup(&matched);

        let description = format!(
            "Generated with {PROGRAM_NAME} by finding tracks not in playlists: {}",
            checked
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.populate_target(&target, &matched, &description).await?;
        Ok(matched)
    }
}

fn log_ambiguous(ambiguous: &[(String, Vec<Playlist>)]) {
    error!("Cannot run as some playlists have non-unique name.");
    info!("Full data on problematic playlists:");
    let mut example_id = None;
    for (name, candidates) in ambiguous {
        info!("Candidates for {name:?} playlist:");
        for candidate in candidates {
            info!(
                " * id: {}, name: {:?}, owner: {}, num_tracks: {}",
                candidate.id, candidate.name, candidate.owner_id, candidate.total_tracks
            );
            example_id = Some(candidate.id.as_str());
        }
    }
    if let Some(id) = example_id {
        info!("If you identified correct playlist then please use id instead of name, e.g. {id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::entities::Artist;
    use async_trait::async_trait;
    use nanoid::nanoid;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Write {
        Create { name: String, description: String },
        Replace { playlist_id: String, ids: Vec<String> },
        Add { playlist_id: String, ids: Vec<String> },
    }

    #[derive(Default)]
    struct FakeService {
        playlists: Vec<Playlist>,
        tracks: HashMap<String, Vec<Track>>,
        descriptions: HashMap<String, String>,
        saved: Vec<Track>,
        reads: AtomicUsize,
        writes: Mutex<Vec<Write>>,
    }

    impl FakeService {
        fn with_playlist(mut self, id: &str, name: &str, track_ids: &[&str]) -> Self {
            self.playlists.push(playlist(id, name));
            self.tracks
                .insert(id.to_string(), track_ids.iter().map(|t| track(t)).collect());
            self
        }

        fn with_description(mut self, id: &str, description: &str) -> Self {
            self.descriptions
                .insert(id.to_string(), description.to_string());
            self
        }

        fn with_saved(mut self, track_ids: &[&str]) -> Self {
            self.saved = track_ids.iter().map(|t| track(t)).collect();
            self
        }

        fn writes(&self) -> Vec<Write> {
            self.writes.lock().expect("poisoned").clone()
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait(?Send)]
    impl MusicService for FakeService {
        async fn current_playlists(&self) -> Result<Vec<Playlist>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.playlists.clone())
        }

        async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.tracks.get(playlist_id).cloned().unwrap_or_default())
        }

        async fn playlist_description(&self, playlist_id: &str) -> Result<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.descriptions.get(playlist_id).cloned())
        }

        async fn saved_tracks(&self) -> Result<Vec<Track>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.saved.clone())
        }

        async fn create_playlist(&self, name: &str, description: &str) -> Result<Playlist> {
            self.writes.lock().expect("poisoned").push(Write::Create {
                name: name.to_string(),
                description: description.to_string(),
            });
            Ok(playlist("new-id", name))
        }

        async fn replace_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
            self.writes.lock().expect("poisoned").push(Write::Replace {
                playlist_id: playlist_id.to_string(),
                ids: track_ids.to_vec(),
            });
            Ok(())
        }

        async fn add_playlist_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
            self.writes.lock().expect("poisoned").push(Write::Add {
                playlist_id: playlist_id.to_string(),
                ids: track_ids.to_vec(),
            });
            Ok(())
        }
    }

    fn playlist(id: &str, name: &str) -> Playlist {
        Playlist {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: "me".to_string(),
            total_tracks: 0,
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artist: Artist {
                name: "Band".to_string(),
            },
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    struct TempCollection(PathBuf);

    impl TempCollection {
        fn new() -> Self {
            TempCollection(
                std::env::temp_dir().join(format!("playlist_manager_collection_{}.json", nanoid!())),
            )
        }

        fn storage(&self) -> CollectionStorage {
            CollectionStorage::new(&self.0)
        }
    }

    impl Drop for TempCollection {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    async fn manager(
        service: FakeService,
        temp: &TempCollection,
        existing_target: ExistingTarget,
    ) -> PlaylistManager<FakeService> {
        let write = WriteOptions {
            dry_run: false,
            existing_target,
        };
        assert_ok!(PlaylistManager::new(service, temp.storage(), write).await)
    }

    fn electro_and_chill() -> FakeService {
        FakeService::default()
            .with_playlist("p1", "Electro", &["a", "b", "c", "d"])
            .with_playlist("p2", "Chill", &["d", "b", "x"])
            .with_playlist("p3", "Rock", &["r", "b"])
    }

    #[tokio::test]
    async fn intersect_creates_target_with_common_tracks() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let result = assert_ok!(m.intersect(&strings(&["Electro", "p2"]), "Both").await);
        assert_eq!(result, strings(&["b", "d"]));
        assert_eq!(
            m.service().writes(),
            vec![
                Write::Create {
                    name: "Both".into(),
                    description: "Generated with playlist-manager by intersecting playlists: Electro, p2"
                        .into(),
                },
                Write::Add {
                    playlist_id: "new-id".into(),
                    ids: strings(&["b", "d"]),
                },
            ]
        );
    }

    #[tokio::test]
    async fn intersect_with_itself_does_nothing() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let result = assert_ok!(m.intersect(&strings(&["Electro", "Electro"]), "Both").await);
        assert!(result.is_empty());
        // name and id of the same playlist
        let result = assert_ok!(m.intersect(&strings(&["Electro", "p1"]), "Both").await);
        assert!(result.is_empty());
        assert!(m.service().writes().is_empty());
    }

    #[tokio::test]
    async fn intersect_reports_missing_and_ambiguous_playlists() {
        let temp = TempCollection::new();
        let service = electro_and_chill().with_playlist("p4", "Chill", &["z"]);
        let mut m = manager(service, &temp, ExistingTarget::Reject).await;

        let err = assert_err!(
            m.intersect(&strings(&["Electro", "Chill", "Nope"]), "Both")
                .await
        );
        match err {
            Error::UnresolvedPlaylists { missing, ambiguous } => {
                assert_eq!(missing, strings(&["Nope"]));
                assert_eq!(ambiguous, strings(&["Chill"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(m.service().writes().is_empty());
    }

    #[tokio::test]
    async fn existing_target_is_rejected_by_default() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let err = assert_err!(m.intersect(&strings(&["Electro", "Chill"]), "Rock").await);
        assert!(matches!(err, Error::TargetExists(name) if name == "Rock"));
        assert!(m.service().writes().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_target_is_an_error() {
        let temp = TempCollection::new();
        let service = electro_and_chill().with_playlist("p4", "Rock", &[]);
        let mut m = manager(service, &temp, ExistingTarget::Replace).await;

        let err = assert_err!(m.intersect(&strings(&["Electro", "Chill"]), "Rock").await);
        assert!(matches!(err, Error::AmbiguousPlaylist { candidates, .. } if candidates.len() == 2));
    }

    #[tokio::test]
    async fn replace_uses_first_page_then_appends() {
        let temp = TempCollection::new();
        let many: Vec<String> = (0..150).map(|i| format!("t{i}")).collect();
        let many_refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let service = FakeService::default()
            .with_playlist("big", "Big", &many_refs)
            .with_playlist("target", "Target", &["old"]);
        let mut m = manager(service, &temp, ExistingTarget::Replace).await;

        let result = assert_ok!(m.union(&strings(&["Big"]), "Target").await);
        assert_eq!(result.len(), 150);
        assert_eq!(
            m.service().writes(),
            vec![
                Write::Replace {
                    playlist_id: "target".into(),
                    ids: many[..100].to_vec(),
                },
                Write::Add {
                    playlist_id: "target".into(),
                    ids: many[100..].to_vec(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn append_only_adds_tracks() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Append).await;

        assert_ok!(m.union(&strings(&["Chill", "Electro"]), "p3").await);
        assert_eq!(
            m.service().writes(),
            vec![Write::Add {
                playlist_id: "p3".into(),
                ids: strings(&["d", "b", "x", "a", "c"]),
            }]
        );
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let temp = TempCollection::new();
        let write = WriteOptions {
            dry_run: true,
            existing_target: ExistingTarget::Reject,
        };
        let mut m = assert_ok!(PlaylistManager::new(electro_and_chill(), temp.storage(), write).await);

        let result = assert_ok!(m.intersect(&strings(&["Electro", "Chill"]), "Both").await);
        assert_eq!(result, strings(&["b", "d"]));
        assert!(m.service().writes().is_empty());
    }

    #[tokio::test]
    async fn difference_subtracts_playlists() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let result = assert_ok!(
            m.difference("Electro", &strings(&["Chill", "Rock"]), "Only electro")
                .await
        );
        assert_eq!(result, strings(&["a", "c"]));

        let err = assert_err!(m.difference("Nope", &strings(&["Chill"]), "Other").await);
        assert!(matches!(err, Error::PlaylistNotFound(name) if name == "Nope"));
    }

    #[tokio::test]
    async fn counter_collects_then_counts_saved_tracks() {
        let temp = TempCollection::new();
        let service = FakeService::default()
            .with_playlist("p1", "Electro", &["a", "b"])
            .with_playlist("p2", "Chill", &["b", "c"])
            .with_playlist("p3", "My Shazam Tracks", &["a", "c"])
            .with_playlist("p4", "Old result", &["c", "d"])
            .with_description("p4", "Generated with playlist-manager by counting")
            .with_saved(&["a", "b", "c", "d", "e", "a"]);
        let mut m = manager(service, &temp, ExistingTarget::Reject).await;

        let options = CounterOptions {
            min_playlists: 0,
            max_playlists: Some(1),
            ignored_name_regex: Some("(Mentor.FM Discovery|.*Shazam.*)".into()),
            ignored_description_regex: Some("Generated with .*".into()),
        };
        let result = assert_ok!(m.playlist_counter(&options, "Lonely").await);
        // b is in two counted playlists, others in at most one
        assert_eq!(result, strings(&["a", "c", "d", "e"]));

        assert!(m.collection().is_collected());
        let stored = assert_ok!(temp.storage().load().await).expect("collection stored");
        assert_eq!(stored.playlist_tracks.len(), 4);
        assert_eq!(stored.saved_tracks.map(|s| s.len()), Some(6));
    }

    #[tokio::test]
    async fn counter_without_filters_counts_every_playlist() {
        let temp = TempCollection::new();
        let service = FakeService::default()
            .with_playlist("p1", "Electro", &["a", "b"])
            .with_playlist("p2", "My Shazam Tracks", &["a"])
            .with_saved(&["a", "b", "z"]);
        let mut m = manager(service, &temp, ExistingTarget::Reject).await;

        let options = CounterOptions {
            min_playlists: 2,
            ..Default::default()
        };
        let result = assert_ok!(m.playlist_counter(&options, "Twice").await);
        // z is in no playlist at all
        assert_eq!(result, strings(&["a", "z"]));
    }

    #[tokio::test]
    async fn counter_always_matches_tracks_without_playlists() {
        let temp = TempCollection::new();
        let service = FakeService::default()
            .with_playlist("p1", "Electro", &["a"])
            .with_playlist("p2", "My Shazam Tracks", &["s"])
            .with_saved(&["a", "z", "s"]);
        let mut m = manager(service, &temp, ExistingTarget::Reject).await;

        let options = CounterOptions {
            min_playlists: 1,
            max_playlists: Some(1),
            ignored_name_regex: Some("(Mentor.FM Discovery|.*Shazam.*)".into()),
            ignored_description_regex: None,
        };
        let result = assert_ok!(m.playlist_counter(&options, "Single").await);
        // s only sits in an ignored playlist, so its count is 0
        assert_eq!(result, strings(&["a", "z"]));
    }

    #[tokio::test]
    async fn counter_reuses_collected_data() {
        let temp = TempCollection::new();
        {
            let service = FakeService::default()
                .with_playlist("p1", "Electro", &["a", "b"])
                .with_playlist("p2", "Chill", &["b"])
                .with_playlist("p3", "Old result", &["a"])
                .with_description("p3", "Generated with playlist-manager by counting")
                .with_saved(&["a", "b", "c"]);
            let mut m = manager(service, &temp, ExistingTarget::Reject).await;
            assert_ok!(m.collect().await);
        }

        let mut m = manager(FakeService::default(), &temp, ExistingTarget::Reject).await;
        assert!(m.collection().is_collected());
        let options = CounterOptions {
            min_playlists: 1,
            ignored_description_regex: Some("Generated with .*".into()),
            ..Default::default()
        };
        let result = assert_ok!(m.playlist_counter(&options, "Once").await);
        assert_eq!(result, strings(&["a", "c"]));
        assert_eq!(m.service().reads(), 0);
    }

    #[tokio::test]
    async fn empty_result_writes_nothing() {
        let temp = TempCollection::new();
        let service = FakeService::default()
            .with_playlist("p1", "Electro", &["a", "b"])
            .with_playlist("p2", "Chill", &["c"])
            .with_playlist("p3", "Target", &["old"]);
        let mut m = manager(service, &temp, ExistingTarget::Replace).await;

        let result = assert_ok!(m.intersect(&strings(&["Electro", "Chill"]), "New").await);
        assert!(result.is_empty());
        let result = assert_ok!(m.difference("Chill", &strings(&["p2"]), "Target").await);
        assert!(result.is_empty());
        assert!(m.service().writes().is_empty());
    }

    #[tokio::test]
    async fn counter_rejects_inverted_range() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let options = CounterOptions {
            min_playlists: 3,
            max_playlists: Some(1),
            ..Default::default()
        };
        let err = assert_err!(m.playlist_counter(&options, "Lonely").await);
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert_eq!(m.service().reads(), 0);
    }

    #[tokio::test]
    async fn not_in_playlists_uses_names_and_regex() {
        let temp = TempCollection::new();
        let service = electro_and_chill()
            .with_playlist("p5", "Rock classics", &["e"])
            .with_saved(&["a", "b", "e", "r", "y", "y"]);
        let mut m = manager(service, &temp, ExistingTarget::Reject).await;

        let options = NotInPlaylistsOptions {
            checked_playlists: strings(&["Electro"]),
            checked_playlists_name_regex: Some("Rock".into()),
            source_playlist: None,
        };
        let result = assert_ok!(m.not_in_playlists(&options, "Unsorted").await);
        assert_eq!(result, strings(&["y"]));
    }

    #[tokio::test]
    async fn not_in_playlists_reads_source_playlist() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let options = NotInPlaylistsOptions {
            checked_playlists: strings(&["Chill"]),
            checked_playlists_name_regex: None,
            source_playlist: Some("Electro".into()),
        };
        let result = assert_ok!(m.not_in_playlists(&options, "Unsorted").await);
        assert_eq!(result, strings(&["a", "c"]));
    }

    #[tokio::test]
    async fn not_in_playlists_requires_checked_playlists() {
        let temp = TempCollection::new();
        let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;

        let options = NotInPlaylistsOptions {
            checked_playlists_name_regex: Some(String::new()),
            ..Default::default()
        };
        let err = assert_err!(m.not_in_playlists(&options, "Unsorted").await);
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn collected_data_replaces_api_reads() {
        let temp = TempCollection::new();
        {
            let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;
            assert_ok!(m.collect().await);
        }

        // same ids, but the service has no data left
        let mut m = manager(FakeService::default(), &temp, ExistingTarget::Reject).await;
        let summaries = assert_ok!(m.show_playlists(true).await);
        let counts: Vec<(String, usize)> = summaries
            .iter()
            .map(|s| (s.playlist.name.clone(), s.track_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("Electro".to_string(), 4),
                ("Chill".to_string(), 3),
                ("Rock".to_string(), 2),
            ]
        );
        let result = assert_ok!(m.intersect(&strings(&["Electro", "Rock"]), "Both").await);
        assert_eq!(result, strings(&["b"]));
        assert_eq!(m.service().reads(), 0);
    }

    #[tokio::test]
    async fn collect_refreshes_stale_collection() {
        let temp = TempCollection::new();
        {
            let mut m = manager(electro_and_chill(), &temp, ExistingTarget::Reject).await;
            assert_ok!(m.collect().await);
        }

        let service = FakeService::default().with_playlist("n1", "New", &["q"]);
        let mut m = manager(service, &temp, ExistingTarget::Reject).await;
        assert_ok!(m.collect().await);

        let stored = assert_ok!(temp.storage().load().await).expect("collection stored");
        let names: Vec<String> = stored
            .playlists
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, strings(&["New"]));
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::{Level, LevelFilter, info, log_enabled};
use playlist_manager::clients::{
    CollectionStorage, SpotifyClient, errors::Result, local_storage::DEFAULT_COLLECTION_FILE,
};
use playlist_manager::manager::{
    CounterOptions, ExistingTarget, NotInPlaylistsOptions, PlaylistManager, WriteOptions,
};

#[derive(Parser)]
#[command(name = "playlist-manager")]
#[command(version, about = "Spotify Playlist Manager", long_about = None)]
pub struct Cli {
    /// 0 prints errors only, 3 prints everything
    #[arg(
        short,
        long,
        global = true,
        default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(0..=3)
    )]
    pub verbosity: u8,

    /// Compute everything but do not create or modify playlists
    #[arg(long, global = true)]
    dry_run: bool,

    /// File with collected playlists and tracks
    #[arg(long, global = true, default_value = DEFAULT_COLLECTION_FILE)]
    collection_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Name or id of the playlist where tracks will be saved
    #[arg(long)]
    target_playlist: String,

    /// If target playlist already exists, replace tracks in it instead of raising error
    #[arg(long, conflicts_with = "allow_append")]
    allow_replace: bool,

    /// If target playlist already exists, append tracks to it instead of raising error
    #[arg(long)]
    allow_append: bool,
}

impl TargetArgs {
    fn existing_target(&self) -> ExistingTarget {
        if self.allow_replace {
            ExistingTarget::Replace
        } else if self.allow_append {
            ExistingTarget::Append
        } else {
            ExistingTarget::Reject
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show all user playlists
    ShowPlaylists,

    /// Collect or update local tracks and playlists data. Once collected, all
    /// other commands use the local data: delete the file or run `collect`
    /// again to use newer data.
    Collect,

    /// Intersect 2+ playlists, e.g. `intersect Instrumental "Electro (softer)"`
    Intersect {
        /// Names or ids of playlists to intersect. A name must be unique.
        #[arg(required = true, num_args = 1..)]
        names_or_ids: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Merge playlists into one without duplicates
    Union {
        /// Names or ids of playlists to merge
        #[arg(required = true, num_args = 1..)]
        names_or_ids: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Tracks of one playlist that are not in any of the others
    Difference {
        /// Name or id of the playlist to take tracks from
        base: String,

        /// Names or ids of playlists whose tracks are removed
        #[arg(required = true, num_args = 1..)]
        subtracted: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create a playlist with saved/liked tracks that are in a specific number
    /// of user playlists, e.g. tracks only in 0-2 playlists. Runs `collect`
    /// first if data is not collected yet.
    PlaylistCounter {
        /// Minimum number of playlists the track must be in
        #[arg(long, default_value_t = 0)]
        min_playlists: u32,

        /// Maximum number of playlists the track must be in (defaults to --min-playlists)
        #[arg(long)]
        max_playlists: Option<u32>,

        /// Playlists with description matching this pattern are not counted
        #[arg(long, default_value = "Generated with .*")]
        ignored_description_regex: String,

        /// Playlists with name matching this pattern are not counted
        #[arg(long, default_value = "(Mentor.FM Discovery|.*Shazam.*)")]
        ignored_name_regex: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create a playlist with saved/liked tracks that are not in some playlists.
    NotInPlaylists {
        /// Names or ids of playlists where tracks should not be present.
        /// Required if --checked-playlists-name-regex is not used.
        checked_playlists: Vec<String>,

        /// Playlists with name matching this pattern are the ones where tracks
        /// should not be present
        #[arg(long)]
        checked_playlists_name_regex: Option<String>,

        /// Name or id of the playlist whose tracks are checked instead of liked tracks
        #[arg(long)]
        source_playlist: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
    },
}

impl Commands {
    fn target(&self) -> Option<&TargetArgs> {
        match self {
            Commands::ShowPlaylists | Commands::Collect => None,
            Commands::Intersect { target, .. }
            | Commands::Union { target, .. }
            | Commands::Difference { target, .. }
            | Commands::PlaylistCounter { target, .. }
            | Commands::NotInPlaylists { target, .. } => Some(target),
        }
    }
}

pub fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module("playlist_manager", level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let write = WriteOptions {
        dry_run: cli.dry_run,
        existing_target: cli
            .command
            .target()
            .map_or(ExistingTarget::Reject, TargetArgs::existing_target),
    };
    let spotify = SpotifyClient::try_default()?;
    let storage = CollectionStorage::new(cli.collection_file);
    let mut manager = PlaylistManager::new(spotify, storage, write).await?;

    match cli.command {
        Commands::ShowPlaylists => {
            for summary in manager.show_playlists(log_enabled!(Level::Debug)).await? {
                let playlist = summary.playlist;
                println!(
                    "{}\t{}\t(owner: {}, tracks: {})",
                    playlist.id, playlist.name, playlist.owner_id, summary.track_count
                );
                if let Some(description) = summary.description {
                    println!("\t{description}");
                }
            }
        }
        Commands::Collect => manager.collect().await?,
        Commands::Intersect {
            names_or_ids,
            target,
        } => {
            manager
                .intersect(&names_or_ids, &target.target_playlist)
                .await?;
        }
        Commands::Union {
            names_or_ids,
            target,
        } => {
            manager.union(&names_or_ids, &target.target_playlist).await?;
        }
        Commands::Difference {
            base,
            subtracted,
            target,
        } => {
            manager
                .difference(&base, &subtracted, &target.target_playlist)
                .await?;
        }
        Commands::PlaylistCounter {
            min_playlists,
            max_playlists,
            ignored_description_regex,
            ignored_name_regex,
            target,
        } => {
            let options = CounterOptions {
                min_playlists,
                max_playlists,
                ignored_name_regex: Some(ignored_name_regex),
                ignored_description_regex: Some(ignored_description_regex),
            };
            manager
                .playlist_counter(&options, &target.target_playlist)
                .await?;
        }
        Commands::NotInPlaylists {
            checked_playlists,
            checked_playlists_name_regex,
            source_playlist,
            target,
        } => {
            let options = NotInPlaylistsOptions {
                checked_playlists,
                checked_playlists_name_regex,
                source_playlist,
            };
            manager
                .not_in_playlists(&options, &target.target_playlist)
                .await?;
        }
    }
    info!("Done");
    Ok(())
}

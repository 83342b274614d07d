use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use sivana::{Engine, EngineConfig, EngineError, IngestMeta};

#[derive(Parser)]
#[command(name = "sivana", about = "Spectral audio fingerprinting and identification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fingerprint an audio file and add it to the index.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        album: Option<String>,
    },
    /// Identify an audio clip against the index.
    Identify { file: PathBuf },
    /// List ingested songs.
    List {
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long)]
        search: Option<String>,
    },
    /// Remove a song by id.
    Remove { song_id: u64 },
    /// Print index-wide statistics.
    Stats,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            error!("failed to open engine: {e}");
            return ExitCode::from(3);
        }
    };

    match run(&engine, cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            let code = match e {
                EngineError::NotFound(_) | EngineError::DuplicatePath(_) | EngineError::EmptyInput => 2,
                _ => 3,
            };
            ExitCode::from(code)
        }
    }
}

fn run(engine: &Engine, command: Command) -> sivana::Result<u8> {
    match command {
        Command::Ingest { file, title, artist, album } => {
            let meta = IngestMeta { title, artist, album };
            let outcome = engine.ingest_file(&file, meta)?;
            println!("ingested song_id={}", outcome.song_id);
            for warning in &outcome.warnings {
                println!("warning: {warning:?}");
            }
            Ok(0)
        }
        Command::Identify { file } => match engine.identify_file(&file)? {
            Some(result) => {
                println!(
                    "MATCH song_id={} title={:?} artist={:?} confidence={:.3} offset={:.2}s",
                    result.song_id, result.title, result.artist, result.confidence, result.time_offset_seconds
                );
                for warning in &result.warnings {
                    println!("warning: {warning:?}");
                }
                Ok(0)
            }
            None => {
                println!("NO MATCH");
                Ok(1)
            }
        },
        Command::List { limit, offset, search } => {
            let songs = engine.list(limit, offset, search.as_deref())?;
            for song in songs {
                println!(
                    "{}\t{}\t{}\t{:.1}s\t{} fingerprints",
                    song.song_id, song.title, song.artist, song.duration_seconds, song.fingerprint_count
                );
            }
            Ok(0)
        }
        Command::Remove { song_id } => {
            engine.remove(song_id)?;
            println!("removed song_id={song_id}");
            Ok(0)
        }
        Command::Stats => {
            let stats = engine.stats()?;
            println!(
                "songs={} fingerprints={} duration_hours={:.2}",
                stats.total_songs, stats.total_fingerprints, stats.total_duration_hours
            );
            Ok(0)
        }
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use song_recognizer::{
    generate_song_fingerprint, AppConfig, AudioLoader, JsonFileIndex, RecognitionResponse,
    Recognizer,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "song-recognizer", about = "Identify audio clips against an index of recordings")]
struct Cli {
    /// Fingerprint index file
    #[arg(long, default_value = "fingerprints.json")]
    db: PathBuf,

    /// JSON configuration overriding the fingerprinting constants
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint a WAV file and add it to the index
    Ingest {
        wav: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        artist: String,
    },
    /// Identify the recording a WAV clip was taken from; prints
    /// `{"recognized": false}` when nothing matches
    Recognize { wav: PathBuf },
    /// List indexed recordings
    List,
    /// Remove a recording and its fingerprints from the index
    Remove { id: u64 },
    /// Print fingerprint statistics for a WAV file without storing it
    Fingerprint { wav: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Ingest { wav, name, artist } => {
            let recognizer = open_recognizer(&cli.db, config)?;
            let waveform = AudioLoader::load_from_wav(&wav)
                .with_context(|| format!("reading {}", wav.display()))?;
            let id = recognizer.ingest(&waveform, &name, &artist)?;
            println!("{}", id);
        }
        Commands::Recognize { wav } => {
            let recognizer = open_recognizer(&cli.db, config)?;
            let waveform = AudioLoader::load_from_wav(&wav)
                .with_context(|| format!("reading {}", wav.display()))?;
            let result = recognizer.recognize(&waveform)?;
            let response = RecognitionResponse::from(&result);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::List => {
            let recognizer = open_recognizer(&cli.db, config)?;
            let recordings = recognizer.list_recordings()?;
            if recordings.is_empty() {
                println!("No recordings indexed");
            }
            for recording in recordings {
                println!(
                    "{:>4}. {} by {} ({:.1}s)",
                    recording.id, recording.name, recording.artist, recording.duration_secs
                );
            }
        }
        Commands::Remove { id } => {
            let recognizer = open_recognizer(&cli.db, config)?;
            if !recognizer.remove_recording(id)? {
                anyhow::bail!("no recording with id {}", id);
            }
            println!("Removed recording {}", id);
        }
        Commands::Fingerprint { wav } => {
            let waveform = AudioLoader::load_from_wav(&wav)
                .with_context(|| format!("reading {}", wav.display()))?;
            let song = generate_song_fingerprint(&waveform, &config.fingerprint)?;
            println!(
                "{} fingerprints over {:.2} seconds",
                song.fingerprints.len(),
                song.duration_secs
            );
        }
    }

    Ok(())
}

fn open_recognizer(db: &Path, config: AppConfig) -> Result<Recognizer<JsonFileIndex>> {
    let index = JsonFileIndex::open(db).with_context(|| format!("opening index {}", db.display()))?;
    Ok(Recognizer::new(index, config)?)
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "musicplayer",
    about = "Schedule JSON beat and melody patterns, and import MIDI files into them!"
)]
pub struct Args {
    /// Prints extra information to the terminal.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a MIDI file into a beat pattern and a melody pattern.
    Import {
        /// Path to the source MIDI file.
        midi: PathBuf,

        /// Where to write the beat pattern JSON. Printed to stdout if omitted.
        #[arg(long = "beat-out")]
        beat_out: Option<PathBuf>,

        /// Where to write the melody pattern JSON. Printed to stdout if omitted.
        #[arg(long = "melody-out")]
        melody_out: Option<PathBuf>,
    },

    /// Dry run: print the synthesis requests a pattern would produce.
    Schedule {
        #[command(flatten)]
        input: PatternInput,

        /// Maximum requests to print.
        #[arg(long, default_value_t = 80)]
        max: usize,
    },

    /// Dispatch a pattern in real time through the logging renderer.
    Play {
        #[command(flatten)]
        input: PatternInput,

        /// Delays the start of the performance by N seconds.
        #[arg(long = "delay-start", default_value_t = 0)]
        delay_start: u64,
    },

    /// Manage saved projects.
    Store {
        /// Path to the project store file.
        #[arg(long, default_value = "musicplayer-projects.json")]
        path: PathBuf,

        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct PatternInput {
    /// Beat pattern JSON file.
    #[arg(short, long)]
    pub beat: Option<PathBuf>,

    /// Melody pattern JSON file.
    #[arg(short = 'm', long)]
    pub melody: Option<PathBuf>,

    /// Tempo used when a pattern does not carry its own bpm.
    #[arg(long, default_value_t = 120.0)]
    pub bpm: f64,

    /// Which patterns to play: both|beat|melody.
    #[arg(long, default_value = "both")]
    pub mode: String,
}

#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// Save a project from pattern files.
    Save {
        name: String,

        #[arg(short, long)]
        beat: Option<PathBuf>,

        #[arg(short = 'm', long)]
        melody: Option<PathBuf>,

        /// Tempo saved with the project.
        #[arg(long)]
        tempo: Option<f64>,
    },

    /// List saved projects, optionally filtered by name.
    List {
        #[arg(long)]
        search: Option<String>,
    },

    /// Print a project as JSON.
    Get { id: String },

    /// Delete a project.
    Delete { id: String },

    /// Export every project and the preferences to a file.
    Export { out: PathBuf },

    /// Merge an exported file into the store.
    Import { file: PathBuf },
}

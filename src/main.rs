use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use musicplayer::{
    Args, Command, LogRenderer, PatternInput, Player, ProjectMetadata, ProjectStore,
    StoreAction, Timeline, arrange, describe_request, import_midi_file, normalize, parse_mode,
    read_pattern_file, schedule,
};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Import {
            midi,
            beat_out,
            melody_out,
        } => run_import(&midi, beat_out.as_deref(), melody_out.as_deref()),
        Command::Schedule { input, max } => run_dry(&input, max),
        Command::Play { input, delay_start } => run_play(&input, delay_start, args.verbose),
        Command::Store { path, action } => run_store(&path, action),
    }
}

fn write_or_print(json: &Value, out: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(json)?;

    match out {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}..!", path.display());
        }
        None => println!("{}", text),
    }

    Ok(())
}

fn run_import(midi: &Path, beat_out: Option<&Path>, melody_out: Option<&Path>) -> Result<()> {
    info!("Importing MIDI file: '{}'...", midi.display());
    let patterns = import_midi_file(midi)?;

    write_or_print(&patterns.beat_json(), beat_out)?;
    write_or_print(&patterns.melody_json(), melody_out)?;

    Ok(())
}

fn load_timeline(path: Option<&PathBuf>, bpm: f64) -> Result<Timeline> {
    let Some(path) = path else {
        return Ok(Timeline {
            bpm,
            ..Timeline::default()
        });
    };

    let value = read_pattern_file(path)?;
    let pattern = normalize(&value, bpm)
        .with_context(|| format!("Invalid pattern in {}", path.display()))?;

    Ok(schedule(&pattern))
}

fn build_timeline(input: &PatternInput) -> Result<Timeline> {
    if input.beat.is_none() && input.melody.is_none() {
        bail!("Pass at least one of --beat or --melody..!")
    }

    let mode = parse_mode(&input.mode);
    let beat = load_timeline(input.beat.as_ref(), input.bpm)?;
    let melody = load_timeline(input.melody.as_ref(), input.bpm)?;

    debug!(
        "Beat: {} requests, melody: {} requests, mode: {:?}",
        beat.requests.len(),
        melody.requests.len(),
        mode
    );

    Ok(arrange(&beat, &melody, mode))
}

fn run_dry(input: &PatternInput, max: usize) -> Result<()> {
    let timeline = build_timeline(input)?;

    info!(
        "Previewing at most {} of {} requests ({:.3}s)..!",
        max,
        timeline.requests.len(),
        timeline.total_seconds
    );
    for (i, request) in timeline.requests.iter().take(max).enumerate() {
        println!("{}", describe_request(i, request));
    }

    Ok(())
}

fn run_play(input: &PatternInput, delay_start: u64, verbose: bool) -> Result<()> {
    let timeline = build_timeline(input)?;

    let player = Player::new(LogRenderer::new(), verbose, delay_start);
    player.load_timeline(timeline)?;

    let player = Arc::new(player);
    let player_for_handler = Arc::clone(&player);

    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping playback..!");
        if let Err(why) = player_for_handler.stop() {
            warn!("Failed to stop playback: {:?}", why);
        }
    })
    .context("Error setting Ctrl-C handler..!")?;

    player.play(true)?;
    info!("Playback finished, exiting..!");

    Ok(())
}

fn pattern_or_empty(path: Option<&PathBuf>) -> Result<Value> {
    match path {
        Some(path) => read_pattern_file(path),
        None => Ok(json!([])),
    }
}

fn run_store(path: &Path, action: StoreAction) -> Result<()> {
    let mut store = ProjectStore::open(path)?;

    match action {
        StoreAction::Save {
            name,
            beat,
            melody,
            tempo,
        } => {
            let metadata = ProjectMetadata {
                tempo: tempo.or(Some(store.preferences().tempo)),
                playback_mode: Some(store.preferences().playback_mode),
                ..ProjectMetadata::default()
            };
            let id = store.save(
                &name,
                pattern_or_empty(beat.as_ref())?,
                pattern_or_empty(melody.as_ref())?,
                metadata,
            )?;
            println!("{}", id);
        }
        StoreAction::List { search } => {
            let records = match &search {
                Some(query) => store.search(query),
                None => store.list().iter().collect(),
            };
            for record in records {
                println!(
                    "{}  {:<30} tempo={} modified={}",
                    record.id, record.name, record.tempo, record.modified
                );
            }
        }
        StoreAction::Get { id } => {
            let Some(record) = store.get(&id) else {
                bail!("No project with id {}..!", id)
            };
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        StoreAction::Delete { id } => {
            if !store.delete(&id)? {
                warn!("No project with id {}..!", id);
            }
        }
        StoreAction::Export { out } => {
            fs::write(&out, store.export_all()?)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Exported {} projects to {}..!", store.list().len(), out.display());
        }
        StoreAction::Import { file } => {
            let blob = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if !store.import_all(&blob) {
                bail!("Import of {} failed..!", file.display())
            }
        }
    }

    Ok(())
}

use crate::engine::scheduler::PlaybackMode;
use crate::model::pattern::{DEFAULT_BPM, MAX_BPM};
use crate::normalizer::normalize;
use anyhow::{Context, bail};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const EXPORT_VERSION: &str = "1.0";
const MAX_RECENT_PROJECTS: usize = 10;
const DEFAULT_MASTER_VOLUME: f64 = 0.7;

/// A saved beat + melody pair. Timestamps are milliseconds since the Unix epoch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub beat_pattern: Value,
    pub melody_pattern: Value,
    pub created: i64,
    pub modified: i64,
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
    /// Any other metadata given at save time.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectMetadata {
    pub tempo: Option<f64>,
    pub playback_mode: Option<PlaybackMode>,
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecentProject {
    pub id: String,
    pub name: String,
    pub modified: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Preferences {
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
    #[serde(default = "default_master_volume")]
    pub master_volume: f64,
}

fn default_tempo() -> f64 {
    DEFAULT_BPM
}

fn default_master_volume() -> f64 {
    DEFAULT_MASTER_VOLUME
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_BPM,
            playback_mode: PlaybackMode::Both,
            master_volume: DEFAULT_MASTER_VOLUME,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
struct StoreData {
    #[serde(default)]
    projects: Vec<ProjectRecord>,
    #[serde(default)]
    preferences: Preferences,
    #[serde(default)]
    recent_projects: Vec<RecentProject>,
}

#[derive(Serialize, Deserialize, Debug)]
struct ExportBlob {
    version: String,
    export_date: String,
    data: StoreData,
}

/// Project storage backed by a single JSON document, rewritten after every change.
#[derive(Debug)]
pub struct ProjectStore {
    path: Option<PathBuf>,
    data: StoreData,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn check_patterns(beat: Option<&Value>, melody: Option<&Value>, tempo: f64) -> anyhow::Result<()> {
    if let Some(beat) = beat {
        normalize(beat, tempo).context("Beat pattern is invalid")?;
    }
    if let Some(melody) = melody {
        normalize(melody, tempo).context("Melody pattern is invalid")?;
    }

    Ok(())
}

fn check_tempo(tempo: f64) -> anyhow::Result<()> {
    if !(tempo > 0.0 && tempo <= MAX_BPM) {
        bail!("Tempo {} is out of range..!", tempo);
    }

    Ok(())
}

fn check_preferences(preferences: &Preferences) -> anyhow::Result<()> {
    check_tempo(preferences.tempo)?;
    if !(0.0..=1.0).contains(&preferences.master_volume) {
        bail!("Master volume {} is out of range..!", preferences.master_volume);
    }

    Ok(())
}

fn check_project(project: &ProjectRecord) -> anyhow::Result<()> {
    check_tempo(project.tempo)?;
    check_patterns(
        Some(&project.beat_pattern),
        Some(&project.melody_pattern),
        project.tempo,
    )
}

impl ProjectStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read project store {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Project store {} is not valid", path.display()))?
        } else {
            debug!("No project store at {}, starting empty..!", path.display());
            StoreData::default()
        };

        Ok(Self {
            path: Some(path),
            data,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: StoreData::default(),
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write project store {}", path.display()))?;

        Ok(())
    }

    /// Persists the current data, restoring `previous` if the write fails.
    fn commit(&mut self, previous: StoreData) -> anyhow::Result<()> {
        if let Err(why) = self.persist() {
            self.data = previous;
            return Err(why);
        }

        Ok(())
    }

    fn touch_recent(&mut self, id: &str, name: &str, modified: i64) {
        let recent = &mut self.data.recent_projects;
        recent.retain(|p| p.id != id);
        recent.insert(
            0,
            RecentProject {
                id: id.to_owned(),
                name: name.to_owned(),
                modified,
            },
        );
        recent.truncate(MAX_RECENT_PROJECTS);
    }

    /// Validates both patterns, stores them under a fresh id and returns the id.
    pub fn save(
        &mut self,
        name: &str,
        beat_pattern: Value,
        melody_pattern: Value,
        metadata: ProjectMetadata,
    ) -> anyhow::Result<String> {
        let tempo = metadata.tempo.unwrap_or(DEFAULT_BPM);
        check_tempo(tempo)?;
        check_patterns(Some(&beat_pattern), Some(&melody_pattern), tempo)?;

        let id = Uuid::new_v4().to_string();
        let timestamp = now_ms();
        let previous = self.data.clone();

        self.data.projects.push(ProjectRecord {
            id: id.clone(),
            name: name.to_owned(),
            beat_pattern,
            melody_pattern,
            created: timestamp,
            modified: timestamp,
            tempo,
            playback_mode: metadata.playback_mode.unwrap_or_default(),
            extra: metadata.extra,
        });
        self.touch_recent(&id, name, timestamp);
        self.commit(previous)?;

        info!("Saved project '{}' as {}..!", name, id);

        Ok(id)
    }

    /// Replaces a project's patterns; false if no project has that id.
    pub fn update(
        &mut self,
        id: &str,
        beat_pattern: Option<Value>,
        melody_pattern: Option<Value>,
    ) -> anyhow::Result<bool> {
        let Some(tempo) = self.get(id).map(|p| p.tempo) else {
            return Ok(false);
        };
        check_patterns(beat_pattern.as_ref(), melody_pattern.as_ref(), tempo)?;

        let previous = self.data.clone();
        let Some(record) = self.data.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(false);
        };

        if let Some(beat) = beat_pattern {
            record.beat_pattern = beat;
        }
        if let Some(melody) = melody_pattern {
            record.melody_pattern = melody;
        }
        record.modified = now_ms();

        let (name, modified) = (record.name.clone(), record.modified);
        self.touch_recent(id, &name, modified);
        self.commit(previous)?;

        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&ProjectRecord> {
        self.data.projects.iter().find(|p| p.id == id)
    }

    pub fn list(&self) -> &[ProjectRecord] {
        &self.data.projects
    }

    /// True if a project was removed.
    pub fn delete(&mut self, id: &str) -> anyhow::Result<bool> {
        let previous = self.data.clone();
        let before = self.data.projects.len();
        self.data.projects.retain(|p| p.id != id);
        self.data.recent_projects.retain(|p| p.id != id);

        if self.data.projects.len() == before {
            debug!("No project with id {}..!", id);
            return Ok(false);
        }

        self.commit(previous)?;
        info!("Deleted project {}..!", id);

        Ok(true)
    }

    /// Most recently saved first.
    pub fn recent_projects(&self) -> &[RecentProject] {
        &self.data.recent_projects
    }

    /// Projects whose name contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&ProjectRecord> {
        let query = query.to_lowercase();
        self.data
            .projects
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&query))
            .collect()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data.preferences
    }

    pub fn save_preferences(&mut self, preferences: Preferences) -> anyhow::Result<()> {
        check_preferences(&preferences)?;

        let previous = self.data.clone();
        self.data.preferences = preferences;
        self.commit(previous)
    }

    /// Every project and the preferences as a versioned JSON blob.
    pub fn export_all(&self) -> anyhow::Result<String> {
        let blob = ExportBlob {
            version: EXPORT_VERSION.to_owned(),
            export_date: chrono::Utc::now().to_rfc3339(),
            data: self.data.clone(),
        };

        Ok(serde_json::to_string_pretty(&blob)?)
    }

    /// Merges an exported blob: unknown projects are added, known ids are kept as they are,
    /// and the imported preferences replace the current ones. Projects or preferences that
    /// fail validation are skipped. False if the blob is malformed.
    pub fn import_all(&mut self, blob: &str) -> bool {
        let imported: ExportBlob = match serde_json::from_str(blob) {
            Ok(imported) => imported,
            Err(why) => {
                warn!("Invalid export data: {}..!", why);
                return false;
            }
        };

        if imported.version != EXPORT_VERSION {
            warn!(
                "Importing export version {} into a {} store..!",
                imported.version, EXPORT_VERSION
            );
        }

        let previous = self.data.clone();
        let mut added = 0;

        for project in imported.data.projects {
            if self.get(&project.id).is_some() {
                debug!("Skipping project {} which is already stored..!", project.id);
                continue;
            }
            if let Err(why) = check_project(&project) {
                warn!("Skipping invalid project {}: {:?}..!", project.id, why);
                continue;
            }
            self.data.projects.push(project);
            added += 1;
        }

        for recent in imported.data.recent_projects {
            let known = self.get(&recent.id).is_some();
            if known && !self.data.recent_projects.iter().any(|p| p.id == recent.id) {
                self.data.recent_projects.push(recent);
            }
        }
        self.data.recent_projects.truncate(MAX_RECENT_PROJECTS);

        match check_preferences(&imported.data.preferences) {
            Ok(()) => self.data.preferences = imported.data.preferences,
            Err(why) => warn!("Keeping current preferences: {:?}..!", why),
        }

        if let Err(why) = self.commit(previous) {
            warn!("Failed to persist imported data: {:?}..!", why);
            return false;
        }

        info!("Imported {} projects..!", added);

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn beat() -> Value {
        json!({"bpm": 100, "pattern": [{"beat": "kick"}, {"beat": "snare"}]})
    }

    fn melody() -> Value {
        json!([{"note": "C4", "dur": 2}, {"note": "rest"}])
    }

    #[test]
    fn saved_projects_survive_reopening() {
        env_logger::try_init().unwrap_or(());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("projects.json");

        let mut extra = Map::new();
        extra.insert("description".into(), json!("first groove"));

        let id = {
            let mut store = ProjectStore::open(&path).unwrap();
            store
                .save(
                    "Groove",
                    beat(),
                    melody(),
                    ProjectMetadata {
                        tempo: Some(95.0),
                        playback_mode: Some(PlaybackMode::Beat),
                        extra,
                    },
                )
                .unwrap()
        };

        let store = ProjectStore::open(&path).unwrap();
        let record = store.get(&id).unwrap();
        assert_eq!(record.name, "Groove");
        assert_eq!(record.beat_pattern, beat());
        assert_eq!(record.tempo, 95.0);
        assert_eq!(record.playback_mode, PlaybackMode::Beat);
        assert_eq!(record.extra.get("description"), Some(&json!("first groove")));
        assert_eq!(record.created, record.modified);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn defaults_apply_without_metadata() {
        let mut store = ProjectStore::in_memory();
        let id = store
            .save("Plain", json!([]), json!([]), ProjectMetadata::default())
            .unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.tempo, 120.0);
        assert_eq!(record.playback_mode, PlaybackMode::Both);
        assert_eq!(store.preferences(), &Preferences::default());
    }

    #[test]
    fn invalid_patterns_are_not_saved() {
        let mut store = ProjectStore::in_memory();
        assert!(store
            .save("Bad", json!({"bpm": 301, "pattern": []}), json!([]), ProjectMetadata::default())
            .is_err());
        assert!(store
            .save("Bad", json!([]), json!([{"note": "H9"}]), ProjectMetadata::default())
            .is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn failed_update_leaves_the_record_unchanged() {
        let mut store = ProjectStore::in_memory();
        let id = store
            .save("Steady", beat(), melody(), ProjectMetadata::default())
            .unwrap();
        let before = store.get(&id).unwrap().clone();

        let result = store.update(
            &id,
            Some(json!([{"beat": "kick"}])),
            Some(json!([{"note": "H9"}])),
        );

        assert!(result.is_err());
        assert_eq!(store.get(&id), Some(&before));
        assert!(store
            .save("Bad tempo", json!([]), json!([]), ProjectMetadata {
                tempo: Some(0.0),
                ..ProjectMetadata::default()
            })
            .is_err());
    }

    #[test]
    fn failed_writes_roll_back() {
        env_logger::try_init().unwrap_or(());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");

        let mut store = ProjectStore::open(&path).unwrap();
        let id = store
            .save("Kept", beat(), melody(), ProjectMetadata::default())
            .unwrap();

        // a directory in place of the store file makes every write fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store
            .save("Phantom", beat(), melody(), ProjectMetadata::default())
            .is_err());
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.recent_projects().len(), 1);

        assert!(store.update(&id, None, Some(json!([{"note": "E4"}]))).is_err());
        assert_eq!(store.get(&id).unwrap().melody_pattern, melody());

        assert!(store.delete(&id).is_err());
        assert!(store.get(&id).is_some());

        assert!(store
            .save_preferences(Preferences {
                tempo: 80.0,
                ..Preferences::default()
            })
            .is_err());
        assert_eq!(store.preferences(), &Preferences::default());
    }

    #[test]
    fn import_skips_invalid_projects_and_preferences() {
        env_logger::try_init().unwrap_or(());

        let record = |id: &str, tempo: f64, melody: Value| {
            json!({
                "id": id,
                "name": id,
                "beat_pattern": [],
                "melody_pattern": melody,
                "created": 0,
                "modified": 0,
                "tempo": tempo
            })
        };
        let blob = json!({
            "version": "1.0",
            "export_date": "2026-01-01T00:00:00+00:00",
            "data": {
                "projects": [
                    record("good", 100.0, json!([{"note": "C4"}])),
                    record("bad-note", 100.0, json!([{"note": "H9"}])),
                    record("bad-tempo", 0.0, json!([])),
                ],
                "preferences": {"tempo": 0.0, "playback_mode": "beat", "master_volume": 0.5},
                "recent_projects": [
                    {"id": "bad-note", "name": "bad-note", "modified": 0},
                    {"id": "good", "name": "good", "modified": 0}
                ]
            }
        });

        let mut store = ProjectStore::in_memory();
        assert!(store.import_all(&blob.to_string()));

        let ids: Vec<&str> = store.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
        assert_eq!(store.recent_projects().len(), 1);
        assert_eq!(store.recent_projects()[0].id, "good");
        assert_eq!(store.preferences(), &Preferences::default());
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let mut store = ProjectStore::in_memory();
        let id = store
            .save("Gone", beat(), melody(), ProjectMetadata::default())
            .unwrap();

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.get(&id).is_none());
        assert!(store.recent_projects().is_empty());
    }

    #[test]
    fn recent_projects_keep_the_last_ten() {
        let mut store = ProjectStore::in_memory();
        let ids: Vec<String> = (0..12)
            .map(|i| {
                store
                    .save(&format!("Song {i}"), json!([]), json!([]), ProjectMetadata::default())
                    .unwrap()
            })
            .collect();

        let recent = store.recent_projects();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].id, ids[11]);
        assert_eq!(recent[9].id, ids[2]);

        assert!(store.update(&ids[5], Some(beat()), None).unwrap());
        assert_eq!(store.recent_projects()[0].id, ids[5]);
        assert_eq!(store.get(&ids[5]).unwrap().beat_pattern, beat());
        assert!(!store.update("nope", None, None).unwrap());
    }

    #[test]
    fn search_ignores_case() {
        let mut store = ProjectStore::in_memory();
        for name in ["Funky Drummer", "Slow Jam", "funk rock"] {
            store
                .save(name, json!([]), json!([]), ProjectMetadata::default())
                .unwrap();
        }

        let names: Vec<&str> = store.search("FUNK").into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Funky Drummer", "funk rock"]);
        assert_eq!(store.search("").len(), 3);
        assert!(store.search("polka").is_empty());
    }

    #[test]
    fn preferences_are_validated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut store = ProjectStore::open(&path).unwrap();
        let prefs = Preferences {
            tempo: 140.0,
            playback_mode: PlaybackMode::Melody,
            master_volume: 0.5,
        };
        store.save_preferences(prefs.clone()).unwrap();
        assert!(store
            .save_preferences(Preferences {
                master_volume: 1.5,
                ..Preferences::default()
            })
            .is_err());

        let reopened = ProjectStore::open(&path).unwrap();
        assert_eq!(reopened.preferences(), &prefs);
    }

    #[test]
    fn export_then_import_merges_without_duplicates() {
        let mut source = ProjectStore::in_memory();
        let shared = source
            .save("Shared", beat(), melody(), ProjectMetadata::default())
            .unwrap();
        source
            .save_preferences(Preferences {
                tempo: 90.0,
                ..Preferences::default()
            })
            .unwrap();

        let blob = source.export_all().unwrap();
        let parsed: Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(parsed["version"], json!("1.0"));
        assert!(parsed["export_date"].is_string());

        let mut target = ProjectStore::in_memory();
        let own = target
            .save("Own", json!([]), json!([]), ProjectMetadata::default())
            .unwrap();

        assert!(target.import_all(&blob));
        assert!(target.import_all(&blob));
        assert_eq!(target.list().len(), 2);
        assert!(target.get(&shared).is_some());
        assert!(target.get(&own).is_some());
        assert_eq!(target.preferences().tempo, 90.0);
    }

    #[test]
    fn malformed_imports_are_rejected() {
        let mut store = ProjectStore::in_memory();
        assert!(!store.import_all("not json"));
        assert!(!store.import_all(r#"{"version": "1.0"}"#));
        assert!(!store.import_all(r#"{"data": {}}"#));
        assert!(store.list().is_empty());
    }
}

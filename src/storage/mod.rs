//! Snapshot persistence
//!
//! Sessions are saved as gzip-compressed JSON documents, one directory per
//! session under the saves root:
//!
//! ```text
//! saves/
//!   1a2b3c4d/
//!     autosave_20250101_120000.json.gz
//!     autosave_latest.json.gz
//!     manual_before-boss_20250101_121500.json.gz
//!     manual_before-boss_latest.json.gz
//! ```
//!
//! Every write goes to a temporary sibling first and is then renamed into
//! place, so a crash never leaves a truncated snapshot behind.

use crate::config::StorageConfig;
use crate::engine::session::Session;
use crate::engine::usage::TokenStats;
use crate::error::{Result, StoryloomError};
use anyhow::Context;
use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub mod types;
pub use types::{SaveSummary, Snapshot, SnapshotHeader, TurnMeta, FORMAT_VERSION};

const COMPRESSED_EXT: &str = ".json.gz";
const PLAIN_EXT: &str = ".json";
const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Checks that a save label is usable in a file name
///
/// # Errors
///
/// Returns `Storage` for empty labels or labels with characters other than
/// ASCII letters, digits, `-` and `_`
///
/// # Examples
///
/// ```
/// use storyloom::storage::validate_label;
///
/// assert!(validate_label("before-boss_2").is_ok());
/// assert!(validate_label("../escape").is_err());
/// assert!(validate_label("").is_err());
/// ```
pub fn validate_label(label: &str) -> Result<()> {
    check_file_component("save label", label)
}

/// Checks that a session id names a directory directly under the saves root
///
/// Session ids follow the same character rules as save labels.
///
/// # Errors
///
/// Returns `Storage` for ids that are empty or could escape the saves root
pub fn validate_session_id(session_id: &str) -> Result<()> {
    check_file_component("session id", session_id)
}

fn check_file_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(StoryloomError::Storage(format!("{} cannot be empty", kind)).into());
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoryloomError::Storage(format!(
            "{} '{}' may only contain letters, digits, '-' and '_'",
            kind, value
        ))
        .into());
    }
    Ok(())
}

/// Versioned snapshot store rooted at a saves directory
pub struct SnapshotStore {
    root: PathBuf,
    retention: usize,
    autosave_label: String,
}

impl SnapshotStore {
    /// Create a store
    ///
    /// # Arguments
    ///
    /// * `root` - Saves directory, created on first write
    /// * `retention` - Autosaves kept per session and label
    /// * `autosave_label` - Label used by `autosave`
    pub fn new<P: Into<PathBuf>>(root: P, retention: usize, autosave_label: &str) -> Self {
        Self {
            root: root.into(),
            retention: retention.max(1),
            autosave_label: autosave_label.to_string(),
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(
            config.resolve_saves_dir()?,
            config.autosave_retention,
            &config.autosave_label,
        ))
    }

    /// Saves directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Label used for automatic saves
    pub fn autosave_label(&self) -> &str {
        &self.autosave_label
    }

    /// Whether a save directory exists for the session
    pub fn has_session(&self, session_id: &str) -> bool {
        validate_session_id(session_id).is_ok() && self.root.join(session_id).is_dir()
    }

    /// Writes an autosave and prunes old ones
    pub fn autosave(&self, session: &mut Session, meta: &TurnMeta) -> Result<PathBuf> {
        let label = self.autosave_label.clone();
        self.save(session, meta, &label, false)
    }

    /// Writes a snapshot stamped with the current time
    pub fn save(
        &self,
        session: &mut Session,
        meta: &TurnMeta,
        label: &str,
        manual: bool,
    ) -> Result<PathBuf> {
        self.save_with_timestamp(session, meta, label, manual, Local::now())
    }

    /// Writes a snapshot with an explicit timestamp
    ///
    /// Assigns the session id if it has none. Writes the timestamped record
    /// and the label's latest pointer, then prunes autosaves of the label.
    ///
    /// # Returns
    ///
    /// Path of the timestamped record
    pub fn save_with_timestamp(
        &self,
        session: &mut Session,
        meta: &TurnMeta,
        label: &str,
        manual: bool,
        timestamp: DateTime<Local>,
    ) -> Result<PathBuf> {
        validate_label(label)?;
        let session_id = session.ensure_id().to_string();
        validate_session_id(&session_id)?;
        let dir = self.root.join(&session_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create save directory {}", dir.display()))?;

        let snapshot = Snapshot::capture(session, &session_id, label, manual, meta, timestamp);
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let prefix = file_prefix(label, manual);
        let record = dir.join(format!(
            "{}_{}{}",
            prefix,
            timestamp.format(FILE_TIMESTAMP),
            COMPRESSED_EXT
        ));
        let latest = dir.join(format!("{}_latest{}", prefix, COMPRESSED_EXT));

        write_compressed(&record, &bytes)?;
        write_compressed(&latest, &bytes)?;
        tracing::info!(
            "Saved session {} to {}",
            session_id,
            record.file_name().and_then(|n| n.to_str()).unwrap_or_default()
        );

        if !manual {
            self.prune_autosaves(&session_id, label)?;
        }
        Ok(record)
    }

    /// Deletes all but the newest autosaves of a label
    ///
    /// Manual saves and latest pointers are never touched.
    ///
    /// # Returns
    ///
    /// Paths that were deleted
    pub fn prune_autosaves(&self, session_id: &str, label: &str) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(session_id);
        let pattern = Regex::new(&format!(
            r"^{}_(\d{{8}}_\d{{6}})\.json(\.gz)?$",
            regex::escape(label)
        ))
        .map_err(|e| StoryloomError::Storage(format!("Invalid label pattern: {}", e)))?;

        let mut autosaves: Vec<(String, String)> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(caps) = pattern.captures(&name) {
                autosaves.push((caps[1].to_string(), name.clone()));
            }
        }
        tracing::debug!("Found {} autosaves for {}", autosaves.len(), session_id);

        if autosaves.len() <= self.retention {
            return Ok(Vec::new());
        }

        autosaves.sort();
        let excess = autosaves.len() - self.retention;
        let mut deleted = Vec::with_capacity(excess);
        for (_, name) in autosaves.into_iter().take(excess) {
            let path = dir.join(&name);
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete old autosave {}", path.display()))?;
            tracing::info!("Pruned old autosave {}", name);
            deleted.push(path);
        }
        Ok(deleted)
    }

    /// Loads a snapshot by file name
    ///
    /// A name without `.json`/`.json.gz` gets `.json.gz` appended. Without
    /// a session id every session directory is searched in name order.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotNotFound` if no file matches and `VersionMismatch`
    /// if the snapshot is from another version and `force` is false
    pub fn load_file(&self, name: &str, session_id: Option<&str>, force: bool) -> Result<Snapshot> {
        let file_name = if name.ends_with(COMPRESSED_EXT) || name.ends_with(PLAIN_EXT) {
            name.to_string()
        } else {
            format!("{}{}", name, COMPRESSED_EXT)
        };
        if file_name.contains('/') || file_name.contains('\\') {
            return Err(StoryloomError::Storage(format!("invalid save file name '{}'", name)).into());
        }

        let path = match session_id {
            Some(id) => {
                validate_session_id(id)?;
                let path = self.root.join(id).join(&file_name);
                path.exists().then_some(path)
            }
            None => self.find_in_sessions(&file_name)?.or(
                if file_name.ends_with(PLAIN_EXT) {
                    self.find_in_sessions(&format!("{}.gz", file_name))?
                } else {
                    None
                },
            ),
        };

        let path = path.ok_or_else(|| StoryloomError::SnapshotNotFound(file_name.clone()))?;
        read_snapshot(&path, force)
    }

    /// Loads the latest pointer of a label in one session
    ///
    /// Falls back to an uncompressed legacy pointer.
    pub fn load_session(&self, session_id: &str, label: Option<&str>, force: bool) -> Result<Snapshot> {
        validate_session_id(session_id)?;
        let dir = self.root.join(session_id);
        if !dir.is_dir() {
            return Err(StoryloomError::SnapshotNotFound(format!(
                "no save directory for session {}",
                session_id
            ))
            .into());
        }

        let label = label.unwrap_or(&self.autosave_label);
        let path = existing_variant(&dir, &format!("{}_latest", label)).ok_or_else(|| {
            StoryloomError::SnapshotNotFound(format!("no {} save in session {}", label, session_id))
        })?;
        read_snapshot(&path, force)
    }

    /// Loads the most recent autosave across all sessions
    pub fn load_latest(&self, force: bool) -> Result<Snapshot> {
        let path = self.find_latest(&self.autosave_label)?.ok_or_else(|| {
            StoryloomError::SnapshotNotFound(format!("no {} saves found", self.autosave_label))
        })?;
        read_snapshot(&path, force)
    }

    /// Finds the most recent save of a label across all sessions
    ///
    /// Each session's latest pointer is read; the timestamped record it
    /// names is preferred over the pointer itself. The greatest timestamp
    /// wins and ties keep the session that sorts first.
    pub fn find_latest(&self, label: &str) -> Result<Option<PathBuf>> {
        let mut best: Option<(DateTime<Local>, PathBuf)> = None;

        for dir in self.session_dirs()? {
            let Some(latest) = existing_variant(&dir, &format!("{}_latest", label)) else {
                continue;
            };
            let header = match read_header(&latest) {
                Ok(header) => header,
                Err(e) => {
                    tracing::warn!("Skipping unreadable save {}: {}", latest.display(), e);
                    continue;
                }
            };

            let record = format!("{}_{}", label, header.timestamp.format(FILE_TIMESTAMP));
            let candidate = existing_variant(&dir, &record).unwrap_or(latest);

            let newer = best
                .as_ref()
                .map(|(time, _)| header.timestamp > *time)
                .unwrap_or(true);
            if newer {
                best = Some((header.timestamp, candidate));
            }
        }

        if let Some((time, path)) = &best {
            tracing::info!("Latest save is {} ({})", path.display(), time.to_rfc3339());
        } else {
            tracing::debug!("No {} saves under {}", label, self.root.display());
        }
        Ok(best.map(|(_, path)| path))
    }

    /// Lists every save file, newest first
    ///
    /// Unreadable files are skipped with a warning.
    pub fn list_saves(&self) -> Result<Vec<SaveSummary>> {
        let mut saves = Vec::new();
        for dir in self.session_dirs()? {
            let session_id = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut names: Vec<String> = std::fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| {
                    !name.starts_with('.')
                        && (name.ends_with(COMPRESSED_EXT) || name.ends_with(PLAIN_EXT))
                })
                .collect();
            names.sort();

            for name in names {
                let path = dir.join(&name);
                match read_header(&path) {
                    Ok(header) => saves.push(SaveSummary {
                        session_id: session_id.clone(),
                        compressed: name.ends_with(COMPRESSED_EXT),
                        file_name: name,
                        player_name: header.player_name,
                        timestamp: header.timestamp,
                        total_turns: header.total_turns,
                        manual: header.manual,
                        label: header.label,
                        version: header.version,
                    }),
                    Err(e) => tracing::warn!("Skipping unreadable save {}: {}", path.display(), e),
                }
            }
        }

        saves.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(saves)
    }

    fn session_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    fn find_in_sessions(&self, file_name: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .session_dirs()?
            .into_iter()
            .map(|dir| dir.join(file_name))
            .find(|path| path.exists()))
    }
}

/// Path of `<stem>.json.gz` in `dir`, or of the legacy `<stem>.json`
fn existing_variant(dir: &Path, stem: &str) -> Option<PathBuf> {
    [COMPRESSED_EXT, PLAIN_EXT]
        .iter()
        .map(|ext| dir.join(format!("{}{}", stem, ext)))
        .find(|path| path.exists())
}

fn file_prefix(label: &str, manual: bool) -> String {
    if manual {
        format!("manual_{}", label)
    } else {
        label.to_string()
    }
}

/// Writes gzip data to a temporary sibling, then renames it into place
///
/// The temporary file is removed again if any step fails.
fn write_compressed(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoryloomError::Storage(format!("invalid path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let written = write_then_rename(&tmp, path, data);
    if written.is_err() && tmp.exists() {
        if let Err(e) = std::fs::remove_file(&tmp) {
            tracing::warn!("Could not remove {}: {}", tmp.display(), e);
        }
    }
    written
}

fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let file = std::fs::File::create(tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(data)?;
    let file = encoder.finish()?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(tmp, path)
        .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let is_gzip = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".gz"))
        .unwrap_or(false);

    if is_gzip {
        let mut text = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut text)
            .map_err(|e| {
                StoryloomError::Storage(format!("{} is not valid gzip: {}", path.display(), e))
            })?;
        Ok(text)
    } else {
        String::from_utf8(bytes)
            .map_err(|e| StoryloomError::Storage(format!("{}: {}", path.display(), e)).into())
    }
}

fn read_header(path: &Path) -> Result<SnapshotHeader> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| {
        StoryloomError::Storage(format!("{} has no readable header: {}", path.display(), e)).into()
    })
}

fn read_snapshot(path: &Path, force: bool) -> Result<Snapshot> {
    let text = read_text(path)?;
    let header: SnapshotHeader = serde_json::from_str(&text).map_err(|e| {
        StoryloomError::Storage(format!("{} has no readable header: {}", path.display(), e))
    })?;

    if header.version != FORMAT_VERSION {
        if !force {
            tracing::warn!(
                "Refusing {}: version {} differs from {}",
                path.display(),
                header.version,
                FORMAT_VERSION
            );
            return Err(StoryloomError::VersionMismatch {
                found: header.version,
                expected: FORMAT_VERSION.to_string(),
            }
            .into());
        }
        tracing::warn!(
            "Force-loading {} written by {}",
            path.display(),
            header.version
        );
    }

    let snapshot: Snapshot = serde_json::from_str(&text).map_err(|e| {
        StoryloomError::Storage(format!("{} could not be restored: {}", path.display(), e))
    })?;
    tracing::info!(
        "Loaded session {} ({} turns, saved {})",
        snapshot.header.session_id,
        snapshot.header.total_turns,
        snapshot.header.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(snapshot)
}

/// Paths written by `export_transcript`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFiles {
    /// Conversation log, one JSON document per line
    pub conversation: PathBuf,
    /// Narrative log mapping round number to description and choice
    pub narrative: PathBuf,
}

/// Writes gzip transcripts of a session under `<dir>/<session id>/`
///
/// The conversation file starts with player, time and token usage lines
/// followed by every logged exchange. The narrative file maps each round to
/// its description and the choice that followed it.
pub fn export_transcript(
    session: &Session,
    dir: &Path,
    timestamp: DateTime<Local>,
) -> Result<TranscriptFiles> {
    let session_id = session.id.as_deref().unwrap_or("unsaved");
    let out_dir = dir.join(session_id);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create export directory {}", out_dir.display()))?;
    let stamp = timestamp.format(FILE_TIMESTAMP).to_string();

    let mut lines = vec![
        serde_json::json!({ "player_name": session.player.name }),
        serde_json::json!({ "time": timestamp.to_rfc3339() }),
        serde_json::json!({ "token_usage": TokenStats::from(&session.tokens) }),
    ];
    for entry in &session.conversation_log {
        lines.push(serde_json::to_value(entry)?);
    }
    let mut conversation = String::new();
    for line in &lines {
        conversation.push_str(&serde_json::to_string(line)?);
        conversation.push('\n');
    }

    let mut rounds = serde_json::Map::new();
    for (index, description) in session.history_descriptions.iter().enumerate() {
        let choice = session
            .history_choices
            .get(index)
            .map(|c| c.trim())
            .unwrap_or_default();
        rounds.insert(
            (index + 1).to_string(),
            serde_json::json!({ "description": description.trim(), "choice": choice }),
        );
    }
    let narrative = serde_json::to_vec_pretty(&serde_json::Value::Object(rounds))?;

    let files = TranscriptFiles {
        conversation: out_dir.join(format!("{}.log.gz", stamp)),
        narrative: out_dir.join(format!("{}_narrative.log.gz", stamp)),
    };
    write_compressed(&files.conversation, conversation.as_bytes())?;
    write_compressed(&files.narrative, &narrative)?;
    tracing::info!("Exported transcript to {}", out_dir.display());
    Ok(files)
}

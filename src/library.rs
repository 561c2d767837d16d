// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session library boundary.
//!
//! The capture core hands finished takes to a [`SessionLibrary`] and never
//! looks inside the [`TargetRef`] it passes along.
//! [`DirectoryLibrary`] stores takes as plain files; [`MemoryLibrary`]
//! keeps them in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::timing::{Tempo, TimeSignature};

/// Directory used for takes without a target
pub const INCOGNITO: &str = "incognito";

const TEMPO_DEFAULTS_FILE: &str = "tempo_defaults.toml";

/// Identifier the library assigns to a saved take
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TakeId(pub String);

impl fmt::Display for TakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to where a take belongs (piece, fragment, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef(pub String);

impl TargetRef {
    pub fn new(name: impl Into<String>) -> Self {
        TargetRef(name.into())
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finalized take ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTake {
    pub blob: Vec<u8>,
    pub mime_type: String,
    pub duration: Duration,
    pub target: Option<TargetRef>,
}

/// Storage consumed by the capture core
pub trait SessionLibrary: Send + Sync {
    /// Persist a take and return its id
    fn save_finished_take(&self, take: &FinishedTake) -> Result<TakeId>;

    /// Remember tempo and meter as the default for `target`
    fn persist_tempo_default(
        &self,
        target: Option<&TargetRef>,
        tempo: Tempo,
        time_signature: TimeSignature,
    ) -> Result<()>;
}

/// File extension for a mime type
pub fn extension_for(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or("").trim();
    match base {
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mp4" | "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// Directory for a target's takes.
///
/// ASCII letters, digits and '-' pass through; every other byte becomes
/// `_XX` in hex, so distinct names never share a directory. A target
/// literally named like the untargeted directory has its first byte escaped.
fn target_dir_name(target: Option<&TargetRef>) -> String {
    let name = match target {
        Some(t) if !t.0.trim().is_empty() => t.0.trim(),
        _ => return INCOGNITO.to_string(),
    };

    let mut dir = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric() || byte == b'-';
        if plain && !(i == 0 && name == INCOGNITO) {
            dir.push(byte as char);
        } else {
            dir.push_str(&format!("_{:02X}", byte));
        }
    }
    dir
}

/// Stored tempo default
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TempoDefault {
    bpm: f64,
    beats_per_measure: u32,
    beat_unit: u32,
}

/// Takes on disk under `<root>/<target>/<take-id>.<ext>`
#[derive(Debug)]
pub struct DirectoryLibrary {
    root: PathBuf,
    counter: AtomicU64,
    /// Serializes read-modify-write of the tempo defaults file
    defaults_lock: Mutex<()>,
}

impl DirectoryLibrary {
    /// Create a library rooted at `root`; the directory is created on first save
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            counter: AtomicU64::new(0),
            defaults_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saved take files for a target, sorted by name
    pub fn list_takes(&self, target: Option<&TargetRef>) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(target_dir_name(target));
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut takes = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {:?}", dir))? {
            let path = entry?.path();
            if path.is_file() {
                takes.push(path);
            }
        }
        takes.sort();
        Ok(takes)
    }

    /// Stored tempo default for a target
    pub fn tempo_default(&self, target: Option<&TargetRef>) -> Result<Option<(Tempo, TimeSignature)>> {
        let defaults = self.read_defaults()?;
        let Some(entry) = defaults.get(&target_dir_name(target)) else {
            return Ok(None);
        };
        let tempo = Tempo::new(entry.bpm)?;
        let sig = TimeSignature::new(entry.beats_per_measure, entry.beat_unit)?;
        Ok(Some((tempo, sig)))
    }

    fn defaults_path(&self) -> PathBuf {
        self.root.join(TEMPO_DEFAULTS_FILE)
    }

    fn read_defaults(&self) -> Result<BTreeMap<String, TempoDefault>> {
        let path = self.defaults_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))
    }

    fn next_take_id(&self) -> TakeId {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        TakeId(format!("take-{}-{:03}", secs, n))
    }
}

impl SessionLibrary for DirectoryLibrary {
    fn save_finished_take(&self, take: &FinishedTake) -> Result<TakeId> {
        if take.blob.is_empty() {
            bail!("take is empty");
        }

        let dir = self.root.join(target_dir_name(take.target.as_ref()));
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;

        let ext = extension_for(&take.mime_type);
        let mut id = self.next_take_id();
        let mut path = dir.join(format!("{}.{}", id, ext));
        while path.exists() {
            id = self.next_take_id();
            path = dir.join(format!("{}.{}", id, ext));
        }

        fs::write(&path, &take.blob).with_context(|| format!("Failed to write take {:?}", path))?;
        info!(take = %id, path = ?path, seconds = take.duration.as_secs_f64(), "take saved");
        Ok(id)
    }

    fn persist_tempo_default(
        &self,
        target: Option<&TargetRef>,
        tempo: Tempo,
        time_signature: TimeSignature,
    ) -> Result<()> {
        let _guard = self
            .defaults_lock
            .lock()
            .map_err(|_| anyhow!("tempo defaults lock poisoned"))?;

        let mut defaults = self.read_defaults()?;
        defaults.insert(
            target_dir_name(target),
            TempoDefault {
                bpm: tempo.bpm(),
                beats_per_measure: time_signature.beats_per_measure(),
                beat_unit: time_signature.beat_unit(),
            },
        );

        fs::create_dir_all(&self.root).with_context(|| format!("Failed to create {:?}", self.root))?;
        let contents = toml::to_string(&defaults).context("Failed to serialize tempo defaults")?;
        let path = self.defaults_path();
        fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
        debug!(target = %target_dir_name(target), %tempo, %time_signature, "tempo default stored");
        Ok(())
    }
}

/// In-memory library
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    takes: Mutex<Vec<(TakeId, FinishedTake)>>,
    tempo_defaults: Mutex<Vec<(Option<TargetRef>, Tempo, TimeSignature)>>,
    rejecting: AtomicBool,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every save while set
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::Relaxed);
    }

    /// Saved takes in save order
    pub fn takes(&self) -> Vec<(TakeId, FinishedTake)> {
        self.takes.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Number of saved takes
    pub fn save_count(&self) -> usize {
        self.takes.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Stored tempo defaults in call order
    pub fn tempo_defaults(&self) -> Vec<(Option<TargetRef>, Tempo, TimeSignature)> {
        self.tempo_defaults.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl SessionLibrary for MemoryLibrary {
    fn save_finished_take(&self, take: &FinishedTake) -> Result<TakeId> {
        if self.rejecting.load(Ordering::Relaxed) {
            bail!("library is read-only");
        }
        let mut takes = self.takes.lock().map_err(|_| anyhow!("library lock poisoned"))?;
        let id = TakeId(format!("mem-{}", takes.len() + 1));
        takes.push((id.clone(), take.clone()));
        Ok(id)
    }

    fn persist_tempo_default(
        &self,
        target: Option<&TargetRef>,
        tempo: Tempo,
        time_signature: TimeSignature,
    ) -> Result<()> {
        self.tempo_defaults
            .lock()
            .map_err(|_| anyhow!("library lock poisoned"))?
            .push((target.cloned(), tempo, time_signature));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn take(target: Option<&str>) -> FinishedTake {
        FinishedTake {
            blob: vec![1, 2, 3, 4],
            mime_type: "audio/wav".into(),
            duration: Duration::from_millis(2500),
            target: target.map(TargetRef::new),
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("audio/wav"), "wav");
        assert_eq!(extension_for("audio/webm;codecs=opus"), "webm");
        assert_eq!(extension_for("video/webm;codecs=vp9,opus"), "webm");
        assert_eq!(extension_for("audio/ogg;codecs=opus"), "ogg");
        assert_eq!(extension_for("video/mp4"), "mp4");
        assert_eq!(extension_for(""), "bin");
    }

    #[test]
    fn test_target_dir_name() {
        assert_eq!(target_dir_name(None), INCOGNITO);
        assert_eq!(target_dir_name(Some(&TargetRef::new("  "))), INCOGNITO);
        assert_eq!(target_dir_name(Some(&TargetRef::new("Etude 3/b"))), "Etude_203_2Fb");
        assert_eq!(target_dir_name(Some(&TargetRef::new(" scales "))), "scales");
    }

    /// Inverse of `target_dir_name` for escaped names
    fn decode_dir_name(dir: &str) -> String {
        let mut bytes = Vec::new();
        let mut rest = dir.as_bytes();
        while let Some((&b, tail)) = rest.split_first() {
            if b == b'_' {
                let hex = std::str::from_utf8(&tail[..2]).unwrap();
                bytes.push(u8::from_str_radix(hex, 16).unwrap());
                rest = &tail[2..];
            } else {
                bytes.push(b);
                rest = tail;
            }
        }
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_target_dir_names_never_collide() {
        let names = ["Etude 3/b", "Etude_3_b", "Etude 3_b", "Étude", "a.b", "a_2Eb", "incognito", "Incognito"];
        let dirs: Vec<String> = names.iter().map(|n| target_dir_name(Some(&TargetRef::new(*n)))).collect();

        for (i, a) in dirs.iter().enumerate() {
            assert_ne!(a, INCOGNITO);
            assert!(!a.contains('/') && !a.contains('.'));
            for b in &dirs[i + 1..] {
                assert_ne!(a, b);
            }
        }
        for (name, dir) in names.iter().zip(&dirs) {
            assert_eq!(decode_dir_name(dir), *name);
        }
    }

    #[test]
    fn test_similar_targets_keep_separate_takes() {
        let dir = tempdir().unwrap();
        let lib = DirectoryLibrary::new(dir.path());
        let spaced = TargetRef::new("Etude 3/b");
        let underscored = TargetRef::new("Etude_3_b");

        lib.save_finished_take(&take(Some("Etude 3/b"))).unwrap();
        assert_eq!(lib.list_takes(Some(&spaced)).unwrap().len(), 1);
        assert!(lib.list_takes(Some(&underscored)).unwrap().is_empty());
    }

    #[test]
    fn test_directory_library_saves_files() {
        let dir = tempdir().unwrap();
        let lib = DirectoryLibrary::new(dir.path());

        let a = lib.save_finished_take(&take(None)).unwrap();
        let b = lib.save_finished_take(&take(None)).unwrap();
        assert_ne!(a, b);

        let files = lib.list_takes(None).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().unwrap() == "wav"));
        assert_eq!(fs::read(&files[0]).unwrap(), vec![1, 2, 3, 4]);

        lib.save_finished_take(&take(Some("scales"))).unwrap();
        assert_eq!(lib.list_takes(Some(&TargetRef::new("scales"))).unwrap().len(), 1);
        assert!(dir.path().join(INCOGNITO).is_dir());
    }

    #[test]
    fn test_directory_library_rejects_empty_take() {
        let dir = tempdir().unwrap();
        let lib = DirectoryLibrary::new(dir.path());
        let mut empty = take(None);
        empty.blob.clear();
        assert!(lib.save_finished_take(&empty).is_err());
    }

    #[test]
    fn test_tempo_defaults_round_trip_through_toml() {
        let dir = tempdir().unwrap();
        let lib = DirectoryLibrary::new(dir.path());
        let piece = TargetRef::new("piece");

        assert!(lib.tempo_default(Some(&piece)).unwrap().is_none());

        let tempo = Tempo::new(96.0).unwrap();
        let sig = TimeSignature::new(3, 4).unwrap();
        lib.persist_tempo_default(Some(&piece), tempo, sig).unwrap();
        lib.persist_tempo_default(None, Tempo::new(60.0).unwrap(), TimeSignature::default())
            .unwrap();

        let (t, s) = lib.tempo_default(Some(&piece)).unwrap().unwrap();
        assert_eq!(t, tempo);
        assert_eq!(s, sig);
        assert_eq!(lib.tempo_default(None).unwrap().unwrap().0.bpm(), 60.0);

        let text = fs::read_to_string(dir.path().join(TEMPO_DEFAULTS_FILE)).unwrap();
        assert!(text.contains("[piece]"));
    }

    #[test]
    fn test_memory_library() {
        let lib = MemoryLibrary::new();
        let id = lib.save_finished_take(&take(None)).unwrap();
        assert_eq!(id.to_string(), "mem-1");
        assert_eq!(lib.save_count(), 1);

        lib.set_rejecting(true);
        assert!(lib.save_finished_take(&take(None)).is_err());
        assert_eq!(lib.save_count(), 1);
    }
}

//! Persistent QC result cache keyed by input fingerprints
//!
//! Each entry stores a (screw, check) result payload together with an xxh3
//! fingerprint of the plan inputs it was derived from. A later run reuses
//! the payload only when the fingerprint of the current inputs matches.
//! A second fingerprint covers the threshold table and check settings;
//! when it changes, every entry is discarded.
//!
//! # Example
//!
//! ```ignore
//! let mut cache = IncrementalCache::new(Path::new(".screwqc"));
//! cache.set_config_fingerprint(config_fingerprint(&thresholds, &settings));
//! let fp = input_fingerprint(&plan, &inputs);
//! if cache.lookup(&screw, kind, fp).is_none() {
//!     cache.store(&screw, kind, fp, result.serializable_content());
//! }
//! cache.save_cache()?;
//! ```

use crate::checks::base::CheckSettings;
use crate::hardware::{PlanSnapshot, ScrewId};
use crate::models::{CheckKind, Content, InputKey};
use crate::thresholds::ThresholdTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::Xxh3;

/// Cache format version - bump when schema changes
pub const CACHE_VERSION: u32 = 1;

pub const CACHE_FILE_NAME: &str = "qc_cache.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResult {
    screw: ScrewId,
    check: CheckKind,
    fingerprint: String,
    content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheData {
    version: u32,
    #[serde(default)]
    config: Option<String>,
    entries: BTreeMap<String, CachedResult>,
}

impl Default for CacheData {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            config: None,
            entries: BTreeMap::new(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub screws: usize,
    pub cache_version: u32,
}

/// On-disk cache of result payloads
pub struct IncrementalCache {
    cache_file: PathBuf,
    cache: CacheData,
    dirty: bool,
}

impl IncrementalCache {
    /// Open (or start) the cache stored in `cache_dir`
    pub fn new(cache_dir: &Path) -> Self {
        if let Err(e) = fs::create_dir_all(cache_dir) {
            warn!("Failed to create cache directory: {}", e);
        }

        let mut instance = Self {
            cache_file: cache_dir.join(CACHE_FILE_NAME),
            cache: CacheData::default(),
            dirty: false,
        };

        if let Err(e) = instance.load_cache() {
            debug!("Failed to load cache: {}", e);
        }

        instance
    }

    fn load_cache(&mut self) -> Result<()> {
        if !self.cache_file.exists() {
            debug!("No cache file found at {:?}", self.cache_file);
            return Ok(());
        }

        let file = File::open(&self.cache_file).context("Failed to open cache file")?;
        let data: CacheData =
            serde_json::from_reader(BufReader::new(file)).context("Failed to parse cache")?;

        if data.version != CACHE_VERSION {
            info!(
                "Cache version mismatch (got {}, expected {}), rebuilding",
                data.version, CACHE_VERSION
            );
            self.invalidate_all();
            return Ok(());
        }

        self.cache = data;
        debug!("Loaded cache with {} entries", self.cache.entries.len());
        Ok(())
    }

    /// Persist to disk through a temp file and a rename
    pub fn save_cache(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let tmp_file = self.cache_file.with_extension("tmp");
        let file = File::create(&tmp_file).context("Failed to create temp cache file")?;
        serde_json::to_writer(BufWriter::new(file), &self.cache)
            .context("Failed to write cache")?;
        fs::rename(&tmp_file, &self.cache_file).context("Failed to rename temp cache")?;

        self.dirty = false;
        debug!("Saved cache with {} entries", self.cache.entries.len());
        Ok(())
    }

    /// Drop every entry when thresholds or settings changed since the last save
    pub fn set_config_fingerprint(&mut self, fingerprint: u64) {
        let hex = to_hex(fingerprint);
        if self.cache.config.as_deref() == Some(hex.as_str()) {
            return;
        }
        if self.cache.config.is_some() {
            info!("Threshold or check settings changed, discarding cached results");
        }
        self.cache.entries.clear();
        self.cache.config = Some(hex);
        self.dirty = true;
    }

    /// Cached payload, if its inputs still match
    pub fn lookup(&self, screw: &ScrewId, check: CheckKind, fingerprint: u64) -> Option<Content> {
        self.cache
            .entries
            .get(&entry_key(screw, check))
            .filter(|e| e.fingerprint == to_hex(fingerprint))
            .map(|e| e.content.clone())
    }

    pub fn store(&mut self, screw: &ScrewId, check: CheckKind, fingerprint: u64, content: Content) {
        self.cache.entries.insert(
            entry_key(screw, check),
            CachedResult {
                screw: screw.clone(),
                check,
                fingerprint: to_hex(fingerprint),
                content,
            },
        );
        self.dirty = true;
    }

    /// Forget entries of screws for which `keep` is false
    pub fn prune(&mut self, keep: impl Fn(&ScrewId) -> bool) {
        let before = self.cache.entries.len();
        self.cache.entries.retain(|_, e| keep(&e.screw));
        if self.cache.entries.len() != before {
            self.dirty = true;
        }
    }

    pub fn invalidate_all(&mut self) {
        self.cache = CacheData::default();
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.cache.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut screws: Vec<&ScrewId> = self.cache.entries.values().map(|e| &e.screw).collect();
        screws.sort();
        screws.dedup();
        CacheStats {
            entries: self.cache.entries.len(),
            screws: screws.len(),
            cache_version: CACHE_VERSION,
        }
    }
}

fn entry_key(screw: &ScrewId, check: CheckKind) -> String {
    format!("{}/{}/{}", screw.case, screw.index, check)
}

fn to_hex(fingerprint: u64) -> String {
    format!("{:016x}", fingerprint)
}

/// Plan data behind one input key
fn fragment(plan: &PlanSnapshot, key: &InputKey) -> Value {
    let value = match key {
        InputKey::Screw(id) => serde_json::to_value(plan.screw(id)),
        InputKey::CaseScrews(case) => {
            // Membership plus attachment, so a screw gaining a pastille changes it
            let members: Vec<(&ScrewId, Vec<&str>)> = plan
                .screws_in_case(case)
                .into_iter()
                .map(|s| {
                    let dots = plan.pastilles_of(&s.id).map(|d| d.id.as_str()).collect();
                    (&s.id, dots)
                })
                .collect();
            serde_json::to_value(members)
        }
        InputKey::Case(id) => serde_json::to_value(plan.case(id)),
        InputKey::Dot(id) => serde_json::to_value(plan.attachment_point(id)),
        InputKey::Connection(id) => serde_json::to_value(plan.connection(id)),
        InputKey::Bone(id) => serde_json::to_value(plan.anatomy().bone_of(id)),
        InputKey::Barrel(id) => serde_json::to_value(plan.barrel(id)),
        InputKey::Osteotomy => serde_json::to_value(plan.osteotomy()),
        InputKey::CriticalStructures => serde_json::to_value(plan.critical_structures()),
    };
    value.unwrap_or(Value::Null)
}

fn hash_json(hasher: &mut Xxh3, value: &impl Serialize) {
    match serde_json::to_vec(value) {
        Ok(bytes) => hasher.update(&bytes),
        Err(e) => warn!("Failed to serialize fingerprint material: {}", e),
    }
}

/// xxh3 fingerprint of the plan data behind `inputs`
pub fn input_fingerprint<'a>(
    plan: &PlanSnapshot,
    inputs: impl IntoIterator<Item = &'a InputKey>,
) -> u64 {
    let mut hasher = Xxh3::new();
    for key in inputs {
        hash_json(&mut hasher, key);
        hash_json(&mut hasher, &fragment(plan, key));
    }
    hasher.digest()
}

/// xxh3 fingerprint of everything besides the plan that shapes a result
pub fn config_fingerprint(thresholds: &ThresholdTable, settings: &CheckSettings) -> u64 {
    let mut hasher = Xxh3::new();
    hash_json(&mut hasher, &thresholds.rows());
    hash_json(&mut hasher, &thresholds.screw_diameters());
    hash_json(&mut hasher, settings);
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{screw, sid, PlanBuilder};
    use crate::models::PastilleDeformedContent;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn content() -> Content {
        Content::PastilleDeformed(PastilleDeformedContent {
            has_pastille: true,
            is_deformed: false,
        })
    }

    #[test]
    fn test_store_save_reload() {
        let dir = TempDir::new().expect("temp dir");
        {
            let mut cache = IncrementalCache::new(dir.path());
            cache.store(&sid(1), CheckKind::PastilleDeformed, 42, content());
            cache.save_cache().expect("save");
        }
        let cache = IncrementalCache::new(dir.path());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&sid(1), CheckKind::PastilleDeformed, 42), Some(content()));
        assert_eq!(cache.lookup(&sid(1), CheckKind::PastilleDeformed, 43), None);
        assert!(!dir.path().join("qc_cache.tmp").exists());
    }

    #[test]
    fn test_version_mismatch_discards() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(
            dir.path().join(CACHE_FILE_NAME),
            r#"{"version": 999, "entries": {}}"#,
        )
        .expect("write");
        let cache = IncrementalCache::new(dir.path());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().cache_version, CACHE_VERSION);
    }

    #[test]
    fn test_config_change_discards_entries() {
        let dir = TempDir::new().expect("temp dir");
        let mut cache = IncrementalCache::new(dir.path());
        cache.set_config_fingerprint(1);
        cache.store(&sid(1), CheckKind::PastilleDeformed, 7, content());
        cache.set_config_fingerprint(1);
        assert_eq!(cache.len(), 1);
        cache.set_config_fingerprint(2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let plan = PlanBuilder::new()
            .screw(1, [0.0, 0.0, 0.0])
            .screw(2, [5.0, 0.0, 0.0])
            .build();
        let inputs = BTreeSet::from([InputKey::Screw(sid(1))]);
        let before = input_fingerprint(&plan, &inputs);
        assert_eq!(before, input_fingerprint(&plan, &inputs));

        // Unrelated edit
        let other = plan.with_screw(screw(2, [6.0, 0.0, 0.0]));
        assert_eq!(before, input_fingerprint(&other, &inputs));

        let moved = plan.with_screw(screw(1, [1.0, 0.0, 0.0]));
        assert_ne!(before, input_fingerprint(&moved, &inputs));
    }

    #[test]
    fn test_config_fingerprint_tracks_settings() {
        let table = ThresholdTable::builtin();
        let a = config_fingerprint(&table, &CheckSettings::default());
        let b = config_fingerprint(
            &table,
            &CheckSettings {
                osteotomy_extension: 2.0,
                ..Default::default()
            },
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_prune_removed_screws() {
        let dir = TempDir::new().expect("temp dir");
        let mut cache = IncrementalCache::new(dir.path());
        cache.store(&sid(1), CheckKind::PastilleDeformed, 1, content());
        cache.store(&sid(2), CheckKind::PastilleDeformed, 1, content());
        cache.prune(|s| s == &sid(1));
        assert_eq!(cache.stats().screws, 1);
    }
}

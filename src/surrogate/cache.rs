//! The surrogate request cache: a bounded in-memory LRU backed by an optional
//! on-disk tier, deduplicating concurrent builds for the same key.
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::CacheError;

/// One weighted cell of a resolved surrogate, as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCell {
    pub row: u32,
    pub col: u32,
    pub weight: f64,
}

/// The resolved, grid-materialized surrogate for a single source polygon:
/// raw (non-normalized) per-cell weights plus the coverage flag.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedSrgData {
    pub cells: Vec<CachedCell>,
    pub total_input_weight: f64,
    pub covered_by_grid: bool,
}

impl GriddedSrgData {
    /// Cell weights normalized to sum to 1, if this surrogate is flagged as
    /// covered by the grid; otherwise the raw (partial) weights.
    pub fn normalized_cells(&self) -> Vec<CachedCell> {
        if !self.covered_by_grid {
            return self.cells.clone();
        }
        let sum: f64 = self.cells.iter().map(|c| c.weight).sum();
        if sum <= 0.0 {
            return self.cells.clone();
        }
        self.cells.iter().map(|c| CachedCell { row: c.row, col: c.col, weight: c.weight / sum }).collect()
    }
}

/// Length-prefixed, fixed-endian binary framing for [`GriddedSrgData`]. No
/// external serialization crate is needed for a structure this simple.
fn encode(data: &GriddedSrgData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + data.cells.len() * 16);
    buf.push(data.covered_by_grid as u8);
    buf.extend_from_slice(&data.total_input_weight.to_le_bytes());
    buf.extend_from_slice(&(data.cells.len() as u64).to_le_bytes());
    for cell in &data.cells {
        buf.extend_from_slice(&cell.row.to_le_bytes());
        buf.extend_from_slice(&cell.col.to_le_bytes());
        buf.extend_from_slice(&cell.weight.to_le_bytes());
    }
    buf
}

fn decode(path: &Path, bytes: &[u8]) -> Result<GriddedSrgData, CacheError> {
    let corrupt = |reason: &str| CacheError::Corrupt { path: path.to_owned(), reason: reason.to_string() };
    if bytes.len() < 1 + 8 + 8 {
        return Err(corrupt("truncated header"));
    }
    let covered_by_grid = bytes[0] != 0;
    let total_input_weight = f64::from_le_bytes(bytes[1..9].try_into().unwrap());
    let count = u64::from_le_bytes(bytes[9..17].try_into().unwrap()) as usize;
    let mut offset = 17;
    let mut cells = Vec::with_capacity(count);
    for _ in 0..count {
        if offset + 16 > bytes.len() {
            return Err(corrupt("truncated cell record"));
        }
        let row = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let col = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        let weight = f64::from_le_bytes(bytes[offset + 8..offset + 16].try_into().unwrap());
        cells.push(CachedCell { row, col, weight });
        offset += 16;
    }
    Ok(GriddedSrgData { cells, total_input_weight, covered_by_grid })
}

struct Lru {
    capacity: usize,
    map: HashMap<String, GriddedSrgData>,
    order: VecDeque<String>,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self { capacity, map: HashMap::new(), order: VecDeque::new() }
    }

    fn get(&mut self, key: &str) -> Option<GriddedSrgData> {
        if let Some(v) = self.map.get(key).cloned() {
            self.touch(key);
            Some(v)
        } else {
            None
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn insert(&mut self, key: String, value: GriddedSrgData) {
        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.touch(&key);
        self.map.insert(key, value);
    }
}

/// Per-key deduplicating cache for resolved surrogates, with an in-memory LRU
/// tier and an optional on-disk tier.
///
/// Nested merge builds must bypass this cache entirely (built directly by the
/// caller) to avoid a thread awaiting its own in-flight build's lock.
pub struct SurrogateCache {
    memory: Mutex<Lru>,
    disk_dir: Option<PathBuf>,
    build_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    max_merge_depth: usize,
}

impl SurrogateCache {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { memory: Mutex::new(Lru::new(capacity)), disk_dir: None, build_locks: Mutex::new(HashMap::new()), max_merge_depth: 10 }
    }

    pub fn with_disk_tier(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_merge_depth = depth;
        self
    }

    pub fn max_merge_depth(&self) -> usize {
        self.max_merge_depth
    }

    /// Stable cache key: `region || code || grid-name || source-key`.
    pub fn key(region: &str, code: &str, grid_name: &str, source_key: &str) -> String {
        format!("{region}|{code}|{grid_name}|{source_key}")
    }

    /// A per-key lock ensuring at most one build runs for a given key at a
    /// time. Callers hold the returned guard only for the duration of the
    /// build; other callers requesting the same key block on the same lock.
    fn build_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().expect("cache build-lock map poisoned");
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(format!("{:x}.srg", simple_hash(key))))
    }

    fn read_disk(&self, key: &str) -> Result<Option<GriddedSrgData>, CacheError> {
        let Some(path) = self.disk_path(key) else { return Ok(None) };
        if !path.exists() {
            return Ok(None);
        }
        let mut file = fs::File::open(&path).map_err(|e| CacheError::CouldNotRead { path: path.clone(), reason: e.to_string() })?;
        let mut bytes = vec![];
        file.read_to_end(&mut bytes).map_err(|e| CacheError::CouldNotRead { path: path.clone(), reason: e.to_string() })?;
        Ok(Some(decode(&path, &bytes)?))
    }

    fn write_disk(&self, key: &str, data: &GriddedSrgData) -> Result<(), CacheError> {
        let Some(path) = self.disk_path(key) else { return Ok(()) };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::CouldNotWrite { path: path.clone(), reason: e.to_string() })?;
        }
        let mut file = fs::File::create(&path).map_err(|e| CacheError::CouldNotWrite { path: path.clone(), reason: e.to_string() })?;
        file.write_all(&encode(data)).map_err(|e| CacheError::CouldNotWrite { path: path.clone(), reason: e.to_string() })?;
        Ok(())
    }

    /// Fetch `key` from memory, then disk; if both miss, call `build` (which
    /// must not itself call back into this cache — nested merge builds bypass
    /// the cache directly) and populate both tiers. If `build` is cancelled
    /// (returns `Ok(None)`), nothing is cached.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Option<GriddedSrgData>, CacheError>
    where
        F: FnOnce() -> Result<Option<GriddedSrgData>, CacheError>,
    {
        if let Some(hit) = self.memory.lock().expect("cache memory tier poisoned").get(key) {
            return Ok(Some(hit));
        }

        let lock = self.build_lock(key);
        let _guard = lock.lock().expect("cache build lock poisoned");

        // Re-check memory now that we hold the build lock: another thread may
        // have populated it while we were waiting.
        if let Some(hit) = self.memory.lock().expect("cache memory tier poisoned").get(key) {
            return Ok(Some(hit));
        }

        if let Some(hit) = self.read_disk(key)? {
            self.memory.lock().expect("cache memory tier poisoned").insert(key.to_string(), hit.clone());
            return Ok(Some(hit));
        }

        let Some(built) = build()? else {
            return Ok(None);
        };

        self.write_disk(key, &built)?;
        self.memory.lock().expect("cache memory tier poisoned").insert(key.to_string(), built.clone());
        Ok(Some(built))
    }
}

impl Default for SurrogateCache {
    fn default() -> Self {
        Self::new()
    }
}

fn simple_hash(s: &str) -> u64 {
    // FNV-1a: deterministic, no external dependency needed for a cache
    // filename derivation.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GriddedSrgData {
        GriddedSrgData {
            cells: vec![CachedCell { row: 0, col: 0, weight: 0.5 }, CachedCell { row: 0, col: 1, weight: 1.5 }],
            total_input_weight: 2.0,
            covered_by_grid: true,
        }
    }

    #[test]
    fn binary_framing_round_trips() {
        let data = sample();
        let bytes = encode(&data);
        let decoded = decode(Path::new("test"), &bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn normalized_cells_sum_to_one_when_covered() {
        let data = sample();
        let normalized = data.normalized_cells();
        let sum: f64 = normalized.iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn get_or_build_populates_memory_tier_once() {
        let cache = SurrogateCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let result = cache
                .get_or_build("k", || {
                    calls += 1;
                    Ok(Some(sample()))
                })
                .unwrap();
            assert!(result.is_some());
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn disk_tier_round_trips_through_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SurrogateCache::new().with_disk_tier(dir.path());
        let built = cache.get_or_build("k", || Ok(Some(sample()))).unwrap().unwrap();
        assert_eq!(built, sample());

        // A fresh cache instance (empty memory tier) still finds it on disk.
        let cache2 = SurrogateCache::new().with_disk_tier(dir.path());
        let mut calls = 0;
        let found = cache2
            .get_or_build("k", || {
                calls += 1;
                Ok(Some(sample()))
            })
            .unwrap()
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(found, sample());
    }
}

//! Keyed storage for expensive intermediate results.
//!
//! Entries are write-once: a key is derived from every parameter its artifact
//! depends on (including the pixelization scheme), so one key can only ever
//! hold one value. Storing a different value under an existing key is a
//! [`Cmb2SphereError::CacheConflict`].
//!
//! The on-disk store assumes a single process at a time; concurrent writers
//! to the same directory are not coordinated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::alm::{Alm, SpectralCoefficients};
use crate::error::{Cmb2SphereError, Result};
use crate::field::{ScalarField, SourceIdentity};
use crate::healpix::{Nside, PIXELIZATION_SCHEME};
use crate::topology::TriangleTopology;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// An entry exists under the key and decoded to the expected shape.
    Found(T),
    /// No entry exists under the key, or the cache is disabled.
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Deterministic key of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: &'static str,
    text: String,
}

impl CacheKey {
    fn new(kind: &'static str, body: &str) -> Self {
        Self {
            kind,
            text: format!("{PIXELIZATION_SCHEME}/{kind}/{body}"),
        }
    }

    /// Key of the coefficients of one source field.
    #[must_use]
    pub fn coefficients(source: &SourceIdentity, lmax: usize, iterations: u32) -> Self {
        Self::new(
            SpectralCoefficients::KIND,
            &format!("source={source}/lmax={lmax}/iter={iterations}"),
        )
    }

    /// Key of a source field resampled at `nside` with smoothing `fwhm` (radians),
    /// synthesized from coefficients analyzed up to `lmax` with `iterations` refinements.
    #[must_use]
    pub fn resampled_field(
        source: &SourceIdentity,
        lmax: usize,
        iterations: u32,
        nside: Nside,
        fwhm: f64,
    ) -> Self {
        Self::new(
            ScalarField::KIND,
            &format!("source={source}/lmax={lmax}/iter={iterations}/nside={nside}/fwhm={fwhm}"),
        )
    }

    /// Key of the triangle topology of one resolution.
    #[must_use]
    pub fn topology(nside: Nside) -> Self {
        Self::new(TriangleTopology::KIND, &format!("nside={nside}"))
    }

    /// Artifact family of this key.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Full key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// File-system safe name derived from the key.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}-{:016x}", self.kind, fnv1a(&self.text))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// 64-bit FNV-1a, stable across platforms and compiler versions.
fn fnv1a(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes()
        .fold(OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

/// A stored artifact: its family, a JSON shape description and raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub kind: String,
    pub shape: serde_json::Value,
    pub payload: Vec<u8>,
}

/// Backend of a [`ResultCache`].
pub trait CacheStore {
    /// Fetches the entry stored under `key`, if any.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Stores `entry` under `key`.
    fn put(&mut self, key: &CacheKey, entry: &CacheEntry) -> Result<()>;

    /// Short description for log messages.
    fn describe(&self) -> String;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        self.entries.insert(key.clone(), entry.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory ({} entries)", self.entries.len())
    }
}

/// Header written next to every payload file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: String,
    kind: String,
    shape: serde_json::Value,
    payload_len: usize,
}

/// Persistent store: one `<stem>.json` header and one `<stem>.bin` payload
/// per entry inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens (and creates if needed) a cache directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn header_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.file_stem()))
    }

    fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.bin", key.file_stem()))
    }
}

impl CacheStore for DirectoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let header_path = self.header_path(key);
        let text = match std::fs::read_to_string(&header_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let header: EntryHeader = serde_json::from_str(&text)
            .map_err(|e| Cmb2SphereError::cache_corrupt(key.as_str(), e.to_string()))?;
        if header.key != key.as_str() {
            return Err(Cmb2SphereError::cache_corrupt(
                key.as_str(),
                format!("file holds entry for '{}'", header.key),
            ));
        }

        let payload = std::fs::read(self.payload_path(key)).map_err(|e| {
            Cmb2SphereError::cache_corrupt(key.as_str(), format!("payload unreadable: {e}"))
        })?;
        if payload.len() != header.payload_len {
            return Err(Cmb2SphereError::cache_corrupt(
                key.as_str(),
                format!(
                    "payload has {} bytes, header promises {}",
                    payload.len(),
                    header.payload_len
                ),
            ));
        }

        Ok(Some(CacheEntry {
            kind: header.kind,
            shape: header.shape,
            payload,
        }))
    }

    fn put(&mut self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        // Payload first: a header on disk means the entry is complete.
        write_replacing(&self.payload_path(key), &entry.payload)?;
        let header = EntryHeader {
            key: key.as_str().to_string(),
            kind: entry.kind.clone(),
            shape: entry.shape.clone(),
            payload_len: entry.payload.len(),
        };
        write_replacing(&self.header_path(key), &serde_json::to_vec_pretty(&header)?)
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Writes through a sibling temporary file and renames it into place.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// A value that can be stored in a [`ResultCache`].
pub trait CacheArtifact: Sized {
    /// Artifact family, also the prefix of its keys.
    const KIND: &'static str;

    /// Small description stored as JSON next to the payload.
    type Shape: Serialize + DeserializeOwned;

    fn shape(&self) -> Self::Shape;

    fn payload(&self) -> Vec<u8>;

    /// Rebuilds the value, validating the payload against the shape.
    fn from_parts(key: &CacheKey, shape: Self::Shape, payload: &[u8]) -> Result<Self>;
}

fn decode<T: bytemuck::Pod>(key: &CacheKey, payload: &[u8], count: usize) -> Result<Vec<T>> {
    let size = std::mem::size_of::<T>();
    if payload.len() != count * size {
        return Err(Cmb2SphereError::cache_corrupt(
            key.as_str(),
            format!(
                "expected {count} items of {size} bytes, payload has {} bytes",
                payload.len()
            ),
        ));
    }
    Ok(bytemuck::pod_collect_to_vec(payload))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FieldShape {
    nside: Nside,
    len: usize,
}

impl CacheArtifact for ScalarField {
    const KIND: &'static str = "field";
    type Shape = FieldShape;

    fn shape(&self) -> FieldShape {
        FieldShape {
            nside: self.nside(),
            len: self.len(),
        }
    }

    fn payload(&self) -> Vec<u8> {
        bytemuck::cast_slice(self.values()).to_vec()
    }

    fn from_parts(key: &CacheKey, shape: FieldShape, payload: &[u8]) -> Result<Self> {
        let expected = shape.nside.pixel_count();
        if shape.len != expected {
            return Err(Cmb2SphereError::ResolutionMismatch {
                expected,
                actual: shape.len,
            });
        }
        let values = decode::<f64>(key, payload, shape.len)?;
        ScalarField::new(shape.nside, values)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CoefficientShape {
    source: SourceIdentity,
    lmax: usize,
    mmax: usize,
}

impl CacheArtifact for SpectralCoefficients {
    const KIND: &'static str = "alm";
    type Shape = CoefficientShape;

    fn shape(&self) -> CoefficientShape {
        CoefficientShape {
            source: self.source.clone(),
            lmax: self.alm.lmax(),
            mmax: self.alm.mmax(),
        }
    }

    fn payload(&self) -> Vec<u8> {
        bytemuck::cast_slice(self.alm.coeffs()).to_vec()
    }

    fn from_parts(key: &CacheKey, shape: CoefficientShape, payload: &[u8]) -> Result<Self> {
        let count = crate::alm::alm_len(shape.lmax, shape.mmax);
        let coeffs = decode(key, payload, count)?;
        Ok(SpectralCoefficients {
            source: shape.source,
            alm: Alm::from_coeffs(shape.lmax, shape.mmax, coeffs)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopologyShape {
    nside: Nside,
    triangles: usize,
    corrected: usize,
}

impl CacheArtifact for TriangleTopology {
    const KIND: &'static str = "topology";
    type Shape = TopologyShape;

    fn shape(&self) -> TopologyShape {
        TopologyShape {
            nside: self.nside(),
            triangles: self.len(),
            corrected: self.corrected_count(),
        }
    }

    fn payload(&self) -> Vec<u8> {
        bytemuck::cast_slice(self.triangles()).to_vec()
    }

    fn from_parts(key: &CacheKey, shape: TopologyShape, payload: &[u8]) -> Result<Self> {
        let triangles = decode::<[u32; 3]>(key, payload, shape.triangles)?;
        TriangleTopology::from_oriented(shape.nside, triangles, shape.corrected)
    }
}

/// Hit/miss counters of a [`ResultCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
}

/// Typed, optional cache in front of a [`CacheStore`].
///
/// A disabled cache never finds anything and silently drops writes, so
/// callers compute everything; results are identical either way.
#[derive(Default)]
pub struct ResultCache {
    store: Option<Box<dyn CacheStore>>,
    stats: CacheStats,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("store", &self.store.as_ref().map(|s| s.describe()))
            .field("stats", &self.stats)
            .finish()
    }
}

impl ResultCache {
    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A process-local cache.
    pub fn in_memory() -> Self {
        Self::with_store(Box::new(MemoryStore::new()))
    }

    /// A persistent cache in `root`.
    pub fn on_disk(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_store(Box::new(DirectoryStore::open(root)?)))
    }

    pub fn with_store(store: Box<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            stats: CacheStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Looks up `key`, decoding the entry as `T`.
    pub fn lookup<T: CacheArtifact>(&mut self, key: &CacheKey) -> Result<Lookup<T>> {
        debug_assert_eq!(key.kind(), T::KIND, "key family does not match artifact");
        let Some(store) = self.store.as_ref() else {
            return Ok(Lookup::NotFound);
        };
        let Some(entry) = store.get(key)? else {
            self.stats.misses += 1;
            log::debug!("cache miss: {key}");
            return Ok(Lookup::NotFound);
        };

        if entry.kind != T::KIND {
            return Err(Cmb2SphereError::cache_corrupt(
                key.as_str(),
                format!("entry is a '{}', expected '{}'", entry.kind, T::KIND),
            ));
        }
        let shape: T::Shape = serde_json::from_value(entry.shape)
            .map_err(|e| Cmb2SphereError::cache_corrupt(key.as_str(), e.to_string()))?;
        let value = T::from_parts(key, shape, &entry.payload)?;

        self.stats.hits += 1;
        log::debug!("cache hit: {key}");
        Ok(Lookup::Found(value))
    }

    /// Stores `value` under `key`.
    ///
    /// Storing an identical value again is a no-op; storing a different one
    /// fails with `CacheConflict`.
    pub fn store<T: CacheArtifact>(&mut self, key: &CacheKey, value: &T) -> Result<()> {
        debug_assert_eq!(key.kind(), T::KIND, "key family does not match artifact");
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let entry = CacheEntry {
            kind: T::KIND.to_string(),
            shape: serde_json::to_value(value.shape())?,
            payload: value.payload(),
        };

        if let Some(existing) = store.get(key)? {
            if existing == entry {
                return Ok(());
            }
            return Err(Cmb2SphereError::CacheConflict {
                key: key.as_str().to_string(),
            });
        }

        store.put(key, &entry)?;
        self.stats.writes += 1;
        log::debug!("cache write: {key} ({} bytes)", entry.payload.len());
        Ok(())
    }
}

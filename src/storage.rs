use crate::error::{RecognizerError, Result};
use crate::models::{Fingerprint, Recording, RecordingId, TokenHash};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One stored occurrence of a hash: which recording, and at which frame
pub type Occurrence = (RecordingId, u32);

/// Durable mapping from token hash to occurrences, plus recording metadata.
///
/// A completed `store` must be visible as a whole: concurrent lookups see
/// either none or all of a recording's fingerprints.
pub trait FingerprintIndex: Send + Sync {
    /// Registers recording metadata and returns its new id
    fn add_recording(&self, name: &str, artist: &str, duration_secs: f32) -> Result<RecordingId>;

    /// Persists every fingerprint of `recording_id`
    fn store(&self, recording_id: RecordingId, fingerprints: &[Fingerprint]) -> Result<()>;

    /// Drops a recording's metadata and all of its occurrences.
    /// Returns whether the recording existed.
    fn remove_recording(&self, id: RecordingId) -> Result<bool>;

    /// Registers a recording together with its fingerprints.
    ///
    /// Either both land or neither does: a failed `store` removes the
    /// metadata again before the error is returned.
    fn add_recording_with_fingerprints(
        &self,
        name: &str,
        artist: &str,
        duration_secs: f32,
        fingerprints: &[Fingerprint],
    ) -> Result<RecordingId> {
        let id = self.add_recording(name, artist, duration_secs)?;
        if let Err(err) = self.store(id, fingerprints) {
            if let Err(cleanup) = self.remove_recording(id) {
                warn!("Could not roll back recording {}: {}", id, cleanup);
            }
            return Err(err);
        }
        Ok(id)
    }

    /// All occurrences of `hash` across all recordings; empty if none
    fn lookup(&self, hash: TokenHash) -> Result<Vec<Occurrence>>;

    /// Looks up several hashes at once, in order
    fn lookup_batch(&self, hashes: &[TokenHash]) -> Result<Vec<Vec<Occurrence>>> {
        hashes.iter().map(|&hash| self.lookup(hash)).collect()
    }

    fn get_recording(&self, id: RecordingId) -> Result<Option<Recording>>;

    fn list_recordings(&self) -> Result<Vec<Recording>>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.list_recordings()?.is_empty())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    next_id: RecordingId,
    recordings: BTreeMap<RecordingId, Recording>,
    entries: HashMap<TokenHash, Vec<Occurrence>>,
}

/// In-process index guarded by a read/write lock
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored occurrences across all hashes
    pub fn occurrence_count(&self) -> usize {
        self.state.read().entries.values().map(Vec::len).sum()
    }

    fn group(
        recording_id: RecordingId,
        fingerprints: &[Fingerprint],
    ) -> HashMap<TokenHash, Vec<Occurrence>> {
        let mut batch: HashMap<TokenHash, Vec<Occurrence>> = HashMap::new();
        for fp in fingerprints {
            batch
                .entry(fp.hash)
                .or_default()
                .push((recording_id, fp.anchor_time));
        }
        batch
    }

    /// Writes a JSON snapshot of the whole index
    pub fn save_json<W: Write>(&self, writer: W) -> Result<()> {
        let state = self.state.read();
        serde_json::to_writer(writer, &*state)?;
        Ok(())
    }

    /// Restores an index from a snapshot written by [`MemoryIndex::save_json`]
    pub fn load_json<R: Read>(reader: R) -> Result<Self> {
        let state: IndexState = serde_json::from_reader(reader)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl FingerprintIndex for MemoryIndex {
    fn add_recording(&self, name: &str, artist: &str, duration_secs: f32) -> Result<RecordingId> {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = state.next_id;
        state.recordings.insert(
            id,
            Recording {
                id,
                name: name.to_string(),
                artist: artist.to_string(),
                duration_secs,
            },
        );
        Ok(id)
    }

    fn store(&self, recording_id: RecordingId, fingerprints: &[Fingerprint]) -> Result<()> {
        // Group outside the lock, then publish in one write
        let batch = Self::group(recording_id, fingerprints);

        let mut state = self.state.write();
        if !state.recordings.contains_key(&recording_id) {
            return Err(RecognizerError::Storage(format!(
                "unknown recording id {}",
                recording_id
            )));
        }
        for (hash, occurrences) in batch {
            state.entries.entry(hash).or_default().extend(occurrences);
        }
        Ok(())
    }

    fn remove_recording(&self, id: RecordingId) -> Result<bool> {
        let mut state = self.state.write();
        if state.recordings.remove(&id).is_none() {
            return Ok(false);
        }
        state.entries.retain(|_, occurrences| {
            occurrences.retain(|&(recording_id, _)| recording_id != id);
            !occurrences.is_empty()
        });
        Ok(true)
    }

    fn add_recording_with_fingerprints(
        &self,
        name: &str,
        artist: &str,
        duration_secs: f32,
        fingerprints: &[Fingerprint],
    ) -> Result<RecordingId> {
        let mut state = self.state.write();
        let id = state.next_id + 1;
        let batch = Self::group(id, fingerprints);

        state.next_id = id;
        state.recordings.insert(
            id,
            Recording {
                id,
                name: name.to_string(),
                artist: artist.to_string(),
                duration_secs,
            },
        );
        for (hash, occurrences) in batch {
            state.entries.entry(hash).or_default().extend(occurrences);
        }
        Ok(id)
    }

    fn lookup(&self, hash: TokenHash) -> Result<Vec<Occurrence>> {
        Ok(self
            .state
            .read()
            .entries
            .get(&hash)
            .cloned()
            .unwrap_or_default())
    }

    fn lookup_batch(&self, hashes: &[TokenHash]) -> Result<Vec<Vec<Occurrence>>> {
        let state = self.state.read();
        Ok(hashes
            .iter()
            .map(|hash| state.entries.get(hash).cloned().unwrap_or_default())
            .collect())
    }

    fn get_recording(&self, id: RecordingId) -> Result<Option<Recording>> {
        Ok(self.state.read().recordings.get(&id).cloned())
    }

    fn list_recordings(&self) -> Result<Vec<Recording>> {
        Ok(self.state.read().recordings.values().cloned().collect())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.state.read().recordings.is_empty())
    }
}

/// A [`MemoryIndex`] persisted as a JSON snapshot on disk.
///
/// Every mutation rewrites the snapshot via a temp file and a rename, so a
/// crash leaves either the old or the new snapshot.
#[derive(Debug)]
pub struct JsonFileIndex {
    path: PathBuf,
    index: MemoryIndex,
    write_lock: Mutex<()>,
}

impl JsonFileIndex {
    /// Opens the snapshot at `path`, or starts empty if it does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let index = if path.exists() {
            let file = fs::File::open(&path)?;
            let index = MemoryIndex::load_json(BufReader::new(file))?;
            info!(
                "Opened index {} with {} recordings",
                path.display(),
                index.state.read().recordings.len()
            );
            index
        } else {
            info!("Creating new index at {}", path.display());
            MemoryIndex::new()
        };

        Ok(Self {
            path,
            index,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            self.index.save_json(&mut writer)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted index to {}", self.path.display());
        Ok(())
    }
}

impl FingerprintIndex for JsonFileIndex {
    fn add_recording(&self, name: &str, artist: &str, duration_secs: f32) -> Result<RecordingId> {
        let _guard = self.write_lock.lock();
        let id = self.index.add_recording(name, artist, duration_secs)?;
        self.persist()?;
        Ok(id)
    }

    fn store(&self, recording_id: RecordingId, fingerprints: &[Fingerprint]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.index.store(recording_id, fingerprints)?;
        self.persist()
    }

    fn remove_recording(&self, id: RecordingId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let removed = self.index.remove_recording(id)?;
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn add_recording_with_fingerprints(
        &self,
        name: &str,
        artist: &str,
        duration_secs: f32,
        fingerprints: &[Fingerprint],
    ) -> Result<RecordingId> {
        let _guard = self.write_lock.lock();
        let id = self
            .index
            .add_recording_with_fingerprints(name, artist, duration_secs, fingerprints)?;
        // Memory must not run ahead of the snapshot
        if let Err(err) = self.persist() {
            self.index.remove_recording(id)?;
            return Err(err);
        }
        Ok(id)
    }

    fn lookup(&self, hash: TokenHash) -> Result<Vec<Occurrence>> {
        self.index.lookup(hash)
    }

    fn lookup_batch(&self, hashes: &[TokenHash]) -> Result<Vec<Vec<Occurrence>>> {
        self.index.lookup_batch(hashes)
    }

    fn get_recording(&self, id: RecordingId) -> Result<Option<Recording>> {
        self.index.get_recording(id)
    }

    fn list_recordings(&self) -> Result<Vec<Recording>> {
        self.index.list_recordings()
    }

    fn is_empty(&self) -> Result<bool> {
        self.index.is_empty()
    }
}

#[cfg(feature = "redis")]
pub use self::redis_index::RedisIndex;

#[cfg(feature = "redis")]
mod redis_index {
    use super::{FingerprintIndex, Occurrence};
    use crate::error::{RecognizerError, Result};
    use crate::models::{Fingerprint, Recording, RecordingId, TokenHash};
    use redis::{Client, Commands};
    use tracing::info;

    /// Manages fingerprints and recording metadata in Redis
    ///
    /// # Storage Structure
    /// - Recording metadata is stored as JSON in "recording:{id}" keys
    /// - Ids come from the "recording_counter" key; known ids live in the "recordings" set
    /// - Each "hash:{hex}" key is a list of "{id}:{anchor_time}" occurrences
    /// - "recording:{id}:hashes" is the set of hash keys a recording touched
    pub struct RedisIndex {
        client: Client,
    }

    impl RedisIndex {
        /// # Arguments
        /// * `redis_url` - URL of the Redis server (e.g., "redis://127.0.0.1/")
        pub fn new(redis_url: &str) -> Result<Self> {
            let client = Client::open(redis_url)?;
            Ok(RedisIndex { client })
        }

        fn hash_key(hash: TokenHash) -> String {
            format!("hash:{}", hash)
        }

        fn hashes_key(id: RecordingId) -> String {
            format!("recording:{}:hashes", id)
        }

        fn queue_metadata(pipe: &mut redis::Pipeline, recording: &Recording) -> Result<()> {
            let json = serde_json::to_string(recording)?;
            pipe.set(format!("recording:{}", recording.id), json)
                .ignore()
                .sadd("recordings", recording.id)
                .ignore();
            Ok(())
        }

        fn queue_fingerprints(
            pipe: &mut redis::Pipeline,
            recording_id: RecordingId,
            fingerprints: &[Fingerprint],
        ) {
            for fp in fingerprints {
                let key = Self::hash_key(fp.hash);
                pipe.rpush(&key, format!("{}:{}", recording_id, fp.anchor_time))
                    .ignore()
                    .sadd(Self::hashes_key(recording_id), &key)
                    .ignore();
            }
        }

        fn parse_occurrence(raw: &str) -> Result<Occurrence> {
            let parsed: Option<Occurrence> = raw
                .split_once(':')
                .and_then(|(id, time)| Some((id.parse().ok()?, time.parse().ok()?)));
            parsed.ok_or_else(|| {
                RecognizerError::Storage(format!("malformed occurrence {:?}", raw))
            })
        }
    }

    impl FingerprintIndex for RedisIndex {
        fn add_recording(
            &self,
            name: &str,
            artist: &str,
            duration_secs: f32,
        ) -> Result<RecordingId> {
            let mut conn = self.client.get_connection()?;
            let id: u64 = conn.incr("recording_counter", 1)?;

            let recording = Recording {
                id,
                name: name.to_string(),
                artist: artist.to_string(),
                duration_secs,
            };
            let mut pipe = redis::pipe();
            pipe.atomic();
            Self::queue_metadata(&mut pipe, &recording)?;
            pipe.query::<()>(&mut conn)?;

            info!("Stored recording '{}' by '{}' with ID: {}", name, artist, id);
            Ok(id)
        }

        fn store(&self, recording_id: RecordingId, fingerprints: &[Fingerprint]) -> Result<()> {
            let mut conn = self.client.get_connection()?;

            // MULTI/EXEC so readers never see part of a recording
            let mut pipe = redis::pipe();
            pipe.atomic();
            Self::queue_fingerprints(&mut pipe, recording_id, fingerprints);
            pipe.query::<()>(&mut conn)?;
            Ok(())
        }

        fn remove_recording(&self, id: RecordingId) -> Result<bool> {
            let mut conn = self.client.get_connection()?;
            let keys: Vec<String> = conn.smembers(Self::hashes_key(id))?;
            let prefix = format!("{}:", id);

            let mut pipe = redis::pipe();
            pipe.atomic();
            for key in &keys {
                let raw: Vec<String> = conn.lrange(key, 0, -1)?;
                for value in raw.iter().filter(|v| v.starts_with(&prefix)) {
                    pipe.lrem(key, 0, value).ignore();
                }
            }
            pipe.del(Self::hashes_key(id))
                .ignore()
                .del(format!("recording:{}", id))
                .ignore()
                .srem("recordings", id);
            let (removed,): (u64,) = pipe.query(&mut conn)?;

            info!("Removed recording {} from {} hash keys", id, keys.len());
            Ok(removed > 0)
        }

        fn add_recording_with_fingerprints(
            &self,
            name: &str,
            artist: &str,
            duration_secs: f32,
            fingerprints: &[Fingerprint],
        ) -> Result<RecordingId> {
            let mut conn = self.client.get_connection()?;
            let id: u64 = conn.incr("recording_counter", 1)?;
            let recording = Recording {
                id,
                name: name.to_string(),
                artist: artist.to_string(),
                duration_secs,
            };

            // Metadata and fingerprints in one MULTI/EXEC
            let mut pipe = redis::pipe();
            pipe.atomic();
            Self::queue_metadata(&mut pipe, &recording)?;
            Self::queue_fingerprints(&mut pipe, id, fingerprints);
            pipe.query::<()>(&mut conn)?;

            info!(
                "Stored recording '{}' by '{}' with ID: {} ({} fingerprints)",
                name,
                artist,
                id,
                fingerprints.len()
            );
            Ok(id)
        }

        fn lookup(&self, hash: TokenHash) -> Result<Vec<Occurrence>> {
            let mut conn = self.client.get_connection()?;
            let raw: Vec<String> = conn.lrange(Self::hash_key(hash), 0, -1)?;
            raw.iter().map(|r| Self::parse_occurrence(r)).collect()
        }

        fn lookup_batch(&self, hashes: &[TokenHash]) -> Result<Vec<Vec<Occurrence>>> {
            let mut conn = self.client.get_connection()?;
            let mut pipe = redis::pipe();
            for &hash in hashes {
                pipe.lrange(Self::hash_key(hash), 0, -1);
            }
            let raw: Vec<Vec<String>> = pipe.query(&mut conn)?;
            raw.iter()
                .map(|list| list.iter().map(|r| Self::parse_occurrence(r)).collect())
                .collect()
        }

        fn get_recording(&self, id: RecordingId) -> Result<Option<Recording>> {
            let mut conn = self.client.get_connection()?;
            let json: Option<String> = conn.get(format!("recording:{}", id))?;
            json.map(|j| serde_json::from_str(&j).map_err(RecognizerError::from))
                .transpose()
        }

        fn list_recordings(&self) -> Result<Vec<Recording>> {
            let mut conn = self.client.get_connection()?;
            let mut ids: Vec<u64> = conn.smembers("recordings")?;
            ids.sort_unstable();

            let mut recordings = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(recording) = self.get_recording(id)? {
                    recordings.push(recording);
                }
            }
            Ok(recordings)
        }

        fn is_empty(&self) -> Result<bool> {
            let mut conn = self.client.get_connection()?;
            let count: u64 = conn.scard("recordings")?;
            Ok(count == 0)
        }
    }
}

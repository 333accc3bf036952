//! Alignment voting over index hits.
//!
//! Every hit of a sample hash votes for `indexed anchor time - sample anchor
//! time` under its recording. A true match piles its votes on one offset;
//! hash collisions scatter theirs.

use crate::config::MatcherConfig;
use crate::error::Result;
use crate::models::{Fingerprint, RecordingId};
use crate::storage::FingerprintIndex;
use std::collections::BTreeMap;
use tracing::debug;

/// Offset evidence for one recording, alive for a single query
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub recording_id: RecordingId,
    offsets: Vec<i64>,
}

impl MatchCandidate {
    pub fn new(recording_id: RecordingId) -> Self {
        Self {
            recording_id,
            offsets: Vec::new(),
        }
    }

    pub fn push(&mut self, offset: i64) {
        self.offsets.push(offset);
    }

    pub fn hits(&self) -> usize {
        self.offsets.len()
    }

    /// Most frequent offset and its count. Equal counts go to the smaller offset.
    pub fn best_alignment(&self) -> Option<(i64, usize)> {
        let mut sorted = self.offsets.clone();
        sorted.sort_unstable();

        let mut best: Option<(i64, usize)> = None;
        for run in sorted.chunk_by(|a, b| a == b) {
            if best.map_or(true, |(_, count)| run.len() > count) {
                best = Some((run[0], run.len()));
            }
        }
        best
    }
}

/// Winning recording of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub recording_id: RecordingId,
    /// Votes at the winning offset
    pub confidence: usize,
    /// Sample start within the recording, in spectrogram frames
    pub offset_frames: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Collects the per-recording offset evidence for `sample`
    pub fn collect_candidates<I: FingerprintIndex + ?Sized>(
        &self,
        sample: &[Fingerprint],
        index: &I,
    ) -> Result<BTreeMap<RecordingId, MatchCandidate>> {
        let mut candidates: BTreeMap<RecordingId, MatchCandidate> = BTreeMap::new();
        if sample.is_empty() {
            return Ok(candidates);
        }

        let hashes: Vec<_> = sample.iter().map(|fp| fp.hash).collect();
        let hits = index.lookup_batch(&hashes)?;

        for (fp, occurrences) in sample.iter().zip(hits) {
            for (recording_id, indexed_time) in occurrences {
                candidates
                    .entry(recording_id)
                    .or_insert_with(|| MatchCandidate::new(recording_id))
                    .push(indexed_time as i64 - fp.anchor_time as i64);
            }
        }
        Ok(candidates)
    }

    /// Best-aligned recording regardless of the confidence threshold.
    /// Equal confidence goes to the lowest recording id.
    pub fn best_candidate<I: FingerprintIndex + ?Sized>(
        &self,
        sample: &[Fingerprint],
        index: &I,
    ) -> Result<Option<MatchOutcome>> {
        let candidates = self.collect_candidates(sample, index)?;

        let mut best: Option<MatchOutcome> = None;
        for candidate in candidates.values() {
            let Some((offset, count)) = candidate.best_alignment() else {
                continue;
            };
            if best.map_or(true, |b| count > b.confidence) {
                best = Some(MatchOutcome {
                    recording_id: candidate.recording_id,
                    confidence: count,
                    offset_frames: offset,
                });
            }
        }

        debug!(
            "Matcher: {} sample hashes, {} candidates, best {:?}",
            sample.len(),
            candidates.len(),
            best
        );
        Ok(best)
    }

    /// Best-aligned recording if it clears `min_confidence`
    pub fn find_match<I: FingerprintIndex + ?Sized>(
        &self,
        sample: &[Fingerprint],
        index: &I,
    ) -> Result<Option<MatchOutcome>> {
        Ok(self
            .best_candidate(sample, index)?
            .filter(|outcome| outcome.confidence >= self.config.min_confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognizerError;
    use crate::models::{Recording, TokenHash};
    use crate::storage::{MemoryIndex, Occurrence};

    fn fp(hash: u64, anchor_time: u32) -> Fingerprint {
        Fingerprint {
            hash: TokenHash(hash),
            anchor_time,
        }
    }

    /// `aligned` hashes agree on an offset of 100 frames; `noise` hashes
    /// each land on a different offset.
    fn index_with_alignment(aligned: u64, noise: u64) -> (MemoryIndex, Vec<Fingerprint>) {
        let index = MemoryIndex::new();
        let id = index.add_recording("target", "artist", 60.0).unwrap();

        let mut stored = Vec::new();
        let mut sample = Vec::new();
        for h in 0..aligned {
            stored.push(fp(h, 100 + h as u32));
            sample.push(fp(h, h as u32));
        }
        for h in 0..noise {
            let hash = 1_000 + h;
            stored.push(fp(hash, 500 + 3 * h as u32));
            sample.push(fp(hash, 0));
        }
        index.store(id, &stored).unwrap();
        (index, sample)
    }

    #[test]
    fn test_histogram_peak_and_tie_break() {
        let mut candidate = MatchCandidate::new(1);
        for offset in [5, 3, 5, 3, 9] {
            candidate.push(offset);
        }
        assert_eq!(candidate.hits(), 5);
        assert_eq!(candidate.best_alignment(), Some((3, 2)));
        assert_eq!(MatchCandidate::new(2).best_alignment(), None);
    }

    #[test]
    fn test_four_votes_not_recognized() {
        let (index, sample) = index_with_alignment(4, 20);
        let matcher = Matcher::default();
        assert_eq!(
            matcher.best_candidate(&sample, &index).unwrap().map(|o| o.confidence),
            Some(4)
        );
        assert_eq!(matcher.find_match(&sample, &index).unwrap(), None);
    }

    #[test]
    fn test_five_votes_recognized() {
        let (index, sample) = index_with_alignment(5, 20);
        let outcome = Matcher::default().find_match(&sample, &index).unwrap().unwrap();
        assert_eq!(outcome.confidence, 5);
        assert_eq!(outcome.offset_frames, 100);
    }

    #[test]
    fn test_empty_sample_and_empty_index() {
        let matcher = Matcher::default();
        let (index, _) = index_with_alignment(10, 0);
        assert_eq!(matcher.find_match(&[], &index).unwrap(), None);

        let empty = MemoryIndex::new();
        let sample: Vec<_> = (0..50).map(|h| fp(h, h as u32)).collect();
        assert_eq!(matcher.find_match(&sample, &empty).unwrap(), None);
    }

    #[test]
    fn test_equal_votes_go_to_lowest_id() {
        let index = MemoryIndex::new();
        let first = index.add_recording("first", "a", 10.0).unwrap();
        let second = index.add_recording("second", "b", 10.0).unwrap();
        let shared: Vec<_> = (0..6).map(|h| fp(h, 40 + h as u32)).collect();
        index.store(second, &shared).unwrap();
        index.store(first, &shared).unwrap();

        let sample: Vec<_> = (0..6).map(|h| fp(h, h as u32)).collect();
        let outcome = Matcher::default().find_match(&sample, &index).unwrap().unwrap();
        assert_eq!(outcome.recording_id, first);
        assert_eq!(outcome.offset_frames, 40);
    }

    #[test]
    fn test_scattered_collisions_lose_to_aligned_votes() {
        let index = MemoryIndex::new();
        let noisy = index.add_recording("noisy", "a", 10.0).unwrap();
        let real = index.add_recording("real", "b", 10.0).unwrap();

        // `noisy` shares more hashes but at inconsistent offsets
        let noisy_prints: Vec<_> = (0..30).map(|h| fp(h, (h * 7) as u32)).collect();
        let real_prints: Vec<_> = (0..8).map(|h| fp(h, 20 + h as u32)).collect();
        index.store(noisy, &noisy_prints).unwrap();
        index.store(real, &real_prints).unwrap();

        let sample: Vec<_> = (0..30).map(|h| fp(h, h as u32)).collect();
        let outcome = Matcher::default().find_match(&sample, &index).unwrap().unwrap();
        assert_eq!(outcome.recording_id, real);
        assert_eq!(outcome.confidence, 8);
    }

    struct FailingIndex;

    impl FingerprintIndex for FailingIndex {
        fn add_recording(&self, _: &str, _: &str, _: f32) -> Result<RecordingId> {
            Err(RecognizerError::Storage("offline".into()))
        }
        fn store(&self, _: RecordingId, _: &[Fingerprint]) -> Result<()> {
            Err(RecognizerError::Storage("offline".into()))
        }
        fn remove_recording(&self, _: RecordingId) -> Result<bool> {
            Err(RecognizerError::Storage("offline".into()))
        }
        fn lookup(&self, _: TokenHash) -> Result<Vec<Occurrence>> {
            Err(RecognizerError::Storage("offline".into()))
        }
        fn get_recording(&self, _: RecordingId) -> Result<Option<Recording>> {
            Err(RecognizerError::Storage("offline".into()))
        }
        fn list_recordings(&self) -> Result<Vec<Recording>> {
            Err(RecognizerError::Storage("offline".into()))
        }
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let sample = vec![fp(1, 0)];
        let result = Matcher::default().find_match(&sample, &FailingIndex);
        assert!(matches!(result, Err(RecognizerError::Storage(_))));
    }
}

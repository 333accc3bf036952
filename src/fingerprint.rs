use crate::config::FingerprintConfig;
use crate::error::Result;
use crate::models::{Fingerprint, Peak, SongFingerprint, Token, TokenHash, Waveform};
use crate::peaks::extract_peaks;
use crate::spectrogram::Spectrogram;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use tracing::{debug, info};

/// Main fingerprinting engine
/// This struct implements the landmark fingerprinting algorithm which:
/// 1. Converts audio to a log-magnitude spectrogram using the STFT
/// 2. Extracts the loudest local maxima as peaks
/// 3. Pairs every peak with later peaks in an adaptive target zone
/// 4. Hashes each pair, keeping the anchor time alongside the hash
#[derive(Debug, Clone, Default)]
pub struct AudioFingerprinter {
    config: FingerprintConfig,
}

impl AudioFingerprinter {
    pub fn new(config: FingerprintConfig) -> Self {
        AudioFingerprinter { config }
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Generates the hashed fingerprints of a waveform
    ///
    /// The waveform must already be at `config.sample_rate`.
    pub fn generate_fingerprint(&self, waveform: &Waveform) -> Result<SongFingerprint> {
        waveform.validate()?;
        let duration_secs = waveform.duration_secs();

        let spectrogram = Spectrogram::build(&waveform.samples, &self.config)?;
        let peaks = extract_peaks(&spectrogram, duration_secs, &self.config);
        let tokens = self.generate_tokens(&peaks, duration_secs);

        let fingerprints: Vec<Fingerprint> = tokens.iter().map(hash_token).collect();
        info!(
            "Generated {} fingerprints from {} peaks ({:.2} seconds)",
            fingerprints.len(),
            peaks.len(),
            duration_secs
        );

        Ok(SongFingerprint {
            fingerprints,
            duration_secs,
        })
    }

    /// Pairs peaks into tokens and enforces the fingerprint budget
    ///
    /// Each peak is an anchor for every later peak at most `max_time_delta`
    /// frames away whose bin differs by more than `min_freq_delta`. Peaks
    /// are put in (frame, bin) order first if they are not already.
    pub fn generate_tokens(&self, peaks: &[Peak], duration_secs: f32) -> Vec<Token> {
        let peaks = time_ordered(peaks);
        let min_delta = self.config.min_time_delta;
        let max_delta = self.config.max_time_delta(duration_secs);
        let mut tokens = Vec::new();

        for (i, anchor) in peaks.iter().enumerate() {
            for target in &peaks[i + 1..] {
                let time_delta = target.frame.saturating_sub(anchor.frame);
                if time_delta > max_delta {
                    break;
                }
                if time_delta < min_delta {
                    continue;
                }
                if anchor.freq_bin.abs_diff(target.freq_bin) <= self.config.min_freq_delta {
                    continue;
                }
                tokens.push(Token {
                    anchor_freq: anchor.freq_bin,
                    target_freq: target.freq_bin,
                    time_delta,
                    anchor_time: anchor.frame,
                });
            }
        }

        let cap = self.config.fingerprint_cap(duration_secs);
        debug!(
            "Tokens: {} pairs within {} frames (cap {})",
            tokens.len(),
            max_delta,
            cap
        );
        self.downsample(tokens, cap)
    }

    /// Uniform random sample without replacement down to `cap`
    fn downsample(&self, tokens: Vec<Token>, cap: usize) -> Vec<Token> {
        if tokens.len() <= cap {
            return tokens;
        }

        let mut rng = match self.config.sampling_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut chosen = rand::seq::index::sample(&mut rng, tokens.len(), cap).into_vec();
        chosen.sort_unstable();
        chosen.into_iter().map(|i| tokens[i]).collect()
    }
}

/// Hashes (anchor frequency, target frequency, time delta) into a
/// [`TokenHash`]. Identical triples hash identically wherever they occur.
pub fn token_hash(anchor_freq: u32, target_freq: u32, time_delta: u32) -> TokenHash {
    let digest = Sha256::digest(format!("{}|{}|{}", anchor_freq, target_freq, time_delta));
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    TokenHash(u64::from_be_bytes(head))
}

fn time_ordered(peaks: &[Peak]) -> Cow<'_, [Peak]> {
    let key = |p: &Peak| (p.frame, p.freq_bin);
    if peaks.windows(2).all(|w| key(&w[0]) <= key(&w[1])) {
        return Cow::Borrowed(peaks);
    }
    let mut sorted = peaks.to_vec();
    sorted.sort_by_key(key);
    Cow::Owned(sorted)
}

pub fn hash_token(token: &Token) -> Fingerprint {
    Fingerprint {
        hash: token_hash(token.anchor_freq, token.target_freq, token.time_delta),
        anchor_time: token.anchor_time,
    }
}

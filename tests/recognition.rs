use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use song_recognizer::{
    AppConfig, FingerprintConfig, FingerprintIndex, MemoryIndex, Recognition, Recognizer,
    RecognizerError, Waveform,
};
use std::f64::consts::PI;

const RATE: u32 = 11_025;
const HOP: usize = 512;

/// A sequence of random three-tone chords, 0.12 s each, with short fades.
/// Rendering the same seed at another rate gives the same music.
fn synth(seed: u64, seconds: f64, sample_rate: u32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let note_len = 0.12;
    let notes = (seconds / note_len).ceil() as usize;
    let chords: Vec<[(f64, f64); 3]> = (0..notes)
        .map(|_| [0, 1, 2].map(|_| (rng.gen_range(200.0..4000.0), rng.gen_range(0.2..1.0))))
        .collect();

    let total = (seconds * sample_rate as f64) as usize;
    (0..total)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let note = ((t / note_len) as usize).min(notes - 1);
            let local = t - note as f64 * note_len;
            let fade = (local / 0.01).min((note_len - local) / 0.01).clamp(0.0, 1.0);
            let value: f64 = chords[note]
                .iter()
                .map(|&(freq, amp)| amp * (2.0 * PI * freq * t).sin())
                .sum();
            (value * fade / 3.0) as f32
        })
        .collect()
}

fn excerpt(samples: &[f32], start_frame: usize, seconds: f64) -> Waveform {
    let start = start_frame * HOP;
    let len = (seconds * RATE as f64) as usize;
    Waveform::new(samples[start..start + len].to_vec(), RATE)
}

fn frame_seconds() -> f32 {
    HOP as f32 / RATE as f32
}

fn recognizer() -> Recognizer<MemoryIndex> {
    Recognizer::new(MemoryIndex::new(), AppConfig::default()).unwrap()
}

fn assert_offset(result: &Recognition, expected_secs: f32) {
    match result {
        Recognition::Recognized {
            time_offset_seconds,
            ..
        } => assert!(
            (time_offset_seconds - expected_secs).abs() <= frame_seconds(),
            "offset {} vs expected {}",
            time_offset_seconds,
            expected_secs
        ),
        Recognition::NotRecognized => panic!("expected a match"),
    }
}

#[test]
fn unmodified_excerpt_is_recognized_at_its_offset() {
    let recognizer = recognizer();
    let song = synth(1, 30.0, RATE);
    let other = synth(2, 30.0, RATE);
    let song_id = recognizer
        .ingest(&Waveform::new(song.clone(), RATE), "505", "Arctic Monkeys")
        .unwrap();
    recognizer
        .ingest(&Waveform::new(other, RATE), "Like Him", "Tyler")
        .unwrap();

    let start_frame = 150;
    let result = recognizer.recognize(&excerpt(&song, start_frame, 6.0)).unwrap();

    assert_eq!(result.recording_id(), Some(song_id));
    match &result {
        Recognition::Recognized {
            name,
            artist,
            confidence,
            ..
        } => {
            assert_eq!(name, "505");
            assert_eq!(artist, "Arctic Monkeys");
            assert!(*confidence >= 5);
        }
        Recognition::NotRecognized => panic!("expected a match"),
    }
    assert_offset(&result, start_frame as f32 * frame_seconds());
}

#[test]
fn excerpt_of_second_recording_picks_second() {
    let recognizer = recognizer();
    let first = synth(10, 20.0, RATE);
    let second = synth(11, 20.0, RATE);
    recognizer
        .ingest(&Waveform::new(first, RATE), "first", "a")
        .unwrap();
    let second_id = recognizer
        .ingest(&Waveform::new(second.clone(), RATE), "second", "b")
        .unwrap();

    let result = recognizer.recognize(&excerpt(&second, 60, 5.0)).unwrap();
    assert_eq!(result.recording_id(), Some(second_id));
}

#[test]
fn low_noise_keeps_the_same_recording() {
    let recognizer = recognizer();
    let song = synth(3, 25.0, RATE);
    recognizer
        .ingest(&Waveform::new(synth(4, 25.0, RATE), RATE), "decoy", "x")
        .unwrap();
    let song_id = recognizer
        .ingest(&Waveform::new(song.clone(), RATE), "song", "y")
        .unwrap();

    let clean = excerpt(&song, 100, 6.0);
    let mut rng = StdRng::seed_from_u64(99);
    let noisy = Waveform::new(
        clean
            .samples
            .iter()
            .map(|s| s + rng.gen_range(-0.01..0.01))
            .collect(),
        RATE,
    );

    let clean_result = recognizer.recognize(&clean).unwrap();
    let noisy_result = recognizer.recognize(&noisy).unwrap();
    assert_eq!(clean_result.recording_id(), Some(song_id));
    assert_eq!(noisy_result.recording_id(), Some(song_id));
}

#[test]
fn shifted_excerpts_report_shifted_offsets() {
    let recognizer = recognizer();
    let song = synth(5, 30.0, RATE);
    let id = recognizer
        .ingest(&Waveform::new(song.clone(), RATE), "song", "artist")
        .unwrap();

    let early = recognizer.recognize(&excerpt(&song, 40, 5.0)).unwrap();
    let late = recognizer.recognize(&excerpt(&song, 300, 5.0)).unwrap();

    assert_eq!(early.recording_id(), Some(id));
    assert_eq!(late.recording_id(), Some(id));
    assert_offset(&early, 40.0 * frame_seconds());
    assert_offset(&late, 300.0 * frame_seconds());
}

#[test]
fn empty_library_is_not_recognized() {
    let recognizer = recognizer();
    let sample = Waveform::new(synth(6, 5.0, RATE), RATE);
    assert_eq!(recognizer.recognize(&sample).unwrap(), Recognition::NotRecognized);
}

#[test]
fn silence_is_not_recognized() {
    let recognizer = recognizer();
    recognizer
        .ingest(&Waveform::new(synth(7, 10.0, RATE), RATE), "song", "artist")
        .unwrap();

    let silence = Waveform::new(vec![0.0; RATE as usize * 3], RATE);
    assert_eq!(recognizer.recognize(&silence).unwrap(), Recognition::NotRecognized);
}

#[test]
fn empty_waveform_is_an_error() {
    let recognizer = recognizer();
    let result = recognizer.recognize(&Waveform::new(Vec::new(), RATE));
    assert!(matches!(result, Err(RecognizerError::EmptyInput)));

    let result = recognizer.ingest(&Waveform::new(Vec::new(), RATE), "n", "a");
    assert!(matches!(result, Err(RecognizerError::EmptyInput)));
    assert!(recognizer.index().is_empty().unwrap());
}

#[test]
fn stored_fingerprints_respect_the_cap() {
    let config = AppConfig {
        fingerprint: FingerprintConfig {
            min_fingerprints: 1000,
            max_fingerprints: 1000,
            ..FingerprintConfig::default()
        },
        ..AppConfig::default()
    };
    let recognizer = Recognizer::new(MemoryIndex::new(), config).unwrap();
    recognizer
        .ingest(&Waveform::new(synth(8, 10.0, RATE), RATE), "song", "artist")
        .unwrap();

    assert_eq!(recognizer.index().occurrence_count(), 1000);
}

#[test]
fn seeded_fingerprinting_is_repeatable() {
    let config = FingerprintConfig {
        sampling_seed: Some(42),
        max_fingerprints: 2000,
        min_fingerprints: 2000,
        ..FingerprintConfig::default()
    };
    let waveform = Waveform::new(synth(9, 8.0, RATE), RATE);

    let first = song_recognizer::generate_song_fingerprint(&waveform, &config).unwrap();
    let second = song_recognizer::generate_song_fingerprint(&waveform, &config).unwrap();
    assert_eq!(first.fingerprints.len(), 2000);
    assert_eq!(first.fingerprints, second.fingerprints);
}

#[test]
fn higher_rate_query_is_resampled_before_matching() {
    let recognizer = recognizer();
    let id = recognizer
        .ingest(&Waveform::new(synth(12, 20.0, RATE), RATE), "song", "artist")
        .unwrap();

    // Same music rendered at 22.05 kHz, starting 100 frames in
    let hi_rate = 22_050;
    let hi = synth(12, 20.0, hi_rate);
    let start = 100 * HOP * 2;
    let query = Waveform::new(hi[start..start + 5 * hi_rate as usize].to_vec(), hi_rate);

    let result = recognizer.recognize(&query).unwrap();
    assert_eq!(result.recording_id(), Some(id));
    assert_offset(&result, 100.0 * frame_seconds());
}

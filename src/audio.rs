use crate::error::{RecognizerError, Result};
use crate::models::Waveform;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info};

const RESAMPLE_CHUNK: usize = 1024;

/// Handles loading and preprocessing of audio files
/// This struct provides methods to load audio from WAV files and convert them
/// into a mono waveform suitable for fingerprinting
pub struct AudioLoader;

impl AudioLoader {
    /// Loads a WAV file and returns its mono waveform at the file's own rate
    ///
    /// # Processing Steps
    /// 1. Opens and reads the WAV file
    /// 2. Converts samples to floating point in [-1.0, 1.0]
    /// 3. Averages multi-channel audio down to mono
    pub fn load_from_wav<P: AsRef<Path>>(file_path: P) -> Result<Waveform> {
        let file_path = file_path.as_ref();
        info!("Loading audio from: {}", file_path.display());

        let reader = hound::WavReader::open(file_path).map_err(|e| {
            RecognizerError::UnsupportedFormat(format!(
                "failed to open {}: {}",
                file_path.display(),
                e
            ))
        })?;
        Self::decode(reader)
    }

    /// Same as [`AudioLoader::load_from_wav`] for an in-memory WAV file
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Waveform> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        Self::decode(reader)
    }

    fn decode<R: Read>(mut reader: hound::WavReader<R>) -> Result<Waveform> {
        let spec = reader.spec();
        debug!(
            "Audio specs - Sample rate: {}Hz, Channels: {}, Bits: {}",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );

        if spec.channels == 0 {
            return Err(RecognizerError::UnsupportedFormat(
                "WAV declares zero channels".into(),
            ));
        }

        // Convert samples to floating point format based on the WAV file's format
        let samples: std::result::Result<Vec<f32>, _> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect(),
            hound::SampleFormat::Int => match spec.bits_per_sample {
                8 => reader
                    .samples::<i8>()
                    .map(|s| s.map(|s| s as f32 / i8::MAX as f32))
                    .collect(),
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                    .collect(),
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / ((1 << 23) as f32)))
                    .collect(),
                32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
                    .collect(),
                bits => {
                    return Err(RecognizerError::UnsupportedFormat(format!(
                        "unsupported bit depth: {}",
                        bits
                    )));
                }
            },
        };

        let samples = to_mono(samples?, spec.channels as usize);
        let waveform = Waveform::new(samples, spec.sample_rate);

        info!(
            "Loaded {} samples ({:.2} seconds)",
            waveform.len(),
            waveform.duration_secs()
        );
        Ok(waveform)
    }
}

/// Averages interleaved channels into a single channel
pub fn to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Band-limited sinc resampling from `from_rate` to `to_rate`.
///
/// The resampler's group delay is trimmed off so sample `n` of the output
/// lines up with time `n / to_rate` of the input.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(RecognizerError::UnsupportedFormat(
            "sample rate is zero".into(),
        ));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 64,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| RecognizerError::UnsupportedFormat(e.to_string()))?;

    // Non-empty input never resamples to nothing
    let expected = ((samples.len() as f64 * ratio).round() as usize).max(1);
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    // Past the end of the input, zero chunks flush the delay line
    let mut position = 0;
    while output.len() < expected + delay {
        let mut chunk = vec![0.0f32; RESAMPLE_CHUNK];
        if position < samples.len() {
            let end = (position + RESAMPLE_CHUNK).min(samples.len());
            chunk[..end - position].copy_from_slice(&samples[position..end]);
        }
        position += RESAMPLE_CHUNK;

        let processed = resampler
            .process(&[chunk], None)
            .map_err(|e| RecognizerError::UnsupportedFormat(e.to_string()))?;
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay);
    output.truncate(expected);
    debug!(
        "Resampled {} samples at {}Hz to {} samples at {}Hz",
        samples.len(),
        from_rate,
        output.len(),
        to_rate
    );
    Ok(output)
}

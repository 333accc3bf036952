//! Local-maximum peak picking over the spectrogram.

use crate::config::FingerprintConfig;
use crate::models::Peak;
use crate::spectrogram::Spectrogram;
use std::cmp::Ordering;
use tracing::debug;

/// Offsets (frequency, time) of a diamond of the given Manhattan radius,
/// excluding the center. Radius 2 is a plus shape dilated by one ring.
pub fn diamond_footprint(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for df in -r..=r {
        for dt in -r..=r {
            if (df != 0 || dt != 0) && df.abs() + dt.abs() <= r {
                offsets.push((df, dt));
            }
        }
    }
    offsets
}

/// Extracts salient local maxima from `spectrogram`.
///
/// A cell is a peak when no in-bounds cell of its footprint is louder and its
/// value exceeds the grid median by `peak_threshold_db`. At most
/// `config.peak_cap(duration_secs)` of the loudest peaks are kept. The result
/// is ordered by time frame, then frequency bin.
pub fn extract_peaks(
    spectrogram: &Spectrogram,
    duration_secs: f32,
    config: &FingerprintConfig,
) -> Vec<Peak> {
    let bins = spectrogram.bins();
    let frames = spectrogram.frames();
    if bins == 0 || frames == 0 {
        return Vec::new();
    }

    let threshold = spectrogram.median() + config.peak_threshold_db;
    let footprint = diamond_footprint(config.neighborhood_radius);

    let mut peaks = Vec::new();
    for bin in 0..bins {
        for frame in 0..frames {
            let value = spectrogram.get(bin, frame);
            if value <= threshold {
                continue;
            }

            let is_local_max = footprint.iter().all(|&(df, dt)| {
                let f = bin as isize + df;
                let t = frame as isize + dt;
                if f < 0 || t < 0 || f >= bins as isize || t >= frames as isize {
                    return true;
                }
                spectrogram.get(f as usize, t as usize) <= value
            });

            if is_local_max {
                peaks.push(Peak {
                    freq_bin: bin as u32,
                    frame: frame as u32,
                    energy: value,
                });
            }
        }
    }

    let candidates = peaks.len();
    let cap = config.peak_cap(duration_secs);
    if peaks.len() > cap {
        // Stable sort keeps grid order among equal energies
        peaks.sort_by(|a, b| b.energy.partial_cmp(&a.energy).unwrap_or(Ordering::Equal));
        peaks.truncate(cap);
    }

    peaks.sort_by_key(|p| (p.frame, p.freq_bin));
    debug!(
        "Peaks: {} candidates above {:.1} dB, kept {} (cap {})",
        candidates,
        threshold,
        peaks.len(),
        cap
    );
    peaks
}

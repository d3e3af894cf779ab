// SentioVox - Audio Segment Processing
// Trimming, DC removal, loudness normalization, fades, natural splitting
// and concatenation of synthesized segments.
//
// Every operation is a pure transform over an AudioBuffer. Degenerate input
// (empty, all-silent, too short) comes back unchanged instead of failing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::{AudioConfig, PreprocessingOptions};

/// Level assigned to an all-zero buffer when computing normalization gain
const SILENT_LEVEL_DB: f64 = -100.0;

/// Mono f32 samples at a fixed rate
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeType {
    In,
    Out,
    Both,
}

impl FromStr for FadeType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "in" => Ok(FadeType::In),
            "out" => Ok(FadeType::Out),
            "both" => Ok(FadeType::Both),
            other => Err(format!("Unknown fade type '{other}'")),
        }
    }
}

/// Converts a duration in seconds to a sample count
fn secs_to_samples(secs: f32, sample_rate: u32) -> usize {
    (secs.max(0.0) * sample_rate as f32) as usize
}

#[derive(Debug, Clone, Default)]
pub struct AudioProcessor {
    config: AudioConfig,
}

impl AudioProcessor {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Cut leading and trailing silence, keeping `margin_samples` on each side.
    ///
    /// Returns the input unchanged when it is empty, entirely silent, or
    /// when the trimmed result would be shorter than the minimum segment length.
    pub fn trim_silence(&self, buffer: AudioBuffer) -> AudioBuffer {
        let threshold = self.config.silence_threshold;
        let is_sound = |s: &f32| s.abs() > threshold;

        let Some(first) = buffer.samples.iter().position(is_sound) else {
            return buffer;
        };
        let Some(last) = buffer.samples.iter().rposition(is_sound) else {
            return buffer;
        };

        let margin = self.config.margin_samples;
        let start = first.saturating_sub(margin);
        let end = (last + 1 + margin).min(buffer.len());

        let min_len = secs_to_samples(self.config.min_segment_length_secs, buffer.sample_rate);
        if end - start < min_len {
            log::debug!(
                "[Audio] Trim would leave {} samples (< {}), keeping original",
                end - start,
                min_len
            );
            return buffer;
        }
        if start == 0 && end == buffer.len() {
            return buffer;
        }

        AudioBuffer::new(buffer.samples[start..end].to_vec(), buffer.sample_rate)
    }

    /// Subtract the mean from every sample
    pub fn remove_dc_offset(&self, mut buffer: AudioBuffer) -> AudioBuffer {
        if buffer.is_empty() {
            return buffer;
        }
        let mean = buffer.samples.iter().map(|&s| s as f64).sum::<f64>() / buffer.len() as f64;
        if mean.abs() > self.config.max_dc_offset as f64 {
            log::warn!("[Audio] Large DC offset removed: {:.4}", mean);
        }
        let mean = mean as f32;
        for sample in &mut buffer.samples {
            *sample -= mean;
        }
        buffer
    }

    /// Scale to `target_db` RMS, with gain clamped to [min_gain, max_gain]
    pub fn normalize_audio(&self, mut buffer: AudioBuffer) -> AudioBuffer {
        if buffer.is_empty() {
            return buffer;
        }
        let gain = self.normalization_gain(&buffer.samples);
        for sample in &mut buffer.samples {
            *sample *= gain;
        }
        buffer
    }

    fn normalization_gain(&self, samples: &[f32]) -> f32 {
        let mean_square =
            samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / samples.len() as f64;
        let rms = mean_square.sqrt();
        let current_db = if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            SILENT_LEVEL_DB
        };
        let gain = 10f64.powf((self.config.target_db as f64 - current_db) / 20.0);
        let clamped = gain.clamp(self.config.min_gain as f64, self.config.max_gain as f64);
        if clamped != gain {
            log::debug!("[Audio] Normalization gain {:.3} clamped to {:.3}", gain, clamped);
        }
        clamped as f32
    }

    /// Linear fade over `fade_samples`, capped at half the buffer
    pub fn apply_fade(&self, mut buffer: AudioBuffer, fade_type: FadeType) -> AudioBuffer {
        let len = buffer.len();
        let n = self.config.fade_samples.min(len / 2);
        if n == 0 {
            return buffer;
        }
        let ramp = |i: usize| {
            if n == 1 {
                0.0
            } else {
                i as f32 / (n - 1) as f32
            }
        };

        if matches!(fade_type, FadeType::In | FadeType::Both) {
            for i in 0..n {
                buffer.samples[i] *= ramp(i);
            }
        }
        if matches!(fade_type, FadeType::Out | FadeType::Both) {
            for i in 0..n {
                buffer.samples[len - n + i] *= ramp(n - 1 - i);
            }
        }
        buffer
    }

    /// Quietest position near `around`, for splitting without cutting speech.
    ///
    /// The search covers `split_window_size` samples centered on `around`,
    /// kept `split_margin_secs` away from both edges. The envelope is a moving
    /// average of |x|; positions louder than `max_amplitude_threshold` are
    /// skipped. Falls back to `around` when no candidate exists.
    pub fn find_natural_split_point(
        &self,
        samples: &[f32],
        around: usize,
        sample_rate: u32,
    ) -> usize {
        let len = samples.len();
        let half_window = self.config.split_window_size / 2;
        let margin = secs_to_samples(self.config.split_margin_secs, sample_rate);

        let lo = around.saturating_sub(half_window).max(margin);
        let hi = around.saturating_add(half_window).min(len.saturating_sub(margin));
        if lo >= hi {
            return around;
        }

        // Prefix sums of |x| over the region the envelope reads from
        let smoothing = self.config.split_smoothing_window.max(1);
        let half_smooth = smoothing / 2;
        let region_start = lo.saturating_sub(half_smooth);
        let region_end = (hi + smoothing).min(len);
        let mut prefix = Vec::with_capacity(region_end - region_start + 1);
        prefix.push(0.0f64);
        let mut acc = 0.0f64;
        for &s in &samples[region_start..region_end] {
            acc += s.abs() as f64;
            prefix.push(acc);
        }

        let max_amplitude = self.config.max_amplitude_threshold as f64;
        let mut best: Option<(usize, f64)> = None;
        for pos in lo..hi {
            let w_start = pos.saturating_sub(half_smooth).max(region_start);
            let w_end = (w_start + smoothing).min(region_end);
            if w_end <= w_start {
                continue;
            }
            let sum = prefix[w_end - region_start] - prefix[w_start - region_start];
            let envelope = sum / (w_end - w_start) as f64;
            if envelope > max_amplitude {
                continue;
            }
            match best {
                Some((_, best_env)) if envelope >= best_env => {}
                _ => best = Some((pos, envelope)),
            }
        }

        best.map(|(pos, _)| pos).unwrap_or(around)
    }

    /// Split a buffer longer than `max_samples` at natural pauses.
    ///
    /// Each cut is searched just before `max_samples`. A cut that would leave
    /// a first part shorter than `min_split_segment_secs` is forced to
    /// `max_samples`. A trailing remainder shorter than the minimum is dropped.
    pub fn split_segment(&self, buffer: &AudioBuffer, max_samples: usize) -> Vec<AudioBuffer> {
        if max_samples == 0 || buffer.len() <= max_samples {
            return vec![buffer.clone()];
        }

        let sample_rate = buffer.sample_rate;
        let min_split = secs_to_samples(self.config.min_split_segment_secs, sample_rate);
        let search_center = max_samples.saturating_sub(self.config.split_window_size / 2);

        let mut parts = Vec::new();
        let mut remaining: &[f32] = &buffer.samples;
        while remaining.len() > max_samples {
            let mut split = self
                .find_natural_split_point(remaining, search_center, sample_rate)
                .min(max_samples);
            if split == 0 || split < min_split {
                split = max_samples;
            }
            parts.push(AudioBuffer::new(remaining[..split].to_vec(), sample_rate));
            remaining = &remaining[split..];
        }

        if !remaining.is_empty() && remaining.len() >= min_split {
            parts.push(AudioBuffer::new(remaining.to_vec(), sample_rate));
        } else if !remaining.is_empty() {
            log::debug!(
                "[Audio] Dropping {}-sample tail after split (< {})",
                remaining.len(),
                min_split
            );
        }

        log::info!(
            "[Audio] Split {:.1}s segment into {} parts",
            buffer.duration_secs(),
            parts.len()
        );
        parts
    }

    /// Concatenate segments with `silence_duration` zeros strictly between them.
    /// Segments over `max_segment_length_secs` are split first.
    pub fn combine_segments_with_silence(
        &self,
        segments: &[AudioBuffer],
        sample_rate: u32,
    ) -> AudioBuffer {
        let max_samples = secs_to_samples(self.config.max_segment_length_secs, sample_rate);

        let mut pieces: Vec<AudioBuffer> = Vec::with_capacity(segments.len());
        for segment in segments {
            if max_samples > 0 && segment.len() > max_samples {
                pieces.extend(self.split_segment(segment, max_samples));
            } else {
                pieces.push(segment.clone());
            }
        }

        let silence = self.config.silence_duration;
        let total = pieces.iter().map(AudioBuffer::len).sum::<usize>()
            + silence * pieces.len().saturating_sub(1);

        let mut combined = Vec::with_capacity(total);
        for (i, piece) in pieces.iter().enumerate() {
            if i > 0 {
                combined.resize(combined.len() + silence, 0.0);
            }
            combined.extend_from_slice(&piece.samples);
        }
        AudioBuffer::new(combined, sample_rate)
    }

    /// DC removal, then normalization, then fade in and out
    pub fn apply_preprocessing(
        &self,
        buffer: AudioBuffer,
        options: &PreprocessingOptions,
    ) -> AudioBuffer {
        let mut buffer = buffer;
        if options.remove_dc {
            buffer = self.remove_dc_offset(buffer);
        }
        if options.normalize {
            buffer = self.normalize_audio(buffer);
        }
        if options.apply_fade {
            buffer = self.apply_fade(buffer, FadeType::Both);
        }
        buffer
    }
}

/// Resample to `target_rate` (one-shot sinc resampler).
/// Returns the input unchanged if the resampler cannot be built.
pub fn resample(buffer: AudioBuffer, target_rate: u32) -> AudioBuffer {
    if buffer.sample_rate == target_rate || buffer.is_empty() || buffer.sample_rate == 0 {
        return buffer;
    }

    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let mut resampler = match SincFixedIn::<f32>::new(ratio, 2.0, params, buffer.len(), 1) {
        Ok(resampler) => resampler,
        Err(e) => {
            log::warn!("[Audio] Resampler init failed: {:?}", e);
            return buffer;
        }
    };

    let result = resampler.process(&[&buffer.samples], None);
    match result {
        Ok(output) => match output.into_iter().next() {
            Some(samples) => AudioBuffer::new(samples, target_rate),
            None => buffer,
        },
        Err(e) => {
            log::warn!(
                "[Audio] Resampling {} -> {} Hz failed: {:?}",
                buffer.sample_rate,
                target_rate,
                e
            );
            buffer
        }
    }
}

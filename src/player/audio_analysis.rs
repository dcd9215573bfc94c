use web_sys::{AnalyserNode, AudioContext, HtmlMediaElement, MediaElementAudioSourceNode};

use crate::error::Result;
use crate::utils::clamp01;

pub const FFT_SIZE: u32 = 2048;
/// Measured amplitudes at or below this count as silence and fall back to
/// the synthetic mouth motion.
pub const SILENCE_THRESHOLD: f64 = 0.02;

/// Root mean square of unsigned 8-bit time-domain samples centred on 128.
pub fn rms_from_time_domain(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&b| {
            let v = (b as f64 - 128.0) / 128.0;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}

pub fn amplitude_from_rms(rms: f64) -> f64 {
    clamp01((rms - 0.02) * 10.0)
}

/// Deterministic talking motion for silent or unanalysed audio.
pub fn pseudo_amplitude(t: f64) -> f64 {
    clamp01(0.55 + 0.45 * (t * 14.5).sin() * (t * 2.7).sin())
}

pub fn mouth_amplitude(measured: Option<f64>, t: f64) -> f64 {
    match measured {
        Some(amp) if amp > SILENCE_THRESHOLD => amp,
        _ => pseudo_amplitude(t),
    }
}

/// Analyser node spliced between the media element and the speakers.
///
/// A media element can only be captured by one source node, so the tap is
/// created at most once per element, after a user gesture.
pub struct AnalysisTap {
    _context: AudioContext,
    _source: MediaElementAudioSourceNode,
    analyser: AnalyserNode,
    buffer: Vec<u8>,
}

impl AnalysisTap {
    pub fn attach(media: &HtmlMediaElement) -> Result<AnalysisTap> {
        let context = AudioContext::new()?;
        let analyser = context.create_analyser()?;
        analyser.set_fft_size(FFT_SIZE);
        let source = context.create_media_element_source(media)?;
        source.connect_with_audio_node(&analyser)?;
        analyser.connect_with_audio_node(&context.destination())?;
        // Resume is a promise; a rejected resume leaves the tap silent, which
        // the pseudo amplitude covers.
        let _ = context.resume();
        Ok(AnalysisTap {
            _context: context,
            _source: source,
            analyser,
            buffer: vec![128; FFT_SIZE as usize],
        })
    }

    pub fn amplitude(&mut self) -> f64 {
        self.analyser.get_byte_time_domain_data(&mut self.buffer);
        amplitude_from_rms(rms_from_time_domain(&self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_has_zero_rms() {
        assert_eq!(rms_from_time_domain(&[128; 64]), 0.0);
        assert_eq!(rms_from_time_domain(&[]), 0.0);
    }

    #[test]
    fn test_full_scale_square_wave() {
        let samples: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();
        let rms = rms_from_time_domain(&samples);
        assert!(rms > 0.99);
        assert_eq!(amplitude_from_rms(rms), 1.0);
    }

    #[test]
    fn test_amplitude_threshold() {
        assert_eq!(amplitude_from_rms(0.02), 0.0);
        assert!((amplitude_from_rms(0.05) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_pseudo_amplitude_bounded() {
        for i in 0..1000 {
            let a = pseudo_amplitude(i as f64 * 0.013);
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_silent_measurement_falls_back() {
        assert_eq!(mouth_amplitude(Some(0.01), 1.0), pseudo_amplitude(1.0));
        assert_eq!(mouth_amplitude(None, 2.0), pseudo_amplitude(2.0));
        assert_eq!(mouth_amplitude(Some(0.4), 2.0), 0.4);
    }
}

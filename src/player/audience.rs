use std::f64::consts::PI;

use fastrand::Rng;
use log::debug;
use web_sys::{
    AudioBuffer, AudioBufferSourceNode, AudioContext, BiquadFilterNode, BiquadFilterType,
    GainNode,
};

use crate::error::Result;
use crate::utils::clamp01;

const AMBIENT_SECONDS: u32 = 2;
const AMBIENT_NOISE_LEVEL: f64 = 0.12;
const AMBIENT_LOWPASS_HZ: f32 = 650.0;
const AMBIENT_Q: f32 = 0.7;
const AMBIENT_GAIN: f64 = 0.025;
const LAUGH_BAND_HZ: f64 = 900.0;
const LAUGH_BAND_SPREAD_HZ: f64 = 400.0;
const LAUGH_Q: f32 = 0.9;

/// Room-tone level; silent while paused and quieter under reduced motion.
pub fn ambient_gain(playing: bool, reduce_motion: bool) -> f64 {
    let target = if playing { AMBIENT_GAIN } else { 0.0 };
    if reduce_motion {
        target * 0.6
    } else {
        target
    }
}

pub fn laugh_duration(intensity: f64) -> f64 {
    0.55 + clamp01(intensity) * 0.25
}

pub fn laugh_gain(intensity: f64, reduce_motion: bool) -> f64 {
    let gain = 0.02 + clamp01(intensity) * 0.03;
    if reduce_motion {
        gain * 0.7
    } else {
        gain
    }
}

/// Decaying, pulsing envelope applied to the noise of sample `index`.
pub fn laugh_envelope(t: f64, index: usize) -> f64 {
    let decay = (-t * 3.2).exp();
    let pulse = 0.65 + 0.35 * (t * PI * 10.0 + (index % 17) as f64).sin();
    decay * pulse * 0.6
}

fn noise(rng: &mut Rng) -> f64 {
    rng.f64() * 2.0 - 1.0
}

pub fn laugh_samples(rng: &mut Rng, intensity: f64, sample_rate: f32) -> Vec<f32> {
    let len = ((sample_rate as f64 * laugh_duration(intensity)).floor() as usize).max(1);
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (noise(rng) * laugh_envelope(t, i)) as f32
        })
        .collect()
}

fn ambient_samples(rng: &mut Rng, sample_rate: f32) -> Vec<f32> {
    let len = (sample_rate as u32 * AMBIENT_SECONDS) as usize;
    (0..len)
        .map(|_| (noise(rng) * AMBIENT_NOISE_LEVEL) as f32)
        .collect()
}

fn mono_buffer(context: &AudioContext, samples: &mut [f32]) -> Result<AudioBuffer> {
    let buffer = context.create_buffer(1, samples.len() as u32, context.sample_rate())?;
    buffer.copy_to_channel(samples, 0)?;
    Ok(buffer)
}

/// Synthesized studio audience: looping low-passed room tone plus short
/// band-passed noise bursts on laugh cues. Only ever created from a user
/// gesture, so it never autoplays.
pub struct AudienceAudio {
    context: AudioContext,
    ambient_source: AudioBufferSourceNode,
    ambient_gain: GainNode,
    _lowpass: BiquadFilterNode,
    rng: Rng,
}

impl AudienceAudio {
    pub fn start(seed: u32) -> Result<AudienceAudio> {
        let context = AudioContext::new()?;
        let mut rng = Rng::with_seed(u64::from(seed));

        let mut samples = ambient_samples(&mut rng, context.sample_rate());
        let buffer = mono_buffer(&context, &mut samples)?;
        let ambient_source = context.create_buffer_source()?;
        ambient_source.set_buffer(Some(&buffer));
        ambient_source.set_loop(true);

        let lowpass = context.create_biquad_filter()?;
        lowpass.set_type(BiquadFilterType::Lowpass);
        lowpass.frequency().set_value(AMBIENT_LOWPASS_HZ);
        lowpass.q().set_value(AMBIENT_Q);

        let ambient_gain = context.create_gain()?;
        ambient_gain.gain().set_value(0.0);

        ambient_source.connect_with_audio_node(&lowpass)?;
        lowpass.connect_with_audio_node(&ambient_gain)?;
        ambient_gain.connect_with_audio_node(&context.destination())?;
        ambient_source.start()?;
        let _ = context.resume();

        debug!("Audience audio started at {} Hz", context.sample_rate());
        Ok(AudienceAudio {
            context,
            ambient_source,
            ambient_gain,
            _lowpass: lowpass,
            rng,
        })
    }

    pub fn set_ambient(&self, playing: bool, reduce_motion: bool) {
        self.ambient_gain
            .gain()
            .set_value(ambient_gain(playing, reduce_motion) as f32);
    }

    pub fn mute(&self) {
        self.ambient_gain.gain().set_value(0.0);
    }

    pub fn play_laugh(&mut self, intensity: f64, reduce_motion: bool) -> Result<()> {
        let context = &self.context;
        let mut samples = laugh_samples(&mut self.rng, intensity, context.sample_rate());
        let buffer = mono_buffer(context, &mut samples)?;

        let source = context.create_buffer_source()?;
        source.set_buffer(Some(&buffer));

        let bandpass = context.create_biquad_filter()?;
        bandpass.set_type(BiquadFilterType::Bandpass);
        bandpass
            .frequency()
            .set_value((LAUGH_BAND_HZ + self.rng.f64() * LAUGH_BAND_SPREAD_HZ) as f32);
        bandpass.q().set_value(LAUGH_Q);

        let gain = context.create_gain()?;
        gain.gain()
            .set_value(laugh_gain(intensity, reduce_motion) as f32);

        source.connect_with_audio_node(&bandpass)?;
        bandpass.connect_with_audio_node(&gain)?;
        gain.connect_with_audio_node(&context.destination())?;

        source.start()?;
        source.stop_with_when(context.current_time() + laugh_duration(intensity) + 0.05)?;
        Ok(())
    }
}

impl Drop for AudienceAudio {
    fn drop(&mut self) {
        let _ = self.ambient_source.stop();
        let _ = self.context.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambient_gain() {
        assert_eq!(ambient_gain(false, false), 0.0);
        assert_eq!(ambient_gain(true, false), 0.025);
        assert!((ambient_gain(true, true) - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_laugh_gain_scales_with_intensity() {
        assert!((laugh_gain(0.0, false) - 0.02).abs() < 1e-12);
        assert!((laugh_gain(1.0, false) - 0.05).abs() < 1e-12);
        assert!((laugh_gain(1.0, true) - 0.035).abs() < 1e-12);
    }

    #[test]
    fn test_laugh_samples_length_and_range() {
        let mut rng = Rng::with_seed(3);
        let samples = laugh_samples(&mut rng, 1.0, 1000.0);
        assert_eq!(samples.len(), 800);
        assert!(samples.iter().all(|s| s.abs() <= 0.6));
    }

    #[test]
    fn test_envelope_decays() {
        assert!(laugh_envelope(0.7, 0) < laugh_envelope(0.0, 0) * 0.2);
    }
}

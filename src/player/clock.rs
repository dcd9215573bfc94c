/// Fastest playback rate the controls offer; bounds how far media time can
/// legitimately advance between two frames.
const MAX_PLAYBACK_RATE: f64 = 2.0;
/// Forward jumps larger than this (beyond what the frame delta explains) are
/// treated as seeks.
const SEEK_JUMP_SEC: f64 = 1.0;
const MIN_DT: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Media position, authoritative for all script sync.
    pub t_media: f64,
    /// Seconds since the first tick; drives cosmetic motion only.
    pub t_anim: f64,
    pub dt: f64,
    /// Media time moved discontinuously since the previous sample.
    pub seeked: bool,
}

/// Reads the two time sources once per display refresh.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    start_ms: Option<f64>,
    last_anim: Option<f64>,
    last_media: Option<f64>,
    pending_seek: bool,
}

impl PlaybackClock {
    pub fn new() -> PlaybackClock {
        PlaybackClock::default()
    }

    /// `now_ms` is the monotonic frame timestamp; `media_time` is the media
    /// element position, or `None` before one is attached, in which case the
    /// animation clock stands in so the preview stays alive.
    pub fn sample(&mut self, now_ms: f64, media_time: Option<f64>) -> ClockSample {
        let start_ms = *self.start_ms.get_or_insert(now_ms);
        let t_anim = ((now_ms - start_ms) / 1000.0).max(0.0);
        let dt = match self.last_anim {
            Some(last) => (t_anim - last).max(MIN_DT),
            None => MIN_DT,
        };
        self.last_anim = Some(t_anim);

        let t_media = media_time
            .filter(|t| t.is_finite())
            .map(|t| t.max(0.0))
            .unwrap_or(t_anim);

        let jumped = match self.last_media {
            Some(last) => {
                t_media < last || t_media - last > SEEK_JUMP_SEC.max(dt * MAX_PLAYBACK_RATE + 0.25)
            }
            None => false,
        };
        let seeked = jumped || std::mem::take(&mut self.pending_seek);
        self.last_media = Some(t_media);

        ClockSample {
            t_media,
            t_anim,
            dt,
            seeked,
        }
    }

    /// Flag an explicit seek (skip intro, ±10s, resume) so the next sample
    /// resyncs even when the jump is small.
    pub fn mark_seek(&mut self) {
        self.pending_seek = true;
    }
}

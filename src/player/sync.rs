use std::rc::Rc;

use crate::show::script::{LaughEvent, ScriptTimeline};

use super::clock::{ClockSample, PlaybackClock};
use super::cursor::EventCursor;
use super::director::{SceneDirector, SceneResolution};
use super::rig::{RigAnimator, RigFrame};
use super::stage::StageScene;

#[derive(Debug, Clone, Default)]
pub struct FrameOptions {
    pub reduce_motion: bool,
    pub audience_mode: bool,
    /// Externally chosen speaker; wins over the scripted one.
    pub speaker_override: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub sample: ClockSample,
    pub speaker: Option<String>,
    pub scene: SceneResolution,
    /// Laugh cues that fired during this frame, in script order.
    pub laughs: Vec<LaughEvent>,
}

/// Per-frame glue: samples the clock, fires due script events and steps the
/// rig animator so the stage matches the current media position.
pub struct FrameSynchronizer {
    timeline: Rc<ScriptTimeline>,
    clock: PlaybackClock,
    director: SceneDirector,
    gesture_cursor: EventCursor,
    laugh_cursor: EventCursor,
    animator: RigAnimator,
    stage: StageScene,
    seed: u32,
    last_t_media: Option<f64>,
}

impl FrameSynchronizer {
    pub fn new(timeline: Rc<ScriptTimeline>, seed: u32) -> FrameSynchronizer {
        let stage = StageScene::new(&timeline.characters, seed);
        FrameSynchronizer {
            timeline,
            clock: PlaybackClock::new(),
            director: SceneDirector::new(),
            gesture_cursor: EventCursor::new(),
            laugh_cursor: EventCursor::new(),
            animator: RigAnimator::new(seed),
            stage,
            seed,
            last_t_media: None,
        }
    }

    /// Swap in a freshly loaded script. The cast is rebuilt and cursors start
    /// after the current position, so a late load does not replay the past.
    pub fn set_timeline(&mut self, timeline: Rc<ScriptTimeline>) {
        self.stage = StageScene::new(&timeline.characters, self.seed);
        self.animator = RigAnimator::new(self.seed);
        self.director.reset();
        let t = self.last_t_media.unwrap_or(0.0);
        self.gesture_cursor.resync(&timeline.gestures, t);
        self.laugh_cursor.resync(&timeline.laughs, t);
        self.timeline = timeline;
    }

    pub fn timeline(&self) -> &Rc<ScriptTimeline> {
        &self.timeline
    }

    pub fn stage(&self) -> &StageScene {
        &self.stage
    }

    pub fn mark_seek(&mut self) {
        self.clock.mark_seek();
    }

    pub fn tick(
        &mut self,
        now_ms: f64,
        media_time: Option<f64>,
        options: &FrameOptions,
        amplitude: &mut dyn FnMut(f64) -> f64,
    ) -> FrameReport {
        let sample = self.clock.sample(now_ms, media_time);
        let t = sample.t_media;
        if sample.seeked {
            self.gesture_cursor.resync(&self.timeline.gestures, t);
            self.laugh_cursor.resync(&self.timeline.laughs, t);
            self.animator.clear_gestures();
        }
        self.last_t_media = Some(t);

        let line = self.timeline.line_at(t);
        let speaker = options
            .speaker_override
            .clone()
            .or_else(|| line.map(|line| line.speaker.clone()));
        let line_text = line.map_or("", |line| line.text.as_str());

        let scene = self.director.resolve(&self.timeline.scenes, t);

        for gesture in self.gesture_cursor.advance(&self.timeline.gestures, t) {
            self.animator.trigger_gesture(gesture, t);
        }
        let laughs = self.laugh_cursor.advance(&self.timeline.laughs, t).to_vec();
        for laugh in &laughs {
            self.animator.trigger_laugh(laugh.intensity, sample.t_anim);
        }

        let frame = RigFrame {
            t_media: t,
            t_anim: sample.t_anim,
            dt: sample.dt,
            speaker: speaker.as_deref(),
            line_text,
            set: scene.set,
            camera: scene.camera,
            reduce_motion: options.reduce_motion,
            audience_mode: options.audience_mode,
        };
        self.animator.update(&mut self.stage, &frame, amplitude);

        FrameReport {
            sample,
            speaker,
            scene,
            laughs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::director::StageSet;
    use crate::show::script::ShowScript;

    const SCRIPT: &str = r#"{
        "scenes": [
            { "id": "stage", "fromSec": 0, "toSec": 10 },
            { "id": "cafe", "fromSec": 10, "toSec": 20, "camera": "close" }
        ],
        "events": [
            { "type": "line", "fromSec": 1, "toSec": 3, "speaker": "host", "text": "Hi!" },
            { "type": "laugh", "atSec": 2, "intensity": 0.5 },
            { "type": "laugh", "atSec": 12, "intensity": 1.0 },
            { "type": "gesture", "atSec": 2.5, "target": "ops", "kind": "shrug" }
        ]
    }"#;

    fn synchronizer() -> FrameSynchronizer {
        let script = ShowScript::from_json(SCRIPT).unwrap();
        FrameSynchronizer::new(Rc::new(ScriptTimeline::from_script(&script)), 7)
    }

    fn tick(sync: &mut FrameSynchronizer, now_ms: f64, t: f64) -> FrameReport {
        sync.tick(now_ms, Some(t), &FrameOptions::default(), &mut |_| 0.3)
    }

    #[test]
    fn test_speaker_and_scene_follow_media_time() {
        let mut sync = synchronizer();
        let report = tick(&mut sync, 0.0, 1.5);
        assert_eq!(report.speaker.as_deref(), Some("host"));
        assert_eq!(report.scene.set, StageSet::Stage);

        let report = tick(&mut sync, 16.0, 1.51);
        assert_eq!(report.laughs.len(), 0);
        let report = tick(&mut sync, 32.0, 15.0);
        assert!(report.sample.seeked);
        assert_eq!(report.scene.set, StageSet::Cafe);
        assert_eq!(sync.stage().active_set, StageSet::Cafe);
        assert_eq!(report.speaker, None);
    }

    #[test]
    fn test_laughs_fire_once_in_order() {
        let mut sync = synchronizer();
        tick(&mut sync, 0.0, 1.9);
        let report = tick(&mut sync, 16.0, 2.05);
        assert_eq!(report.laughs.len(), 1);
        assert_eq!(report.laughs[0].intensity, 0.5);
        assert!(tick(&mut sync, 32.0, 2.1).laughs.is_empty());
    }

    #[test]
    fn test_forward_seek_skips_passed_events() {
        let mut sync = synchronizer();
        tick(&mut sync, 0.0, 0.0);
        let report = tick(&mut sync, 16.0, 11.0);
        assert!(report.sample.seeked);
        assert!(report.laughs.is_empty());
        let mut fired = 0;
        let mut t = 11.0;
        let mut now = 16.0;
        while t < 12.01 {
            t += 0.016;
            now += 16.0;
            let report = tick(&mut sync, now, t);
            assert!(!report.sample.seeked);
            fired += report.laughs.len();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_backward_seek_rearms_events() {
        let mut sync = synchronizer();
        tick(&mut sync, 0.0, 1.9);
        assert_eq!(tick(&mut sync, 16.0, 2.05).laughs.len(), 1);
        tick(&mut sync, 32.0, 1.0);
        assert_eq!(tick(&mut sync, 48.0, 2.05).laughs.len(), 0);
        tick(&mut sync, 64.0, 1.0);
        let mut fired = 0;
        let mut t = 1.0;
        let mut now = 64.0;
        while t < 2.5 {
            t += 0.016;
            now += 16.0;
            fired += tick(&mut sync, now, t).laughs.len();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_speaker_override_wins() {
        let mut sync = synchronizer();
        let options = FrameOptions {
            speaker_override: Some("friend1".to_string()),
            ..FrameOptions::default()
        };
        let report = sync.tick(0.0, Some(1.5), &options, &mut |_| 0.0);
        assert_eq!(report.speaker.as_deref(), Some("friend1"));
    }

    #[test]
    fn test_late_timeline_does_not_replay_past() {
        let mut sync = FrameSynchronizer::new(Rc::new(ScriptTimeline::idle()), 7);
        tick(&mut sync, 0.0, 5.0);
        let script = ShowScript::from_json(SCRIPT).unwrap();
        sync.set_timeline(Rc::new(ScriptTimeline::from_script(&script)));
        let report = tick(&mut sync, 16.0, 5.016);
        assert!(report.laughs.is_empty());
        assert_eq!(sync.stage().rigs.len(), 4);
    }
}

use std::f64::consts::PI;

use fastrand::Rng;
use fxhash::FxHashMap;

use crate::show::script::{GestureEvent, GestureKind};
use crate::utils::{clamp, clamp01, lerp, seed_from_id};

use super::director::{CameraMode, StageSet};
use super::stage::{CameraNode, RigPose, StageScene, Vec3, REST_BROW_Y};

pub const GESTURE_WINDOW_SEC: f64 = 0.9;
pub const BLINK_SEC: f64 = 0.13;
pub const SPEAKER_POP_SEC: f64 = 0.45;
const FIRST_BLINK_DELAY: f64 = 2.0;
const MIN_BLINK_INTERVAL: f64 = 2.2;
const BLINK_INTERVAL_SPREAD: f64 = 3.4;

/// Per-character motion bookkeeping that is not part of the pose itself.
#[derive(Debug, Clone, PartialEq)]
struct RigState {
    last_x: f64,
    last_z: f64,
    next_blink_at: f64,
    blink_until: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GestureImpulse {
    kind: GestureKind,
    started_at: f64,
}

/// Inputs for one animation step.
#[derive(Debug, Clone, Copy)]
pub struct RigFrame<'a> {
    pub t_media: f64,
    pub t_anim: f64,
    pub dt: f64,
    pub speaker: Option<&'a str>,
    pub line_text: &'a str,
    pub set: StageSet,
    pub camera: CameraMode,
    pub reduce_motion: bool,
    pub audience_mode: bool,
}

/// Drives every rig, the crowd and the camera from script state.
#[derive(Debug)]
pub struct RigAnimator {
    states: FxHashMap<String, RigState>,
    gestures: FxHashMap<String, GestureImpulse>,
    laugh_pulse_until: f64,
    last_speaker: Option<String>,
    speaker_pop_until: f64,
    rng: Rng,
}

impl RigAnimator {
    pub fn new(seed: u32) -> RigAnimator {
        RigAnimator {
            states: FxHashMap::default(),
            gestures: FxHashMap::default(),
            laugh_pulse_until: 0.0,
            last_speaker: None,
            speaker_pop_until: 0.0,
            rng: Rng::with_seed(u64::from(seed)),
        }
    }

    /// Start (or replace) the gesture impulse on the event's target.
    pub fn trigger_gesture(&mut self, gesture: &GestureEvent, t_media: f64) {
        self.gestures.insert(
            gesture.target.clone(),
            GestureImpulse {
                kind: gesture.kind,
                started_at: t_media,
            },
        );
    }

    pub fn trigger_laugh(&mut self, intensity: f64, t_anim: f64) {
        self.laugh_pulse_until = self
            .laugh_pulse_until
            .max(t_anim + 0.8 + clamp01(intensity) * 0.6);
    }

    pub fn laugh_pulse_until(&self) -> f64 {
        self.laugh_pulse_until
    }

    pub fn is_laughing(&self, t_anim: f64) -> bool {
        t_anim < self.laugh_pulse_until
    }

    pub fn active_gesture(&self, id: &str) -> Option<GestureKind> {
        self.gestures.get(id).map(|impulse| impulse.kind)
    }

    /// Drop impulses whose start time no longer makes sense after a seek.
    pub fn clear_gestures(&mut self) {
        self.gestures.clear();
    }

    pub fn update(
        &mut self,
        stage: &mut StageScene,
        frame: &RigFrame,
        amplitude: &mut dyn FnMut(f64) -> f64,
    ) {
        let t_anim = frame.t_anim;
        let reduce = frame.reduce_motion;

        if frame.speaker != self.last_speaker.as_deref() {
            self.last_speaker = frame.speaker.map(str::to_string);
            self.speaker_pop_until = t_anim + SPEAKER_POP_SEC;
        }

        stage.show_set(frame.set);
        stage.crowd.visible = frame.audience_mode && stage.active_set == StageSet::Stage;

        let focus_x = frame
            .speaker
            .and_then(|id| stage.rig(id))
            .map(|rig| rig.pose.root.x);
        update_camera(&mut stage.camera, frame, focus_x);

        let breath = if reduce { 0.0 } else { (t_anim * 0.9).sin() * 0.015 };
        let laugh_bounce = if frame.audience_mode && !reduce && self.is_laughing(t_anim) {
            (t_anim * 12.0).sin() * 0.02
        } else {
            0.0
        };
        let question = frame.line_text.contains('?');
        let excited = frame.line_text.contains('!');

        for rig in stage.rigs.iter_mut() {
            let speaking = frame.speaker == Some(rig.id.as_str());
            let amp = if speaking { amplitude(frame.t_media) } else { 0.0 };
            let id_seed = seed_from_id(&rig.id);
            let pose = &mut rig.pose;

            let (mark_x, mark_z) = frame.set.mark_for(&rig.id).unwrap_or((0.0, 0.0));
            let before_x = pose.root.x;
            let before_z = pose.root.z;
            if reduce {
                pose.root.x = mark_x;
                pose.root.z = mark_z;
            } else {
                pose.root.x = lerp(pose.root.x, mark_x, 0.06);
                pose.root.z = lerp(pose.root.z, mark_z, 0.06);
            }

            let rng = &mut self.rng;
            let state = self.states.entry(rig.id.clone()).or_insert_with(|| RigState {
                last_x: before_x,
                last_z: before_z,
                next_blink_at: t_anim + FIRST_BLINK_DELAY,
                blink_until: 0.0,
            });
            let speed = (pose.root.x - state.last_x).hypot(pose.root.z - state.last_z)
                / frame.dt.max(1e-4);
            state.last_x = pose.root.x;
            state.last_z = pose.root.z;

            let walk_energy = if reduce { 0.0 } else { clamp01(speed * 0.8) };
            let walk_phase = t_anim * (4.1 + walk_energy * 1.1) + id_seed * PI * 2.0;

            let brow_lift = if speaking && question {
                0.06
            } else if speaking && excited {
                0.03
            } else {
                0.0
            };
            let mouth_y = 0.6 + amp * 1.6;
            let mouth_x = 0.9 + amp * 0.35;

            if reduce {
                pose.root.y = 0.0;
                pose.leg_l_rot_x = 0.0;
                pose.leg_r_rot_x = 0.0;
                pose.eye_scale_y = 1.0;
                pose.head_rot = Vec3::ZERO;
                pose.brow_y = REST_BROW_Y + brow_lift;
                pose.mouth_scale_y = mouth_y;
                pose.mouth_scale_x = mouth_x;
                let swing = if speaking { 0.06 } else { 0.0 };
                pose.arm_l = Vec3::new(0.0, 0.0, swing);
                pose.arm_r = Vec3::new(0.0, 0.0, -swing);
                pose.body_scale = 1.0;
            } else {
                let walk_swing = walk_phase.sin() * 0.65 * walk_energy;
                pose.leg_l_rot_x = lerp(pose.leg_l_rot_x, walk_swing, 0.2);
                pose.leg_r_rot_x = lerp(pose.leg_r_rot_x, -walk_swing, 0.2);

                let stride = if walk_energy > 0.05 {
                    walk_phase.sin().abs() * 0.015 * walk_energy
                } else {
                    0.0
                };
                pose.root.y = breath + laugh_bounce + stride;

                if t_anim >= state.next_blink_at {
                    state.blink_until = t_anim + BLINK_SEC;
                    state.next_blink_at =
                        t_anim + MIN_BLINK_INTERVAL + rng.f64() * BLINK_INTERVAL_SPREAD;
                }
                let eye_target = if t_anim <= state.blink_until { 0.12 } else { 1.0 };
                pose.eye_scale_y = lerp(pose.eye_scale_y, eye_target, 0.25);

                let look = match focus_x {
                    Some(fx) if !speaking => clamp((fx - pose.root.x) * 0.18, -0.25, 0.25),
                    _ => 0.0,
                };
                let head_y = if speaking {
                    (t_anim * 0.6 + id_seed * 3.0).sin() * 0.15
                } else {
                    look + (t_anim * 0.18 + id_seed * 12.0).sin() * 0.03
                };
                let head_x = if speaking {
                    (t_anim * 1.1 + id_seed * 2.0).sin() * 0.07
                } else {
                    (t_anim * 0.25 + id_seed * 8.0).sin() * 0.02
                };
                pose.head_rot.y = lerp(pose.head_rot.y, head_y, 0.06);
                pose.head_rot.x = lerp(pose.head_rot.x, head_x, 0.06);

                pose.brow_y = lerp(pose.brow_y, REST_BROW_Y + brow_lift, 0.12);
                pose.mouth_scale_y = lerp(pose.mouth_scale_y, mouth_y, 0.35);
                pose.mouth_scale_x = lerp(pose.mouth_scale_x, mouth_x, 0.25);

                let arm_swing = if speaking {
                    (frame.t_media * 3.2).sin() * 0.22
                } else {
                    walk_phase.sin() * 0.35 * walk_energy * 0.5
                };
                ease_arm(&mut pose.arm_l, arm_swing);
                ease_arm(&mut pose.arm_r, -arm_swing);

                let pop = if speaking && t_anim < self.speaker_pop_until {
                    (self.speaker_pop_until - t_anim) * 0.06
                } else {
                    0.0
                };
                pose.body_scale = 1.0 + pop;
            }

            if let Some(impulse) = self.gestures.get(&rig.id).copied() {
                let age = frame.t_media - impulse.started_at;
                if age > GESTURE_WINDOW_SEC {
                    self.gestures.remove(&rig.id);
                } else if !reduce {
                    apply_gesture(pose, impulse.kind, 1.0 - clamp01(age / GESTURE_WINDOW_SEC), t_anim);
                }
            }
        }

        stage.crowd.offset_y = if frame.audience_mode && !reduce {
            let pulse = if self.is_laughing(t_anim) {
                (t_anim * 16.0).sin() * 0.03 + 0.03
            } else {
                0.0
            };
            lerp(stage.crowd.offset_y, pulse, 0.18)
        } else {
            0.0
        };
    }
}

/// Arms swing around z; x and y only move during gestures and settle back.
fn ease_arm(arm: &mut Vec3, swing: f64) {
    arm.x = lerp(arm.x, 0.0, 0.12);
    arm.y = lerp(arm.y, 0.0, 0.12);
    arm.z = lerp(arm.z, swing, 0.12);
}

fn apply_gesture(pose: &mut RigPose, kind: GestureKind, k: f64, t_anim: f64) {
    match kind {
        GestureKind::Shrug => {
            pose.arm_l.x = k * 0.8;
            pose.arm_r.x = k * 0.8;
        }
        GestureKind::Wave => {
            pose.arm_r.z = -0.8 + (t_anim * 18.0).sin() * 0.25;
        }
        GestureKind::Point => {
            pose.arm_r.z = -1.1;
            pose.arm_r.y = 0.6;
        }
        GestureKind::Nod => {
            pose.head_rot.x += k * 0.35;
        }
        GestureKind::Facepalm => {
            pose.arm_l.z = 1.4;
            pose.arm_l.y = -0.6;
        }
    }
}

fn update_camera(camera: &mut CameraNode, frame: &RigFrame, focus_x: Option<f64>) {
    if frame.reduce_motion {
        camera.position = CameraNode::REST_POSITION;
        camera.look_at = CameraNode::REST_LOOK_AT;
        return;
    }
    let mode = frame.camera;
    let target_x = focus_x.map_or(0.0, |x| x * mode.follow_factor());
    let target_y = mode.height() + (frame.t_anim * 0.35).sin() * 0.03;
    camera.position.x = lerp(camera.position.x, target_x, 0.06);
    camera.position.z = lerp(camera.position.z, mode.distance(), 0.05);
    camera.position.y = lerp(camera.position.y, target_y, 0.04);
    camera.look_at = Vec3::new(target_x, 1.2, 0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::script::default_characters;

    fn frame(t: f64) -> RigFrame<'static> {
        RigFrame {
            t_media: t,
            t_anim: t,
            dt: 1.0 / 60.0,
            speaker: None,
            line_text: "",
            set: StageSet::Stage,
            camera: CameraMode::Wide,
            reduce_motion: false,
            audience_mode: false,
        }
    }

    fn gesture(target: &str, kind: GestureKind) -> GestureEvent {
        GestureEvent {
            at_sec: 0.0,
            target: target.to_string(),
            kind,
        }
    }

    fn no_audio(_: f64) -> f64 {
        0.0
    }

    #[test]
    fn test_laugh_pulse_extends_to_max() {
        let mut animator = RigAnimator::new(1);
        animator.trigger_laugh(0.5, 5.0);
        assert!((animator.laugh_pulse_until() - 6.1).abs() < 1e-9);
        animator.trigger_laugh(0.0, 4.0);
        assert!((animator.laugh_pulse_until() - 6.1).abs() < 1e-9);
        animator.trigger_laugh(1.0, 5.5);
        assert!((animator.laugh_pulse_until() - 6.9).abs() < 1e-9);
    }

    #[test]
    fn test_gesture_removed_after_window() {
        let mut stage = StageScene::new(&default_characters(), 1);
        let mut animator = RigAnimator::new(1);
        animator.trigger_gesture(&gesture("host", GestureKind::Shrug), 10.0);

        animator.update(&mut stage, &frame(10.5), &mut no_audio);
        assert_eq!(animator.active_gesture("host"), Some(GestureKind::Shrug));
        assert!(stage.rig("host").unwrap().pose.arm_l.x > 0.0);

        animator.update(&mut stage, &frame(10.95), &mut no_audio);
        assert_eq!(animator.active_gesture("host"), None);
    }

    #[test]
    fn test_gesture_replaces_previous() {
        let mut animator = RigAnimator::new(1);
        animator.trigger_gesture(&gesture("ops", GestureKind::Wave), 1.0);
        animator.trigger_gesture(&gesture("ops", GestureKind::Facepalm), 1.2);
        assert_eq!(animator.active_gesture("ops"), Some(GestureKind::Facepalm));
    }

    #[test]
    fn test_point_arm_settles_after_gesture() {
        let mut stage = StageScene::new(&default_characters(), 1);
        let mut animator = RigAnimator::new(1);
        animator.trigger_gesture(&gesture("friend1", GestureKind::Point), 0.0);
        animator.update(&mut stage, &frame(0.1), &mut no_audio);
        assert_eq!(stage.rig("friend1").unwrap().pose.arm_r.y, 0.6);

        let mut t = 1.0;
        while t < 4.0 {
            animator.update(&mut stage, &frame(t), &mut no_audio);
            t += 1.0 / 60.0;
        }
        assert!(stage.rig("friend1").unwrap().pose.arm_r.y.abs() < 0.01);
    }

    #[test]
    fn test_reduced_motion_is_deterministic() {
        let mut stage = StageScene::new(&default_characters(), 1);
        let mut animator = RigAnimator::new(1);
        animator.trigger_gesture(&gesture("host", GestureKind::Wave), 3.0);
        animator.trigger_laugh(1.0, 3.0);
        let input = RigFrame {
            speaker: Some("host"),
            line_text: "Ready?",
            set: StageSet::Cafe,
            camera: CameraMode::Close,
            reduce_motion: true,
            audience_mode: true,
            ..frame(3.2)
        };

        animator.update(&mut stage, &input, &mut |_| 0.5);
        let first = stage.clone();
        animator.update(&mut stage, &input, &mut |_| 0.5);
        assert_eq!(first, stage);

        assert_eq!(stage.camera.position, CameraNode::REST_POSITION);
        assert_eq!(stage.crowd.offset_y, 0.0);
        let host = stage.rig("host").unwrap();
        assert_eq!((host.pose.root.x, host.pose.root.z), (-0.9, 0.35));
        assert_eq!(host.pose.eye_scale_y, 1.0);
    }

    #[test]
    fn test_camera_follows_speaker() {
        let mut stage = StageScene::new(&default_characters(), 1);
        let mut animator = RigAnimator::new(1);
        let input = RigFrame {
            speaker: Some("ops"),
            camera: CameraMode::Close,
            ..frame(1.0)
        };
        for _ in 0..600 {
            animator.update(&mut stage, &input, &mut no_audio);
        }
        assert!((stage.camera.position.x - 1.1 * 0.55).abs() < 1e-3);
        assert!((stage.camera.position.z - 3.15).abs() < 1e-3);
    }

    #[test]
    fn test_speaker_mouth_opens_with_amplitude() {
        let mut stage = StageScene::new(&default_characters(), 1);
        let mut animator = RigAnimator::new(1);
        let input = RigFrame {
            speaker: Some("friend2"),
            ..frame(2.0)
        };
        for _ in 0..60 {
            animator.update(&mut stage, &input, &mut |_| 1.0);
        }
        assert!((stage.rig("friend2").unwrap().pose.mouth_scale_y - 2.2).abs() < 1e-3);
        assert!((stage.rig("host").unwrap().pose.mouth_scale_y - 0.6).abs() < 1e-3);
    }

    #[test]
    fn test_crowd_only_on_stage_set_in_audience_mode() {
        let mut stage = StageScene::new(&default_characters(), 1);
        let mut animator = RigAnimator::new(1);
        let mut input = RigFrame {
            audience_mode: true,
            ..frame(1.0)
        };
        animator.update(&mut stage, &input, &mut no_audio);
        assert!(stage.crowd.visible);
        input.set = StageSet::Cafe;
        animator.update(&mut stage, &input, &mut no_audio);
        assert!(!stage.crowd.visible);
    }
}

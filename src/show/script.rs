use itertools::Itertools;
use serde::Deserialize;

use crate::error::Result;
use crate::utils::clamp01;

/// Seek target for "skip intro" when the script does not provide one.
pub const DEFAULT_INTRO_END_SEC: f64 = 32.0;
pub const DEFAULT_LAUGH_INTENSITY: f64 = 0.6;

fn default_intro_end() -> f64 {
    DEFAULT_INTRO_END_SEC
}

fn default_laugh_intensity() -> f64 {
    DEFAULT_LAUGH_INTENSITY
}

/// Pre-authored episode timeline, deserialized from `script.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowScript {
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_intro_end")]
    pub intro_end_sec: f64,
    #[serde(default)]
    pub characters: Vec<CharacterDef>,
    #[serde(default)]
    pub scenes: Vec<SceneDef>,
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDef {
    pub id: String,
    pub display_name: String,
    pub color: String,
}

impl CharacterDef {
    pub fn new(id: &str, display_name: &str, color: &str) -> CharacterDef {
        CharacterDef {
            id: id.to_string(),
            display_name: display_name.to_string(),
            color: color.to_string(),
        }
    }
}

/// Lineup used before the script arrives, or when it fails to load.
pub fn default_characters() -> Vec<CharacterDef> {
    vec![
        CharacterDef::new("host", "Host", "#7CF7D4"),
        CharacterDef::new("friend1", "Friend 1", "#6EA8FF"),
        CharacterDef::new("friend2", "Friend 2", "#FFC38A"),
        CharacterDef::new("ops", "Ops", "#E6E6E6"),
    ]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDef {
    #[serde(default)]
    pub id: String,
    pub from_sec: f64,
    pub to_sec: f64,
    #[serde(default)]
    pub camera: Option<String>,
}

impl SceneDef {
    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.from_sec && t < self.to_sec
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineEvent {
    Line(LineEvent),
    Gesture(GestureEvent),
    Laugh(LaughEvent),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    pub from_sec: f64,
    pub to_sec: f64,
    pub speaker: String,
    #[serde(default)]
    pub text: String,
}

impl LineEvent {
    /// Lines are inclusive on both ends so back-to-back lines never leave a
    /// one-frame gap without a speaker.
    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        self.from_sec <= t && t <= self.to_sec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Shrug,
    Point,
    Wave,
    Nod,
    Facepalm,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureEvent {
    pub at_sec: f64,
    pub target: String,
    pub kind: GestureKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaughEvent {
    pub at_sec: f64,
    #[serde(default = "default_laugh_intensity")]
    pub intensity: f64,
}

/// One-shot events that fire when the media clock passes them.
pub trait TimedEvent {
    fn at_sec(&self) -> f64;
}

impl TimedEvent for GestureEvent {
    fn at_sec(&self) -> f64 {
        self.at_sec
    }
}

impl TimedEvent for LaughEvent {
    fn at_sec(&self) -> f64 {
        self.at_sec
    }
}

impl ShowScript {
    pub fn from_json(json: &str) -> Result<ShowScript> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Time-sorted projections of a script, built once per load.
#[derive(Debug, Clone)]
pub struct ScriptTimeline {
    pub version: String,
    pub intro_end_sec: f64,
    pub characters: Vec<CharacterDef>,
    pub scenes: Vec<SceneDef>,
    pub lines: Vec<LineEvent>,
    pub gestures: Vec<GestureEvent>,
    pub laughs: Vec<LaughEvent>,
}

impl ScriptTimeline {
    pub fn from_script(script: &ShowScript) -> ScriptTimeline {
        // `sorted_by` is a stable sort, ties keep authoring order.
        let scenes = script
            .scenes
            .iter()
            .cloned()
            .sorted_by(|a, b| a.from_sec.total_cmp(&b.from_sec))
            .collect_vec();

        let lines = script
            .events
            .iter()
            .filter_map(|event| match event {
                TimelineEvent::Line(line) => Some(line.clone()),
                _ => None,
            })
            .sorted_by(|a, b| a.from_sec.total_cmp(&b.from_sec))
            .collect_vec();

        let gestures = script
            .events
            .iter()
            .filter_map(|event| match event {
                TimelineEvent::Gesture(gesture) => Some(gesture.clone()),
                _ => None,
            })
            .sorted_by(|a, b| a.at_sec.total_cmp(&b.at_sec))
            .collect_vec();

        let laughs = script
            .events
            .iter()
            .filter_map(|event| match event {
                TimelineEvent::Laugh(laugh) => Some(LaughEvent {
                    at_sec: laugh.at_sec,
                    intensity: clamp01(laugh.intensity),
                }),
                _ => None,
            })
            .sorted_by(|a, b| a.at_sec.total_cmp(&b.at_sec))
            .collect_vec();

        let characters = if script.characters.is_empty() {
            default_characters()
        } else {
            script.characters.clone()
        };

        ScriptTimeline {
            version: script.version.clone(),
            intro_end_sec: script.intro_end_sec,
            characters,
            scenes,
            lines,
            gestures,
            laughs,
        }
    }

    /// Timeline with no events, used while the script is loading or failed.
    pub fn idle() -> ScriptTimeline {
        ScriptTimeline {
            version: String::new(),
            intro_end_sec: DEFAULT_INTRO_END_SEC,
            characters: default_characters(),
            scenes: Vec::new(),
            lines: Vec::new(),
            gestures: Vec::new(),
            laughs: Vec::new(),
        }
    }

    pub fn line_at(&self, t: f64) -> Option<&LineEvent> {
        self.lines.iter().find(|line| line.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r##"{
        "version": "1",
        "introEndSec": 12.5,
        "characters": [
            { "id": "host", "displayName": "Host", "color": "#7CF7D4" },
            { "id": "ops", "displayName": "Ops", "color": "#E6E6E6" }
        ],
        "scenes": [
            { "id": "cafe", "fromSec": 10, "toSec": 20, "camera": "close" },
            { "id": "stage", "fromSec": 0, "toSec": 10 }
        ],
        "events": [
            { "type": "laugh", "atSec": 9, "intensity": 1.7 },
            { "type": "line", "fromSec": 4, "toSec": 6, "speaker": "ops", "text": "Really?" },
            { "type": "gesture", "atSec": 5, "target": "host", "kind": "wave" },
            { "type": "line", "fromSec": 0, "toSec": 4, "speaker": "host", "text": "Hi!" },
            { "type": "gesture", "atSec": 2, "target": "ops", "kind": "facepalm" },
            { "type": "laugh", "atSec": 3 }
        ]
    }"##;

    #[test]
    fn test_parse_script() {
        let script = ShowScript::from_json(SCRIPT).unwrap();
        assert_eq!(script.intro_end_sec, 12.5);
        assert_eq!(script.characters.len(), 2);
        assert_eq!(script.scenes[0].camera.as_deref(), Some("close"));
        assert_eq!(script.events.len(), 6);
        assert!(matches!(
            script.events[2],
            TimelineEvent::Gesture(GestureEvent { kind: GestureKind::Wave, .. })
        ));
    }

    #[test]
    fn test_projections_are_sorted() {
        let script = ShowScript::from_json(SCRIPT).unwrap();
        let timeline = ScriptTimeline::from_script(&script);
        assert_eq!(timeline.scenes[0].id, "stage");
        assert_eq!(timeline.lines[0].speaker, "host");
        assert_eq!(timeline.gestures[0].target, "ops");
        assert_eq!(timeline.laughs[0].at_sec, 3.0);
    }

    #[test]
    fn test_laugh_intensity_defaults_and_clamps() {
        let script = ShowScript::from_json(SCRIPT).unwrap();
        let timeline = ScriptTimeline::from_script(&script);
        assert_eq!(timeline.laughs[0].intensity, DEFAULT_LAUGH_INTENSITY);
        assert_eq!(timeline.laughs[1].intensity, 1.0);
    }

    #[test]
    fn test_ties_keep_authoring_order() {
        let json = r#"{ "events": [
            { "type": "gesture", "atSec": 1, "target": "a", "kind": "nod" },
            { "type": "gesture", "atSec": 1, "target": "b", "kind": "nod" }
        ] }"#;
        let timeline = ScriptTimeline::from_script(&ShowScript::from_json(json).unwrap());
        assert_eq!(timeline.gestures[0].target, "a");
        assert_eq!(timeline.gestures[1].target, "b");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let script = ShowScript::from_json("{}").unwrap();
        assert_eq!(script.intro_end_sec, DEFAULT_INTRO_END_SEC);
        let timeline = ScriptTimeline::from_script(&script);
        assert_eq!(timeline.characters, default_characters());
    }

    #[test]
    fn test_line_at_is_inclusive() {
        let script = ShowScript::from_json(SCRIPT).unwrap();
        let timeline = ScriptTimeline::from_script(&script);
        assert_eq!(timeline.line_at(4.0).unwrap().speaker, "host");
        assert_eq!(timeline.line_at(6.0).unwrap().speaker, "ops");
        assert!(timeline.line_at(6.5).is_none());
    }

    #[test]
    fn test_unknown_gesture_kind_is_rejected() {
        let json = r#"{ "events": [ { "type": "gesture", "atSec": 1, "target": "a", "kind": "dance" } ] }"#;
        assert!(ShowScript::from_json(json).is_err());
    }
}

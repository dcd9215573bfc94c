use crate::show::script::SceneDef;

/// Visual sets the stage knows how to draw. Scene ids without a registered
/// set fall back to `Stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageSet {
    Stage,
    Cafe,
    Apartment,
    Workshop,
}

pub const FALLBACK_SET: StageSet = StageSet::Stage;

impl StageSet {
    pub const ALL: [StageSet; 4] = [
        StageSet::Stage,
        StageSet::Cafe,
        StageSet::Apartment,
        StageSet::Workshop,
    ];

    pub fn from_id(id: &str) -> Option<StageSet> {
        match id {
            "stage" => Some(StageSet::Stage),
            "cafe" => Some(StageSet::Cafe),
            "apartment" => Some(StageSet::Apartment),
            "workshop" => Some(StageSet::Workshop),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            StageSet::Stage => "stage",
            StageSet::Cafe => "cafe",
            StageSet::Apartment => "apartment",
            StageSet::Workshop => "workshop",
        }
    }

    /// Floor mark (x, z) for a character in this set.
    pub fn mark_for(self, character_id: &str) -> Option<(f64, f64)> {
        let marks: [(f64, f64); 4] = match self {
            StageSet::Cafe => [(-0.9, 0.35), (-0.25, -0.05), (0.35, 0.25), (0.95, -0.08)],
            StageSet::Apartment => [(-0.75, 0.2), (-0.15, 0.05), (0.35, 0.18), (0.9, 0.02)],
            StageSet::Workshop => [(-0.85, 0.15), (-0.2, 0.0), (0.35, 0.1), (0.95, 0.0)],
            StageSet::Stage => [(-1.1, 0.0), (-0.35, 0.0), (0.35, 0.0), (1.1, 0.0)],
        };
        let slot = match character_id {
            "host" => 0,
            "friend1" => 1,
            "friend2" => 2,
            "ops" => 3,
            _ => return None,
        };
        Some(marks[slot])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Wide,
    Close,
    Two,
}

impl CameraMode {
    /// Unknown or missing modes frame wide.
    pub fn parse(mode: Option<&str>) -> CameraMode {
        match mode {
            Some("close") => CameraMode::Close,
            Some("two") => CameraMode::Two,
            _ => CameraMode::Wide,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraMode::Wide => "wide",
            CameraMode::Close => "close",
            CameraMode::Two => "two",
        }
    }

    /// Share of the speaker's x offset the camera follows.
    pub fn follow_factor(self) -> f64 {
        match self {
            CameraMode::Close => 0.55,
            CameraMode::Two => 0.45,
            CameraMode::Wide => 0.35,
        }
    }

    pub fn distance(self) -> f64 {
        match self {
            CameraMode::Close => 3.15,
            CameraMode::Two => 3.75,
            CameraMode::Wide => 4.2,
        }
    }

    pub fn height(self) -> f64 {
        match self {
            CameraMode::Close => 1.25,
            _ => 1.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneResolution {
    /// Index into the sorted scene list, `None` when there are no scenes.
    pub scene_index: Option<usize>,
    pub set: StageSet,
    pub camera: CameraMode,
}

impl SceneResolution {
    pub fn fallback() -> SceneResolution {
        SceneResolution {
            scene_index: None,
            set: FALLBACK_SET,
            camera: CameraMode::Wide,
        }
    }
}

/// Picks the active scene for the current media time.
///
/// Overlapping scenes resolve to whichever one the scan meets first; gaps and
/// trailing time resolve to the last scene.
#[derive(Debug, Default)]
pub struct SceneDirector {
    cached_index: usize,
}

impl SceneDirector {
    pub fn new() -> SceneDirector {
        SceneDirector::default()
    }

    pub fn resolve(&mut self, scenes: &[SceneDef], t: f64) -> SceneResolution {
        if scenes.is_empty() {
            return SceneResolution::fallback();
        }

        let cached_hit = scenes
            .get(self.cached_index)
            .map_or(false, |scene| scene.contains(t));
        if !cached_hit {
            self.cached_index = scenes
                .iter()
                .position(|scene| scene.contains(t))
                .unwrap_or(scenes.len() - 1);
        }

        let scene = &scenes[self.cached_index];
        let set = if scene.id.is_empty() {
            FALLBACK_SET
        } else {
            StageSet::from_id(&scene.id).unwrap_or(FALLBACK_SET)
        };
        SceneResolution {
            scene_index: Some(self.cached_index),
            set,
            camera: CameraMode::parse(scene.camera.as_deref()),
        }
    }

    pub fn reset(&mut self) {
        self.cached_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(id: &str, from_sec: f64, to_sec: f64, camera: Option<&str>) -> SceneDef {
        SceneDef {
            id: id.to_string(),
            from_sec,
            to_sec,
            camera: camera.map(str::to_string),
        }
    }

    fn two_scenes() -> Vec<SceneDef> {
        vec![
            scene("stage", 0.0, 10.0, None),
            scene("cafe", 10.0, 20.0, Some("close")),
        ]
    }

    #[test]
    fn test_resolves_containing_scene() {
        let mut director = SceneDirector::new();
        let res = director.resolve(&two_scenes(), 15.0);
        assert_eq!(res.set, StageSet::Cafe);
        assert_eq!(res.camera, CameraMode::Close);
        assert_eq!(res.scene_index, Some(1));
    }

    #[test]
    fn test_past_end_uses_last_scene() {
        let mut director = SceneDirector::new();
        let res = director.resolve(&two_scenes(), 25.0);
        assert_eq!(res.set, StageSet::Cafe);
    }

    #[test]
    fn test_empty_scenes_use_fallback() {
        let mut director = SceneDirector::new();
        assert_eq!(director.resolve(&[], 3.0), SceneResolution::fallback());
    }

    #[test]
    fn test_unregistered_set_falls_back_to_stage() {
        let mut director = SceneDirector::new();
        let scenes = vec![scene("rooftop", 0.0, 10.0, Some("two"))];
        let res = director.resolve(&scenes, 1.0);
        assert_eq!(res.set, StageSet::Stage);
        assert_eq!(res.camera, CameraMode::Two);
    }

    #[test]
    fn test_unknown_camera_is_wide() {
        assert_eq!(CameraMode::parse(Some("dolly")), CameraMode::Wide);
        assert_eq!(CameraMode::parse(None), CameraMode::Wide);
    }

    #[test]
    fn test_boundary_belongs_to_next_scene() {
        let mut director = SceneDirector::new();
        assert_eq!(director.resolve(&two_scenes(), 10.0).set, StageSet::Cafe);
    }

    #[test]
    fn test_backward_seek_rescans() {
        let mut director = SceneDirector::new();
        director.resolve(&two_scenes(), 15.0);
        let res = director.resolve(&two_scenes(), 2.0);
        assert_eq!(res.set, StageSet::Stage);
        assert_eq!(res.scene_index, Some(0));
    }

    #[test]
    fn test_overlap_prefers_first_in_scan() {
        let mut director = SceneDirector::new();
        let scenes = vec![
            scene("apartment", 0.0, 12.0, None),
            scene("workshop", 8.0, 20.0, None),
        ];
        assert_eq!(director.resolve(&scenes, 9.0).set, StageSet::Apartment);
    }

    #[test]
    fn test_exactly_one_set_for_any_time() {
        let mut director = SceneDirector::new();
        let scenes = vec![
            scene("stage", 0.0, 5.0, None),
            scene("cafe", 7.0, 12.0, None),
        ];
        for step in 0..300 {
            let t = step as f64 * 0.1;
            let res = director.resolve(&scenes, t);
            let index = res.scene_index.unwrap();
            let scene = &scenes[index];
            assert!(scene.contains(t) || index == scenes.len() - 1);
        }
    }

    #[test]
    fn test_marks_for_known_characters_only() {
        assert_eq!(StageSet::Stage.mark_for("host"), Some((-1.1, 0.0)));
        assert_eq!(StageSet::Cafe.mark_for("ops"), Some((0.95, -0.08)));
        assert_eq!(StageSet::Cafe.mark_for("guest"), None);
    }
}

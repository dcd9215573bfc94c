use fastrand::Rng;

use crate::show::script::CharacterDef;

use super::director::StageSet;

pub const MAX_RIGS: usize = 4;
pub const CROWD_SIZE: usize = 240;
const CROWD_COLUMNS: usize = 40;
const RIG_XS: [f64; MAX_RIGS] = [-1.1, -0.35, 0.35, 1.1];

pub const REST_BROW_Y: f64 = 0.085;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Vec3 {
        Vec3 { x, y, z }
    }
}

/// Every animatable channel of one character. Rotations are in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigPose {
    pub root: Vec3,
    pub body_scale: f64,
    /// Only x (pitch) and y (yaw) are animated.
    pub head_rot: Vec3,
    pub eye_scale_y: f64,
    pub brow_y: f64,
    pub mouth_scale_x: f64,
    pub mouth_scale_y: f64,
    pub arm_l: Vec3,
    pub arm_r: Vec3,
    pub leg_l_rot_x: f64,
    pub leg_r_rot_x: f64,
}

impl RigPose {
    pub fn at(x: f64) -> RigPose {
        RigPose {
            root: Vec3::new(x, 0.0, 0.0),
            body_scale: 1.0,
            head_rot: Vec3::ZERO,
            eye_scale_y: 1.0,
            brow_y: REST_BROW_Y,
            mouth_scale_x: 1.0,
            mouth_scale_y: 1.0,
            arm_l: Vec3::ZERO,
            arm_r: Vec3::ZERO,
            leg_l_rot_x: 0.0,
            leg_r_rot_x: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigNode {
    pub id: String,
    pub color: String,
    pub pose: RigPose,
}

/// Solid piece of scenery, drawn as a box.
#[derive(Debug, Clone, PartialEq)]
pub struct SetProp {
    pub center: Vec3,
    pub size: Vec3,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetGroup {
    pub set: StageSet,
    pub visible: bool,
    pub floor_radius: f64,
    pub floor_color: &'static str,
    pub wall_color: &'static str,
    pub props: Vec<SetProp>,
}

impl SetGroup {
    fn build(set: StageSet) -> SetGroup {
        let (floor_radius, floor_color, wall_color, props) = match set {
            StageSet::Stage => (3.4, "#090a10", "#05060a", vec![]),
            StageSet::Cafe => (
                3.5,
                "#090804",
                "#050509",
                vec![SetProp {
                    center: Vec3::new(0.0, 0.66, 0.15),
                    size: Vec3::new(1.24, 0.06, 1.24),
                    color: "#1a1110",
                }],
            ),
            StageSet::Apartment => (
                3.5,
                "#070810",
                "#04040a",
                vec![SetProp {
                    center: Vec3::new(0.0, 0.28, 0.25),
                    size: Vec3::new(1.65, 0.45, 0.55),
                    color: "#101423",
                }],
            ),
            StageSet::Workshop => (
                3.5,
                "#05060d",
                "#040409",
                vec![SetProp {
                    center: Vec3::new(0.0, 0.56, 0.2),
                    size: Vec3::new(2.2, 0.22, 0.62),
                    color: "#0c0f1a",
                }],
            ),
        };
        SetGroup {
            set,
            visible: set == StageSet::Stage,
            floor_radius,
            floor_color,
            wall_color,
            props,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrowdMember {
    pub position: Vec3,
    pub scale: f64,
    pub yaw: f64,
}

/// Rows of small silhouettes behind the stage, shown in audience mode.
#[derive(Debug, Clone, PartialEq)]
pub struct CrowdNode {
    pub members: Vec<CrowdMember>,
    pub visible: bool,
    pub offset_y: f64,
}

impl CrowdNode {
    fn build(rng: &mut Rng) -> CrowdNode {
        let members = (0..CROWD_SIZE)
            .map(|i| {
                let row = i / CROWD_COLUMNS;
                let col = i % CROWD_COLUMNS;
                let stagger = if row % 2 == 1 { 0.05 } else { 0.0 };
                CrowdMember {
                    position: Vec3::new(
                        (col as f64 - 20.0) * 0.12 + stagger,
                        0.08 + row as f64 * 0.02,
                        -1.15 - row as f64 * 0.16,
                    ),
                    scale: 0.9 + rng.f64() * 0.6,
                    yaw: (rng.f64() - 0.5) * 0.25,
                }
            })
            .collect();
        CrowdNode {
            members,
            visible: false,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraNode {
    pub position: Vec3,
    pub look_at: Vec3,
    pub fov_deg: f64,
}

impl CameraNode {
    pub const REST_POSITION: Vec3 = Vec3::new(0.0, 1.35, 4.2);
    pub const REST_LOOK_AT: Vec3 = Vec3::new(0.0, 1.2, 0.0);
}

impl Default for CameraNode {
    fn default() -> Self {
        CameraNode {
            position: CameraNode::REST_POSITION,
            look_at: CameraNode::REST_LOOK_AT,
            fov_deg: 45.0,
        }
    }
}

/// Everything the renderer draws. Owned by the player and mutated in place
/// by the rig animator each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StageScene {
    pub sets: Vec<SetGroup>,
    pub active_set: StageSet,
    pub rigs: Vec<RigNode>,
    pub crowd: CrowdNode,
    pub camera: CameraNode,
}

impl StageScene {
    /// Builds one rig per character, up to the four floor marks.
    pub fn new(characters: &[CharacterDef], seed: u32) -> StageScene {
        let mut rng = Rng::with_seed(u64::from(seed));
        let rigs = characters
            .iter()
            .zip(RIG_XS.iter())
            .map(|(character, &x)| RigNode {
                id: character.id.clone(),
                color: character.color.clone(),
                pose: RigPose::at(x),
            })
            .collect();

        StageScene {
            sets: StageSet::ALL.iter().map(|&set| SetGroup::build(set)).collect(),
            active_set: StageSet::Stage,
            rigs,
            crowd: CrowdNode::build(&mut rng),
            camera: CameraNode::default(),
        }
    }

    /// Make `set` the only visible set. Returns whether anything changed.
    pub fn show_set(&mut self, set: StageSet) -> bool {
        if set == self.active_set {
            return false;
        }
        for group in self.sets.iter_mut() {
            group.visible = group.set == set;
        }
        self.active_set = set;
        true
    }

    pub fn visible_set(&self) -> Option<&SetGroup> {
        self.sets.iter().find(|group| group.visible)
    }

    pub fn rig(&self, id: &str) -> Option<&RigNode> {
        self.rigs.iter().find(|rig| rig.id == id)
    }

    pub fn rig_mut(&mut self, id: &str) -> Option<&mut RigNode> {
        self.rigs.iter_mut().find(|rig| rig.id == id)
    }
}

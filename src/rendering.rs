use std::{
    cell::{Cell, RefCell},
    f64::consts::PI,
    rc::Rc,
};

use log::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlElement, ResizeObserver};

use crate::error::{Result, ShowError};
use crate::js_api::safe_js_string;
use crate::player::stage::{CameraNode, RigNode, SetGroup, StageScene, Vec3};

const NEAR: f64 = 0.1;
const MAX_PIXEL_RATIO: f64 = 2.0;
const FLOOR_SEGMENTS: usize = 48;

const SKIN: &str = "#e8e2d8";
const ACCENT: &str = "#141826";
const BROW: &str = "#0a0c14";
const FOOT: &str = "#0b0e18";
const CROWD: &str = "#0f1320";

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

fn normalize(v: Vec3) -> Vec3 {
    let len = dot(v, v).sqrt();
    if len == 0.0 {
        return v;
    }
    Vec3::new(v.x / len, v.y / len, v.z / len)
}

/// A point on screen plus the pixels-per-world-unit scale at its depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub depth: f64,
}

/// Pinhole projection for a camera looking at a target with +y up.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    eye: Vec3,
    right: Vec3,
    up: Vec3,
    forward: Vec3,
    focal: f64,
    half_width: f64,
    half_height: f64,
}

impl Projector {
    pub fn new(camera: &CameraNode, width: f64, height: f64) -> Projector {
        let forward = normalize(sub(camera.look_at, camera.position));
        let right = normalize(cross(forward, Vec3::new(0.0, 1.0, 0.0)));
        let up = cross(right, forward);
        let half_fov = camera.fov_deg.to_radians() / 2.0;
        Projector {
            eye: camera.position,
            right,
            up,
            forward,
            focal: (height / 2.0) / half_fov.tan(),
            half_width: width / 2.0,
            half_height: height / 2.0,
        }
    }

    /// `None` for points at or behind the near plane.
    pub fn project(&self, p: Vec3) -> Option<ScreenPoint> {
        let rel = sub(p, self.eye);
        let depth = dot(rel, self.forward);
        if depth <= NEAR {
            return None;
        }
        let scale = self.focal / depth;
        Some(ScreenPoint {
            x: self.half_width + dot(rel, self.right) * scale,
            y: self.half_height - dot(rel, self.up) * scale,
            scale,
            depth,
        })
    }
}

/// `#rrggbb` scaled toward black. Malformed colors pass through unchanged.
pub fn shade(color: &str, factor: f64) -> String {
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 {
        return color.to_string();
    }
    let Ok(rgb) = u32::from_str_radix(hex, 16) else {
        return color.to_string();
    };
    let channel = |shift: u32| (((rgb >> shift) & 0xff) as f64 * factor).round().clamp(0.0, 255.0) as u32;
    format!("#{:02x}{:02x}{:02x}", channel(16), channel(8), channel(0))
}

pub struct StageRenderer {
    canvas: HtmlCanvasElement,
    ctx2d: CanvasRenderingContext2d,
    size: (u32, u32),
    _resize_observer: Option<(ResizeObserver, Closure<dyn FnMut()>)>,
}

impl StageRenderer {
    /// `Ok(None)` when the browser cannot give us a 2D context.
    fn create() -> Result<Option<StageRenderer>> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or(ShowError::Unavailable("document"))?;
        let canvas = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()?;
        canvas.style().set_property("width", "100%")?;
        canvas.style().set_property("height", "100%")?;
        canvas.style().set_property("display", "block")?;

        let ctx2d = match canvas.get_context("2d")? {
            Some(ctx) => ctx.dyn_into::<CanvasRenderingContext2d>()?,
            None => return Ok(None),
        };
        Ok(Some(StageRenderer {
            canvas,
            ctx2d,
            size: (1, 1),
            _resize_observer: None,
        }))
    }

    pub fn set_container_element(&mut self, container: &HtmlElement) -> Result<()> {
        if self.canvas.parent_node().is_some() {
            self.canvas.remove();
        }
        container.append_child(&self.canvas)?;
        self.resize();
        Ok(())
    }

    fn observe_resize(&mut self) -> Result<()> {
        let on_resize = Closure::<dyn FnMut()>::new(|| {
            with_renderer_mut(|renderer_lock| {
                if let Some(renderer) = renderer_lock {
                    renderer.resize();
                }
            });
        });
        let observer = ResizeObserver::new(on_resize.as_ref().unchecked_ref())?;
        observer.observe(&self.canvas);
        self._resize_observer = Some((observer, on_resize));
        Ok(())
    }

    /// Match the backing store to the displayed size, capped at 2x density.
    pub fn resize(&mut self) {
        let ratio = web_sys::window()
            .map_or(1.0, |window| window.device_pixel_ratio())
            .min(MAX_PIXEL_RATIO);
        let rect = self.canvas.get_bounding_client_rect();
        let width = ((rect.width() * ratio).floor() as u32).max(1);
        let height = ((rect.height() * ratio).floor() as u32).max(1);
        if (width, height) != self.size {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
            self.size = (width, height);
        }
    }

    fn fill(&self, color: &str) {
        self.ctx2d.set_fill_style(&safe_js_string(color));
        self.ctx2d.fill();
    }

    fn polygon(&self, points: &[ScreenPoint], color: &str) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.ctx2d.begin_path();
        self.ctx2d.move_to(first.x, first.y);
        for point in rest {
            self.ctx2d.line_to(point.x, point.y);
        }
        self.ctx2d.close_path();
        self.fill(color);
    }

    fn project_all(projector: &Projector, points: &[Vec3]) -> Option<Vec<ScreenPoint>> {
        points.iter().map(|&p| projector.project(p)).collect()
    }

    fn draw_set(&self, projector: &Projector, set: &SetGroup) {
        let wall = [
            Vec3::new(-4.5, -0.9, -3.0),
            Vec3::new(4.5, -0.9, -3.0),
            Vec3::new(4.5, 4.1, -3.0),
            Vec3::new(-4.5, 4.1, -3.0),
        ];
        if let Some(points) = Self::project_all(projector, &wall) {
            self.polygon(&points, set.wall_color);
        }

        let floor: Vec<Vec3> = (0..FLOOR_SEGMENTS)
            .map(|i| {
                let a = i as f64 / FLOOR_SEGMENTS as f64 * PI * 2.0;
                Vec3::new(a.cos() * set.floor_radius, 0.0, a.sin() * set.floor_radius)
            })
            .collect();
        let floor: Vec<ScreenPoint> = floor.iter().filter_map(|&p| projector.project(p)).collect();
        self.polygon(&floor, set.floor_color);

        for prop in &set.props {
            let (c, h) = (prop.center, Vec3::new(prop.size.x / 2.0, prop.size.y / 2.0, prop.size.z / 2.0));
            let front = [
                Vec3::new(c.x - h.x, c.y - h.y, c.z + h.z),
                Vec3::new(c.x + h.x, c.y - h.y, c.z + h.z),
                Vec3::new(c.x + h.x, c.y + h.y, c.z + h.z),
                Vec3::new(c.x - h.x, c.y + h.y, c.z + h.z),
            ];
            let top = [
                Vec3::new(c.x - h.x, c.y + h.y, c.z + h.z),
                Vec3::new(c.x + h.x, c.y + h.y, c.z + h.z),
                Vec3::new(c.x + h.x, c.y + h.y, c.z - h.z),
                Vec3::new(c.x - h.x, c.y + h.y, c.z - h.z),
            ];
            if let Some(points) = Self::project_all(projector, &front) {
                self.polygon(&points, &shade(prop.color, 0.8));
            }
            if let Some(points) = Self::project_all(projector, &top) {
                self.polygon(&points, prop.color);
            }
        }
    }

    fn draw_crowd(&self, projector: &Projector, stage: &StageScene) {
        self.ctx2d.set_fill_style(&safe_js_string(CROWD));
        for member in &stage.crowd.members {
            let mut p = member.position;
            p.y += stage.crowd.offset_y;
            if let Some(point) = projector.project(p) {
                let w = 0.07 * member.scale * point.scale;
                let h = 0.16 * member.scale * point.scale;
                self.ctx2d.fill_rect(point.x - w / 2.0, point.y - h / 2.0, w, h);
            }
        }
    }

    fn limb(&self, from: ScreenPoint, to: ScreenPoint, width: f64, color: &str) {
        self.ctx2d.begin_path();
        self.ctx2d.move_to(from.x, from.y);
        self.ctx2d.line_to(to.x, to.y);
        self.ctx2d.set_line_width(width);
        self.ctx2d.set_line_cap("round");
        self.ctx2d.set_stroke_style(&safe_js_string(color));
        self.ctx2d.stroke();
    }

    fn disc(&self, at: ScreenPoint, rx: f64, ry: f64, color: &str) {
        self.ctx2d.begin_path();
        if self
            .ctx2d
            .ellipse(at.x, at.y, rx.max(0.1), ry.max(0.1), 0.0, 0.0, PI * 2.0)
            .is_ok()
        {
            self.fill(color);
        }
    }

    fn draw_rig(&self, projector: &Projector, rig: &RigNode) {
        let pose = &rig.pose;
        let root = pose.root;
        let at = |x: f64, y: f64, z: f64| projector.project(Vec3::new(root.x + x, root.y + y, root.z + z));
        let Some(base) = at(0.0, 0.0, 0.0) else {
            return;
        };
        let s = base.scale;

        // Legs swing forward and back around the hip; on screen that shortens them.
        let leg_color = shade(&rig.color, 0.55);
        for (side, rot) in [(-0.12, pose.leg_l_rot_x), (0.12, pose.leg_r_rot_x)] {
            if let (Some(hip), Some(foot)) = (at(side, 0.43, 0.0), at(side, 0.43 - rot.cos() * 0.42, rot.sin() * 0.42)) {
                self.limb(hip, foot, 0.14 * s, &leg_color);
                self.disc(foot, 0.09 * s, 0.03 * s, FOOT);
            }
        }

        if let (Some(top), Some(bottom)) = (at(0.0, 0.92 + 0.25 * pose.body_scale, 0.0), at(0.0, 0.92 - 0.25 * pose.body_scale, 0.0)) {
            self.limb(top, bottom, 0.48 * s * pose.body_scale, &rig.color);
        }

        for (side, arm) in [(-1.0, pose.arm_l), (1.0, pose.arm_r)] {
            let Some(shoulder) = at(side * 0.28, 1.08, 0.0) else {
                continue;
            };
            // Rest pose points outward; z rotation swings in the screen plane,
            // x lifts toward the camera, y turns the forearm.
            let len = 0.34 * arm.x.cos();
            let dx = side * len * arm.z.cos() * arm.y.cos();
            let dy = len * arm.z.sin() * side.signum() + 0.34 * arm.x.sin() * 0.5;
            if let Some(hand) = at(side * 0.28 + dx, 1.08 + dy, 0.34 * arm.y.sin()) {
                self.limb(shoulder, hand, 0.12 * s, &rig.color);
                self.disc(hand, 0.035 * s, 0.025 * s, SKIN);
            }
        }

        let Some(head) = at(0.0, 1.36, 0.0) else {
            return;
        };
        self.disc(head, 0.22 * s, 0.22 * s, SKIN);

        let yaw = pose.head_rot.y.sin() * 0.18;
        let pitch = -pose.head_rot.x.sin() * 0.12;
        let face = |x: f64, y: f64| at(x + yaw, 1.36 + y + pitch, 0.19);
        for side in [-0.07, 0.07] {
            if let Some(eye) = face(side, 0.04) {
                self.disc(eye, 0.03 * s, 0.03 * s * pose.eye_scale_y, ACCENT);
            }
            if let Some(brow) = face(side, pose.brow_y) {
                let w = 0.0375 * s;
                self.ctx2d.set_fill_style(&safe_js_string(BROW));
                self.ctx2d.fill_rect(brow.x - w, brow.y - 0.006 * s, w * 2.0, 0.012 * s);
            }
        }
        if let Some(mouth) = face(0.0, -0.07) {
            let w = 0.055 * s * pose.mouth_scale_x;
            let h = 0.0175 * s * pose.mouth_scale_y;
            self.ctx2d.set_fill_style(&safe_js_string(ACCENT));
            self.ctx2d.fill_rect(mouth.x - w, mouth.y - h, w * 2.0, h * 2.0);
        }
    }

    pub fn draw(&mut self, stage: &StageScene) {
        let (width, height) = (self.size.0 as f64, self.size.1 as f64);
        self.ctx2d.clear_rect(0.0, 0.0, width, height);
        let projector = Projector::new(&stage.camera, width, height);

        if let Some(set) = stage.visible_set() {
            self.draw_set(&projector, set);
        }
        if stage.crowd.visible {
            self.draw_crowd(&projector, stage);
        }

        // Painter's order: farthest rig first.
        let mut rigs: Vec<(&RigNode, f64)> = stage
            .rigs
            .iter()
            .filter_map(|rig| projector.project(rig.pose.root).map(|p| (rig, p.depth)))
            .collect();
        rigs.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rig, _) in rigs {
            self.draw_rig(&projector, rig);
        }
    }
}

thread_local! {
    pub static RENDERER_LOCK: RefCell<Option<StageRenderer>> = RefCell::new(None);
}

pub fn with_renderer_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Option<StageRenderer>) -> R,
{
    RENDERER_LOCK.with_borrow_mut(|renderer_lock| f(renderer_lock))
}

/// Create the stage canvas inside `container`. Returns false when no 2D
/// context is available; the stage then simply stays blank.
pub fn mount(container: HtmlElement) -> Result<bool> {
    let renderer = match StageRenderer::create()? {
        Some(renderer) => renderer,
        None => {
            warn!("Canvas 2D context unavailable, stage will not be drawn");
            return Ok(false);
        }
    };
    with_renderer_mut(|renderer_lock| -> Result<()> {
        let renderer = renderer_lock.insert(renderer);
        renderer.set_container_element(&container)?;
        renderer.observe_resize()
    })?;
    debug!("Stage canvas mounted");
    Ok(true)
}

pub fn unmount() {
    with_renderer_mut(|renderer_lock| {
        if let Some(renderer) = renderer_lock.take() {
            if let Some((observer, _)) = &renderer._resize_observer {
                observer.disconnect();
            }
            renderer.canvas.remove();
        }
    });
}

fn request_animation_frame(f: &Closure<dyn FnMut(f64)>) -> Option<i32> {
    web_sys::window()?
        .request_animation_frame(f.as_ref().unchecked_ref())
        .ok()
}

/// Handle to a running `requestAnimationFrame` loop.
pub struct FrameLoop {
    cancelled: Rc<Cell<bool>>,
    handle: Rc<Cell<Option<i32>>>,
    callback: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>,
}

impl FrameLoop {
    /// Calls `on_frame` with the frame timestamp once per display refresh
    /// until cancelled.
    pub fn start<F: FnMut(f64) + 'static>(mut on_frame: F) -> FrameLoop {
        let cancelled = Rc::new(Cell::new(false));
        let handle = Rc::new(Cell::new(None));
        let callback: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));

        let cb_cancelled = Rc::clone(&cancelled);
        let cb_handle = Rc::clone(&handle);
        let cb_self = Rc::clone(&callback);
        let cb = Closure::<dyn FnMut(f64)>::new(move |now_ms: f64| {
            if cb_cancelled.get() {
                return;
            }
            on_frame(now_ms);
            if let Some(cb) = cb_self.borrow().as_ref() {
                cb_handle.set(request_animation_frame(cb));
            }
        });
        handle.set(request_animation_frame(&cb));
        callback.replace(Some(cb));

        FrameLoop {
            cancelled,
            handle,
            callback,
        }
    }

    /// Stop ticking and release the callback. Safe to call from inside the
    /// frame callback: the closure is dropped on a later microtask.
    pub fn cancel(&self) {
        self.cancelled.set(true);
        if let (Some(id), Some(window)) = (self.handle.take(), web_sys::window()) {
            let _ = window.cancel_animation_frame(id);
        }
        if let Some(callback) = self.callback.borrow_mut().take() {
            wasm_bindgen_futures::spawn_local(async move { drop(callback) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_target_projects_to_center() {
        let projector = Projector::new(&CameraNode::default(), 800.0, 450.0);
        let p = projector.project(CameraNode::REST_LOOK_AT).unwrap();
        assert!((p.x - 400.0).abs() < 1e-9);
        assert!((p.y - 225.0).abs() < 1e-9);
    }

    #[test]
    fn test_points_behind_camera_are_culled() {
        let projector = Projector::new(&CameraNode::default(), 800.0, 450.0);
        assert!(projector.project(Vec3::new(0.0, 1.35, 5.0)).is_none());
    }

    #[test]
    fn test_nearer_points_are_larger_and_right_is_right() {
        let projector = Projector::new(&CameraNode::default(), 800.0, 450.0);
        let near = projector.project(Vec3::new(0.5, 1.0, 1.0)).unwrap();
        let far = projector.project(Vec3::new(0.5, 1.0, -1.0)).unwrap();
        assert!(near.scale > far.scale);
        assert!(near.x > 400.0);
    }

    #[test]
    fn test_shade() {
        assert_eq!(shade("#FF8000", 0.5), "#804000");
        assert_eq!(shade("teal", 0.5), "teal");
    }
}

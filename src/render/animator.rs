use crate::choreo::camera::{relax, CameraState, Intensity};
use crate::choreo::engine::TickOutput;

/// Where the interpolation ring sits between two neighbouring poses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpolationResult {
    pub frame_a: usize,
    pub frame_b: usize,
    /// Blend position from `frame_a` (0) to `frame_b` (1).
    pub t: f32,
    /// Seam rotation in radians.
    pub seam_angle: f32,
    /// +1 while the ring turns forward, -1 backward.
    pub motion_dir: i8,
}

/// Camera values the interpolation pipeline draws with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimatorView {
    pub angle: f32,
    pub zoom: f32,
    pub pan: [f32; 2],
    /// Degrees per second, signed.
    pub angular_velocity: f32,
}

/// Owns rotation, zoom and pan targets for the interpolation ring and eases
/// toward them with the same first-order lag as the camera rig.
///
/// The ring spans 360 degrees with one pose every `360 / N` degrees. When
/// the choreography switches pose the target rolls forward to that pose's
/// slot, so the drawn frame blends through the poses in between.
#[derive(Clone, Debug)]
pub struct PhaseAnimator {
    frame_count: usize,
    rate: f32,
    angle: f32,
    target_angle: f32,
    zoom: f32,
    target_zoom: f32,
    pan: [f32; 2],
    target_pan: [f32; 2],
    velocity: f32,
}

impl PhaseAnimator {
    pub fn new(frame_count: usize, intensity: Intensity) -> Self {
        Self {
            frame_count,
            rate: intensity.fast_decay(),
            angle: 0.0,
            target_angle: 0.0,
            zoom: 1.0,
            target_zoom: 1.0,
            pan: [0.0; 2],
            target_pan: [0.0; 2],
            velocity: 0.0,
        }
    }

    pub fn step_angle(&self) -> f32 {
        360.0 / self.frame_count.max(1) as f32
    }

    #[cfg(test)]
    pub fn advance(&mut self, steps: f32) {
        self.target_angle += steps * self.step_angle();
    }

    pub fn set_zoom_target(&mut self, zoom: f32) {
        self.target_zoom = zoom;
    }

    pub fn set_pan_target(&mut self, x: f32, y: f32) {
        self.target_pan = [x, y];
    }

    /// Roll the target forward until it rests on `frame`.
    pub fn seek(&mut self, frame: usize) {
        if self.frame_count == 0 {
            return;
        }
        let goal = (frame % self.frame_count) as f32 * self.step_angle();
        let delta = (goal - self.target_angle.rem_euclid(360.0)).rem_euclid(360.0);
        self.target_angle += delta;
    }

    /// Feed one engine tick. `frame` is the ring slot of the active pose.
    pub fn drive(&mut self, tick: &TickOutput, frame: Option<usize>) {
        if let (true, Some(frame)) = (tick.pose_changed, frame) {
            self.seek(frame);
        }
        self.follow(&tick.camera);
    }

    pub fn follow(&mut self, camera: &CameraState) {
        self.set_zoom_target(camera.effective_zoom());
        self.set_pan_target(camera.offset_x(), camera.offset_y());
    }

    pub fn step(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        let before = self.angle;
        self.angle = relax(self.angle, self.target_angle, self.rate, dt);
        self.zoom = relax(self.zoom, self.target_zoom, self.rate, dt);
        self.pan[0] = relax(self.pan[0], self.target_pan[0], self.rate, dt);
        self.pan[1] = relax(self.pan[1], self.target_pan[1], self.rate, dt);
        if dt > 0.0 {
            self.velocity = (self.angle - before) / dt;
        }

        // Keep both angles small without disturbing their difference.
        if self.angle >= 360.0 && self.target_angle >= 360.0 {
            self.angle -= 360.0;
            self.target_angle -= 360.0;
        }
    }

    pub fn view(&self) -> AnimatorView {
        AnimatorView {
            angle: self.angle,
            zoom: self.zoom,
            pan: self.pan,
            angular_velocity: self.velocity,
        }
    }

    pub fn current(&self) -> Option<InterpolationResult> {
        let mut phase = self.calculate_phase(self.angle)?;
        if self.velocity < 0.0 {
            phase.motion_dir = -1;
        }
        Some(phase)
    }

    /// Map a ring angle in degrees to the neighbouring pose pair. `None`
    /// when the ring is empty.
    pub fn calculate_phase(&self, angle: f32) -> Option<InterpolationResult> {
        if self.frame_count == 0 {
            return None;
        }
        let n = self.frame_count;
        let angle = angle.rem_euclid(360.0);
        let pos = angle / self.step_angle();
        let frame_a = (pos.floor() as usize) % n;
        Some(InterpolationResult {
            frame_a,
            frame_b: (frame_a + 1) % n,
            t: pos.fract().clamp(0.0, 1.0),
            seam_angle: angle.to_radians(),
            motion_dir: 1,
        })
    }
}

use glam::{DMat3, DMat4, DQuat, DVec3};

/// Local transform of a scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    pub fn matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Rotate so the local +Z axis points at `target` (parent space).
    pub fn look_at(&mut self, target: DVec3) {
        self.rotation = look_rotation(target - self.position, DVec3::Y);
    }

    /// Rotation about a local axis, applied after the current rotation.
    pub fn rotate_local(&mut self, axis: DVec3, angle: f64) {
        self.rotation = (self.rotation * DQuat::from_axis_angle(axis, angle)).normalize();
    }

    pub fn set_uniform_scale(&mut self, k: f64) {
        self.scale = DVec3::splat(k);
    }
}

/// Orientation whose +Z axis follows `forward`, keeping +Y close to `up`.
pub fn look_rotation(forward: DVec3, up: DVec3) -> DQuat {
    let z = forward.normalize_or_zero();
    if z == DVec3::ZERO {
        return DQuat::IDENTITY;
    }

    let mut x = up.cross(z);
    if x.length_squared() < 1e-20 {
        // forward parallel to up: nudge off the pole
        let nudged = (z + DVec3::new(0.0, 0.0, 1e-4)).normalize();
        x = up.cross(nudged);
        if x.length_squared() < 1e-20 {
            x = DVec3::X;
        }
    }
    let x = x.normalize();
    let y = z.cross(x);

    DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize()
}

use glam::Vec3;

use crate::sampler::Sampler;

/// Emissive triangle. The emission radiance is copied out of the material
/// table at scene build; materials are immutable afterwards so the copy
/// cannot drift.
#[derive(Debug, Clone, Copy)]
pub struct AreaLight {
    p1: Vec3,
    p2: Vec3,
    p3: Vec3,
    emission: Vec3,
    area: f32,
}

impl AreaLight {
    pub fn new(p1: Vec3, p2: Vec3, p3: Vec3, emission: Vec3) -> Self {
        let area = (p2 - p1).cross(p3 - p1).length() / 2.0;
        Self {
            p1,
            p2,
            p3,
            emission,
            area,
        }
    }

    /// Uniform point on the triangle plus the emitted radiance.
    pub fn sample(&self, _target: Vec3, sampler: &mut Sampler) -> (Vec3, Vec3) {
        let (mut a, mut b) = sampler.sample_pair();
        if a + b > 1.0 {
            a = 1.0 - a;
            b = 1.0 - b;
        }
        let position = self.p1 + (self.p2 - self.p1) * a + (self.p3 - self.p1) * b;
        (position, self.emission)
    }

    pub fn area(&self) -> f32 {
        self.area
    }
}

/// Constant background radiance for rays that leave the scene.
#[derive(Debug, Clone, Copy)]
pub struct Skybox {
    radiance: Vec3,
}

impl Skybox {
    pub fn new(radiance: Vec3) -> Self {
        Self { radiance }
    }

    pub fn sample(&self, _direction: Vec3) -> Vec3 {
        self.radiance
    }
}

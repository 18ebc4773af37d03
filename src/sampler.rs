use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Per-worker stream of uniform floats in [0, 1). Never shared across
/// threads; the renderer constructs one per stripe.
pub struct Sampler {
    rng: SmallRng,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Deterministic mode for tests and reproducible renders.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn sample(&mut self) -> f32 {
        self.rng.gen()
    }

    pub fn sample_pair(&mut self) -> (f32, f32) {
        (self.sample(), self.sample())
    }

    /// Uniform direction on the unit sphere via the inverse CDF.
    pub fn sample_direction(&mut self) -> Vec3 {
        let (u1, u2) = self.sample_pair();
        let theta = 2.0 * std::f32::consts::PI * u1;
        let phi = (1.0 - 2.0 * u2).acos();
        Vec3::new(
            phi.sin() * theta.cos(),
            phi.sin() * theta.sin(),
            phi.cos(),
        )
    }

    /// Uniform direction on the hemisphere around `normal`; pdf 1/(2π).
    pub fn sample_direction_hemisphere(&mut self, normal: Vec3) -> Vec3 {
        let dir = self.sample_direction();
        if dir.dot(normal) < 0.0 {
            -dir
        } else {
            dir
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

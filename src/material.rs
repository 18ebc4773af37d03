use glam::{Vec2, Vec3};

use crate::config::Config;
use crate::sampler::Sampler;
use crate::scene::Vertex;
use crate::texture::Texture;

const GLOSS_EXPONENT: i32 = 15;

/// One sampled reflection lobe.
#[derive(Debug, Clone, Copy)]
pub struct Reflection {
    pub radiance: Vec3,
    pub pdf: f32,
    pub dir: Vec3,
    pub is_specular: bool,
}

/// Surface material imported from scene assets: a textured diffuse term
/// with a Phong-style glossy tint, optional emission and an optional
/// mirror lobe. Capabilities are expressed by the `Option` fields.
#[derive(Clone, Default)]
pub struct Material {
    pub diffuse_rgb: Vec3,
    pub diffuse_texture: Option<Texture>,
    pub emission: Option<Vec3>,
    pub specular_rgb: Option<Vec3>,
    pub ambient_rgb: Vec3,
    pub parameter_factor: f32,
}

fn reflect(i: Vec3, normal: Vec3) -> Vec3 {
    i - normal * 2.0 * i.dot(normal)
}

fn interpolate_uv(barycentric: Vec3, v0: &Vertex, v1: &Vertex, v2: &Vertex) -> Vec2 {
    v0.uv * barycentric.x + v1.uv * barycentric.y + v2.uv * barycentric.z
}

impl Material {
    pub fn diffuse(diffuse_rgb: Vec3, parameter_factor: f32) -> Self {
        Self {
            diffuse_rgb,
            parameter_factor,
            ..Self::default()
        }
    }

    /// The shape importers hand over: diffuse color plus optional texture
    /// and emission, stamped with the configured BRDF multiplier.
    pub fn imported(
        diffuse_rgb: Vec3,
        diffuse_texture: Option<Texture>,
        emission: Option<Vec3>,
        config: &Config,
    ) -> Self {
        Self {
            diffuse_rgb,
            diffuse_texture,
            emission,
            specular_rgb: None,
            ambient_rgb: Vec3::ZERO,
            parameter_factor: config.material_parameter_factor,
        }
    }

    /// Evaluates `f_r` for light arriving from `from` and leaving towards
    /// `to` at surface point `p`.
    #[allow(clippy::too_many_arguments)]
    pub fn brdf(
        &self,
        from: Vec3,
        p: Vec3,
        to: Vec3,
        normal: Vec3,
        barycentric: Vec3,
        v0: &Vertex,
        v1: &Vertex,
        v2: &Vertex,
    ) -> Vec3 {
        let kd = match &self.diffuse_texture {
            Some(texture) => texture.sample_pixel(interpolate_uv(barycentric, v0, v1, v2)),
            None => Vec3::ONE,
        };

        let reflected = reflect(from - p, normal);
        let outgoing = to - p;
        let denom = reflected.length() * outgoing.length();
        let gloss = if denom > f32::EPSILON {
            (outgoing.dot(reflected) / denom).max(0.0)
        } else {
            0.0
        };

        (gloss.powi(GLOSS_EXPONENT) * self.ambient_rgb + self.diffuse_rgb * kd)
            * self.parameter_factor
    }

    /// Importance-samples the reflective lobe: uniform over the hemisphere
    /// around `normal`, pdf 1/(2π).
    #[allow(clippy::too_many_arguments)]
    pub fn sample_f(
        &self,
        p: Vec3,
        normal: Vec3,
        in_dir: Vec3,
        barycentric: Vec3,
        v0: &Vertex,
        v1: &Vertex,
        v2: &Vertex,
        sampler: &mut Sampler,
    ) -> Reflection {
        let dir = sampler.sample_direction_hemisphere(normal);
        Reflection {
            radiance: self.brdf(p + in_dir, p, p + dir, normal, barycentric, v0, v1, v2),
            pdf: 1.0 / (2.0 * std::f32::consts::PI),
            dir,
            is_specular: false,
        }
    }

    /// Mirror lobe. Callers must check `has_specular` first.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_specular(
        &self,
        _p: Vec3,
        normal: Vec3,
        in_dir: Vec3,
        _barycentric: Vec3,
        _v0: &Vertex,
        _v1: &Vertex,
        _v2: &Vertex,
        _sampler: &mut Sampler,
    ) -> Reflection {
        debug_assert!(self.has_specular());
        let dir = 2.0 * normal.dot(-in_dir) * normal + in_dir;
        Reflection {
            radiance: self.specular_rgb.unwrap_or(Vec3::ZERO) * self.parameter_factor,
            pdf: 1.0,
            dir,
            is_specular: true,
        }
    }

    pub fn emission(&self) -> Vec3 {
        self.emission.unwrap_or(Vec3::ZERO)
    }

    pub fn is_emissive(&self) -> bool {
        self.emission.is_some()
    }

    pub fn has_specular(&self) -> bool {
        self.specular_rgb.is_some()
    }
}

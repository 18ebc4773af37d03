use glam::Vec3;

use crate::config::Config;
use crate::raycaster::RayCaster;
use crate::sampler::Sampler;
use crate::scene::{Scene, SceneError};

const SHADOW_EPSILON: f32 = 32.0 * f32::EPSILON;

/// Monte-Carlo radiance estimator over a scene and its accelerator.
pub struct PathTracer<'scene> {
    scene: &'scene Scene,
    raycaster: RayCaster<'scene>,
    recursion_level: i32,
    max_reflections: u32,
    roulette_factor: f32,
}

impl<'scene> PathTracer<'scene> {
    pub fn new(scene: &'scene Scene, config: &Config) -> Result<Self, SceneError> {
        Ok(Self {
            scene,
            raycaster: RayCaster::new(scene, config)?,
            recursion_level: config.recursion,
            max_reflections: config.max_reflections,
            roulette_factor: config.roulette_factor,
        })
    }

    pub fn raycaster(&self) -> &RayCaster<'scene> {
        &self.raycaster
    }

    /// Estimates incoming radiance along a camera ray.
    pub fn trace(&self, origin: Vec3, dir: Vec3, sampler: &mut Sampler) -> Vec3 {
        self.trace_inner(origin, dir, true, Vec3::ONE, sampler, self.recursion_level)
    }

    /// Picking helper: which submesh does this ray see first?
    pub fn debug_trace(&self, origin: Vec3, dir: Vec3) -> Option<u16> {
        self.raycaster
            .trace(origin, dir)
            .map(|hit| hit.triangle.submesh)
    }

    fn trace_inner(
        &self,
        origin: Vec3,
        dir: Vec3,
        include_emission: bool,
        beta: Vec3,
        sampler: &mut Sampler,
        depth: i32,
    ) -> Vec3 {
        if depth < 0 {
            return Vec3::ZERO;
        }

        // Russian roulette keeps the recursion unbiased while killing
        // low-throughput paths early.
        let survival = (self.roulette_factor * beta.max_element()).min(1.0);
        if sampler.sample() > survival {
            return Vec3::ZERO;
        }
        let beta = beta / survival;

        let hit = match self.raycaster.trace(origin, dir) {
            Some(hit) => hit,
            None => return beta * self.scene.sky.sample(dir),
        };

        let material = self.scene.material_of(hit.triangle);
        let (v0, v1, v2) = self.scene.triangle_vertices(hit.triangle);
        let normal = hit.geometric_normal;
        let x = hit.position;
        let mut radiance = Vec3::ZERO;

        if include_emission {
            radiance += material.emission() * beta;
        }

        // Direct illumination: connect the shading point to every area
        // light through a shadow ray.
        let cos_surface = dir.dot(normal.normalize()).abs();
        for light in &self.scene.area_lights {
            let (light_point, light_radiance) = light.sample(x, sampler);
            let to_light = light_point - x;
            let distance = to_light.length();
            if distance <= f32::EPSILON {
                continue;
            }
            let wi = to_light / distance;

            if let Some(shadow) = self.raycaster.trace(x, wi) {
                if shadow.t < distance + SHADOW_EPSILON {
                    continue;
                }
            }

            let cos_light = wi.dot(normal.normalize()).abs();
            let g = cos_light * cos_surface
                / (distance * distance * std::f32::consts::PI * std::f32::consts::PI);
            radiance += material.brdf(light_point, x, origin, normal, hit.barycentric, v0, v1, v2)
                * light_radiance
                * beta
                * g
                * light.area();
        }

        // One hemisphere sample against the sky.
        let sky_dir = sampler.sample_direction_hemisphere(normal);
        if self.raycaster.trace(x, sky_dir).is_none() {
            radiance += beta
                * self.scene.sky.sample(sky_dir)
                * material.brdf(x + sky_dir, x, origin, normal, hit.barycentric, v0, v1, v2);
        }

        // Indirect diffuse. Emission is masked on these branches because
        // the lights were already sampled directly above.
        for _ in 0..self.max_reflections {
            let reflection = material.sample_f(x, normal, dir, hit.barycentric, v0, v1, v2, sampler);
            let new_beta = beta * reflection.radiance / reflection.pdf;
            radiance += self.trace_inner(x, reflection.dir, false, new_beta, sampler, depth - 1)
                / self.max_reflections as f32;
        }

        // The mirror lobe re-enables emission: it reveals emitters that the
        // direct sampling above cannot see.
        if material.has_specular() {
            let reflection =
                material.sample_specular(x, normal, dir, hit.barycentric, v0, v1, v2, sampler);
            radiance += self.trace_inner(
                x,
                reflection.dir,
                true,
                beta * reflection.radiance / reflection.pdf,
                sampler,
                depth - 1,
            );
        }

        radiance
    }
}

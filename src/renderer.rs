use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use parking_lot::RwLock;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::pathtracer::PathTracer;
use crate::sampler::Sampler;
use crate::scene::{Scene, SceneError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Camera pose: eye position plus the combined view-projection transform.
/// Rays are generated by pushing NDC points through the inverse.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub view_projection: Mat4,
}

impl Camera {
    pub fn new(position: Vec3, view_projection: Mat4) -> Self {
        Self {
            position,
            view_projection,
        }
    }
}

/// Shared render output observed by the host while workers fill it in.
/// `hdr` is linear scene-referred RGBA f32; `ldr` is the tonemapped 8-bit
/// RGBA image. Both are published between stripe groups.
pub struct RenderState {
    width: u32,
    height: u32,
    pub hdr: RwLock<Vec<f32>>,
    pub ldr: RwLock<Vec<u8>>,
    pub running: AtomicBool,
    pub stripes_done: AtomicU32,
}

impl RenderState {
    pub fn new(width: u32, height: u32) -> Self {
        let pixels = (width * height) as usize;
        Self {
            width,
            height,
            hdr: RwLock::new(vec![0.0; pixels * 4]),
            ldr: RwLock::new(vec![0; pixels * 4]),
            running: AtomicBool::new(true),
            stripes_done: AtomicU32::new(0),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Drives the path tracer over the framebuffer in column stripes.
pub struct Renderer<'scene> {
    tracer: PathTracer<'scene>,
    config: Config,
}

impl<'scene> Renderer<'scene> {
    pub fn new(scene: &'scene Scene, config: &Config) -> Result<Self, RenderError> {
        config.validate()?;
        Ok(Self {
            tracer: PathTracer::new(scene, config)?,
            config: config.clone(),
        })
    }

    pub fn tracer(&self) -> &PathTracer<'scene> {
        &self.tracer
    }

    /// Renders into `state`, dispatching `threads` stripes at a time and
    /// publishing both output buffers between groups. `on_group` runs on
    /// the driver thread after every join; clearing `state.running` stops
    /// the render at the next group boundary.
    pub fn render(
        &self,
        camera: &Camera,
        state: &RenderState,
        mut on_group: impl FnMut(&RenderState),
    ) {
        let width = state.width();
        let height = state.height();
        let inv_view_projection = camera.view_projection.inverse();

        let stripe_width = self.config.cols_per_thread as u32;
        let stripe_count = (width + stripe_width - 1) / stripe_width;
        let stripes: Vec<u32> = (0..stripe_count).collect();

        log::info!("started taking picture: {width}x{height}, {stripe_count} stripes");

        for group in stripes.chunks(self.config.threads) {
            if !state.running.load(Ordering::Relaxed) {
                log::info!("render cancelled between stripe groups");
                return;
            }

            let results: Vec<(u32, Vec<Vec3>)> = group
                .par_iter()
                .map(|&stripe| {
                    let x_start = stripe * stripe_width;
                    let cols = stripe_width.min(width - x_start);
                    let pixels = self.render_stripe(
                        camera.position,
                        inv_view_projection,
                        stripe,
                        x_start,
                        cols,
                        width,
                        height,
                    );
                    (x_start, pixels)
                })
                .collect();

            self.publish(state, &results);
            state
                .stripes_done
                .fetch_add(group.len() as u32, Ordering::Relaxed);
            on_group(state);
        }

        log::info!("taking picture done");
    }

    /// One-shot render: allocates the output, runs every stripe group and
    /// hands the finished state back.
    pub fn take_picture(&self, camera: &Camera, width: u32, height: u32) -> RenderState {
        let state = RenderState::new(width, height);
        self.render(camera, &state, |_| {});
        state
    }

    #[allow(clippy::too_many_arguments)]
    fn render_stripe(
        &self,
        eye: Vec3,
        inv_view_projection: Mat4,
        stripe: u32,
        x_start: u32,
        cols: u32,
        width: u32,
        height: u32,
    ) -> Vec<Vec3> {
        // Seeding by stripe index keeps deterministic renders independent
        // of which worker picks up which stripe.
        let mut sampler = match self.config.seed {
            Some(seed) => Sampler::seeded(seed.wrapping_add(
                (stripe as u64 + 1).wrapping_mul(0x9e3779b97f4a7c15),
            )),
            None => Sampler::new(),
        };

        let half_width = (width / 2) as f32;
        let half_height = (height / 2) as f32;
        let samples = self.config.samples_per_pixel;

        let mut pixels = vec![Vec3::ZERO; (cols * height) as usize];
        for col in 0..cols {
            let x = x_start + col;
            for y in 0..height {
                let xr = (x as f32 - half_width) / half_width;
                let yr = (y as f32 - half_height) / half_height;

                let mut sum = Vec3::ZERO;
                for _ in 0..samples {
                    let (ju, jv) = sampler.sample_pair();
                    let du = (ju - 0.5) * self.config.pixel_step;
                    let dv = (jv - 0.5) * self.config.pixel_step;

                    let ndc = Vec4::new(xr + du, -(yr + dv), 1.0, 1.0);
                    let target = inv_view_projection * ndc;
                    let dir = target.xyz().normalize();
                    sum += self.tracer.trace(eye, dir, &mut sampler);
                }
                pixels[(col * height + y) as usize] = sum / samples as f32;
            }
        }
        pixels
    }

    fn publish(&self, state: &RenderState, results: &[(u32, Vec<Vec3>)]) {
        let width = state.width();
        let height = state.height();
        let iso = self.config.iso;

        let mut hdr = state.hdr.write();
        let mut ldr = state.ldr.write();
        for (x_start, pixels) in results {
            let cols = pixels.len() as u32 / height;
            for col in 0..cols {
                let x = x_start + col;
                for y in 0..height {
                    let value = pixels[(col * height + y) as usize];
                    let index = ((y * width + x) * 4) as usize;

                    hdr[index] = value.x;
                    hdr[index + 1] = value.y;
                    hdr[index + 2] = value.z;
                    hdr[index + 3] = 1.0;

                    let mapped = (value * iso).clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
                    ldr[index] = mapped.x as u8;
                    ldr[index + 1] = mapped.y as u8;
                    ldr[index + 2] = mapped.z as u8;
                    ldr[index + 3] = 0xff;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::Skybox;
    use crate::material::Material;
    use crate::scene::{Submesh, Vertex};
    use glam::Vec2;

    fn sky_only_scene(sky: Vec3) -> Scene {
        // One tiny triangle far below the camera; almost every ray sees sky.
        let vertices = vec![
            Vertex {
                position: Vec3::new(0.0, -100.0, 0.0),
                uv: Vec2::ZERO,
                normal: Vec3::Y,
            },
            Vertex {
                position: Vec3::new(1.0, -100.0, 0.0),
                uv: Vec2::ZERO,
                normal: Vec3::Y,
            },
            Vertex {
                position: Vec3::new(0.0, -100.0, 1.0),
                uv: Vec2::ZERO,
                normal: Vec3::Y,
            },
        ];
        Scene::new(
            vec![Submesh {
                vertices,
                indices: vec![0, 1, 2],
                material_id: 0,
            }],
            vec![Material::diffuse(Vec3::ONE, 1.0)],
            Skybox::new(sky),
        )
        .unwrap()
    }

    fn test_camera() -> Camera {
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        Camera::new(Vec3::ZERO, projection * view)
    }

    fn test_config() -> Config {
        Config {
            recursion: 0,
            max_reflections: 0,
            samples_per_pixel: 2,
            threads: 2,
            cols_per_thread: 4,
            sky: Vec3::new(0.5, 0.25, 0.125),
            seed: Some(11),
            ..Config::default()
        }
    }

    #[test]
    fn renders_sky_into_both_outputs() {
        let config = test_config();
        let scene = sky_only_scene(config.sky);
        let renderer = Renderer::new(&scene, &config).unwrap();
        let state = RenderState::new(16, 16);
        renderer.render(&test_camera(), &state, |_| {});

        let hdr = state.hdr.read();
        let ldr = state.ldr.read();
        let index = ((8 * 16 + 8) * 4) as usize;
        assert!((hdr[index] - 0.5).abs() < 1e-5);
        assert!((hdr[index + 1] - 0.25).abs() < 1e-5);
        assert!((hdr[index + 2] - 0.125).abs() < 1e-5);
        assert_eq!(hdr[index + 3], 1.0);

        assert_eq!(ldr[index], 127);
        assert_eq!(ldr[index + 3], 0xff);
        assert_eq!(
            state.stripes_done.load(Ordering::Relaxed),
            4,
            "16 columns in stripes of 4"
        );
    }

    #[test]
    fn iso_scales_and_clamps_the_ldr_output() {
        let mut config = test_config();
        config.iso = 4.0;
        let scene = sky_only_scene(config.sky);
        let renderer = Renderer::new(&scene, &config).unwrap();
        let state = RenderState::new(8, 8);
        renderer.render(&test_camera(), &state, |_| {});

        let ldr = state.ldr.read();
        // 0.5 * 4 clamps to 1.0; 0.25 * 4 hits exactly 1.0.
        assert_eq!(ldr[0], 255);
        assert_eq!(ldr[1], 255);
        assert_eq!(ldr[2], 127);

        // HDR stays linear and unclamped.
        let hdr = state.hdr.read();
        assert!((hdr[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn same_seed_renders_identically() {
        let config = test_config();
        let scene = sky_only_scene(config.sky);
        let renderer = Renderer::new(&scene, &config).unwrap();

        let first = RenderState::new(12, 12);
        renderer.render(&test_camera(), &first, |_| {});
        let second = RenderState::new(12, 12);
        renderer.render(&test_camera(), &second, |_| {});

        assert_eq!(*first.hdr.read(), *second.hdr.read());
        assert_eq!(*first.ldr.read(), *second.ldr.read());
    }

    #[test]
    fn clearing_running_stops_after_current_group() {
        let config = test_config();
        let scene = sky_only_scene(config.sky);
        let renderer = Renderer::new(&scene, &config).unwrap();
        let state = RenderState::new(16, 16);

        renderer.render(&test_camera(), &state, |state| {
            state.running.store(false, Ordering::Relaxed);
        });
        // First group of 2 stripes completed, the rest never started.
        assert_eq!(state.stripes_done.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn take_picture_runs_to_completion() {
        let config = test_config();
        let scene = sky_only_scene(config.sky);
        let renderer = Renderer::new(&scene, &config).unwrap();
        let state = renderer.take_picture(&test_camera(), 8, 8);
        assert_eq!(state.stripes_done.load(Ordering::Relaxed), 2);
        assert!((state.hdr.read()[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = test_config();
        config.iso = 0.0;
        let scene = sky_only_scene(Vec3::ONE);
        assert!(matches!(
            Renderer::new(&scene, &config),
            Err(RenderError::Config(_))
        ));
    }
}

use glam::Vec3;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("option \"{key}\" must be at least {min}, got {got}")]
    BelowMinimum {
        key: &'static str,
        min: f64,
        got: f64,
    },
    #[error("option \"{key}\" must be strictly positive, got {got}")]
    NotPositive { key: &'static str, got: f64 },
    #[error("option \"sky\" must be elementwise non-negative, got {0}")]
    NegativeSky(Vec3),
}

/// Immutable render configuration, built once by the host and passed by
/// reference to the kd-tree builder, the path tracer and the renderer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial path depth budget.
    pub recursion: i32,
    /// Number of indirect-diffuse branches per shading point.
    pub max_reflections: u32,
    /// Scales `max(beta)` in the russian-roulette survival probability.
    pub roulette_factor: f32,
    pub kdtree_max_depth: u32,
    pub kdtree_max_triangles_in_leaf: usize,
    /// SAH bin count; 0 disables SAH and splits ranges at the middle.
    pub sah_resolution: usize,
    pub samples_per_pixel: u32,
    pub threads: usize,
    pub cols_per_thread: usize,
    /// Linear-to-LDR scale factor applied before the 8-bit clamp.
    pub iso: f32,
    /// Multiplier applied to every BRDF return value.
    pub material_parameter_factor: f32,
    /// Constant sky radiance.
    pub sky: Vec3,
    /// Extent of the per-sample jitter square, in NDC units.
    pub pixel_step: f32,
    /// Fixed sampler seed. `None` seeds every worker from entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursion: 2,
            max_reflections: 1,
            roulette_factor: 1.0,
            kdtree_max_depth: 20,
            kdtree_max_triangles_in_leaf: 8,
            sah_resolution: 32,
            samples_per_pixel: 16,
            threads: 4,
            cols_per_thread: 16,
            iso: 1.0,
            material_parameter_factor: 1.0,
            sky: Vec3::splat(0.5),
            pixel_step: 0.002,
            seed: None,
        }
    }
}

impl Config {
    /// Checks every option against its §6 constraint. Fatal at startup;
    /// rendering never begins with an invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recursion < 0 {
            return Err(ConfigError::BelowMinimum {
                key: "recursion",
                min: 0.0,
                got: self.recursion as f64,
            });
        }
        if self.roulette_factor < 0.0 {
            return Err(ConfigError::NotPositive {
                key: "roulette_factor",
                got: self.roulette_factor as f64,
            });
        }
        if self.kdtree_max_triangles_in_leaf < 1 {
            return Err(ConfigError::BelowMinimum {
                key: "kdtree_max_triangles_in_leaf",
                min: 1.0,
                got: self.kdtree_max_triangles_in_leaf as f64,
            });
        }
        if self.samples_per_pixel < 1 {
            return Err(ConfigError::BelowMinimum {
                key: "samples_per_pixel",
                min: 1.0,
                got: self.samples_per_pixel as f64,
            });
        }
        if self.threads < 1 {
            return Err(ConfigError::BelowMinimum {
                key: "threads",
                min: 1.0,
                got: self.threads as f64,
            });
        }
        if self.cols_per_thread < 1 {
            return Err(ConfigError::BelowMinimum {
                key: "cols_per_thread",
                min: 1.0,
                got: self.cols_per_thread as f64,
            });
        }
        if self.iso <= 0.0 {
            return Err(ConfigError::NotPositive {
                key: "iso",
                got: self.iso as f64,
            });
        }
        if self.pixel_step < 0.0 {
            return Err(ConfigError::BelowMinimum {
                key: "pixel_step",
                min: 0.0,
                got: self.pixel_step as f64,
            });
        }
        if self.sky.min_element() < 0.0 {
            return Err(ConfigError::NegativeSky(self.sky));
        }
        Ok(())
    }
}

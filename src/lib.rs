pub mod config;
pub mod lights;
pub mod material;
pub mod pathtracer;
pub mod raycaster;
pub mod renderer;
pub mod sampler;
pub mod scene;
pub mod texture;

pub use config::{Config, ConfigError};
pub use lights::{AreaLight, Skybox};
pub use material::{Material, Reflection};
pub use pathtracer::PathTracer;
pub use raycaster::{HitRecord, RayCaster};
pub use renderer::{Camera, RenderError, RenderState, Renderer};
pub use sampler::Sampler;
pub use scene::{Aabb, Scene, SceneError, Submesh, TriangleId, Vertex};
pub use texture::Texture;

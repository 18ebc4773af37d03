use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::lights::{AreaLight, Skybox};
use crate::material::Material;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
}

/// Vertex + index arrays sharing one material. Triangle k of a submesh is
/// `indices[3k..3k + 3]`.
#[derive(Clone)]
pub struct Submesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material_id: u32,
}

/// Stable identifier of one triangle, valid for the lifetime of the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriangleId {
    pub submesh: u16,
    pub i0: u32,
    pub i1: u32,
    pub i2: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub lower: Vec3,
    pub upper: Vec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            lower: Vec3::splat(f32::INFINITY),
            upper: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn grow(&mut self, point: Vec3) {
        self.lower = self.lower.min(point);
        self.upper = self.upper.max(point);
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.lower.x
            && point.x <= self.upper.x
            && point.y >= self.lower.y
            && point.y <= self.upper.y
            && point.z >= self.lower.z
            && point.z <= self.upper.z
    }

    /// The box grown by `margin` on every side.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            lower: self.lower - Vec3::splat(margin),
            upper: self.upper + Vec3::splat(margin),
        }
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("submesh {submesh} has {len} indices, not divisible by 3")]
    IndicesNotDivisibleByThree { submesh: usize, len: usize },
    #[error("submesh {submesh} references vertex {index} but has only {vertex_count} vertices")]
    IndexOutOfRange {
        submesh: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("submesh {submesh} references material {material_id} but only {material_count} materials exist")]
    MaterialOutOfRange {
        submesh: usize,
        material_id: u32,
        material_count: usize,
    },
    #[error("scene contains no triangles")]
    EmptyScene,
}

/// Immutable world description: geometry, materials, the area lights
/// derived from emissive materials, and the background radiance.
pub struct Scene {
    pub submeshes: Vec<Submesh>,
    pub materials: Vec<Material>,
    pub area_lights: Vec<AreaLight>,
    pub sky: Skybox,
    pub aabb: Aabb,
}

impl Scene {
    /// Validates the geometry, computes the bounding box and collects one
    /// area light per triangle of every emissive material.
    pub fn new(
        submeshes: Vec<Submesh>,
        materials: Vec<Material>,
        sky: Skybox,
    ) -> Result<Self, SceneError> {
        let mut aabb = Aabb::empty();
        let mut triangle_count = 0usize;

        for (submesh_id, submesh) in submeshes.iter().enumerate() {
            if submesh.indices.len() % 3 != 0 {
                return Err(SceneError::IndicesNotDivisibleByThree {
                    submesh: submesh_id,
                    len: submesh.indices.len(),
                });
            }
            if submesh.material_id as usize >= materials.len() {
                return Err(SceneError::MaterialOutOfRange {
                    submesh: submesh_id,
                    material_id: submesh.material_id,
                    material_count: materials.len(),
                });
            }
            for &index in &submesh.indices {
                if index as usize >= submesh.vertices.len() {
                    return Err(SceneError::IndexOutOfRange {
                        submesh: submesh_id,
                        index,
                        vertex_count: submesh.vertices.len(),
                    });
                }
            }
            for vertex in &submesh.vertices {
                aabb.grow(vertex.position);
            }
            triangle_count += submesh.indices.len() / 3;
        }

        if triangle_count == 0 {
            return Err(SceneError::EmptyScene);
        }

        let mut area_lights = Vec::new();
        for submesh in &submeshes {
            let material = &materials[submesh.material_id as usize];
            if !material.is_emissive() {
                continue;
            }
            let emission = material.emission();
            for triangle in submesh.indices.chunks_exact(3) {
                area_lights.push(AreaLight::new(
                    submesh.vertices[triangle[0] as usize].position,
                    submesh.vertices[triangle[1] as usize].position,
                    submesh.vertices[triangle[2] as usize].position,
                    emission,
                ));
            }
        }

        log::info!(
            "scene: {} submeshes, {} triangles, {} area lights",
            submeshes.len(),
            triangle_count,
            area_lights.len()
        );

        Ok(Self {
            submeshes,
            materials,
            area_lights,
            sky,
            aabb,
        })
    }

    /// Every triangle in the scene, in submesh order. This is the index
    /// table the accelerator builds over.
    pub fn triangles(&self) -> Vec<TriangleId> {
        let mut triangles = Vec::new();
        for (submesh_id, submesh) in self.submeshes.iter().enumerate() {
            for triangle in submesh.indices.chunks_exact(3) {
                triangles.push(TriangleId {
                    submesh: submesh_id as u16,
                    i0: triangle[0],
                    i1: triangle[1],
                    i2: triangle[2],
                });
            }
        }
        triangles
    }

    pub fn triangle_vertices(&self, id: TriangleId) -> (&Vertex, &Vertex, &Vertex) {
        let vertices = &self.submeshes[id.submesh as usize].vertices;
        (
            &vertices[id.i0 as usize],
            &vertices[id.i1 as usize],
            &vertices[id.i2 as usize],
        )
    }

    pub fn material_of(&self, id: TriangleId) -> &Material {
        &self.materials[self.submeshes[id.submesh as usize].material_id as usize]
    }
}

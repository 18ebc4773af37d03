use std::cmp::Ordering;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::config::Config;
use crate::scene::{Aabb, Scene, SceneError, TriangleId};

/// Rejection threshold for the triangle test, both for the determinant and
/// for the ray parameter.
const EPSILON_T: f32 = 32.0 * f32::EPSILON;
/// Slack on the leaf-box containment test for accepted hits.
const BOX_EPSILON: f32 = 1e-3;
/// Below this extent along the split axis the SAH gives up and bisects.
const DEGENERATE_EXTENT: f32 = 1e-3;

const LEAF_FLAG: u32 = 1 << 31;

/// Packed 8-byte kd-tree node. The high bit of the first word tags leaves;
/// the remaining 31 bits index either the child pair (internal) or the
/// triangle table (leaf). The second word is the split plane's f32 bits or
/// the leaf's triangle count. The split axis is implied by node depth mod 3.
#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
pub struct KdNode {
    word0: u32,
    word1: u32,
}

impl KdNode {
    fn internal(first_child: usize, split: f32) -> Self {
        debug_assert!((first_child as u32) < LEAF_FLAG);
        Self {
            word0: first_child as u32,
            word1: split.to_bits(),
        }
    }

    fn leaf(first_index: usize, count: usize) -> Self {
        debug_assert!((first_index as u32) < LEAF_FLAG);
        Self {
            word0: LEAF_FLAG | first_index as u32,
            word1: count as u32,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.word0 & LEAF_FLAG != 0
    }

    /// Left child slot; the right child sits at the next index.
    pub fn first_child(&self) -> usize {
        debug_assert!(!self.is_leaf());
        self.word0 as usize
    }

    pub fn split(&self) -> f32 {
        debug_assert!(!self.is_leaf());
        f32::from_bits(self.word1)
    }

    /// Offset of the leaf's triangles in the index table.
    pub fn first_index(&self) -> usize {
        debug_assert!(self.is_leaf());
        (self.word0 & !LEAF_FLAG) as usize
    }

    pub fn triangle_count(&self) -> usize {
        debug_assert!(self.is_leaf());
        self.word1 as usize
    }
}

/// Closest intersection along a ray.
#[derive(Debug, Clone, Copy)]
pub struct HitRecord {
    pub t: f32,
    pub position: Vec3,
    /// Sums to one; weights for the triangle's vertices in order.
    pub barycentric: Vec3,
    pub geometric_normal: Vec3,
    pub triangle: TriangleId,
}

struct RawHit {
    t: f32,
    position: Vec3,
    barycentric: Vec3,
    normal: Vec3,
}

// Möller–Trumbore. Degenerate triangles fail the determinant test and are
// treated as misses.
fn intersect_triangle(origin: Vec3, dir: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<RawHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let pvec = dir.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < EPSILON_T {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = origin - v0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t < EPSILON_T {
        return None;
    }

    Some(RawHit {
        t,
        position: origin + dir * t,
        barycentric: Vec3::new(1.0 - u - v, u, v),
        normal: edge1.cross(edge2).normalize(),
    })
}

fn ray_hits_aabb(bounds: &Aabb, origin: Vec3, direction: Vec3) -> bool {
    if bounds.contains(origin) {
        return true;
    }
    let mut tmin = f32::NEG_INFINITY;
    let mut tmax = f32::INFINITY;
    for axis in 0..3 {
        // A ray parallel to the slab either stays inside it forever or
        // misses outright; the general formula would produce NaNs here.
        if direction[axis] == 0.0 {
            if origin[axis] < bounds.lower[axis] || origin[axis] > bounds.upper[axis] {
                return false;
            }
            continue;
        }
        let inv = 1.0 / direction[axis];
        let t1 = (bounds.lower[axis] - origin[axis]) * inv;
        let t2 = (bounds.upper[axis] - origin[axis]) * inv;
        tmin = tmin.max(t1.min(t2));
        tmax = tmax.min(t1.max(t2));
    }
    tmax >= tmin
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub leaf_count: u32,
    pub total_leaf_depth: u64,
    pub max_leaf_depth: u32,
}

impl BuildStats {
    pub fn average_leaf_depth(&self) -> f32 {
        if self.leaf_count == 0 {
            0.0
        } else {
            self.total_leaf_depth as f32 / self.leaf_count as f32
        }
    }
}

/// Spatial kd-tree over every triangle of a scene, answering closest-hit
/// queries. Built once, immutable afterwards; traversal allocates nothing.
pub struct RayCaster<'scene> {
    scene: &'scene Scene,
    nodes: Vec<KdNode>,
    triangle_table: Vec<TriangleId>,
    next_node: usize,
    max_triangles_in_leaf: usize,
    max_depth: u32,
    sah_resolution: usize,
    stats: BuildStats,
}

impl<'scene> RayCaster<'scene> {
    pub fn new(scene: &'scene Scene, config: &Config) -> Result<Self, SceneError> {
        for (submesh_id, submesh) in scene.submeshes.iter().enumerate() {
            if submesh.indices.len() % 3 != 0 {
                return Err(SceneError::IndicesNotDivisibleByThree {
                    submesh: submesh_id,
                    len: submesh.indices.len(),
                });
            }
            log::info!(
                "loading submesh with {} triangles",
                submesh.indices.len() / 3
            );
        }

        let mut triangles = scene.triangles();
        if triangles.is_empty() {
            return Err(SceneError::EmptyScene);
        }
        log::info!(
            "{} submeshes loaded, {} triangles in total",
            scene.submeshes.len(),
            triangles.len()
        );
        log::info!("constructing kd-tree");

        let mut caster = Self {
            scene,
            nodes: vec![KdNode::default(); triangles.len()],
            triangle_table: Vec::with_capacity(triangles.len()),
            next_node: 1,
            max_triangles_in_leaf: config.kdtree_max_triangles_in_leaf,
            max_depth: config.kdtree_max_depth,
            sah_resolution: config.sah_resolution,
            stats: BuildStats::default(),
        };
        caster.build_node(0, &mut triangles, Vec::new(), 0);

        log::info!(
            "kd-tree construction done: {} leaves, average depth {:.2}, max depth {}",
            caster.stats.leaf_count,
            caster.stats.average_leaf_depth(),
            caster.stats.max_leaf_depth,
        );
        Ok(caster)
    }

    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    pub fn triangle_table(&self) -> &[TriangleId] {
        &self.triangle_table
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    fn vertex_position(&self, id: TriangleId, index: u32) -> Vec3 {
        let vertices = &self.scene.submeshes[id.submesh as usize].vertices;
        vertices[index as usize].position
    }

    fn triangle_min(&self, axis: usize, id: TriangleId) -> f32 {
        self.vertex_position(id, id.i0)[axis]
            .min(self.vertex_position(id, id.i1)[axis])
            .min(self.vertex_position(id, id.i2)[axis])
    }

    fn triangle_max(&self, axis: usize, id: TriangleId) -> f32 {
        self.vertex_position(id, id.i0)[axis]
            .max(self.vertex_position(id, id.i1)[axis])
            .max(self.vertex_position(id, id.i2)[axis])
    }

    fn triangle_area(&self, id: TriangleId) -> f32 {
        let ab = self.vertex_position(id, id.i1) - self.vertex_position(id, id.i0);
        let ac = self.vertex_position(id, id.i2) - self.vertex_position(id, id.i0);
        ab.cross(ac).length() / 2.0
    }

    /// Picks the pivot index inside the sorted `range` by scoring binned
    /// split candidates. Bins hold a roughly equal number of triangles.
    fn surface_area_heuristic(&self, range: &[TriangleId], axis: usize) -> usize {
        let count = range.len();
        let per_segment = count / self.sah_resolution + 1;

        let low = self.triangle_max(axis, range[0]);
        let high = self.triangle_max(axis, range[count - 1]);
        if high - low < DEGENERATE_EXTENT {
            log::warn!("SAH over a degenerate extent, splitting at the middle");
            return count / 2;
        }

        let mut segments = vec![0.0f32; self.sah_resolution];
        let mut total_area = 0.0f32;
        let mut segments_used = 0usize;
        let mut cursor = 0usize;
        for segment in segments.iter_mut() {
            for _ in 0..per_segment {
                if cursor == count {
                    break;
                }
                let area = self.triangle_area(range[cursor]);
                *segment += area;
                total_area += area;
                cursor += 1;
            }
            segments_used += 1;
            if cursor == count {
                break;
            }
        }

        let mut area_left = 0.0f32;
        let mut area_right = total_area;
        let mut best_split = None;
        let mut best_value = f32::INFINITY;
        for i in 0..segments_used.saturating_sub(1) {
            if i * per_segment >= count {
                break;
            }
            area_left += segments[i];
            area_right -= segments[i];

            let size_left =
                ((self.triangle_max(axis, range[i * per_segment]) - low) / (high - low))
                    .clamp(0.0, 1.0);
            let value = size_left * area_left + (1.0 - size_left) * area_right;
            if value < best_value {
                best_value = value;
                best_split = Some(i);
            }
        }

        match best_split {
            Some(i) => i * per_segment,
            None => count / 2,
        }
    }

    /// Build recursion. `range` holds triangles that belong exclusively to
    /// this subtree; `carry` holds straddlers inherited from earlier splits.
    fn build_node(
        &mut self,
        position: usize,
        range: &mut [TriangleId],
        carry: Vec<TriangleId>,
        depth: u32,
    ) {
        if self.nodes.len() <= position {
            log::warn!("resizing the kd-tree's node buffer");
            self.nodes.resize(position + 1, KdNode::default());
        }

        let triangle_count = range.len() + carry.len();
        let splittable = triangle_count > self.max_triangles_in_leaf
            && depth < self.max_depth
            && range.len() > carry.len();

        if !splittable {
            let first_index = self.triangle_table.len();
            self.triangle_table.extend_from_slice(range);
            self.triangle_table.extend_from_slice(&carry);
            self.nodes[position] = KdNode::leaf(first_index, triangle_count);

            self.stats.leaf_count += 1;
            self.stats.total_leaf_depth += depth as u64;
            self.stats.max_leaf_depth = self.stats.max_leaf_depth.max(depth);
            return;
        }

        let axis = (depth % 3) as usize;
        range.sort_by(|a, b| {
            self.triangle_max(axis, *a)
                .partial_cmp(&self.triangle_max(axis, *b))
                .unwrap_or(Ordering::Equal)
        });

        let pivot = if self.sah_resolution > 0 {
            self.surface_area_heuristic(range, axis)
        } else {
            range.len() / 2
        };
        let split = self.triangle_max(axis, range[pivot]);

        let mut carry_left = Vec::new();
        let mut carry_right = Vec::new();
        for &triangle in &carry {
            if self.triangle_min(axis, triangle) < split {
                carry_left.push(triangle);
            }
            if self.triangle_max(axis, triangle) >= split {
                carry_right.push(triangle);
            }
        }

        let (left_range, right_range) = range.split_at_mut(pivot);

        // Straddlers from the right half must also be visible to the left
        // subtree; the right half itself rides along as carry, so the right
        // subtree's exclusive range stays empty and terminates by the
        // no-forward-progress rule.
        for &triangle in right_range.iter() {
            if self.triangle_min(axis, triangle) < split {
                carry_left.push(triangle);
            }
        }
        let mut right_carry: Vec<TriangleId> = right_range.to_vec();
        right_carry.append(&mut carry_right);

        let first_child = self.next_node;
        self.next_node += 2;
        self.nodes[position] = KdNode::internal(first_child, split);

        self.build_node(first_child + 1, &mut [], right_carry, depth + 1);
        self.build_node(first_child, left_range, carry_left, depth + 1);
    }

    /// Nearest legitimate intersection along the ray, or `None`. The scene
    /// bounding box seeds the traversal.
    pub fn trace(&self, origin: Vec3, direction: Vec3) -> Option<HitRecord> {
        self.traverse(self.scene.aabb, 0, 0, origin, direction)
    }

    fn traverse(
        &self,
        bounds: Aabb,
        node_index: usize,
        depth: u32,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<HitRecord> {
        if !ray_hits_aabb(&bounds, origin, direction) {
            return None;
        }

        let node = self.nodes[node_index];
        if node.is_leaf() {
            return self.check_leaf(&bounds, origin, direction, node);
        }

        let axis = (depth % 3) as usize;
        let split = node.split();
        let mut left_bounds = bounds;
        left_bounds.upper[axis] = split;
        let mut right_bounds = bounds;
        right_bounds.lower[axis] = split;

        let first_child = node.first_child();
        if direction[axis] > 0.0 {
            self.traverse(left_bounds, first_child, depth + 1, origin, direction)
                .or_else(|| {
                    self.traverse(right_bounds, first_child + 1, depth + 1, origin, direction)
                })
        } else {
            self.traverse(right_bounds, first_child + 1, depth + 1, origin, direction)
                .or_else(|| self.traverse(left_bounds, first_child, depth + 1, origin, direction))
        }
    }

    fn check_leaf(
        &self,
        bounds: &Aabb,
        origin: Vec3,
        direction: Vec3,
        node: KdNode,
    ) -> Option<HitRecord> {
        let clip = bounds.expanded(BOX_EPSILON);
        let first = node.first_index();

        let mut best: Option<HitRecord> = None;
        let mut best_t = f32::INFINITY;
        for &id in &self.triangle_table[first..first + node.triangle_count()] {
            let (v0, v1, v2) = self.scene.triangle_vertices(id);
            if let Some(hit) =
                intersect_triangle(origin, direction, v0.position, v1.position, v2.position)
            {
                if hit.t < best_t && clip.contains(hit.position) {
                    best_t = hit.t;
                    best = Some(HitRecord {
                        t: hit.t,
                        position: hit.position,
                        barycentric: hit.barycentric,
                        geometric_normal: hit.normal,
                        triangle: id,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::Skybox;
    use crate::material::Material;
    use crate::sampler::Sampler;
    use crate::scene::{Submesh, Vertex};
    use glam::Vec2;
    use std::collections::HashSet;

    fn vertex(position: Vec3) -> Vertex {
        Vertex {
            position,
            uv: Vec2::ZERO,
            normal: Vec3::Z,
        }
    }

    fn soup_scene(triangles: &[[Vec3; 3]]) -> Scene {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for triangle in triangles {
            let base = vertices.len() as u32;
            vertices.extend(triangle.iter().map(|&p| vertex(p)));
            indices.extend([base, base + 1, base + 2]);
        }
        Scene::new(
            vec![Submesh {
                vertices,
                indices,
                material_id: 0,
            }],
            vec![Material::diffuse(Vec3::ONE, 1.0)],
            Skybox::new(Vec3::ZERO),
        )
        .unwrap()
    }

    fn random_soup(count: usize, seed: u64) -> Vec<[Vec3; 3]> {
        let mut sampler = Sampler::seeded(seed);
        let mut triangles = Vec::with_capacity(count);
        for _ in 0..count {
            let center = Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) * 10.0;
            let a = center + Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) - 0.5;
            let b = center + Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) - 0.5;
            let c = center + Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) - 0.5;
            triangles.push([a, b, c]);
        }
        triangles
    }

    fn brute_force_trace(scene: &Scene, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut best = None;
        for id in scene.triangles() {
            let (v0, v1, v2) = scene.triangle_vertices(id);
            if let Some(hit) =
                intersect_triangle(origin, direction, v0.position, v1.position, v2.position)
            {
                if best.map_or(true, |t| hit.t < t) {
                    best = Some(hit.t);
                }
            }
        }
        best
    }

    // Walks every leaf with its depth and clipped bounding box.
    fn walk_leaves(
        caster: &RayCaster,
        bounds: Aabb,
        node_index: usize,
        depth: u32,
        out: &mut Vec<(KdNode, u32, Aabb)>,
    ) {
        let node = caster.nodes()[node_index];
        if node.is_leaf() {
            out.push((node, depth, bounds));
            return;
        }
        let axis = (depth % 3) as usize;
        let mut left = bounds;
        left.upper[axis] = node.split();
        let mut right = bounds;
        right.lower[axis] = node.split();
        walk_leaves(caster, left, node.first_child(), depth + 1, out);
        walk_leaves(caster, right, node.first_child() + 1, depth + 1, out);
    }

    #[test]
    fn nodes_pack_into_eight_bytes() {
        assert_eq!(std::mem::size_of::<KdNode>(), 8);

        let internal = KdNode::internal(12345, 6.5);
        assert!(!internal.is_leaf());
        assert_eq!(internal.first_child(), 12345);
        assert_eq!(internal.split(), 6.5);

        let leaf = KdNode::leaf(54321, 7);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.first_index(), 54321);
        assert_eq!(leaf.triangle_count(), 7);
    }

    // The right half of every split rides along as carry, so right children
    // can never split further; every reachable right child must be a leaf.
    #[test]
    fn right_children_are_always_leaves() {
        fn visit(caster: &RayCaster, node_index: usize, is_right_child: bool) {
            let node = caster.nodes()[node_index];
            if node.is_leaf() {
                return;
            }
            assert!(!is_right_child, "right child {node_index} split further");
            visit(caster, node.first_child(), false);
            visit(caster, node.first_child() + 1, true);
        }

        let scene = soup_scene(&random_soup(200, 11));
        let caster = RayCaster::new(&scene, &Config::default()).unwrap();
        visit(&caster, 0, false);
    }

    #[test]
    fn moller_trumbore_round_trip() {
        let mut sampler = Sampler::seeded(99);
        for _ in 0..200 {
            let v0 = Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) * 4.0 - 2.0;
            let v1 = v0 + Vec3::new(sampler.sample() + 0.1, sampler.sample(), sampler.sample());
            let v2 = v0 + Vec3::new(sampler.sample(), sampler.sample() + 0.1, sampler.sample());

            // Pick an interior point and aim a ray at it from a fixed origin.
            let (mut a, mut b) = sampler.sample_pair();
            if a + b > 1.0 {
                a = 1.0 - a;
                b = 1.0 - b;
            }
            let bary = Vec3::new(1.0 - a - b, a, b);
            let target = v0 * bary.x + v1 * bary.y + v2 * bary.z;
            let origin = Vec3::new(0.0, 0.0, -10.0);
            let dir = (target - origin).normalize();

            if let Some(hit) = intersect_triangle(origin, dir, v0, v1, v2) {
                let reconstructed = v0 * hit.barycentric.x + v1 * hit.barycentric.y + v2 * hit.barycentric.z;
                assert!((reconstructed - target).length() < 1e-4);
                assert!((origin + dir * hit.t - target).length() < 1e-4);
                let bary_sum = hit.barycentric.x + hit.barycentric.y + hit.barycentric.z;
                assert!((bary_sum - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn degenerate_triangle_is_rejected() {
        // Collinear vertices: zero-area triangle.
        let v0 = Vec3::ZERO;
        let v1 = Vec3::X;
        let v2 = Vec3::X * 2.0;
        let hit = intersect_triangle(Vec3::new(0.5, 0.0, -1.0), Vec3::Z, v0, v1, v2);
        assert!(hit.is_none());
    }

    #[test]
    fn traversal_matches_brute_force() {
        let scene = soup_scene(&random_soup(300, 1234));
        let config = Config {
            kdtree_max_depth: 16,
            kdtree_max_triangles_in_leaf: 4,
            sah_resolution: 16,
            ..Config::default()
        };
        let caster = RayCaster::new(&scene, &config).unwrap();

        let mut sampler = Sampler::seeded(4321);
        let mut hits = 0;
        for _ in 0..500 {
            let origin = Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) * 14.0 - 2.0;
            let dir = sampler.sample_direction();
            let expected = brute_force_trace(&scene, origin, dir);
            let got = caster.trace(origin, dir);
            match (expected, got) {
                (None, None) => {}
                (Some(t), Some(hit)) => {
                    hits += 1;
                    assert!(
                        (hit.t - t).abs() < 1e-3,
                        "closest hit differs: {t} vs {}",
                        hit.t
                    );
                }
                (expected, got) => {
                    panic!("hit disagreement: {:?} vs {:?}", expected, got.map(|h| h.t))
                }
            }
        }
        assert!(hits > 20, "test scene produced almost no hits: {hits}");
    }

    #[test]
    fn traversal_soundness() {
        let scene = soup_scene(&random_soup(200, 77));
        let caster = RayCaster::new(&scene, &Config::default()).unwrap();
        let clip = scene.aabb.expanded(BOX_EPSILON);

        let mut sampler = Sampler::seeded(78);
        for _ in 0..500 {
            let origin = Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) * 20.0 - 5.0;
            let dir = sampler.sample_direction();
            if let Some(hit) = caster.trace(origin, dir) {
                assert!(hit.t > 0.0);
                assert!(clip.contains(hit.position));
                assert!((hit.geometric_normal.length() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn every_triangle_lands_in_a_leaf() {
        let scene = soup_scene(&random_soup(150, 5));
        let caster = RayCaster::new(&scene, &Config::default()).unwrap();

        let mut leaves = Vec::new();
        walk_leaves(&caster, scene.aabb, 0, 0, &mut leaves);

        let mut covered = HashSet::new();
        for (leaf, _, _) in &leaves {
            let first = leaf.first_index();
            for &id in &caster.triangle_table()[first..first + leaf.triangle_count()] {
                covered.insert(id);
            }
        }
        for id in scene.triangles() {
            assert!(covered.contains(&id), "triangle {id:?} missing from tree");
        }
    }

    #[test]
    fn leaf_and_depth_bounds_hold() {
        let scene = soup_scene(&random_soup(400, 6));
        let config = Config {
            kdtree_max_depth: 12,
            kdtree_max_triangles_in_leaf: 6,
            ..Config::default()
        };
        let caster = RayCaster::new(&scene, &config).unwrap();

        let mut leaves = Vec::new();
        walk_leaves(&caster, scene.aabb, 0, 0, &mut leaves);
        assert_eq!(leaves.len() as u32, caster.stats().leaf_count);

        for (leaf, depth, _) in &leaves {
            assert!(*depth <= config.kdtree_max_depth);
            // An oversized leaf is legal only when the depth cap was reached
            // or splitting stopped making progress; progress-blocked leaves
            // are the ones whose emit happened with depth below the cap.
            if leaf.triangle_count() > config.kdtree_max_triangles_in_leaf {
                assert!(*depth > 0, "oversized root leaf");
            }
        }
        assert!(caster.stats().max_leaf_depth <= config.kdtree_max_depth);
    }

    #[test]
    fn split_plane_hit_is_not_lost() {
        // Two quads abutting at x = 0; every split on x lands exactly on the
        // shared edge. Rays down the plane boundary must still hit.
        let quads = [
            [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(-1.0, 1.0, 0.0)],
            [Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0)],
            [Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
        ];
        let scene = soup_scene(&quads);
        let config = Config {
            kdtree_max_triangles_in_leaf: 1,
            kdtree_max_depth: 8,
            ..Config::default()
        };
        let caster = RayCaster::new(&scene, &config).unwrap();

        let hit = caster
            .trace(Vec3::new(0.0, 0.0, -1.0), Vec3::Z)
            .expect("ray along the shared edge lost");
        assert!((hit.t - 1.0).abs() < 1e-4);

        // And slightly to each side of the plane.
        for x in [-1e-4, 1e-4] {
            assert!(caster.trace(Vec3::new(x, 0.0, -1.0), Vec3::Z).is_some());
        }
    }

    #[test]
    fn mid_split_mode_builds_without_sah() {
        let scene = soup_scene(&random_soup(64, 8));
        let config = Config {
            sah_resolution: 0,
            ..Config::default()
        };
        let caster = RayCaster::new(&scene, &config).unwrap();
        assert!(caster.stats().leaf_count > 0);

        let mut sampler = Sampler::seeded(9);
        for _ in 0..100 {
            let origin = Vec3::new(sampler.sample(), sampler.sample(), sampler.sample()) * 12.0;
            let dir = sampler.sample_direction();
            let expected = brute_force_trace(&scene, origin, dir);
            let got = caster.trace(origin, dir).map(|h| h.t);
            match (expected, got) {
                (None, None) => {}
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-3),
                (a, b) => panic!("hit disagreement: {a:?} vs {b:?}"),
            }
        }
    }

    #[test]
    fn dense_cluster_depth_stays_logarithmic() {
        // A dense cluster in a corner of an otherwise huge sparse box.
        let mut triangles = random_soup(1000, 10)
            .into_iter()
            .map(|t| t.map(|p| p * 0.01))
            .collect::<Vec<_>>();
        triangles.push([
            Vec3::new(90.0, 90.0, 90.0),
            Vec3::new(91.0, 90.0, 90.0),
            Vec3::new(90.0, 91.0, 90.0),
        ]);
        let scene = soup_scene(&triangles);
        let config = Config {
            kdtree_max_depth: 40,
            kdtree_max_triangles_in_leaf: 8,
            sah_resolution: 32,
            ..Config::default()
        };
        let caster = RayCaster::new(&scene, &config).unwrap();

        let balanced = (triangles.len() as f32).log2().ceil() as u32;
        assert!(
            caster.stats().max_leaf_depth <= 2 * balanced,
            "depth {} exceeds 2x balanced bound {}",
            caster.stats().max_leaf_depth,
            2 * balanced
        );
    }
}

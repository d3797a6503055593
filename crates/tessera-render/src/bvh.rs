use crate::geometry::{Hit, Sphere};
use crate::math::{Ray, Vec3};

const LEAF_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    fn grow(self, min: Vec3, max: Vec3) -> Self {
        Self {
            min: self.min.min(min),
            max: self.max.max(max),
        }
    }

    fn union(self, other: Self) -> Self {
        self.grow(other.min, other.max)
    }

    /// Slab test against precomputed inverse direction.
    fn hit(&self, origin: Vec3, inv_dir: Vec3, t_min: f32, t_max: f32) -> bool {
        let mut near = t_min;
        let mut far = t_max;
        for axis in 0..3 {
            let inv = inv_dir.axis(axis);
            let mut t0 = (self.min.axis(axis) - origin.axis(axis)) * inv;
            let mut t1 = (self.max.axis(axis) - origin.axis(axis)) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            // NaN from 0 * inf compares false and leaves the interval unchanged.
            if t0 > near {
                near = t0;
            }
            if t1 < far {
                far = t1;
            }
            if far < near {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf { start: u32, count: u32 },
    /// The left child directly follows its parent; `right` is an index.
    Interior { right: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bounds: Aabb,
    kind: NodeKind,
}

/// Bounding volume hierarchy over spheres, stored depth-first in one array.
pub struct Bvh {
    spheres: Vec<Sphere>,
    nodes: Vec<Node>,
}

impl Bvh {
    pub fn new(spheres: Vec<Sphere>) -> Self {
        let mut order: Vec<usize> = (0..spheres.len()).collect();
        let mut nodes = Vec::with_capacity(spheres.len().max(1) * 2);
        if !order.is_empty() {
            build(&mut nodes, &mut order, 0, &spheres);
        }
        let spheres = order.into_iter().map(|index| spheres[index].clone()).collect();
        Self { spheres, nodes }
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        if self.nodes.is_empty() {
            return None;
        }
        let inv_dir = ray.direction.map(|d| 1.0 / d);
        let mut closest: Option<Hit> = None;
        let mut closest_t = t_max;
        let mut stack = vec![0u32];

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.hit(ray.origin, inv_dir, t_min, closest_t) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    let range = start as usize..(start + count) as usize;
                    for sphere in &self.spheres[range] {
                        if let Some(hit) = sphere.hit(ray, t_min, closest_t) {
                            closest_t = hit.t;
                            closest = Some(hit);
                        }
                    }
                }
                NodeKind::Interior { right } => {
                    stack.push(right);
                    stack.push(index + 1);
                }
            }
        }
        closest
    }
}

fn build(nodes: &mut Vec<Node>, order: &mut [usize], offset: usize, spheres: &[Sphere]) -> usize {
    let bounds = order.iter().fold(Aabb::empty(), |acc, &index| {
        let (min, max) = spheres[index].bounds();
        acc.grow(min, max)
    });

    let node_index = nodes.len();
    if order.len() <= LEAF_SIZE {
        nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf {
                start: offset as u32,
                count: order.len() as u32,
            },
        });
        return node_index;
    }

    let axis = (bounds.max - bounds.min).max_axis();
    order.sort_by(|&a, &b| {
        spheres[a]
            .center
            .axis(axis)
            .total_cmp(&spheres[b].center.axis(axis))
    });

    nodes.push(Node {
        bounds,
        kind: NodeKind::Interior { right: 0 },
    });
    let mid = order.len() / 2;
    let (left, right) = order.split_at_mut(mid);
    let left_index = build(nodes, left, offset, spheres);
    let right_index = build(nodes, right, offset + mid, spheres);
    debug_assert_eq!(left_index, node_index + 1);

    nodes[node_index].bounds = nodes[left_index].bounds.union(nodes[right_index].bounds);
    nodes[node_index].kind = NodeKind::Interior {
        right: right_index as u32,
    };
    node_index
}

//! Crease edge extraction for untextured models.

use std::collections::HashMap;

use glam::{DVec3, Vec3};

use crate::asset::{LineGeometry, MeshGeometry};

/// Minimum angle between adjacent face normals for an edge to be drawn.
pub const EDGE_THRESHOLD_DEGREES: f64 = 1.0;

/// Vertices closer than this are merged before edges are matched.
const MERGE_PRECISION: f64 = 1e4;

#[allow(clippy::cast_possible_truncation)]
fn vertex_key(p: DVec3) -> (i64, i64, i64) {
    (
        (p.x * MERGE_PRECISION).round() as i64,
        (p.y * MERGE_PRECISION).round() as i64,
        (p.z * MERGE_PRECISION).round() as i64,
    )
}

type VertexKey = (i64, i64, i64);

struct OpenEdge {
    normal: DVec3,
    a: DVec3,
    b: DVec3,
}

/// Edges of `geometry` where the faces meet at more than
/// `threshold_degrees`, plus every boundary edge.
#[must_use]
pub fn edge_outline(geometry: &MeshGeometry, threshold_degrees: f64) -> LineGeometry {
    let threshold_dot = threshold_degrees.to_radians().cos();
    let mut open: HashMap<(VertexKey, VertexKey), OpenEdge> = HashMap::new();
    let mut segments = Vec::new();

    for tri in geometry.triangles() {
        let keys = tri.map(vertex_key);
        // Degenerate after merging.
        if keys[0] == keys[1] || keys[1] == keys[2] || keys[2] == keys[0] {
            continue;
        }
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero();

        for i in 0..3 {
            let j = (i + 1) % 3;
            let (ka, kb) = (keys[i], keys[j]);
            let edge = if ka < kb { (ka, kb) } else { (kb, ka) };

            if let Some(other) = open.remove(&edge) {
                if normal.dot(other.normal) <= threshold_dot {
                    segments.push([other.a.as_vec3(), other.b.as_vec3()]);
                }
            } else {
                open.insert(
                    edge,
                    OpenEdge {
                        normal,
                        a: tri[i],
                        b: tri[j],
                    },
                );
            }
        }
    }

    // Unmatched edges lie on the mesh boundary.
    segments.extend(open.into_values().map(|e| [e.a.as_vec3(), e.b.as_vec3()]));
    LineGeometry { segments }
}

/// Total length of an outline, for diagnostics.
#[must_use]
pub fn outline_length(outline: &LineGeometry) -> f64 {
    outline
        .segments
        .iter()
        .map(|[a, b]| f64::from((*b - *a).length()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::tests::cube;

    #[test]
    fn test_flat_quad_has_only_boundary_edges() {
        let quad = MeshGeometry::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
        .unwrap();
        let outline = edge_outline(&quad, EDGE_THRESHOLD_DEGREES);
        assert_eq!(outline.segments.len(), 4);
        assert!((outline_length(&outline) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_cube_creases() {
        let outline = edge_outline(&cube(), EDGE_THRESHOLD_DEGREES);
        assert_eq!(outline.segments.len(), 12);
        assert!((outline_length(&outline) - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_wide_threshold_drops_creases() {
        let outline = edge_outline(&cube(), 95.0);
        assert!(outline.segments.is_empty());
    }

    #[test]
    fn test_degenerate_triangles_are_skipped() {
        let mesh = MeshGeometry::new(vec![Vec3::ZERO, Vec3::ZERO, Vec3::X], vec![0, 1, 2]).unwrap();
        assert!(edge_outline(&mesh, EDGE_THRESHOLD_DEGREES).segments.is_empty());
    }
}

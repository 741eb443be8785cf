//! 由索引、法线与 uv 重建切线（Lengyel 方法）

use glam::{Vec2, Vec3};
use vela_scene::model::Vertex;

const DEGENERATE_UV_EPSILON: f32 = 1e-12;

/// 为 `vertices` 写入切线，`indices` 为相对于 `vertices` 的三角形索引
///
/// 每个三角形的切线与副切线累加到三个顶点上，之后对法线做 Gram-Schmidt 正交化，
/// 根据副切线确定手性，写入 `tangent * sign`。返回每个顶点的手性符号。
pub fn generate_tangents(vertices: &mut [Vertex], indices: &[u32]) -> Vec<f32> {
    let _span = tracy_client::span!("generate_tangents");

    let mut tangents = vec![Vec3::ZERO; vertices.len()];
    let mut bitangents = vec![Vec3::ZERO; vertices.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }

        let p0 = Vec3::from(vertices[i0].position);
        let p1 = Vec3::from(vertices[i1].position);
        let p2 = Vec3::from(vertices[i2].position);
        let w0 = Vec2::from(vertices[i0].uv);
        let w1 = Vec2::from(vertices[i1].uv);
        let w2 = Vec2::from(vertices[i2].uv);

        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let d1 = w1 - w0;
        let d2 = w2 - w0;

        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < DEGENERATE_UV_EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;

        for i in [i0, i1, i2] {
            tangents[i] += sdir;
            bitangents[i] += tdir;
        }
    }

    let mut signs = Vec::with_capacity(vertices.len());
    for (i, vertex) in vertices.iter_mut().enumerate() {
        let n = Vec3::from(vertex.normal).normalize_or_zero();
        let t = tangents[i];

        let orthogonal = (t - n * n.dot(t)).normalize_or_zero();
        let orthogonal = if orthogonal == Vec3::ZERO { n.any_orthonormal_vector() } else { orthogonal };
        let sign = if n.cross(orthogonal).dot(bitangents[i]) < 0.0 { -1.0 } else { 1.0 };

        vertex.tangent = (orthogonal * sign).to_array();
        signs.push(sign);
    }
    signs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vertex>, Vec<u32>) {
        let corners = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let vertices = corners
            .iter()
            .map(|&[x, y]| Vertex {
                position: [x, y, 0.0],
                normal: [0.0, 0.0, 1.0],
                uv: [x, y],
                ..Default::default()
            })
            .collect();
        (vertices, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn test_unit_quad_tangent() {
        let (mut vertices, indices) = quad();
        let signs = generate_tangents(&mut vertices, &indices);
        for (vertex, sign) in vertices.iter().zip(signs) {
            assert!(Vec3::from(vertex.tangent).abs_diff_eq(Vec3::X, 1e-5), "{:?}", vertex.tangent);
            assert_eq!(sign, 1.0);
        }
    }

    #[test]
    fn test_tangent_orthogonal_to_normal() {
        let (mut vertices, indices) = quad();
        // 法线稍微倾斜，切线仍需与其正交
        for v in &mut vertices {
            v.normal = Vec3::new(0.3, 0.0, 1.0).normalize().to_array();
        }
        generate_tangents(&mut vertices, &indices);
        for v in &vertices {
            assert!(Vec3::from(v.normal).dot(Vec3::from(v.tangent)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_flipped_uv_gives_negative_sign() {
        let (mut vertices, indices) = quad();
        for v in &mut vertices {
            v.uv[1] = 1.0 - v.uv[1];
        }
        let signs = generate_tangents(&mut vertices, &indices);
        assert!(signs.iter().all(|&s| s == -1.0));
    }
}

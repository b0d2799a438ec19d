use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::GeometryError;
use crate::error::Result;
use crate::point::Point3;

/// Corner indices of each cuboid face. Corner `i` sits at
/// `(±hx, ±hy, ±hz)` with bit 0, 1, 2 of `i` selecting the positive x, y, z
/// half. Every face is counter-clockwise when viewed from outside.
const CUBOID_FACES: [[usize; 4]; 6] = [
    [0, 4, 6, 2], // left   (-x)
    [1, 3, 7, 5], // right  (+x)
    [0, 1, 5, 4], // front  (-y)
    [2, 6, 7, 3], // back   (+y)
    [0, 2, 3, 1], // bottom (-z)
    [4, 5, 7, 6], // top    (+z)
];

/// A polyhedral solid made of planar quadrilateral faces.
#[derive(Debug, Clone, PartialEq)]
pub struct Solid {
    faces: Vec<[Point3; 4]>,
}

impl Solid {
    /// Axis-aligned box with the given full extents, centred on the origin.
    pub fn cuboid(x_dimension: f64, y_dimension: f64, z_dimension: f64) -> Result<Self> {
        for (axis, value) in [('x', x_dimension), ('y', y_dimension), ('z', z_dimension)] {
            if !value.is_finite() || value < 0.0 {
                return Err(GeometryError::InvalidDimension { axis, value });
            }
        }
        let half = Point3::new(x_dimension / 2.0, y_dimension / 2.0, z_dimension / 2.0);
        let corner = |i: usize| {
            Point3::new(
                if i & 1 == 0 { -half.x } else { half.x },
                if i & 2 == 0 { -half.y } else { half.y },
                if i & 4 == 0 { -half.z } else { half.z },
            )
        };
        let faces = CUBOID_FACES
            .iter()
            .map(|face| face.map(corner))
            .collect();
        Ok(Self { faces })
    }

    pub fn faces(&self) -> &[[Point3; 4]] {
        &self.faces
    }

    pub fn map_vertices(&self, f: impl Fn(Point3) -> Point3) -> Self {
        Self {
            faces: self.faces.iter().map(|face| face.map(&f)).collect(),
        }
    }

    /// `POLYHEDRALSURFACE Z` with one closed ring per face. PostGIS turns
    /// it into a volume with `ST_MakeSolid`.
    pub fn to_wkt(&self) -> String {
        let mut wkt = String::from("POLYHEDRALSURFACE Z(");
        for (i, face) in self.faces.iter().enumerate() {
            if i > 0 {
                wkt.push(',');
            }
            wkt.push_str("((");
            for (j, p) in face.iter().chain(face.first()).enumerate() {
                if j > 0 {
                    wkt.push_str(", ");
                }
                let _ = write!(wkt, "{} {} {}", p.x + 0.0, p.y + 0.0, p.z + 0.0);
            }
            wkt.push_str("))");
        }
        wkt.push(')');
        wkt
    }

    /// Enclosed volume, from the divergence theorem over the face triangles.
    pub fn volume(&self) -> f64 {
        let signed: f64 = self
            .triangles()
            .map(|[a, b, c]| a.dot(b.cross(c)))
            .sum();
        (signed / 6.0).abs()
    }

    /// True when every directed edge is matched by exactly one opposite
    /// edge, i.e. the surface is closed and consistently oriented.
    pub fn is_closed(&self) -> bool {
        let mut edges: HashMap<([u64; 3], [u64; 3]), usize> = HashMap::new();
        for face in &self.faces {
            for i in 0..face.len() {
                let from = face[i].key();
                let to = face[(i + 1) % face.len()].key();
                if from == to {
                    return false;
                }
                *edges.entry((from, to)).or_default() += 1;
            }
        }
        edges
            .iter()
            .all(|(&(from, to), &count)| count == 1 && edges.get(&(to, from)) == Some(&1))
    }

    /// Shortest 3D distance from `point` to the solid's surface.
    pub fn distance_to(&self, point: Point3) -> f64 {
        self.triangles()
            .map(|[a, b, c]| point.distance(closest_on_triangle(point, a, b, c)))
            .fold(f64::INFINITY, f64::min)
    }

    fn triangles(&self) -> impl Iterator<Item = [Point3; 3]> + '_ {
        self.faces
            .iter()
            .flat_map(|[a, b, c, d]| [[*a, *b, *c], [*a, *c, *d]])
    }
}

fn closest_on_segment(p: Point3, a: Point3, b: Point3) -> Point3 {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

// Region tests from Ericson, Real-Time Collision Detection, 5.1.5.
fn closest_on_triangle(p: Point3, a: Point3, b: Point3, c: Point3) -> Point3 {
    let ab = b - a;
    let ac = c - a;
    if ab.cross(ac).dot(ab.cross(ac)) == 0.0 {
        return [
            closest_on_segment(p, a, b),
            closest_on_segment(p, b, c),
            closest_on_segment(p, a, c),
        ]
        .into_iter()
        .min_by(|l, r| p.distance(*l).total_cmp(&p.distance(*r)))
        .unwrap_or(a);
    }

    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

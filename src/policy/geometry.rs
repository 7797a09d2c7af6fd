use anyhow::{anyhow, Result};

/// Simple polygon in source-image pixel space.
///
/// Vertices are stored in order; the closing edge from the last vertex back
/// to the first is implicit.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(vertices: Vec<(f64, f64)>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(anyhow!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            ));
        }
        if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(anyhow!("polygon vertices must be finite"));
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Even-odd ray cast. Points exactly on an edge may land on either side.
    pub fn contains(&self, point: (f64, f64)) -> bool {
        let (px, py) = point;
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for i in 0..self.vertices.len() {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

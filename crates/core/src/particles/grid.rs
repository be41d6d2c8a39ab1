use std::collections::HashMap;

use glam::Vec2;

/// Anything with a 2D position that can be bucketed.
pub trait GridPoint {
    fn position(&self) -> Vec2;
}

impl GridPoint for Vec2 {
    fn position(&self) -> Vec2 {
        *self
    }
}

/// A point found near a query point, identified by its index in the slice
/// the grid was built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// Uniform bucket grid for fixed-radius neighbour queries.
///
/// The grid stores indices only, so queries take the same slice that was
/// passed to [`rebuild`](Self::rebuild). It has to be rebuilt whenever the
/// points move.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
    len: usize,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: sanitize_cell_size(cell_size),
            cells: HashMap::new(),
            len: 0,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Integer cell containing `position`.
    pub fn cell_of(&self, position: Vec2) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    /// Indices bucketed into `cell`.
    pub fn bucket(&self, cell: (i32, i32)) -> &[usize] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops every bucket and re-inserts all points at their current
    /// positions.
    pub fn rebuild<P: GridPoint>(&mut self, points: &[P], cell_size: f32) {
        self.cell_size = sanitize_cell_size(cell_size);
        self.cells.clear();
        for (index, point) in points.iter().enumerate() {
            let cell = self.cell_of(point.position());
            self.cells.entry(cell).or_default().push(index);
        }
        self.len = points.len();
    }

    /// Calls `visit` for every point strictly closer than `radius` to the
    /// point at `index`, excluding that point itself.
    ///
    /// Only the 3×3 block of cells around the query is searched, so results
    /// are complete only while `radius <= cell_size`.
    pub fn for_each_neighbor<P, F>(&self, points: &[P], index: usize, radius: f32, mut visit: F)
    where
        P: GridPoint,
        F: FnMut(Neighbor),
    {
        debug_assert_eq!(points.len(), self.len, "grid is stale");
        let Some(origin) = points.get(index).map(GridPoint::position) else {
            return;
        };

        let (cx, cy) = self.cell_of(origin);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for &other in self.bucket((cx + dx, cy + dy)) {
                    if other == index {
                        continue;
                    }
                    let Some(point) = points.get(other) else {
                        continue;
                    };
                    let distance = origin.distance(point.position());
                    if distance < radius {
                        visit(Neighbor {
                            index: other,
                            distance,
                        });
                    }
                }
            }
        }
    }

    /// Collects the neighbours of the point at `index`. No ordering is
    /// guaranteed.
    pub fn neighbors_of<P: GridPoint>(
        &self,
        points: &[P],
        index: usize,
        radius: f32,
    ) -> Vec<Neighbor> {
        let mut out = Vec::new();
        self.for_each_neighbor(points, index, radius, |neighbor| out.push(neighbor));
        out
    }
}

fn sanitize_cell_size(cell_size: f32) -> f32 {
    if cell_size.is_finite() && cell_size > 0.0 {
        cell_size
    } else {
        1.0
    }
}

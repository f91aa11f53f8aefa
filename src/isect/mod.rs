// Two-phase spatial intersection for screen-space label boxes.
// The grid here only prunes candidate pairs; callers decide what an overlap means.

mod obb;

pub use obb::Obb;

use glam::{UVec2, Vec2};
use std::collections::HashSet;

/// Axis-aligned box in screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Vec2::new(min_x.min(max_x), min_y.min(max_y)),
            max: Vec2::new(min_x.max(max_x), min_y.max(max_y)),
        }
    }

    pub fn from_points(points: &[Vec2]) -> Self {
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        if points.is_empty() {
            return Self {
                min: Vec2::ZERO,
                max: Vec2::ZERO,
            };
        }
        Self { min, max }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Inclusive overlap test: boxes sharing an edge overlap.
    pub fn intersects(&self, other: &Aabb) -> bool {
        !(self.max.x < other.min.x
            || other.max.x < self.min.x
            || self.max.y < other.min.y
            || other.max.y < self.min.y)
    }
}

/// Largest grid resolution per axis; larger splits are clamped to it.
pub const MAX_GRID_SPLIT: u32 = 1024;

/// Uniform grid over the viewport, rebuilt for every query.
struct CellGrid {
    split: UVec2,
    cell: Vec2,
    /// Flat row-major cells holding indices into the box list.
    cells: Vec<Vec<usize>>,
}

impl CellGrid {
    fn new(split: UVec2, resolution: Vec2) -> Self {
        let split = split.clamp(UVec2::ONE, UVec2::splat(MAX_GRID_SPLIT));
        let cell = if resolution.x > 0.0 && resolution.y > 0.0 {
            Vec2::new(
                (resolution.x / split.x as f32).ceil().max(1.0),
                (resolution.y / split.y as f32).ceil().max(1.0),
            )
        } else {
            Vec2::ZERO
        };
        // No usable extent means everything shares a single cell.
        let split = if cell == Vec2::ZERO { UVec2::ONE } else { split };
        let count = split
            .x
            .checked_mul(split.y)
            .and_then(|count| usize::try_from(count).ok());
        match count {
            Some(count) => Self {
                split,
                cell,
                cells: vec![Vec::new(); count],
            },
            None => Self {
                split: UVec2::ONE,
                cell: Vec2::ZERO,
                cells: vec![Vec::new()],
            },
        }
    }

    fn column(&self, x: f32) -> u32 {
        if self.cell.x <= 0.0 {
            return 0;
        }
        let ix = (x / self.cell.x).floor();
        ix.clamp(0.0, (self.split.x - 1) as f32) as u32
    }

    fn row(&self, y: f32) -> u32 {
        if self.cell.y <= 0.0 {
            return 0;
        }
        let iy = (y / self.cell.y).floor();
        iy.clamp(0.0, (self.split.y - 1) as f32) as u32
    }

    fn insert(&mut self, idx: usize, aabb: &Aabb) {
        let (x0, x1) = (self.column(aabb.min.x), self.column(aabb.max.x));
        let (y0, y1) = (self.row(aabb.min.y), self.row(aabb.max.y));
        for iy in y0..=y1 {
            for ix in x0..=x1 {
                self.cells[(iy * self.split.x + ix) as usize].push(idx);
            }
        }
    }
}

/// Broad phase: every index pair `(i, j)`, `i < j`, whose boxes overlap.
///
/// `split` is the grid resolution in cells and `resolution` the extent it
/// covers (usually the viewport). Boxes outside the extent are clamped into
/// the border cells, so no overlap is ever missed; the grid only avoids the
/// full pairwise scan when boxes are spread out.
pub fn intersect(boxes: &[Aabb], split: UVec2, resolution: Vec2) -> Vec<(usize, usize)> {
    let mut grid = CellGrid::new(split, resolution);
    for (idx, aabb) in boxes.iter().enumerate() {
        grid.insert(idx, aabb);
    }

    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut pairs = Vec::new();
    for cell in &grid.cells {
        for (a_pos, &a) in cell.iter().enumerate() {
            for &b in &cell[a_pos + 1..] {
                let key = if a < b { (a, b) } else { (b, a) };
                if !seen.insert(key) {
                    continue;
                }
                if boxes[key.0].intersects(&boxes[key.1]) {
                    pairs.push(key);
                }
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Cell rectangles of the grid `intersect` uses, row-major. Empty when the
/// extent is degenerate.
pub fn grid_cells(split: UVec2, resolution: Vec2) -> Vec<Aabb> {
    let grid = CellGrid::new(split, resolution);
    if grid.cell == Vec2::ZERO {
        return Vec::new();
    }
    let mut cells = Vec::with_capacity(grid.cells.len());
    for iy in 0..grid.split.y {
        for ix in 0..grid.split.x {
            let min = Vec2::new(ix as f32, iy as f32) * grid.cell;
            cells.push(Aabb {
                min,
                max: min + grid.cell,
            });
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(boxes: &[Aabb]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                if boxes[i].intersects(&boxes[j]) {
                    out.push((i, j));
                }
            }
        }
        out
    }

    #[test]
    fn aabb_overlap_partial() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let b = Aabb::new(5.0, 5.0, 15.0, 15.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn aabb_overlap_disjoint() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let b = Aabb::new(100.0, 100.0, 110.0, 110.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn aabb_touching_edges_overlap() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let b = Aabb::new(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
    }

    #[test]
    fn aabb_new_normalizes_corners() {
        let a = Aabb::new(10.0, 10.0, 0.0, 0.0);
        assert_eq!(a.min, Vec2::ZERO);
        assert_eq!(a.max, Vec2::splat(10.0));
    }

    #[test]
    fn intersect_reports_each_pair_once() {
        // Both boxes straddle all four central cells.
        let boxes = [
            Aabb::new(90.0, 90.0, 110.0, 110.0),
            Aabb::new(95.0, 95.0, 105.0, 105.0),
        ];
        let pairs = intersect(&boxes, UVec2::new(4, 4), Vec2::new(200.0, 200.0));
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn intersect_skips_disjoint_boxes_in_same_cell() {
        let boxes = [
            Aabb::new(0.0, 0.0, 5.0, 5.0),
            Aabb::new(20.0, 20.0, 25.0, 25.0),
        ];
        let pairs = intersect(&boxes, UVec2::new(4, 4), Vec2::new(200.0, 200.0));
        assert!(pairs.is_empty());
    }

    #[test]
    fn intersect_clamps_offscreen_boxes_into_border_cells() {
        let boxes = [
            Aabb::new(-50.0, -50.0, -10.0, -10.0),
            Aabb::new(-20.0, -20.0, 5.0, 5.0),
            Aabb::new(400.0, 400.0, 420.0, 420.0),
            Aabb::new(410.0, 410.0, 430.0, 430.0),
        ];
        let pairs = intersect(&boxes, UVec2::new(4, 4), Vec2::new(200.0, 200.0));
        assert_eq!(pairs, vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn intersect_clamps_oversized_splits() {
        let boxes = [
            Aabb::new(0.0, 0.0, 10.0, 10.0),
            Aabb::new(5.0, 5.0, 15.0, 15.0),
        ];
        let pairs = intersect(&boxes, UVec2::new(70_000, 70_000), Vec2::new(400.0, 300.0));
        assert_eq!(pairs, vec![(0, 1)]);
        let cells = grid_cells(UVec2::new(70_000, 2), Vec2::new(400.0, 300.0));
        assert_eq!(cells.len(), (MAX_GRID_SPLIT * 2) as usize);
    }

    #[test]
    fn intersect_without_resolution_uses_single_cell() {
        let boxes = [
            Aabb::new(0.0, 0.0, 10.0, 10.0),
            Aabb::new(5.0, 5.0, 15.0, 15.0),
        ];
        let pairs = intersect(&boxes, UVec2::new(4, 4), Vec2::ZERO);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn grid_cells_cover_viewport() {
        let cells = grid_cells(UVec2::new(4, 2), Vec2::new(200.0, 100.0));
        assert_eq!(cells.len(), 8);
        assert_eq!(cells[0], Aabb::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(cells[5], Aabb::new(50.0, 50.0, 100.0, 100.0));
        assert!(grid_cells(UVec2::new(4, 4), Vec2::ZERO).is_empty());
    }

    #[test]
    fn intersect_matches_brute_force_on_scattered_boxes() {
        let mut boxes = Vec::new();
        // Deterministic scatter with a few clusters.
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..120 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let x = (seed % 800) as f32;
            let y = ((seed / 800) % 600) as f32;
            let w = 8.0 + (seed % 40) as f32;
            let h = 6.0 + (seed % 13) as f32;
            boxes.push(Aabb::new(x, y, x + w, y + h));
        }
        let pairs = intersect(&boxes, UVec2::new(4, 4), Vec2::new(800.0, 600.0));
        assert_eq!(pairs, brute_force(&boxes));
    }
}

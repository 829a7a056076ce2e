//! Boundary tracing of binary rasters with a full containment hierarchy.
//!
//! Tracing is delegated to [`imageproc::contours::find_contours`] (Suzuki–Abe border
//! following), which reports contours in raster-scan order of their first boundary pixel
//! together with a parent link. This module turns those parent links into an
//! index-based tree and drops the redundant vertices along straight chain runs.

use image::GrayImage;
use imageproc::{
    contours::{BorderType, Contour, find_contours},
    point::Point,
};
use tracing::debug;

/// Position of one contour in the containment tree, as indices into [`ContourSet::contours`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HierarchyEdge {
    pub next: Option<usize>,
    pub previous: Option<usize>,
    pub first_child: Option<usize>,
    pub parent: Option<usize>,
}

impl HierarchyEdge {
    /// An outermost boundary: not nested in any other contour.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// One traced boundary. The point sequence is open: the first point is not repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedContour {
    pub points: Vec<Point<i32>>,
    /// True when this contour bounds a hole rather than a foreground region.
    pub is_hole: bool,
}

/// Contours of a raster plus their hierarchy, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourSet {
    pub contours: Vec<TracedContour>,
    pub hierarchy: Vec<HierarchyEdge>,
}

impl ContourSet {
    pub fn len(&self) -> usize {
        self.contours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    /// Indices of the root contours, in tracing order.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.hierarchy
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.is_root())
            .map(|(i, _)| i)
    }

    /// Direct children of contour `index`, following the sibling chain.
    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let first = self.hierarchy.get(index).and_then(|edge| edge.first_child);
        std::iter::successors(first, |&child| self.hierarchy[child].next)
    }
}

/// Traces every boundary of `raster`, treating any non-zero pixel as foreground.
///
/// The result is deterministic: identical rasters give identical contour order, point
/// order and hierarchy. Each contour keeps only the vertices where the 8-connected chain
/// changes direction (see [`reduce_vertices`]), which preserves the traced path exactly.
pub fn trace(raster: &GrayImage) -> ContourSet {
    let traced: Vec<Contour<i32>> = find_contours(raster);
    let parents: Vec<Option<usize>> = traced.iter().map(|c| c.parent).collect();
    let hierarchy = build_hierarchy(&parents);

    let contours: Vec<TracedContour> = traced
        .into_iter()
        .map(|contour| TracedContour {
            points: reduce_vertices(&contour.points),
            is_hole: contour.border_type == BorderType::Hole,
        })
        .collect();

    debug!(
        contours = contours.len(),
        roots = hierarchy.iter().filter(|e| e.is_root()).count(),
        "traced raster"
    );

    ContourSet {
        contours,
        hierarchy,
    }
}

/// Builds sibling and child links from per-contour parent indices.
///
/// Siblings are chained in index order; roots form one sibling chain of their own.
/// A parent index that points outside the list is treated as no parent.
pub fn build_hierarchy(parents: &[Option<usize>]) -> Vec<HierarchyEdge> {
    let len = parents.len();
    let mut edges = vec![HierarchyEdge::default(); len];
    // Last child seen per parent; the extra slot at `len` tracks the root chain.
    let mut last_child: Vec<Option<usize>> = vec![None; len + 1];

    for (i, parent) in parents.iter().enumerate() {
        let parent = parent.filter(|&p| p < len && p != i);
        edges[i].parent = parent;

        let slot = parent.unwrap_or(len);
        match last_child[slot] {
            Some(previous) => {
                edges[previous].next = Some(i);
                edges[i].previous = Some(previous);
            }
            None => {
                if let Some(p) = parent {
                    edges[p].first_child = Some(i);
                }
            }
        }
        last_child[slot] = Some(i);
    }

    edges
}

/// Drops every vertex that lies inside a straight run of the closed chain.
///
/// A vertex is kept when the step arriving at it differs from the step leaving it,
/// so axis-aligned and diagonal runs collapse to their endpoints. Chains of up to two
/// points are returned unchanged.
pub fn reduce_vertices(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let step = |from: Point<i32>, to: Point<i32>| (to.x - from.x, to.y - from.y);
    let kept: Vec<Point<i32>> = (0..n)
        .filter(|&i| {
            let previous = points[(i + n - 1) % n];
            let current = points[i];
            let next = points[(i + 1) % n];
            step(previous, current) != step(current, next)
        })
        .map(|i| points[i])
        .collect();

    if kept.is_empty() {
        vec![points[0]]
    } else {
        kept
    }
}

//! Connected components labeling over binarized images using Union-Find.
//!
//! Labels ink pixels (value `0`) with 4-connectivity and accumulates
//! per-component bounding boxes, pixel counts, and centroid sums. Backed by
//! a caller-provided arena so repeated scans reuse allocation.

use bumpalo::Bump;

/// A disjoint-set forest with path compression and rank union.
pub struct UnionFind<'a> {
    parent: &'a mut [u32],
    rank: &'a mut [u8],
}

impl<'a> UnionFind<'a> {
    /// Create a new Union-Find structure backed by the provided arena.
    pub fn new_in(arena: &'a Bump, size: usize) -> Self {
        let parent = arena.alloc_slice_fill_with(size, |i| i as u32);
        let rank = arena.alloc_slice_fill_copy(size, 0u8);
        Self { parent, rank }
    }

    /// Find the representative (root) of the set containing `i`.
    #[inline]
    pub fn find(&mut self, i: u32) -> u32 {
        let mut root = i;
        while self.parent[root as usize] != root {
            self.parent[root as usize] = self.parent[self.parent[root as usize] as usize];
            root = self.parent[root as usize];
        }
        root
    }

    /// Unite the sets containing `i` and `j`.
    #[inline]
    pub fn union(&mut self, i: u32, j: u32) {
        let root_i = self.find(i);
        let root_j = self.find(j);
        if root_i != root_j {
            match self.rank[root_i as usize].cmp(&self.rank[root_j as usize]) {
                std::cmp::Ordering::Less => self.parent[root_i as usize] = root_j,
                std::cmp::Ordering::Greater => self.parent[root_j as usize] = root_i,
                std::cmp::Ordering::Equal => {
                    self.parent[root_i as usize] = root_j;
                    self.rank[root_j as usize] += 1;
                }
            }
        }
    }
}

/// Bounding box and statistics for a connected component of ink pixels.
#[derive(Clone, Copy, Debug)]
pub struct ComponentStats {
    /// Minimum x coordinate.
    pub min_x: u32,
    /// Maximum x coordinate.
    pub max_x: u32,
    /// Minimum y coordinate.
    pub min_y: u32,
    /// Maximum y coordinate.
    pub max_y: u32,
    /// Total number of pixels in the component.
    pub pixel_count: u32,
    /// Sum of pixel x coordinates, for the centroid.
    pub sum_x: u64,
    /// Sum of pixel y coordinates, for the centroid.
    pub sum_y: u64,
}

impl Default for ComponentStats {
    fn default() -> Self {
        Self {
            min_x: u32::MAX,
            max_x: 0,
            min_y: u32::MAX,
            max_y: 0,
            pixel_count: 0,
            sum_x: 0,
            sum_y: 0,
        }
    }
}

impl ComponentStats {
    /// Bounding box width in pixels.
    #[must_use]
    pub fn bbox_width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Bounding box height in pixels.
    #[must_use]
    pub fn bbox_height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Pixel-count fill ratio of the bounding box.
    #[must_use]
    pub fn bbox_fill(&self) -> f32 {
        self.pixel_count as f32 / (self.bbox_width() * self.bbox_height()) as f32
    }

    /// Component centroid in image coordinates.
    #[must_use]
    pub fn centroid(&self) -> [f64; 2] {
        let n = f64::from(self.pixel_count);
        [self.sum_x as f64 / n, self.sum_y as f64 / n]
    }

    /// Whether `other`'s bounding box lies strictly inside this one.
    #[must_use]
    pub fn contains_bbox(&self, other: &ComponentStats) -> bool {
        other.min_x > self.min_x
            && other.max_x < self.max_x
            && other.min_y > self.min_y
            && other.max_y < self.max_y
    }
}

/// Result of connected component labeling.
pub struct LabelResult<'a> {
    /// Flat array of pixel labels (row-major); `0` is background, component
    /// labels start at `1`.
    pub labels: &'a [u32],
    /// Statistics for each component, indexed by `label - 1`.
    pub component_stats: Vec<ComponentStats>,
}

/// Label connected ink components (binary value `0`) with 4-connectivity and
/// compute per-component statistics.
pub fn label_components<'a>(
    arena: &'a Bump,
    binary: &[u8],
    width: usize,
    height: usize,
) -> LabelResult<'a> {
    let labels = arena.alloc_slice_fill_copy(width * height, 0u32);
    let mut uf = UnionFind::new_in(arena, width * height);

    // Pass 1: provisional labels from left/up neighbors
    for y in 0..height {
        let row_off = y * width;
        for x in 0..width {
            let idx = row_off + x;
            if binary[idx] != 0 {
                continue;
            }
            let left = x > 0 && binary[idx - 1] == 0;
            let up = y > 0 && binary[idx - width] == 0;
            labels[idx] = match (left, up) {
                (false, false) => idx as u32 + 1,
                (true, false) => labels[idx - 1],
                (false, true) => labels[idx - width],
                (true, true) => {
                    uf.union(labels[idx - 1] - 1, labels[idx - width] - 1);
                    labels[idx - 1]
                }
            };
        }
    }

    // Pass 2: resolve to roots and assign dense labels with stats
    let mut dense: std::collections::HashMap<u32, u32> = std::collections::HashMap::new();
    let mut stats: Vec<ComponentStats> = Vec::new();
    for y in 0..height {
        let row_off = y * width;
        for x in 0..width {
            let idx = row_off + x;
            if labels[idx] == 0 {
                continue;
            }
            let root = uf.find(labels[idx] - 1);
            let next_label = stats.len() as u32 + 1;
            let label = *dense.entry(root).or_insert_with(|| {
                stats.push(ComponentStats::default());
                next_label
            });
            labels[idx] = label;

            let s = &mut stats[(label - 1) as usize];
            s.min_x = s.min_x.min(x as u32);
            s.max_x = s.max_x.max(x as u32);
            s.min_y = s.min_y.min(y as u32);
            s.max_y = s.max_y.max(y as u32);
            s.pixel_count += 1;
            s.sum_x += x as u64;
            s.sum_y += y as u64;
        }
    }

    LabelResult {
        labels,
        component_stats: stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_from(rows: &[&str]) -> (Vec<u8>, usize, usize) {
        let height = rows.len();
        let width = rows[0].len();
        let mut data = vec![255u8; width * height];
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    data[y * width + x] = 0;
                }
            }
        }
        (data, width, height)
    }

    #[test]
    fn test_two_components() {
        let (binary, w, h) = binary_from(&[
            "##..#",
            "##..#",
            ".....",
        ]);
        let arena = Bump::new();
        let result = label_components(&arena, &binary, w, h);
        assert_eq!(result.component_stats.len(), 2);
        let counts: Vec<u32> = result
            .component_stats
            .iter()
            .map(|s| s.pixel_count)
            .collect();
        assert!(counts.contains(&4));
        assert!(counts.contains(&2));
    }

    #[test]
    fn test_u_shape_merges() {
        let (binary, w, h) = binary_from(&[
            "#.#",
            "#.#",
            "###",
        ]);
        let arena = Bump::new();
        let result = label_components(&arena, &binary, w, h);
        assert_eq!(result.component_stats.len(), 1);
        assert_eq!(result.component_stats[0].pixel_count, 7);
    }

    #[test]
    fn test_centroid_and_bbox() {
        let (binary, w, h) = binary_from(&[
            ".....",
            ".###.",
            ".###.",
            ".###.",
            ".....",
        ]);
        let arena = Bump::new();
        let result = label_components(&arena, &binary, w, h);
        assert_eq!(result.component_stats.len(), 1);
        let s = &result.component_stats[0];
        assert_eq!(s.bbox_width(), 3);
        assert_eq!(s.bbox_height(), 3);
        let c = s.centroid();
        assert!((c[0] - 2.0).abs() < 1e-9);
        assert!((c[1] - 2.0).abs() < 1e-9);
        assert!((s.bbox_fill() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_containment() {
        let (binary, w, h) = binary_from(&[
            "#######",
            "#.....#",
            "#..#..#",
            "#.....#",
            "#######",
        ]);
        let arena = Bump::new();
        let result = label_components(&arena, &binary, w, h);
        assert_eq!(result.component_stats.len(), 2);
        let (outer, inner) = if result.component_stats[0].pixel_count
            > result.component_stats[1].pixel_count
        {
            (&result.component_stats[0], &result.component_stats[1])
        } else {
            (&result.component_stats[1], &result.component_stats[0])
        };
        assert!(outer.contains_bbox(inner));
        assert!(!inner.contains_bbox(outer));
    }
}

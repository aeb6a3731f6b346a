//! Merging of raw sliding-window hits into face boxes
//!
//! Mirrors OpenCV's `groupRectangles`: hits are partitioned into equivalence
//! classes of "similar" rectangles, every class is averaged, weak classes are
//! dropped and boxes nested inside a stronger box are suppressed. Output order
//! is class order, i.e. the order in which each class's first raw hit was
//! produced by the scan.

use crate::BoundingBox;

/// Similarity tolerance used by the detector
pub const GROUP_EPS: f64 = 0.2;

fn similar(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps
        * (f64::from(a.width.min(b.width)) + f64::from(a.height.min(b.height)))
        * 0.5;
    f64::from((a.x - b.x).abs()) <= delta
        && f64::from((a.y - b.y).abs()) <= delta
        && f64::from((a.right() - b.right()).abs()) <= delta
        && f64::from((a.bottom() - b.bottom()).abs()) <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Label each rectangle with its equivalence class; classes are numbered by
/// first appearance. Returns `(labels, class_count)`.
pub fn partition(rects: &[BoundingBox], eps: f64) -> (Vec<usize>, usize) {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; n];
    let mut labels = Vec::with_capacity(n);
    let mut classes = 0;
    for i in 0..n {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = classes;
            classes += 1;
        }
        labels.push(class_of_root[root]);
    }
    (labels, classes)
}

/// Group raw detections, keeping classes with more than `min_neighbors` members
///
/// `min_neighbors == 0` returns the input unchanged.
#[must_use]
pub fn group_rectangles(rects: &[BoundingBox], min_neighbors: usize, eps: f64) -> Vec<BoundingBox> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let (labels, classes) = partition(rects, eps);

    let mut sums = vec![[0i64; 4]; classes];
    let mut counts = vec![0usize; classes];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += i64::from(rect.x);
        s[1] += i64::from(rect.y);
        s[2] += i64::from(rect.width);
        s[3] += i64::from(rect.height);
        counts[label] += 1;
    }

    let averaged: Vec<BoundingBox> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let scale = 1.0 / n as f64;
            // Ties go to the even neighbour, like cvRound
            let avg = |v: i64| (v as f64 * scale).round_ties_even() as i32;
            BoundingBox::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }

        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (f64::from(r2.width) * eps).round() as i32;
            let dy = (f64::from(r2.height) * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !nested {
            grouped.push(*r1);
        }
    }
    grouped
}

// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ordered tree edit distance (Zhang–Shasha) with unit costs.
//!
//! Insert, delete, and relabel all cost 1. Trees whose distance matrix
//! would exceed [`MAX_TED_CELLS`] fall back to a label-histogram distance,
//! which is a lower bound of the exact value.

use crate::dom_tree::DomTree;
use std::collections::HashMap;

/// Upper bound on `n * m` for the exact algorithm.
pub const MAX_TED_CELLS: usize = 16_000_000;

/// Edit distance between two ordered labelled trees.
pub fn tree_edit_distance(a: &DomTree, b: &DomTree) -> usize {
    let n = a.node_count();
    let m = b.node_count();
    if n == 0 || m == 0 {
        return n.max(m);
    }
    if n.saturating_mul(m) > MAX_TED_CELLS {
        tracing::debug!(n, m, "tree too large for exact edit distance, using label histogram");
        return histogram_distance(a, b);
    }

    let mut td = vec![vec![0u32; m]; n];
    for &i in a.keyroots() {
        for &j in b.keyroots() {
            forest_distance(a, b, i, j, &mut td);
        }
    }
    td[n - 1][m - 1] as usize
}

fn forest_distance(a: &DomTree, b: &DomTree, i: usize, j: usize, td: &mut [Vec<u32>]) {
    let la = a.leftmost();
    let lb = b.leftmost();
    let li = la[i];
    let lj = lb[j];
    let rows = i - li + 2;
    let cols = j - lj + 2;

    let mut fd = vec![vec![0u32; cols]; rows];
    for x in 1..rows {
        fd[x][0] = fd[x - 1][0] + 1;
    }
    for y in 1..cols {
        fd[0][y] = fd[0][y - 1] + 1;
    }

    for x in 1..rows {
        let i1 = li + x - 1;
        for y in 1..cols {
            let j1 = lj + y - 1;
            let delete = fd[x - 1][y] + 1;
            let insert = fd[x][y - 1] + 1;
            if la[i1] == li && lb[j1] == lj {
                let relabel = u32::from(a.labels()[i1] != b.labels()[j1]);
                let best = delete.min(insert).min(fd[x - 1][y - 1] + relabel);
                fd[x][y] = best;
                td[i1][j1] = best;
            } else {
                let p = la[i1] - li;
                let q = lb[j1] - lj;
                fd[x][y] = delete.min(insert).min(fd[p][q] + td[i1][j1]);
            }
        }
    }
}

/// Sum of per-label count differences, adjusted so that relabels count once.
fn histogram_distance(a: &DomTree, b: &DomTree) -> usize {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for label in a.labels() {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    for label in b.labels() {
        *counts.entry(label.as_str()).or_default() -= 1;
    }
    let (mut surplus, mut deficit) = (0usize, 0usize);
    for v in counts.values() {
        if *v > 0 {
            surplus += *v as usize;
        } else {
            deficit += v.unsigned_abs() as usize;
        }
    }
    surplus.max(deficit)
}

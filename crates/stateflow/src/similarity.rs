// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Similarity and diversity measures between states.
//!
//! All diversity values are in `[0, 1]`: 0 means identical, 1 means
//! nothing in common.

use crate::dom_tree::DomTree;
use crate::tree_edit::tree_edit_distance;

/// Similarity of two action-name sequences by their common prefix:
/// `2 * common / (len_a + len_b)`. Two empty sequences are identical.
pub fn prefix_similarity(a: &[String], b: &[String]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let common = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    (2 * common) as f64 / total as f64
}

/// Path diversity between two sets of root paths:
/// one minus the highest prefix similarity across all pairs.
///
/// Returns 1.0 when either set is empty.
pub fn path_set_diversity(paths_a: &[Vec<String>], paths_b: &[Vec<String>]) -> f64 {
    if paths_a.is_empty() || paths_b.is_empty() {
        return 1.0;
    }
    let mut best = 0.0f64;
    for pa in paths_a {
        for pb in paths_b {
            let sim = prefix_similarity(pa, pb);
            if sim > best {
                best = sim;
                if best >= 1.0 {
                    return 0.0;
                }
            }
        }
    }
    (1.0 - best).clamp(0.0, 1.0)
}

/// Tree edit distance normalized by the larger node count, clamped to 1.
pub fn normalized_tree_distance(a: &DomTree, b: &DomTree) -> f64 {
    let max_nodes = a.node_count().max(b.node_count());
    if max_nodes == 0 {
        return 0.0;
    }
    let distance = tree_edit_distance(a, b) as f64 / max_nodes as f64;
    distance.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefix_identical() {
        let a = seq(&["a", "b"]);
        assert!((prefix_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_partial() {
        let a = seq(&["a", "b", "c"]);
        let b = seq(&["a", "x"]);
        // 2 * 1 / 5
        assert!((prefix_similarity(&a, &b) - 0.4).abs() < 1e-9);
        assert!((prefix_similarity(&b, &a) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_empty() {
        let empty: Vec<String> = Vec::new();
        assert!((prefix_similarity(&empty, &empty) - 1.0).abs() < 1e-9);
        assert_eq!(prefix_similarity(&empty, &seq(&["a"])), 0.0);
    }

    #[test]
    fn test_path_set_diversity_takes_best_pair() {
        let a = vec![seq(&["x"]), seq(&["a", "b"])];
        let b = vec![seq(&["a", "c"])];
        // best pair: [a,b] vs [a,c] -> 0.5
        assert!((path_set_diversity(&a, &b) - 0.5).abs() < 1e-9);
        assert!((path_set_diversity(&b, &a) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_path_set_diversity_no_paths() {
        let a = vec![seq(&["a"])];
        assert_eq!(path_set_diversity(&a, &[]), 1.0);
        assert_eq!(path_set_diversity(&[], &[]), 1.0);
    }

    #[test]
    fn test_normalized_distance_bounds() {
        let a = DomTree::parse("<html><body><p>one</p></body></html>");
        let b = DomTree::parse(
            "<html><body><ul><li>1</li><li>2</li><li>3</li></ul><table></table></body></html>",
        );
        let d = normalized_tree_distance(&a, &b);
        assert!(d > 0.0 && d <= 1.0);
        assert_eq!(normalized_tree_distance(&a, &a), 0.0);
        assert!((normalized_tree_distance(&b, &a) - d).abs() < 1e-9);
    }
}

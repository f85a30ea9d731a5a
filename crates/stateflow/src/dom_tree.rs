// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Labelled DOM trees in the post-order layout used by tree edit distance.

use scraper::{ElementRef, Html};

/// Label given to non-blank text nodes.
pub const TEXT_LABEL: &str = "#text";

/// A labelled ordered tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomNode {
    pub label: String,
    pub children: Vec<DomNode>,
}

impl DomNode {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(label: impl Into<String>, children: Vec<DomNode>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    /// Parse an HTML document into a tree of element tag names.
    /// Non-blank text nodes become `#text` leaves; comments are dropped.
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_document(html);
        Self::from_element(doc.root_element())
    }

    fn from_element(el: ElementRef<'_>) -> Self {
        let mut children = Vec::new();
        for child in el.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                children.push(Self::from_element(child_el));
            } else if let Some(text) = child.value().as_text() {
                if !text.trim().is_empty() {
                    children.push(Self::leaf(TEXT_LABEL));
                }
            }
        }
        Self {
            label: el.value().name().to_string(),
            children,
        }
    }
}

/// Post-order view of a [`DomNode`] tree.
///
/// `leftmost[i]` is the post-order index of the leftmost leaf under node `i`.
/// `keyroots` lists, in ascending order, the highest node for each distinct
/// leftmost leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomTree {
    labels: Vec<String>,
    leftmost: Vec<usize>,
    keyroots: Vec<usize>,
}

impl DomTree {
    pub fn parse(html: &str) -> Self {
        Self::from_node(&DomNode::from_html(html))
    }

    pub fn from_node(root: &DomNode) -> Self {
        let mut labels = Vec::new();
        let mut leftmost = Vec::new();
        flatten(root, &mut labels, &mut leftmost);

        let mut seen = vec![false; labels.len()];
        let mut keyroots = Vec::new();
        for i in (0..labels.len()).rev() {
            let l = leftmost[i];
            if !seen[l] {
                seen[l] = true;
                keyroots.push(i);
            }
        }
        keyroots.reverse();

        Self {
            labels,
            leftmost,
            keyroots,
        }
    }

    pub fn node_count(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn leftmost(&self) -> &[usize] {
        &self.leftmost
    }

    pub fn keyroots(&self) -> &[usize] {
        &self.keyroots
    }
}

fn flatten(node: &DomNode, labels: &mut Vec<String>, leftmost: &mut Vec<usize>) -> usize {
    let mut first_leaf = None;
    for child in &node.children {
        let idx = flatten(child, labels, leftmost);
        if first_leaf.is_none() {
            first_leaf = Some(leftmost[idx]);
        }
    }
    let idx = labels.len();
    labels.push(node.label.clone());
    leftmost.push(first_leaf.unwrap_or(idx));
    idx
}

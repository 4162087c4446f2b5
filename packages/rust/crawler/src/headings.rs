//! Heading hierarchy reconstruction.
//!
//! Pages rarely nest headings cleanly: levels get skipped (`h1` → `h3`) or
//! go backwards (`h3` before the first `h1`). The builder keeps a stack of
//! open ancestors and accepts any level sequence; the result is always a
//! valid forest whose pre-order traversal is the input order.

use siteadvisor_shared::{Heading, HeadingNode};

/// Incrementally builds the flat heading list and the heading tree together.
#[derive(Debug, Default)]
pub struct HeadingTreeBuilder {
    flat: Vec<Heading>,
    roots: Vec<HeadingNode>,
    /// Levels of the open ancestors. This is always the rightmost path of
    /// the forest, so depth `d` is reached by following last children.
    open: Vec<u8>,
}

impl HeadingTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next heading in document order. Levels are clamped to 1..=6.
    pub fn push(&mut self, level: u8, text: impl Into<String>) {
        let level = level.clamp(1, 6);
        let text = text.into();

        // Entries at the same or a deeper level cannot be ancestors.
        while self.open.last().is_some_and(|&open| open >= level) {
            self.open.pop();
        }

        let node = HeadingNode::new(level, text.clone());
        match rightmost_at_depth(&mut self.roots, self.open.len()) {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }

        self.open.push(level);
        self.flat.push(Heading { level, text });
    }

    /// Number of headings pushed so far.
    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// Consume the builder, returning `(flat list, root nodes)`.
    pub fn finish(self) -> (Vec<Heading>, Vec<HeadingNode>) {
        (self.flat, self.roots)
    }
}

/// Walk `depth` levels down the rightmost path. Depth 0 means "no parent".
fn rightmost_at_depth(roots: &mut [HeadingNode], depth: usize) -> Option<&mut HeadingNode> {
    if depth == 0 {
        return None;
    }
    let mut node = roots.last_mut()?;
    for _ in 1..depth {
        node = node.children.last_mut()?;
    }
    Some(node)
}

/// Build a heading forest from a flat, document-ordered heading list.
pub fn build_heading_tree(headings: &[Heading]) -> Vec<HeadingNode> {
    let mut builder = HeadingTreeBuilder::new();
    for heading in headings {
        builder.push(heading.level, heading.text.clone());
    }
    builder.finish().1
}

/// Pre-order traversal of a heading forest.
pub fn flatten_tree(roots: &[HeadingNode]) -> Vec<Heading> {
    fn walk(node: &HeadingNode, out: &mut Vec<Heading>) {
        out.push(Heading {
            level: node.level,
            text: node.text.clone(),
        });
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for root in roots {
        walk(root, &mut out);
    }
    out
}

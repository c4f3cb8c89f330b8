//! Topological ordering of the mix graph.
//!
//! Depth-first search with white/grey/black marks. A grey node met again is a
//! back edge, so a cycle built from guest routing is reported as
//! [`GraphError::CycleDetected`] instead of looping. The result lists every
//! node after all of its sources: sub-mixes first, the final mix last.
//!
//! Working storage is allocated once for the renderer's mix count and reused
//! every frame.

use super::EdgeMatrix;
use thiserror::Error;

/// Errors produced while ordering the mix graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A routing loop passes through `node`.
    #[error("cycle detected through mix {node}")]
    CycleDetected {
        /// A node on the cycle.
        node: usize,
    },

    /// The edge matrix does not match the ordering's node count.
    #[error("edge matrix has {found} nodes, ordering expects {expected}")]
    SizeMismatch {
        /// Node count the ordering was built for.
        expected: usize,
        /// Node count of the matrix passed in.
        found: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Reusable topological sorter.
#[derive(Debug, Clone)]
pub struct CommandOrdering {
    marks: Vec<Mark>,
    stack: Vec<(usize, usize)>,
    order: Vec<usize>,
}

impl CommandOrdering {
    /// Allocates working storage for `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            marks: vec![Mark::White; node_count],
            stack: Vec::with_capacity(node_count),
            order: Vec::with_capacity(node_count),
        }
    }

    /// Orders every node of `edges` so that each node follows all of its
    /// sources.
    ///
    /// On error the previous order is discarded.
    pub fn sort(&mut self, edges: &EdgeMatrix) -> Result<&[usize], GraphError> {
        let n = self.marks.len();
        if edges.node_count() != n {
            return Err(GraphError::SizeMismatch {
                expected: n,
                found: edges.node_count(),
            });
        }

        self.marks.fill(Mark::White);
        self.stack.clear();
        self.order.clear();

        for root in 0..n {
            if self.marks[root] != Mark::White {
                continue;
            }
            self.marks[root] = Mark::Grey;
            self.stack.push((root, 0));

            while let Some(top) = self.stack.last_mut() {
                let node = top.0;
                let mut descend = None;

                while top.1 < n {
                    let to = top.1;
                    top.1 += 1;
                    if !edges.connected(node, to) {
                        continue;
                    }
                    match self.marks[to] {
                        Mark::Grey => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(from = node, to, "mix routing cycle");
                            self.order.clear();
                            return Err(GraphError::CycleDetected { node: to });
                        }
                        Mark::White => {
                            descend = Some(to);
                            break;
                        }
                        Mark::Black => {}
                    }
                }

                match descend {
                    Some(to) => {
                        self.marks[to] = Mark::Grey;
                        self.stack.push((to, 0));
                    }
                    None => {
                        self.marks[node] = Mark::Black;
                        self.order.push(node);
                        self.stack.pop();
                    }
                }
            }
        }

        // Post-order lists destinations before sources.
        self.order.reverse();
        Ok(&self.order)
    }

    /// The last successful order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

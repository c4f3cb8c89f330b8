//! Adjacency matrix over mix ids.
//!
//! Each mix resolves to at most one outgoing edge per update, so the matrix
//! is kept incrementally: a mix whose routing changed clears its row with
//! [`EdgeMatrix::remove_edges`] and then reconnects. No cycle check happens
//! here; [`CommandOrdering`](super::CommandOrdering) fails closed instead.

/// Square boolean adjacency matrix indexed by mix id.
#[derive(Debug, Clone)]
pub struct EdgeMatrix {
    node_count: usize,
    bits: Vec<bool>,
}

impl EdgeMatrix {
    /// Creates an edgeless matrix for `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            bits: vec![false; node_count * node_count],
        }
    }

    /// Number of nodes the matrix covers.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    fn slot(&self, from: usize, to: usize) -> Option<usize> {
        (from < self.node_count && to < self.node_count).then(|| from * self.node_count + to)
    }

    /// Records `from → to`. Out-of-range ids are ignored and reported as `false`.
    pub fn connect(&mut self, from: usize, to: usize) -> bool {
        match self.slot(from, to) {
            Some(slot) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("edge_connect: {from} → {to}");
                self.bits[slot] = true;
                true
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(from, to, nodes = self.node_count, "edge outside matrix ignored");
                false
            }
        }
    }

    /// Clears `from → to`.
    pub fn disconnect(&mut self, from: usize, to: usize) {
        if let Some(slot) = self.slot(from, to) {
            self.bits[slot] = false;
        }
    }

    /// Clears every outgoing edge of `from`.
    pub fn remove_edges(&mut self, from: usize) {
        if from < self.node_count {
            let row = from * self.node_count;
            self.bits[row..row + self.node_count].fill(false);
        }
    }

    /// Whether `from → to` is set.
    pub fn connected(&self, from: usize, to: usize) -> bool {
        self.slot(from, to).is_some_and(|slot| self.bits[slot])
    }

    /// Destinations of `from`, in ascending id order.
    pub fn outgoing(&self, from: usize) -> impl Iterator<Item = usize> + '_ {
        let row = if from < self.node_count {
            &self.bits[from * self.node_count..(from + 1) * self.node_count]
        } else {
            &[][..]
        };
        row.iter()
            .enumerate()
            .filter_map(|(to, &set)| set.then_some(to))
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.bits.iter().filter(|&&set| set).count()
    }

    /// Whether `to` is reachable from `from` along one or more edges.
    pub fn has_path(&self, from: usize, to: usize) -> bool {
        if from >= self.node_count {
            return false;
        }
        let mut visited = vec![false; self.node_count];
        let mut stack: Vec<usize> = self.outgoing(from).collect();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if visited[current] {
                continue;
            }
            visited[current] = true;
            stack.extend(self.outgoing(current));
        }
        false
    }

    /// Clears every edge.
    pub fn clear(&mut self) {
        self.bits.fill(false);
    }
}

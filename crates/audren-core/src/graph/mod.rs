//! Mix routing graph.
//!
//! Mixes are nodes and resolved destinations are edges. The graph is owned by
//! [`MixContext`](crate::MixContext) and mutated incrementally as mix
//! parameters change:
//!
//! - [`EdgeMatrix`] stores the edges. A mix clears its row before
//!   reconnecting, so each mix contributes at most one edge.
//! - [`CommandOrdering`] turns the matrix into a processing order and rejects
//!   cycles.
//!
//! # Example
//!
//! ```rust
//! use audren_core::graph::{CommandOrdering, EdgeMatrix};
//!
//! let mut edges = EdgeMatrix::new(3);
//! edges.connect(2, 1);
//! edges.connect(1, 0);
//!
//! let mut ordering = CommandOrdering::new(3);
//! assert_eq!(ordering.sort(&edges).unwrap(), &[2, 1, 0]);
//! ```

pub mod edge_matrix;
pub mod ordering;

pub use edge_matrix::EdgeMatrix;
pub use ordering::{CommandOrdering, GraphError};

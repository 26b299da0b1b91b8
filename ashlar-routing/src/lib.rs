//! Global routing: rectilinear-MST net decomposition and a best-first
//! maze router over a capacity-tracking cell grid.

pub mod grid;
pub mod maze;
pub mod prim;

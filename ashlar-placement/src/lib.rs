//! Standard-cell placement: a quadratic wirelength solver for the initial
//! spread, a diffusion step that resolves overlap, a recursive netlist
//! splitter and a row legalizer to land cells on site rows.

pub mod analytic;
pub mod diffusion;
pub mod legalizer;
pub mod net_model;
pub mod splitter;

#[cfg(test)]
pub mod test;

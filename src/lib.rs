//! screw-qc - Quality control for CMF implant screw plans
//!
//! Evaluates every screw of a surgical plan against a fixed set of checks
//! (spacing along plates, osteotomy crossings, guide barrels, pastille
//! deformation, clearance to critical anatomy), keeps the results current
//! as the plan is edited, and renders them for review documents.

pub mod checks;
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod hardware;
pub mod models;
pub mod reporters;
pub mod thresholds;

#[cfg(test)]
pub(crate) mod fixtures;

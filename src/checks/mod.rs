//! Screw quality checks
//!
//! This module provides the check framework and the built-in checks run
//! against every screw of a plan.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CheckerManager                          │
//! │  - Runs every (screw, check) pair in parallel (rayon)       │
//! │  - Caches results with the inputs they were derived from    │
//! │  - Re-evaluates only pairs whose inputs changed             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Checker Trait                          │
//! │  - kind(): Which check this is                              │
//! │  - inputs(screw, ctx): Plan inputs the result depends on    │
//! │  - check(screw, ctx): Evaluate one screw                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Built-in checks
//!
//! - `MinMaxDistanceChecker` - Screws too close together or too far apart along a plate
//! - `OsteotomyIntersectionChecker` - Screw trajectory crossing a planned cut
//! - `BarrelTypeChecker` - Registered guide barrel and guide creation errors
//! - `PastilleDeformedChecker` - Pastilles bent out of shape
//! - `AnatomicalObstacleChecker` - Clearance to nerves and other critical anatomy
//!
//! # Usage
//!
//! ```ignore
//! use screw_qc::checks::CheckerManagerBuilder;
//!
//! let mut manager = CheckerManagerBuilder::new().workers(4).build();
//! let report = manager.run(plan)?;
//! ```

mod anatomical_obstacle;
mod barrel_type;
mod base;
mod incremental_cache;
mod manager;
mod min_max_distance;
mod osteotomy_intersection;
mod pastille_deformed;

pub use anatomical_obstacle::{AnatomicalObstacleChecker, ObstacleThresholds};
pub use barrel_type::BarrelTypeChecker;
pub use base::{
    CheckContext, CheckSettings, Checker, CheckerRegistry, DEFAULT_OSTEOTOMY_EXTENSION,
};
pub use incremental_cache::{
    config_fingerprint, input_fingerprint, CacheStats, IncrementalCache, CACHE_FILE_NAME,
    CACHE_VERSION,
};
pub use manager::{
    changed_inputs, ChangeNotifier, CheckerManager, CheckerManagerBuilder, PlanChange,
    RecheckReport, DEFAULT_WORKERS,
};
pub use min_max_distance::MinMaxDistanceChecker;
pub use osteotomy_intersection::OsteotomyIntersectionChecker;
pub use pastille_deformed::PastilleDeformedChecker;

//! Inter-screw distance thresholds
//!
//! Pure lookups over an immutable [`ThresholdTable`]. The table is built
//! once (built-in values, optionally overridden from `screwqc.toml`) and
//! shared by reference with every check; nothing here keeps global state.

use crate::hardware::{Connection, ConnectionKind, ImplantCase, ImplantType, ScrewBrand};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Coefficient of the plate bending formula
pub const MAX_DISTANCE_COEFFICIENT: f64 = 15.62;

/// Width lost to the pastille rim
pub const WIDTH_OFFSET: f64 = 0.2;

/// Diameter assumed for screw types missing from the table
pub const DEFAULT_SCREW_DIAMETER: f64 = 1.5;

/// Limits for one brand/implant-type pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    /// Minimum allowed head-to-head distance (mm)
    pub min_distance: f64,
    /// Smallest plate width a connection override may use (mm)
    pub plate_width_min: f64,
    /// Largest plate width a connection override may use (mm)
    pub plate_width_max: f64,
}

impl ThresholdEntry {
    pub const fn new(min_distance: f64, plate_width_min: f64, plate_width_max: f64) -> Self {
        Self {
            min_distance,
            plate_width_min,
            plate_width_max,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_distance < 0.0 || self.plate_width_min < 0.0 || self.plate_width_max < 0.0 {
            bail!("threshold values must be non-negative: {:?}", self);
        }
        if self.plate_width_max < self.plate_width_min {
            bail!(
                "plate_width_max ({}) is below plate_width_min ({})",
                self.plate_width_max,
                self.plate_width_min
            );
        }
        Ok(())
    }
}

/// Entry used when a brand/implant pair has no row
const FALLBACK_ENTRY: ThresholdEntry = ThresholdEntry::new(3.5, 1.0, 3.2);

const BUILTIN_ENTRIES: &[(ScrewBrand, ImplantType, ThresholdEntry)] = &[
    (ScrewBrand::Synthes, ImplantType::Lefort, ThresholdEntry::new(3.5, 1.0, 3.2)),
    (ScrewBrand::Synthes, ImplantType::Bsso, ThresholdEntry::new(4.0, 1.5, 3.6)),
    (ScrewBrand::Synthes, ImplantType::Genio, ThresholdEntry::new(4.0, 1.5, 3.6)),
    (ScrewBrand::Synthes, ImplantType::Mandible, ThresholdEntry::new(5.0, 2.0, 4.5)),
    (ScrewBrand::Synthes, ImplantType::Orbital, ThresholdEntry::new(2.5, 0.6, 2.0)),
    (ScrewBrand::Synthes, ImplantType::Zygoma, ThresholdEntry::new(3.0, 1.0, 3.0)),
    (ScrewBrand::KlsMartin, ImplantType::Lefort, ThresholdEntry::new(3.6, 1.0, 3.0)),
    (ScrewBrand::KlsMartin, ImplantType::Bsso, ThresholdEntry::new(4.2, 1.6, 3.6)),
    (ScrewBrand::KlsMartin, ImplantType::Genio, ThresholdEntry::new(4.2, 1.6, 3.6)),
    (ScrewBrand::KlsMartin, ImplantType::Mandible, ThresholdEntry::new(5.2, 2.0, 4.6)),
    (ScrewBrand::Stryker, ImplantType::Lefort, ThresholdEntry::new(3.4, 1.0, 3.2)),
    (ScrewBrand::Stryker, ImplantType::Mandible, ThresholdEntry::new(5.0, 2.0, 4.4)),
    (ScrewBrand::Medartis, ImplantType::Lefort, ThresholdEntry::new(3.3, 0.9, 3.0)),
    (ScrewBrand::Medartis, ImplantType::Orbital, ThresholdEntry::new(2.4, 0.5, 1.8)),
];

const BUILTIN_SCREW_DIAMETERS: &[(&str, f64)] = &[
    ("matrix-orbital-1.3", 1.3),
    ("matrix-midface-1.5", 1.5),
    ("matrix-midface-1.85", 1.85),
    ("matrix-mandible-2.0", 2.0),
    ("matrix-mandible-2.4", 2.4),
];

/// Configuration-supplied replacement for (part of) a table row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThresholdOverride {
    pub brand: ScrewBrand,
    pub implant_type: ImplantType,
    #[serde(default)]
    pub min_distance: Option<f64>,
    #[serde(default)]
    pub plate_width_min: Option<f64>,
    #[serde(default)]
    pub plate_width_max: Option<f64>,
}

/// Immutable lookup table of distance limits and screw diameters
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    entries: HashMap<(ScrewBrand, ImplantType), ThresholdEntry>,
    fallback: ThresholdEntry,
    screw_diameters: HashMap<String, f64>,
}

impl ThresholdTable {
    /// Table with the built-in brand values
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_ENTRIES
                .iter()
                .map(|&(brand, implant, entry)| ((brand, implant), entry))
                .collect(),
            fallback: FALLBACK_ENTRY,
            screw_diameters: BUILTIN_SCREW_DIAMETERS
                .iter()
                .map(|&(name, d)| (name.to_string(), d))
                .collect(),
        }
    }

    /// Apply configuration overrides, rejecting rows that break `max >= min >= 0`
    pub fn with_overrides(
        mut self,
        overrides: &[ThresholdOverride],
        screw_diameters: &HashMap<String, f64>,
    ) -> Result<Self> {
        for o in overrides {
            let mut entry = self.entry(o.brand, o.implant_type);
            if let Some(v) = o.min_distance {
                entry.min_distance = v;
            }
            if let Some(v) = o.plate_width_min {
                entry.plate_width_min = v;
            }
            if let Some(v) = o.plate_width_max {
                entry.plate_width_max = v;
            }
            entry.validate()?;
            self.entries.insert((o.brand, o.implant_type), entry);
        }
        for (name, &d) in screw_diameters {
            if d <= 0.0 {
                bail!("screw type '{}' has non-positive diameter {}", name, d);
            }
            self.screw_diameters.insert(name.clone(), d);
        }
        Ok(self)
    }

    pub fn entry(&self, brand: ScrewBrand, implant_type: ImplantType) -> ThresholdEntry {
        self.entries
            .get(&(brand, implant_type))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Rows sorted by brand and implant type, for display
    pub fn rows(&self) -> Vec<(ScrewBrand, ImplantType, ThresholdEntry)> {
        let sorted: BTreeMap<_, _> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        sorted.into_iter().map(|((b, i), e)| (b, i, e)).collect()
    }

    pub fn acceptable_min_distance(&self, brand: ScrewBrand, implant_type: ImplantType) -> f64 {
        self.entry(brand, implant_type).min_distance
    }

    /// `15.62 * thickness^2 * (width - 0.2)`, never negative
    pub fn acceptable_max_distance(
        &self,
        _brand: ScrewBrand,
        _implant_type: ImplantType,
        plate_thickness: f64,
        plate_width: f64,
    ) -> f64 {
        let value = MAX_DISTANCE_COEFFICIENT
            * plate_thickness
            * plate_thickness
            * (plate_width - WIDTH_OFFSET);
        value.max(0.0)
    }

    /// Clamp an override width into the implant's allowed range
    pub fn clamp_width(&self, brand: ScrewBrand, implant_type: ImplantType, width: f64) -> f64 {
        let entry = self.entry(brand, implant_type);
        width.clamp(entry.plate_width_min, entry.plate_width_max)
    }

    /// Width of a connection: its override, else the case default for its kind
    ///
    /// Plate overrides are clamped to the implant's plate range. Link
    /// overrides are taken as given, only floored at zero.
    pub fn effective_width(&self, case: &ImplantCase, connection: &Connection) -> f64 {
        match (connection.width, connection.kind) {
            (Some(w), ConnectionKind::Plate) => self.clamp_width(case.brand, case.implant_type, w),
            (Some(w), ConnectionKind::Link) => w.max(0.0),
            (None, kind) => case.default_width(kind),
        }
    }

    pub fn screw_diameter(&self, screw_type: &str) -> f64 {
        self.screw_diameters
            .get(screw_type)
            .copied()
            .unwrap_or(DEFAULT_SCREW_DIAMETER)
    }

    /// Known screw types, sorted by name
    pub fn screw_diameters(&self) -> BTreeMap<&str, f64> {
        self.screw_diameters
            .iter()
            .map(|(name, &d)| (name.as_str(), d))
            .collect()
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::builtin()
    }
}

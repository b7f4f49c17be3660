//! Hardware model of a surgical plan
//!
//! Typed entities the checks read: screws, attachment points ("dots"),
//! connections and the implant cases that own them, plus the anatomy and
//! osteotomy inputs. Everything is bundled into an immutable
//! [`PlanSnapshot`]; edits produce a new snapshot rather than mutating
//! the old one, so a running check always sees one consistent plan.

use crate::geometry::{RigidTransform, TriangleMesh};
use anyhow::{Context, Result};
use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of an implant case
    CaseId
);
string_id!(
    /// Identifier of an attachment point
    DotId
);
string_id!(
    /// Identifier of a plate or link
    ConnectionId
);
string_id!(
    /// Identifier of a rigid anatomical structure
    BoneId
);

/// Screw identity: owning case plus the index shown to the surgeon
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScrewId {
    pub case: CaseId,
    pub index: u32,
}

impl ScrewId {
    pub fn new(case: impl Into<String>, index: u32) -> Self {
        Self {
            case: CaseId::new(case),
            index,
        }
    }
}

impl fmt::Display for ScrewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Screw manufacturer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrewBrand {
    Synthes,
    KlsMartin,
    Stryker,
    Medartis,
}

impl fmt::Display for ScrewBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrewBrand::Synthes => write!(f, "Synthes"),
            ScrewBrand::KlsMartin => write!(f, "KLS Martin"),
            ScrewBrand::Stryker => write!(f, "Stryker"),
            ScrewBrand::Medartis => write!(f, "Medartis"),
        }
    }
}

/// Kind of implant planned for a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImplantType {
    Lefort,
    Bsso,
    Genio,
    Mandible,
    Orbital,
    Zygoma,
}

impl fmt::Display for ImplantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImplantType::Lefort => write!(f, "Le Fort"),
            ImplantType::Bsso => write!(f, "BSSO"),
            ImplantType::Genio => write!(f, "Genioplasty"),
            ImplantType::Mandible => write!(f, "Mandible"),
            ImplantType::Orbital => write!(f, "Orbital"),
            ImplantType::Zygoma => write!(f, "Zygoma"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SurgeryType {
    #[default]
    Orthognathic,
    Reconstruction,
    Trauma,
}

/// Configuration of one planned implant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplantCase {
    pub id: CaseId,
    pub brand: ScrewBrand,
    #[serde(default)]
    pub surgery_type: SurgeryType,
    pub implant_type: ImplantType,
    pub plate_thickness: f64,
    pub plate_width: f64,
    pub link_width: f64,
    pub screw_type: String,
    pub screw_length: f64,
    pub pastille_diameter: f64,
}

impl ImplantCase {
    /// Width used for a connection that carries no override
    pub fn default_width(&self, kind: ConnectionKind) -> f64 {
        match kind {
            ConnectionKind::Plate => self.plate_width,
            ConnectionKind::Link => self.link_width,
        }
    }
}

/// A placed screw. Edits go through the `moved_to`/`with_length`/`transformed`
/// constructors, which keep the identity and return a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screw {
    pub id: ScrewId,
    pub head: Point3<f64>,
    pub tip: Point3<f64>,
    pub length: f64,
    pub screw_type: String,
    #[serde(default)]
    pub barrel_type: Option<String>,
}

impl Screw {
    pub fn new(id: ScrewId, head: Point3<f64>, tip: Point3<f64>, screw_type: &str) -> Self {
        Self {
            id,
            head,
            tip,
            length: (tip - head).norm(),
            screw_type: screw_type.to_string(),
            barrel_type: None,
        }
    }

    pub fn with_barrel_type(mut self, barrel_type: &str) -> Self {
        self.barrel_type = Some(barrel_type.to_string());
        self
    }

    /// Unit vector from head to tip (zero for a degenerate screw)
    pub fn direction(&self) -> Vector3<f64> {
        (self.tip - self.head)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn body_length(&self) -> f64 {
        (self.tip - self.head).norm()
    }

    pub fn moved_to(&self, head: Point3<f64>, tip: Point3<f64>) -> Self {
        Self {
            head,
            tip,
            length: (tip - head).norm(),
            ..self.clone()
        }
    }

    /// Re-place the tip along the current axis so the body has `length`
    pub fn with_length(&self, length: f64) -> Self {
        let tip = self.head + self.direction() * length;
        Self {
            tip,
            length,
            ..self.clone()
        }
    }

    pub fn transformed(&self, iso: &Isometry3<f64>) -> Self {
        Self {
            head: iso * self.head,
            tip: iso * self.tip,
            ..self.clone()
        }
    }
}

/// What an attachment point is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DotKind {
    /// Screw-bearing attachment point
    Pastille {
        #[serde(default)]
        screw: Option<ScrewId>,
        #[serde(default)]
        deformed: bool,
    },
    /// Routing point for the hardware, carries no screw
    ControlPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPoint {
    pub id: DotId,
    pub case: CaseId,
    pub location: Point3<f64>,
    pub direction: Vector3<f64>,
    pub kind: DotKind,
}

impl AttachmentPoint {
    pub fn pastille(id: &str, case: &str, location: Point3<f64>, screw: Option<ScrewId>) -> Self {
        Self {
            id: DotId::new(id),
            case: CaseId::new(case),
            location,
            direction: Vector3::z(),
            kind: DotKind::Pastille {
                screw,
                deformed: false,
            },
        }
    }

    pub fn control_point(id: &str, case: &str, location: Point3<f64>) -> Self {
        Self {
            id: DotId::new(id),
            case: CaseId::new(case),
            location,
            direction: Vector3::z(),
            kind: DotKind::ControlPoint,
        }
    }

    pub fn screw(&self) -> Option<&ScrewId> {
        match &self.kind {
            DotKind::Pastille { screw, .. } => screw.as_ref(),
            DotKind::ControlPoint => None,
        }
    }

    pub fn is_deformed(&self) -> bool {
        matches!(self.kind, DotKind::Pastille { deformed: true, .. })
    }

    pub fn with_deformed(mut self, value: bool) -> Self {
        if let DotKind::Pastille { deformed, .. } = &mut self.kind {
            *deformed = value;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Rigid, wide hardware
    Plate,
    /// Flexible, narrow hardware
    Link,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Plate => write!(f, "plate"),
            ConnectionKind::Link => write!(f, "link"),
        }
    }
}

/// Edge between two attachment points of the same case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub case: CaseId,
    pub from: DotId,
    pub to: DotId,
    pub kind: ConnectionKind,
    /// Per-connection width override
    #[serde(default)]
    pub width: Option<f64>,
}

impl Connection {
    pub fn new(id: &str, case: &str, from: &str, to: &str, kind: ConnectionKind) -> Self {
        Self {
            id: ConnectionId::new(id),
            case: CaseId::new(case),
            from: DotId::new(from),
            to: DotId::new(to),
            kind,
            width: None,
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneAssignment {
    pub screw: ScrewId,
    pub bone: BoneId,
}

/// Which anatomical structure each screw head sits on
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<BoneAssignment>", into = "Vec<BoneAssignment>")]
pub struct AnatomicalContext {
    bones: HashMap<ScrewId, BoneId>,
}

impl AnatomicalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, screw: ScrewId, bone: BoneId) {
        self.bones.insert(screw, bone);
    }

    pub fn bone_of(&self, screw: &ScrewId) -> Option<&BoneId> {
        self.bones.get(screw)
    }

    /// Unclassified screws never share a bone
    pub fn same_bone(&self, a: &ScrewId, b: &ScrewId) -> bool {
        match (self.bone_of(a), self.bone_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

impl From<Vec<BoneAssignment>> for AnatomicalContext {
    fn from(list: Vec<BoneAssignment>) -> Self {
        Self {
            bones: list.into_iter().map(|a| (a.screw, a.bone)).collect(),
        }
    }
}

impl From<AnatomicalContext> for Vec<BoneAssignment> {
    fn from(ctx: AnatomicalContext) -> Self {
        let mut list: Vec<BoneAssignment> = ctx
            .bones
            .into_iter()
            .map(|(screw, bone)| BoneAssignment { screw, bone })
            .collect();
        list.sort_by(|a, b| a.screw.cmp(&b.screw));
        list
    }
}

/// Geometry of a planned bone cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CutGeometry {
    Plane {
        origin: Point3<f64>,
        normal: Vector3<f64>,
    },
    Surface {
        mesh: TriangleMesh,
    },
}

/// A cut on one original (pre-osteotomy) structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsteotomyCut {
    pub id: String,
    pub bone: BoneId,
    pub geometry: CutGeometry,
}

/// Maps a planned bone fragment back onto its original structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneRegistration {
    pub planned: BoneId,
    pub original: BoneId,
    pub transform: RigidTransform,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OsteotomyPlan {
    #[serde(default)]
    pub cuts: Vec<OsteotomyCut>,
    #[serde(default)]
    pub registrations: Vec<BoneRegistration>,
    /// Planned fragments that are grafts and have no original position
    #[serde(default)]
    pub grafts: Vec<BoneId>,
}

impl OsteotomyPlan {
    pub fn has_cuts(&self) -> bool {
        !self.cuts.is_empty()
    }

    pub fn registration_for(&self, planned: &BoneId) -> Option<&BoneRegistration> {
        self.registrations.iter().find(|r| &r.planned == planned)
    }

    pub fn is_graft(&self, bone: &BoneId) -> bool {
        self.grafts.contains(bone)
    }

    pub fn cuts_on<'a>(&'a self, original: &'a BoneId) -> impl Iterator<Item = &'a OsteotomyCut> {
        self.cuts.iter().filter(move |c| &c.bone == original)
    }
}

/// Nerve, tooth root or other structure screws must keep clear of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalStructure {
    pub name: String,
    pub mesh: TriangleMesh,
}

/// Guide barrel registered on a screw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredBarrel {
    pub screw: ScrewId,
    #[serde(default)]
    pub is_guide_creation_error: bool,
}

/// Plain-data form of a plan, as read from or written to JSON
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanData {
    #[serde(default)]
    pub cases: Vec<ImplantCase>,
    #[serde(default)]
    pub screws: Vec<Screw>,
    #[serde(default)]
    pub attachment_points: Vec<AttachmentPoint>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub anatomy: AnatomicalContext,
    #[serde(default)]
    pub osteotomy: Option<OsteotomyPlan>,
    #[serde(default)]
    pub critical_structures: Vec<CriticalStructure>,
    #[serde(default)]
    pub barrels: Vec<RegisteredBarrel>,
}

/// Structural problem found by [`PlanSnapshot::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    DuplicateScrew(ScrewId),
    UnknownConnectionEndpoint { connection: ConnectionId, dot: DotId },
    CrossCaseConnection { connection: ConnectionId },
    UnknownPastilleScrew { dot: DotId, screw: ScrewId },
    SharedScrew { screw: ScrewId, dots: Vec<DotId> },
    UnknownCase(CaseId),
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanIssue::DuplicateScrew(id) => {
                write!(f, "screw {} of case '{}' is defined twice", id, id.case)
            }
            PlanIssue::UnknownConnectionEndpoint { connection, dot } => {
                write!(f, "connection '{}' references unknown dot '{}'", connection, dot)
            }
            PlanIssue::CrossCaseConnection { connection } => {
                write!(f, "connection '{}' joins dots of different cases", connection)
            }
            PlanIssue::UnknownPastilleScrew { dot, screw } => {
                write!(f, "pastille '{}' references unknown screw {}", dot, screw)
            }
            PlanIssue::SharedScrew { screw, dots } => {
                let names: Vec<&str> = dots.iter().map(|d| d.as_str()).collect();
                write!(f, "screw {} is held by several pastilles: {}", screw, names.join(", "))
            }
            PlanIssue::UnknownCase(case) => write!(f, "unknown implant case '{}'", case),
        }
    }
}

/// Immutable, indexed view of a plan
#[derive(Debug, Clone, Default)]
pub struct PlanSnapshot {
    data: PlanData,
    case_index: HashMap<CaseId, usize>,
    screw_index: HashMap<ScrewId, usize>,
    dot_index: HashMap<DotId, usize>,
    connection_index: HashMap<ConnectionId, usize>,
    barrel_index: HashMap<ScrewId, usize>,
}

impl PlanSnapshot {
    pub fn new(data: PlanData) -> Self {
        let case_index = index_by(&data.cases, |c| c.id.clone());
        let screw_index = index_by(&data.screws, |s| s.id.clone());
        let dot_index = index_by(&data.attachment_points, |d| d.id.clone());
        let connection_index = index_by(&data.connections, |c| c.id.clone());
        let barrel_index = index_by(&data.barrels, |b| b.screw.clone());
        Self {
            data,
            case_index,
            screw_index,
            dot_index,
            connection_index,
            barrel_index,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let data: PlanData = serde_json::from_str(json).context("Failed to parse plan JSON")?;
        Ok(Self::new(data))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid plan file {}", path.display()))
    }

    pub fn data(&self) -> &PlanData {
        &self.data
    }

    pub fn into_data(self) -> PlanData {
        self.data
    }

    pub fn cases(&self) -> &[ImplantCase] {
        &self.data.cases
    }

    pub fn screws(&self) -> &[Screw] {
        &self.data.screws
    }

    pub fn attachment_points(&self) -> &[AttachmentPoint] {
        &self.data.attachment_points
    }

    pub fn connections(&self) -> &[Connection] {
        &self.data.connections
    }

    pub fn anatomy(&self) -> &AnatomicalContext {
        &self.data.anatomy
    }

    pub fn osteotomy(&self) -> Option<&OsteotomyPlan> {
        self.data.osteotomy.as_ref()
    }

    pub fn critical_structures(&self) -> &[CriticalStructure] {
        &self.data.critical_structures
    }

    pub fn case(&self, id: &CaseId) -> Option<&ImplantCase> {
        self.case_index.get(id).map(|&i| &self.data.cases[i])
    }

    pub fn screw(&self, id: &ScrewId) -> Option<&Screw> {
        self.screw_index.get(id).map(|&i| &self.data.screws[i])
    }

    pub fn attachment_point(&self, id: &DotId) -> Option<&AttachmentPoint> {
        self.dot_index.get(id).map(|&i| &self.data.attachment_points[i])
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connection_index
            .get(id)
            .map(|&i| &self.data.connections[i])
    }

    pub fn barrel(&self, screw: &ScrewId) -> Option<&RegisteredBarrel> {
        self.barrel_index.get(screw).map(|&i| &self.data.barrels[i])
    }

    pub fn case_of(&self, screw: &ScrewId) -> Option<&ImplantCase> {
        self.case(&screw.case)
    }

    /// Screws of one case, ordered by index
    pub fn screws_in_case(&self, case: &CaseId) -> Vec<&Screw> {
        let mut screws: Vec<&Screw> = self
            .data
            .screws
            .iter()
            .filter(|s| &s.id.case == case)
            .collect();
        screws.sort_by_key(|s| s.id.index);
        screws
    }

    /// All screw ids, ordered by case then index
    pub fn screw_ids(&self) -> Vec<ScrewId> {
        let mut ids: Vec<ScrewId> = self.data.screws.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids
    }

    /// Pastilles bearing the given screw
    pub fn pastilles_of<'a>(&'a self, screw: &'a ScrewId) -> impl Iterator<Item = &'a AttachmentPoint> {
        self.data
            .attachment_points
            .iter()
            .filter(move |d| d.screw() == Some(screw))
    }

    /// Replace (or add) a screw, keeping everything else
    pub fn with_screw(&self, screw: Screw) -> Self {
        let mut data = self.data.clone();
        match data.screws.iter_mut().find(|s| s.id == screw.id) {
            Some(slot) => *slot = screw,
            None => data.screws.push(screw),
        }
        Self::new(data)
    }

    pub fn without_screw(&self, id: &ScrewId) -> Self {
        let mut data = self.data.clone();
        data.screws.retain(|s| &s.id != id);
        data.barrels.retain(|b| &b.screw != id);
        for dot in &mut data.attachment_points {
            if let DotKind::Pastille { screw, .. } = &mut dot.kind {
                if screw.as_ref() == Some(id) {
                    *screw = None;
                }
            }
        }
        Self::new(data)
    }

    pub fn with_attachment_point(&self, dot: AttachmentPoint) -> Self {
        let mut data = self.data.clone();
        match data.attachment_points.iter_mut().find(|d| d.id == dot.id) {
            Some(slot) => *slot = dot,
            None => data.attachment_points.push(dot),
        }
        Self::new(data)
    }

    pub fn with_connection(&self, connection: Connection) -> Self {
        let mut data = self.data.clone();
        match data.connections.iter_mut().find(|c| c.id == connection.id) {
            Some(slot) => *slot = connection,
            None => data.connections.push(connection),
        }
        Self::new(data)
    }

    pub fn with_barrels(&self, barrels: Vec<RegisteredBarrel>) -> Self {
        let mut data = self.data.clone();
        data.barrels = barrels;
        Self::new(data)
    }

    /// Drop a case together with its hardware and screws
    pub fn without_case(&self, case: &CaseId) -> Self {
        let mut data = self.data.clone();
        data.cases.retain(|c| &c.id != case);
        data.attachment_points.retain(|d| &d.case != case);
        data.connections.retain(|c| &c.case != case);
        data.screws.retain(|s| &s.id.case != case);
        data.barrels.retain(|b| &b.screw.case != case);
        Self::new(data)
    }

    /// Check structural invariants without failing
    pub fn validate(&self) -> Vec<PlanIssue> {
        let mut issues = Vec::new();

        let mut seen = HashSet::new();
        for screw in &self.data.screws {
            if !seen.insert(&screw.id) {
                issues.push(PlanIssue::DuplicateScrew(screw.id.clone()));
            }
            if self.case(&screw.id.case).is_none() {
                issues.push(PlanIssue::UnknownCase(screw.id.case.clone()));
            }
        }

        for conn in &self.data.connections {
            let mut cross_case = false;
            for dot in [&conn.from, &conn.to] {
                match self.attachment_point(dot) {
                    None => issues.push(PlanIssue::UnknownConnectionEndpoint {
                        connection: conn.id.clone(),
                        dot: dot.clone(),
                    }),
                    Some(d) if d.case != conn.case => cross_case = true,
                    Some(_) => {}
                }
            }
            if cross_case {
                issues.push(PlanIssue::CrossCaseConnection {
                    connection: conn.id.clone(),
                });
            }
        }

        let mut holders: HashMap<&ScrewId, Vec<DotId>> = HashMap::new();
        for dot in &self.data.attachment_points {
            if let Some(screw) = dot.screw() {
                if self.screw(screw).is_none() {
                    issues.push(PlanIssue::UnknownPastilleScrew {
                        dot: dot.id.clone(),
                        screw: screw.clone(),
                    });
                }
                holders.entry(screw).or_default().push(dot.id.clone());
            }
        }
        let mut shared: Vec<(&ScrewId, Vec<DotId>)> =
            holders.into_iter().filter(|(_, dots)| dots.len() > 1).collect();
        shared.sort_by(|a, b| a.0.cmp(b.0));
        for (screw, dots) in shared {
            issues.push(PlanIssue::SharedScrew {
                screw: screw.clone(),
                dots,
            });
        }

        issues
    }
}

impl From<PlanData> for PlanSnapshot {
    fn from(data: PlanData) -> Self {
        Self::new(data)
    }
}

fn index_by<T, K: std::hash::Hash + Eq>(items: &[T], key: impl Fn(&T) -> K) -> HashMap<K, usize> {
    let mut index = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        // First definition wins; duplicates are reported by validate()
        index.entry(key(item)).or_insert(i);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str) -> ImplantCase {
        ImplantCase {
            id: CaseId::new(id),
            brand: ScrewBrand::Synthes,
            surgery_type: SurgeryType::Orthognathic,
            implant_type: ImplantType::Lefort,
            plate_thickness: 1.0,
            plate_width: 2.6,
            link_width: 1.3,
            screw_type: "matrix-midface-1.5".into(),
            screw_length: 6.0,
            pastille_diameter: 3.6,
        }
    }

    #[test]
    fn test_screw_edits_keep_identity() {
        let screw = Screw::new(
            ScrewId::new("c1", 4),
            Point3::origin(),
            Point3::new(0.0, 0.0, -6.0),
            "matrix-midface-1.5",
        );
        let longer = screw.with_length(8.0);
        assert_eq!(longer.id, screw.id);
        assert!((longer.body_length() - 8.0).abs() < 1e-12);
        assert!((longer.tip.z + 8.0).abs() < 1e-12);

        let moved = screw.moved_to(Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 0.0, -4.0));
        assert_eq!(moved.id.index, 4);
        assert!((moved.length - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_same_bone_requires_classification() {
        let a = ScrewId::new("c1", 1);
        let b = ScrewId::new("c1", 2);
        let c = ScrewId::new("c1", 3);
        let mut anatomy = AnatomicalContext::new();
        anatomy.assign(a.clone(), BoneId::new("maxilla"));
        anatomy.assign(b.clone(), BoneId::new("maxilla"));
        assert!(anatomy.same_bone(&a, &b));
        assert!(!anatomy.same_bone(&a, &c));
        assert!(!anatomy.same_bone(&c, &c));
    }

    #[test]
    fn test_anatomy_serializes_as_list() {
        let mut anatomy = AnatomicalContext::new();
        anatomy.assign(ScrewId::new("c1", 1), BoneId::new("maxilla"));
        let json = serde_json::to_value(&anatomy).expect("serialize anatomy");
        assert!(json.is_array());
        let back: AnatomicalContext = serde_json::from_value(json).expect("deserialize anatomy");
        assert_eq!(back, anatomy);
    }

    #[test]
    fn test_validate_reports_issues() {
        let s1 = ScrewId::new("c1", 1);
        let data = PlanData {
            cases: vec![case("c1"), case("c2")],
            screws: vec![Screw::new(
                s1.clone(),
                Point3::origin(),
                Point3::new(0.0, 0.0, -6.0),
                "matrix-midface-1.5",
            )],
            attachment_points: vec![
                AttachmentPoint::pastille("d1", "c1", Point3::origin(), Some(s1.clone())),
                AttachmentPoint::pastille("d2", "c1", Point3::new(5.0, 0.0, 0.0), Some(s1.clone())),
                AttachmentPoint::control_point("d3", "c2", Point3::new(9.0, 0.0, 0.0)),
            ],
            connections: vec![
                Connection::new("p1", "c1", "d1", "missing", ConnectionKind::Plate),
                Connection::new("p2", "c1", "d1", "d3", ConnectionKind::Link),
            ],
            ..Default::default()
        };
        let issues = PlanSnapshot::new(data).validate();
        assert!(issues.contains(&PlanIssue::UnknownConnectionEndpoint {
            connection: ConnectionId::new("p1"),
            dot: DotId::new("missing"),
        }));
        assert!(issues.contains(&PlanIssue::CrossCaseConnection {
            connection: ConnectionId::new("p2"),
        }));
        assert!(issues
            .iter()
            .any(|i| matches!(i, PlanIssue::SharedScrew { screw, .. } if screw == &s1)));
    }

    #[test]
    fn test_without_case_drops_hardware() {
        let data = PlanData {
            cases: vec![case("c1")],
            attachment_points: vec![AttachmentPoint::control_point("d1", "c1", Point3::origin())],
            ..Default::default()
        };
        let snap = PlanSnapshot::new(data).without_case(&CaseId::new("c1"));
        assert!(snap.cases().is_empty());
        assert!(snap.attachment_points().is_empty());
    }
}

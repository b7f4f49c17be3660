//! Plan builders shared by unit tests

use crate::hardware::{
    AttachmentPoint, BoneId, CaseId, Connection, ConnectionKind, ImplantCase, ImplantType,
    PlanData, PlanSnapshot, Screw, ScrewBrand, ScrewId, SurgeryType,
};
use nalgebra::{Point3, Vector3};

pub(crate) const CASE: &str = "c1";

/// Synthes Le Fort case: thickness 1.0, plate 2.6, link 1.3
pub(crate) fn reference_case(id: &str) -> ImplantCase {
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

pub(crate) fn sid(index: u32) -> ScrewId {
    ScrewId::new(CASE, index)
}

pub(crate) fn dot(index: u32) -> String {
    format!("d{}", index)
}

/// Screw pointing down -z from `head`, 6 mm long
pub(crate) fn screw(index: u32, head: [f64; 3]) -> Screw {
    let head = Point3::from(head);
    Screw::new(sid(index), head, head - Vector3::z() * 6.0, "matrix-midface-1.5")
}

pub(crate) struct PlanBuilder {
    data: PlanData,
}

impl PlanBuilder {
    pub(crate) fn new() -> Self {
        Self {
            data: PlanData {
                cases: vec![reference_case(CASE)],
                ..Default::default()
            },
        }
    }

    /// Screw with its own pastille `d{index}`
    pub(crate) fn screw(mut self, index: u32, head: [f64; 3]) -> Self {
        let s = screw(index, head);
        self.data.attachment_points.push(AttachmentPoint::pastille(
            &dot(index),
            CASE,
            s.head,
            Some(s.id.clone()),
        ));
        self.data.screws.push(s);
        self
    }

    /// Screw with no attachment point
    pub(crate) fn floating_screw(mut self, index: u32, head: [f64; 3]) -> Self {
        self.data.screws.push(screw(index, head));
        self
    }

    pub(crate) fn control_point(mut self, id: &str, at: [f64; 3]) -> Self {
        self.data
            .attachment_points
            .push(AttachmentPoint::control_point(id, CASE, Point3::from(at)));
        self
    }

    pub(crate) fn bone(mut self, index: u32, bone: &str) -> Self {
        self.data.anatomy.assign(sid(index), BoneId::new(bone));
        self
    }

    pub(crate) fn plate(self, id: &str, a: u32, b: u32) -> Self {
        self.connect(Connection::new(id, CASE, &dot(a), &dot(b), ConnectionKind::Plate))
    }

    pub(crate) fn link(self, id: &str, a: u32, b: u32) -> Self {
        self.connect(Connection::new(id, CASE, &dot(a), &dot(b), ConnectionKind::Link))
    }

    pub(crate) fn connect(mut self, connection: Connection) -> Self {
        self.data.connections.push(connection);
        self
    }

    pub(crate) fn data_mut(&mut self) -> &mut PlanData {
        &mut self.data
    }

    pub(crate) fn build(self) -> PlanSnapshot {
        PlanSnapshot::new(self.data)
    }
}

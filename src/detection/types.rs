//! Detection data types shared by the sidecar contract and the analyzer.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Violations the system can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationType {
    Smoking,
    Littering,
    Graffiti,
}

impl ViolationType {
    /// All recognised violation types, in class-id order of trained models.
    pub const ALL: [Self; 3] = [Self::Smoking, Self::Littering, Self::Graffiti];

    /// Returns the canonical name used by models and the ontology.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Smoking => "smoking",
            Self::Littering => "littering",
            Self::Graffiti => "graffiti",
        }
    }

    /// Looks a type up by its canonical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Returns the label shown to users.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Smoking => "Курение",
            Self::Littering => "Выброс мусора",
            Self::Graffiti => "Граффити",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Converts float `[x1, y1, x2, y2]` coordinates, truncating toward zero.
    #[must_use]
    pub fn from_xyxy(xyxy: [f64; 4]) -> Self {
        Self::new(
            xyxy[0] as i32,
            xyxy[1] as i32,
            xyxy[2] as i32,
            xyxy[3] as i32,
        )
    }

    /// Returns the center point using floor division.
    #[must_use]
    pub fn center(&self) -> (i32, i32) {
        let mid = |a: i32, b: i32| (i64::from(a) + i64::from(b)).div_euclid(2) as i32;
        (mid(self.x1, self.x2), mid(self.y1, self.y2))
    }

    #[must_use]
    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    /// Checks whether a point lies inside the box grown by `margin` on each side.
    #[must_use]
    pub fn contains_with_margin(&self, point: (i32, i32), margin: i32) -> bool {
        let (px, py) = (i64::from(point.0), i64::from(point.1));
        let margin = i64::from(margin);
        i64::from(self.x1) - margin <= px
            && px <= i64::from(self.x2) + margin
            && i64::from(self.y1) - margin <= py
            && py <= i64::from(self.y2) + margin
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// A detection as reported by the detector sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,

    /// Class name from the model, if the sidecar reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    pub confidence: f64,

    /// `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f64; 4],
}

/// One frame worth of detector output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Frame number assigned by the sidecar.
    #[serde(default)]
    pub frame: Option<u64>,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,

    /// Snapshot of the frame written by the sidecar.
    #[serde(default)]
    pub image: Option<PathBuf>,

    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// A detection with its class name resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    #[must_use]
    pub fn center(&self) -> (i32, i32) {
        self.bbox.center()
    }
}

/// A violation hypothesis before classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViolationCandidate {
    pub kind: ViolationType,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_type_names() {
        assert_eq!(ViolationType::from_name("smoking"), Some(ViolationType::Smoking));
        assert_eq!(ViolationType::from_name("Smoking"), None);
        assert_eq!(ViolationType::Graffiti.to_string(), "graffiti");
    }

    #[test]
    fn test_bbox_truncates_and_centers() {
        let bbox = BoundingBox::from_xyxy([10.9, 20.2, 101.7, 51.0]);
        assert_eq!(bbox, BoundingBox::new(10, 20, 101, 51));
        assert_eq!(bbox.center(), (55, 35));
        assert_eq!(bbox.height(), 31);
    }

    #[test]
    fn test_center_floors_negative_sums() {
        let bbox = BoundingBox::new(-3, -3, 0, 0);
        assert_eq!(bbox.center(), (-2, -2));
    }

    #[test]
    fn test_contains_with_margin_is_inclusive() {
        let bbox = BoundingBox::new(100, 100, 200, 300);
        assert!(bbox.contains_with_margin((50, 50), 50));
        assert!(bbox.contains_with_margin((250, 350), 50));
        assert!(!bbox.contains_with_margin((251, 200), 50));
    }

    #[test]
    fn test_huge_coordinates_saturate_without_overflow() {
        let bbox = BoundingBox::from_xyxy([3e9, -3e9, 3e9, 10.0]);
        assert_eq!(bbox, BoundingBox::new(i32::MAX, i32::MIN, i32::MAX, 10));
        assert_eq!(bbox.center(), (i32::MAX, (i32::MIN + 10).div_euclid(2)));
        assert_eq!(bbox.height(), 10 - i64::from(i32::MIN));
        assert!(bbox.contains_with_margin((i32::MAX, 0), 50));
        assert!(!BoundingBox::new(0, 0, 10, 10).contains_with_margin((i32::MAX, 0), 50));
    }

    #[test]
    fn test_frame_report_defaults() {
        let report: FrameReport = serde_json::from_str(
            r#"{"detections":[{"class_id":0,"confidence":0.9,"bbox":[0,0,10,10]}]}"#,
        )
        .unwrap();
        assert_eq!(report.frame, None);
        assert_eq!(report.detections[0].class_name, None);
    }
}

//! Class-name resolution for detector output.

use super::types::{BoundingBox, Detection, RawDetection};

/// The 80 COCO classes of generic YOLO models, by class id.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Resolves class ids to names.
///
/// Priority: explicit override list, then the name reported by the model,
/// then the COCO table for generic models, then the id itself.
#[derive(Debug, Clone, Default)]
pub struct ClassNames {
    overrides: Vec<String>,
    custom_model: bool,
}

impl ClassNames {
    #[must_use]
    pub const fn new(overrides: Vec<String>, custom_model: bool) -> Self {
        Self {
            overrides,
            custom_model,
        }
    }

    /// Returns the name for a class id.
    #[must_use]
    pub fn resolve(&self, class_id: u32, reported: Option<&str>) -> String {
        let index = class_id as usize;

        if !self.overrides.is_empty() {
            return self
                .overrides
                .get(index)
                .cloned()
                .unwrap_or_else(|| class_id.to_string());
        }

        if let Some(name) = reported.map(str::trim).filter(|name| !name.is_empty()) {
            return name.to_owned();
        }

        if !self.custom_model
            && let Some(name) = COCO_CLASSES.get(index)
        {
            return (*name).to_owned();
        }

        class_id.to_string()
    }

    /// Converts a raw sidecar detection into a resolved one.
    #[must_use]
    pub fn detection(&self, raw: &RawDetection) -> Detection {
        Detection {
            class_id: raw.class_id,
            class_name: self.resolve(raw.class_id, raw.class_name.as_deref()),
            confidence: raw.confidence,
            bbox: BoundingBox::from_xyxy(raw.bbox),
        }
    }

    /// Returns the id-to-name table in effect, for diagnostics.
    #[must_use]
    pub fn table(&self) -> Vec<String> {
        if !self.overrides.is_empty() {
            return self.overrides.clone();
        }
        if self.custom_model {
            return Vec::new();
        }
        COCO_CLASSES.iter().map(|name| (*name).to_owned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coco_lookup() {
        let names = ClassNames::new(Vec::new(), false);
        assert_eq!(names.resolve(0, None), "person");
        assert_eq!(names.resolve(67, None), "cell phone");
        assert_eq!(names.resolve(500, None), "500");
    }

    #[test]
    fn test_reported_name_wins_over_coco() {
        let names = ClassNames::new(Vec::new(), false);
        assert_eq!(names.resolve(0, Some("pedestrian")), "pedestrian");
        assert_eq!(names.resolve(0, Some("  ")), "person");
    }

    #[test]
    fn test_custom_model_without_names_uses_ids() {
        let names = ClassNames::new(Vec::new(), true);
        assert_eq!(names.resolve(1, None), "1");
        assert_eq!(names.resolve(1, Some("littering")), "littering");
        assert!(names.table().is_empty());
    }

    #[test]
    fn test_overrides_win() {
        let overrides = vec!["graffiti".to_owned(), "littering".to_owned(), "smoking".to_owned()];
        let names = ClassNames::new(overrides, true);
        assert_eq!(names.resolve(0, Some("smoking")), "graffiti");
        assert_eq!(names.resolve(2, None), "smoking");
        assert_eq!(names.resolve(3, Some("smoking")), "3");
    }

    #[test]
    fn test_detection_conversion() {
        let names = ClassNames::default();
        let raw = RawDetection {
            class_id: 41,
            class_name: None,
            confidence: 0.8,
            bbox: [1.5, 2.5, 11.9, 22.1],
        };
        let detection = names.detection(&raw);
        assert_eq!(detection.class_name, "cup");
        assert_eq!(detection.bbox, BoundingBox::new(1, 2, 11, 22));
    }
}

//! Violation analysis over resolved detections.
//!
//! Trained violation models report `smoking`/`littering`/`graffiti` classes
//! directly. Generic COCO models only see people and objects, so violations
//! are inferred from objects near each person:
//! - smoking: a phone-, cup- or cigarette-like object in the upper half of the person
//! - littering: a bottle, cup or bowl at the person's feet, boosted when it just appeared
//! - graffiti: not detectable without a trained model

use std::collections::VecDeque;

use tracing::debug;

use super::classes::ClassNames;
use super::types::{Detection, RawDetection, ViolationCandidate, ViolationType};

/// Frames of detections kept for appearance checks.
const HISTORY_LIMIT: usize = 10;

/// How many recent frames are searched when deciding if an object is new.
const HISTORY_LOOKBACK: usize = 3;

/// Pixel distance (per axis) within which an earlier object counts as the same one.
const HISTORY_DISTANCE: i64 = 100;

/// Minimum confidence for a person to be examined.
const PERSON_MIN_CONFIDENCE: f64 = 0.3;

/// How far around a person objects are still considered nearby.
const NEARBY_MARGIN: i32 = 50;

const SMOKING_INDICATORS: [&str; 6] = ["cell phone", "remote", "cigarette", "lighter", "cup", "bottle"];
const SMOKING_MIN_CONFIDENCE: f64 = 0.45;

const LITTER_OBJECTS: [&str; 3] = ["bottle", "cup", "bowl"];
const LITTER_FEET_OFFSET: i32 = 50;
const LITTER_MIN_CONFIDENCE: f64 = 0.5;

/// Result of analysing one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    /// All detections above the confidence threshold.
    pub detections: Vec<Detection>,
    /// Violations found on the frame.
    pub candidates: Vec<ViolationCandidate>,
}

/// Stateful violation analyzer. Keeps a short detection history across frames.
#[derive(Debug, Clone)]
pub struct ViolationAnalyzer {
    confidence_threshold: f64,
    custom_model: bool,
    class_names: ClassNames,
    history: VecDeque<Vec<Detection>>,
}

impl ViolationAnalyzer {
    /// Creates an analyzer.
    ///
    /// With `custom_model` the model's own violation classes are trusted,
    /// otherwise COCO heuristics are used.
    #[must_use]
    pub fn new(confidence_threshold: f64, custom_model: bool, class_overrides: Vec<String>) -> Self {
        Self {
            confidence_threshold,
            custom_model,
            class_names: ClassNames::new(class_overrides, custom_model),
            history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
        }
    }

    #[must_use]
    pub const fn is_custom_model(&self) -> bool {
        self.custom_model
    }

    #[must_use]
    pub const fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    /// Number of frames currently held in the history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Analyses one frame of raw detections and records it in the history.
    pub fn analyze(&mut self, raw: &[RawDetection]) -> FrameAnalysis {
        let detections: Vec<Detection> = raw
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .map(|d| self.class_names.detection(d))
            .collect();

        for detection in &detections {
            debug!(
                "Detected {} ({:.2}) at {}",
                detection.class_name, detection.confidence, detection.bbox
            );
        }

        let candidates = if self.custom_model {
            model_violations(&detections)
        } else {
            self.heuristic_violations(&detections)
        };

        self.history.push_back(detections.clone());
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }

        FrameAnalysis {
            detections,
            candidates,
        }
    }

    fn heuristic_violations(&self, detections: &[Detection]) -> Vec<ViolationCandidate> {
        let people: Vec<(usize, &Detection)> = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.class_name == "person" && d.confidence > PERSON_MIN_CONFIDENCE)
            .collect();

        debug!("People found: {}", people.len());
        if people.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (person_index, person) in people {
            let nearby: Vec<&Detection> = detections
                .iter()
                .enumerate()
                .filter(|(i, obj)| {
                    *i != person_index && person.bbox.contains_with_margin(obj.center(), NEARBY_MARGIN)
                })
                .map(|(_, obj)| obj)
                .collect();

            debug!(
                "Person at {} has {} nearby objects: {:?}",
                person.bbox,
                nearby.len(),
                nearby.iter().map(|o| o.class_name.as_str()).collect::<Vec<_>>()
            );

            if let Some(candidate) = check_smoking(person, &nearby) {
                debug!("Smoking detected with confidence {:.2}", candidate.confidence);
                candidates.push(candidate);
            }

            if let Some(candidate) = self.check_littering(person, &nearby) {
                debug!("Littering detected with confidence {:.2}", candidate.confidence);
                candidates.push(candidate);
            }
        }

        // Generic models cannot see spray cans or markers, so graffiti needs a trained model.
        candidates
    }

    fn check_littering(&self, person: &Detection, nearby: &[&Detection]) -> Option<ViolationCandidate> {
        let feet_region_y = person.bbox.y2.saturating_sub(LITTER_FEET_OFFSET);

        for obj in nearby {
            if !LITTER_OBJECTS.contains(&obj.class_name.as_str()) {
                continue;
            }
            if obj.center().1 <= feet_region_y || obj.confidence <= LITTER_MIN_CONFIDENCE {
                continue;
            }

            let mut confidence = obj.confidence * 0.8;
            if self.history.len() >= 2 && !self.seen_recently(obj) {
                confidence = (confidence * 1.1).min(0.75);
            }

            if confidence > LITTER_MIN_CONFIDENCE {
                return Some(ViolationCandidate {
                    kind: ViolationType::Littering,
                    confidence,
                    bbox: person.bbox,
                });
            }
        }

        None
    }

    /// Checks whether a similar object was present in the last few frames.
    fn seen_recently(&self, obj: &Detection) -> bool {
        let (cx, cy) = obj.center();
        self.history.iter().rev().take(HISTORY_LOOKBACK).any(|frame| {
            frame.iter().any(|prev| {
                let (px, py) = prev.center();
                prev.class_name == obj.class_name
                    && (i64::from(px) - i64::from(cx)).abs() < HISTORY_DISTANCE
                    && (i64::from(py) - i64::from(cy)).abs() < HISTORY_DISTANCE
            })
        })
    }
}

/// Trained models report violation classes directly.
fn model_violations(detections: &[Detection]) -> Vec<ViolationCandidate> {
    detections
        .iter()
        .filter_map(|d| {
            ViolationType::from_name(&d.class_name).map(|kind| ViolationCandidate {
                kind,
                confidence: d.confidence,
                bbox: d.bbox,
            })
        })
        .collect()
}

fn check_smoking(person: &Detection, nearby: &[&Detection]) -> Option<ViolationCandidate> {
    let bbox = person.bbox;
    let face_region_y = f64::from(bbox.y1) + bbox.height() as f64 * 0.5;

    for obj in nearby {
        if !SMOKING_INDICATORS.contains(&obj.class_name.as_str()) {
            continue;
        }
        if f64::from(obj.center().1) >= face_region_y {
            continue;
        }

        let confidence = match obj.class_name.as_str() {
            "remote" => (obj.confidence * 0.85).min(0.70),
            "cup" | "bottle" => (obj.confidence * 0.75).min(0.65),
            _ => (obj.confidence * 0.9).min(0.75),
        };

        if confidence > SMOKING_MIN_CONFIDENCE {
            return Some(ViolationCandidate {
                kind: ViolationType::Smoking,
                confidence,
                bbox,
            });
        }
        debug!(
            "{} near the face, but confidence is low: {:.2}",
            obj.class_name, confidence
        );
    }

    None
}

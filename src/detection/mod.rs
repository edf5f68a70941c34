mod analyzer;
mod classes;
mod detector;
mod feed;
mod types;

pub use analyzer::{FrameAnalysis, ViolationAnalyzer};
pub use classes::{COCO_CLASSES, ClassNames};
pub use detector::{CommandDetector, Detector, DetectorError, DetectorStream};
pub use feed::{FeedError, FrameFeed};
pub use types::{BoundingBox, Detection, FrameReport, RawDetection, ViolationCandidate, ViolationType};

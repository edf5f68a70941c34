//! Camera monitoring: the frame loop, its counters and evidence storage.

mod evidence;
mod runner;
mod state;

pub use evidence::{EvidenceError, EvidenceRecord, EvidenceStore, SavedEvidence};
pub use runner::{CameraMonitor, MonitorError, MonitorMessage, supervise};
pub use state::{MonitorState, MonitorSummary};

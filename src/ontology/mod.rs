//! Violation ontology module.
//!
//! Maps detected violation types to administrative code articles and fines.
//! Knowledge bases are Turtle (`.ttl`) or JSON files.

mod knowledge;
pub mod turtle;

pub use knowledge::{
    FineContext, Ontology, OntologyError, VMS_NAMESPACE, Violation, ViolationRecord,
};

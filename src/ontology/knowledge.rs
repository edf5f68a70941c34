//! Violation knowledge base: articles, fines and classification rules.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::turtle::{self, Term, Triple, TurtleError};
use crate::detection::ViolationType;

/// Namespace of violation individuals in Turtle knowledge bases.
pub const VMS_NAMESPACE: &str = "http://example.org/vms#";

/// Errors that can occur while loading or querying the knowledge base.
#[derive(Debug, Error)]
pub enum OntologyError {
    #[error(
        "Ontology file not found: {0}. Set ONTOLOGY_PATH in .env or place violations_ontology.ttl in the working directory."
    )]
    NotFound(PathBuf),

    #[error("Failed to read ontology file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse ontology JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Turtle(#[from] TurtleError),

    #[error("Ontology loaded, but no violation individuals were found")]
    NoViolations,

    #[error("Unknown violation type: {0}")]
    UnknownViolation(String),

    #[error("Violation type '{0}' is missing from the ontology")]
    MissingViolation(&'static str),

    #[error("Violation '{kind}' has an empty {field}")]
    EmptyField { kind: String, field: &'static str },

    #[error("Violation '{kind}' has an invalid fine amount: {amount}")]
    InvalidFine { kind: String, amount: f64 },
}

/// Knowledge about one violation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Administrative code article, e.g. "ст. 6.24 ч. 1 КоАП РФ".
    pub article: String,

    /// Human readable description.
    pub description: String,

    /// Base fine before context rules apply.
    pub fine_amount: f64,

    #[serde(default = "default_currency")]
    pub fine_currency: String,

    #[serde(default)]
    pub category: String,

    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_currency() -> String {
    "RUB".to_owned()
}

fn default_severity() -> String {
    "medium".to_owned()
}

/// Circumstances that adjust the base fine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FineContext {
    /// Detection confidence, copied into the resulting violation.
    pub confidence: Option<f64>,
    /// The offender was already fined for this.
    pub is_repeat: bool,
    /// The violation happened in a public place.
    pub public_place: bool,
    /// The damaged object is of historical value.
    pub historical_object: bool,
}

impl FineContext {
    /// Creates a context carrying only a detection confidence.
    #[must_use]
    pub const fn with_confidence(confidence: f64) -> Self {
        Self {
            confidence: Some(confidence),
            is_repeat: false,
            public_place: false,
            historical_object: false,
        }
    }
}

/// A fully classified violation.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub violation_type: String,
    pub article: String,
    pub description: String,
    pub fine_amount: f64,
    pub fine_currency: String,
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Local>,
    pub location: Option<String>,
    pub evidence_image_path: Option<PathBuf>,
    pub category: String,
    pub severity: String,
}

/// On-disk JSON representation.
#[derive(Debug, Serialize, Deserialize)]
struct OntologyFile {
    violations: BTreeMap<String, ViolationRecord>,
}

/// The violation knowledge base.
#[derive(Debug, Clone, PartialEq)]
pub struct Ontology {
    records: BTreeMap<String, ViolationRecord>,
}

impl Ontology {
    /// Creates a knowledge base from records.
    #[must_use]
    pub const fn new(records: BTreeMap<String, ViolationRecord>) -> Self {
        Self { records }
    }

    /// Loads a knowledge base, choosing the format by file extension.
    ///
    /// `.json` files are read as JSON, everything else as Turtle.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, malformed, or has no violations.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OntologyError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OntologyError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let ontology = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_turtle(&content)?
        };

        info!(
            "Ontology loaded: {} (types={})",
            path.display(),
            ontology.len()
        );
        Ok(ontology)
    }

    /// Parses a JSON knowledge base.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or empty.
    pub fn from_json(content: &str) -> Result<Self, OntologyError> {
        let file: OntologyFile = serde_json::from_str(content)?;
        if file.violations.is_empty() {
            return Err(OntologyError::NoViolations);
        }
        Ok(Self::new(file.violations))
    }

    /// Parses a Turtle knowledge base.
    ///
    /// Every subject in [`VMS_NAMESPACE`] that has an article, a description
    /// or a non-zero fine becomes an entry keyed by its local name.
    ///
    /// # Errors
    ///
    /// Returns an error if the Turtle is malformed or yields no entries.
    pub fn from_turtle(content: &str) -> Result<Self, OntologyError> {
        let triples = turtle::parse(content)?;

        // Subjects in first-seen order.
        let mut seen = HashSet::new();
        let subjects: Vec<&str> = triples
            .iter()
            .map(|t| t.subject.as_str())
            .filter(|s| seen.insert(*s))
            .collect();

        let text = |subject: &str, property: &str, default: &str| {
            first_object(&triples, subject, property)
                .map_or_else(|| default.to_owned(), Term::as_text)
        };

        let mut records = BTreeMap::new();
        for subject in subjects {
            let Some(local) = subject.strip_prefix(VMS_NAMESPACE) else {
                continue;
            };
            let key = local.trim();
            if key.is_empty() {
                continue;
            }

            let article = text(subject, "hasArticle", "");
            let description = text(subject, "hasDescription", "");
            let fine_amount = first_object(&triples, subject, "hasFineAmount")
                .and_then(Term::as_f64)
                .unwrap_or(0.0);

            if article.is_empty() && description.is_empty() && fine_amount == 0.0 {
                continue;
            }

            records.insert(
                key.to_owned(),
                ViolationRecord {
                    article,
                    description,
                    fine_amount,
                    fine_currency: text(subject, "hasCurrency", "RUB"),
                    category: text(subject, "hasCategory", ""),
                    severity: text(subject, "hasSeverity", "medium"),
                },
            );
        }

        if records.is_empty() {
            return Err(OntologyError::NoViolations);
        }
        Ok(Self::new(records))
    }

    /// Serializes the knowledge base as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, OntologyError> {
        let file = OntologyFile {
            violations: self.records.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Writes the knowledge base as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), OntologyError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Serializes the knowledge base as Turtle in the `vms:` vocabulary.
    #[must_use]
    pub fn to_turtle(&self) -> String {
        let mut out = format!("@prefix vms: <{VMS_NAMESPACE}> .\n");
        for (key, record) in &self.records {
            let _ = write!(
                out,
                "\nvms:{key} a vms:Violation ;\n    \
                 vms:hasArticle {} ;\n    \
                 vms:hasDescription {} ;\n    \
                 vms:hasFineAmount {} ;\n    \
                 vms:hasCurrency {} ;\n    \
                 vms:hasCategory {} ;\n    \
                 vms:hasSeverity {} .\n",
                turtle_string(&record.article),
                turtle_string(&record.description),
                turtle_number(record.fine_amount),
                turtle_string(&record.fine_currency),
                turtle_string(&record.category),
                turtle_string(&record.severity),
            );
        }
        out
    }

    /// Writes the knowledge base, as JSON for `.json` paths and Turtle otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OntologyError> {
        let path = path.as_ref();
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            return self.save_json(path);
        }
        std::fs::write(path, self.to_turtle())?;
        Ok(())
    }

    /// Classifies a violation and applies the fine adjustment rules.
    ///
    /// - repeat offence: fine x2
    /// - smoking in a public place: fine x1.5
    /// - graffiti on a historical object: fine x3
    ///
    /// # Errors
    ///
    /// Returns [`OntologyError::UnknownViolation`] for types not in the knowledge base.
    pub fn classify(
        &self,
        violation_type: &str,
        location: Option<&str>,
        context: &FineContext,
    ) -> Result<Violation, OntologyError> {
        let record = self
            .records
            .get(violation_type)
            .ok_or_else(|| OntologyError::UnknownViolation(violation_type.to_owned()))?;

        let mut fine_amount = record.fine_amount;
        if context.is_repeat {
            fine_amount *= 2.0;
        }
        if context.public_place && violation_type == ViolationType::Smoking.as_str() {
            fine_amount *= 1.5;
        }
        if context.historical_object && violation_type == ViolationType::Graffiti.as_str() {
            fine_amount *= 3.0;
        }

        Ok(Violation {
            violation_type: violation_type.to_owned(),
            article: record.article.clone(),
            description: record.description.clone(),
            fine_amount,
            fine_currency: record.fine_currency.clone(),
            confidence: context.confidence,
            timestamp: Local::now(),
            location: location.map(str::to_owned),
            evidence_image_path: None,
            category: record.category.clone(),
            severity: record.severity.clone(),
        })
    }

    /// Returns the record for a violation type.
    #[must_use]
    pub fn get(&self, violation_type: &str) -> Option<&ViolationRecord> {
        self.records.get(violation_type)
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ViolationRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Checks if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validates that every detectable violation type is present and well formed.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), OntologyError> {
        for kind in ViolationType::ALL {
            if !self.records.contains_key(kind.as_str()) {
                return Err(OntologyError::MissingViolation(kind.as_str()));
            }
        }
        self.records
            .iter()
            .try_for_each(|(key, record)| validate_record(key, record))
    }

    /// Returns validation results for every entry, in key order.
    #[must_use]
    pub fn validate_all(&self) -> Vec<(String, Result<(), OntologyError>)> {
        self.records
            .iter()
            .map(|(key, record)| (key.clone(), validate_record(key, record)))
            .collect()
    }

    /// Returns detectable violation types missing from the knowledge base.
    #[must_use]
    pub fn missing_types(&self) -> Vec<ViolationType> {
        ViolationType::ALL
            .into_iter()
            .filter(|kind| !self.records.contains_key(kind.as_str()))
            .collect()
    }

    /// Creates an example knowledge base for users to reference.
    #[must_use]
    pub fn example() -> Self {
        let record = |article: &str, description: &str, fine: f64, category: &str, severity: &str| {
            ViolationRecord {
                article: article.to_owned(),
                description: description.to_owned(),
                fine_amount: fine,
                fine_currency: default_currency(),
                category: category.to_owned(),
                severity: severity.to_owned(),
            }
        };

        let mut records = BTreeMap::new();
        records.insert(
            "smoking".to_owned(),
            record(
                "ст. 6.24 ч. 1 КоАП РФ",
                "Курение в неустановленном месте",
                500.0,
                "public_health",
                "medium",
            ),
        );
        records.insert(
            "littering".to_owned(),
            record(
                "ст. 8.2 КоАП РФ",
                "Выброс мусора в общественном месте",
                1000.0,
                "environment",
                "medium",
            ),
        );
        records.insert(
            "graffiti".to_owned(),
            record(
                "ст. 7.17 КоАП РФ",
                "Нанесение граффити на имущество",
                500.0,
                "property_damage",
                "high",
            ),
        );
        Self::new(records)
    }
}

/// Returns the first object of `vms:<property>` on a subject.
fn first_object<'a>(triples: &'a [Triple], subject: &str, property: &str) -> Option<&'a Term> {
    let predicate = format!("{VMS_NAMESPACE}{property}");
    triples
        .iter()
        .find(|t| t.subject == subject && t.predicate == predicate)
        .map(|t| &t.object)
}

/// Quotes a string literal for Turtle output.
fn turtle_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Writes a fine as a shortest round-trip Turtle decimal.
fn turtle_number(value: f64) -> String {
    if !value.is_finite() {
        return turtle_string(&value.to_string());
    }
    let text = value.to_string();
    if text.contains('.') { text } else { format!("{text}.0") }
}

fn validate_record(key: &str, record: &ViolationRecord) -> Result<(), OntologyError> {
    let empty = |field: &'static str| OntologyError::EmptyField {
        kind: key.to_owned(),
        field,
    };

    if record.article.trim().is_empty() {
        return Err(empty("article"));
    }
    if record.description.trim().is_empty() {
        return Err(empty("description"));
    }
    if record.fine_currency.trim().is_empty() {
        return Err(empty("currency"));
    }
    if !record.fine_amount.is_finite() || record.fine_amount < 0.0 {
        return Err(OntologyError::InvalidFine {
            kind: key.to_owned(),
            amount: record.fine_amount,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: &str = r#"
@prefix vms: <http://example.org/vms#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .

vms:Violation a rdfs:Class .

vms:smoking a vms:Violation ;
    vms:hasArticle "ст. 6.24 ч. 1 КоАП РФ" ;
    vms:hasDescription "Курение в неустановленном месте" ;
    vms:hasFineAmount 500.0 ;
    vms:hasCategory "public_health" .

vms:littering a vms:Violation ;
    vms:hasArticle "ст. 8.2 КоАП РФ" ;
    vms:hasDescription "Выброс мусора" ;
    vms:hasFineAmount "1000" ;
    vms:hasCurrency "RUB" ;
    vms:hasSeverity "low" .

vms:graffiti a vms:Violation ;
    vms:hasArticle "ст. 7.17 КоАП РФ" ;
    vms:hasDescription "Граффити" ;
    vms:hasFineAmount 500 .
"#;

    #[test]
    fn test_turtle_loading() {
        let ontology = Ontology::from_turtle(TTL).unwrap();
        assert_eq!(ontology.len(), 3);

        let smoking = ontology.get("smoking").unwrap();
        assert_eq!(smoking.article, "ст. 6.24 ч. 1 КоАП РФ");
        assert!((smoking.fine_amount - 500.0).abs() < f64::EPSILON);
        assert_eq!(smoking.fine_currency, "RUB");
        assert_eq!(smoking.severity, "medium");
        assert_eq!(smoking.category, "public_health");

        let littering = ontology.get("littering").unwrap();
        assert!((littering.fine_amount - 1000.0).abs() < f64::EPSILON);
        assert_eq!(littering.severity, "low");

        // The class declaration has no article, description or fine.
        assert!(ontology.get("Violation").is_none());
        assert!(ontology.validate().is_ok());
    }

    #[test]
    fn test_turtle_without_violations() {
        let err = Ontology::from_turtle("@prefix x: <urn:x#> .\nx:a x:b \"c\" .").unwrap_err();
        assert!(matches!(err, OntologyError::NoViolations));
    }

    #[test]
    fn test_json_matches_turtle() {
        let example = Ontology::example();
        let json = example.to_json().unwrap();
        let parsed = Ontology::from_json(&json).unwrap();
        assert_eq!(parsed, example);

        let parsed = Ontology::from_turtle(&example.to_turtle()).unwrap();
        assert_eq!(parsed, example);
    }

    #[test]
    fn test_turtle_output_escapes_quotes() {
        let mut records = BTreeMap::new();
        records.insert(
            "graffiti".to_owned(),
            ViolationRecord {
                article: "ст. 7.17 \"КоАП\"".to_owned(),
                description: "Граффити\\рисунок".to_owned(),
                fine_amount: 500.0,
                fine_currency: "RUB".to_owned(),
                category: String::new(),
                severity: "high".to_owned(),
            },
        );
        let ontology = Ontology::new(records);
        let parsed = Ontology::from_turtle(&ontology.to_turtle()).unwrap();
        assert_eq!(parsed, ontology);
    }

    #[test]
    fn test_turtle_keeps_fine_precision() {
        let mut ontology = Ontology::example();
        ontology.records.get_mut("smoking").unwrap().fine_amount = 499.95;

        let turtle = ontology.to_turtle();
        assert!(turtle.contains("vms:hasFineAmount 499.95 ;"));
        assert!(turtle.contains("vms:hasFineAmount 1000.0 ;"));
        assert_eq!(Ontology::from_turtle(&turtle).unwrap(), ontology);
    }

    #[test]
    fn test_turtle_long_and_escaped_literals() {
        let ttl = r#"
@prefix vms: <http://example.org/vms#> .

vms:smoking a vms:Violation ;
    vms:hasArticle '\u0441\u0442. 6.24 ч. 1 КоАП РФ' ;
    vms:hasDescription """Курение
в неустановленном месте""" ;
    vms:hasFineAmount 500 .
"#;
        let ontology = Ontology::from_turtle(ttl).unwrap();
        let smoking = ontology.get("smoking").unwrap();
        assert_eq!(smoking.article, "ст. 6.24 ч. 1 КоАП РФ");
        assert_eq!(smoking.description, "Курение\nв неустановленном месте");
    }

    #[test]
    fn test_save_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["kb.json", "kb.ttl"] {
            let path = dir.path().join(name);
            Ontology::example().save(&path).unwrap();
            assert_eq!(Ontology::load(&path).unwrap(), Ontology::example());
        }
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("violations.json");
        Ontology::example().save_json(&json_path).unwrap();
        assert_eq!(Ontology::load(&json_path).unwrap().len(), 3);

        let ttl_path = dir.path().join("violations_ontology.ttl");
        std::fs::write(&ttl_path, TTL).unwrap();
        assert_eq!(Ontology::load(&ttl_path).unwrap().len(), 3);

        let missing = Ontology::load(dir.path().join("nope.ttl")).unwrap_err();
        assert!(matches!(missing, OntologyError::NotFound(_)));
    }

    #[test]
    fn test_classify_base_fine() {
        let ontology = Ontology::example();
        let violation = ontology
            .classify("littering", Some("Камера 1"), &FineContext::with_confidence(0.62))
            .unwrap();

        assert_eq!(violation.violation_type, "littering");
        assert!((violation.fine_amount - 1000.0).abs() < f64::EPSILON);
        assert_eq!(violation.confidence, Some(0.62));
        assert_eq!(violation.location.as_deref(), Some("Камера 1"));
        assert!(violation.evidence_image_path.is_none());
    }

    #[test]
    fn test_classify_fine_rules() {
        let ontology = Ontology::example();

        let public = FineContext {
            public_place: true,
            ..FineContext::default()
        };
        let smoking = ontology.classify("smoking", None, &public).unwrap();
        assert!((smoking.fine_amount - 750.0).abs() < f64::EPSILON);

        // Public place only matters for smoking.
        let littering = ontology.classify("littering", None, &public).unwrap();
        assert!((littering.fine_amount - 1000.0).abs() < f64::EPSILON);

        let historical = FineContext {
            historical_object: true,
            ..FineContext::default()
        };
        let graffiti = ontology.classify("graffiti", None, &historical).unwrap();
        assert!((graffiti.fine_amount - 1500.0).abs() < f64::EPSILON);

        let repeat_public = FineContext {
            is_repeat: true,
            public_place: true,
            ..FineContext::default()
        };
        let smoking = ontology.classify("smoking", None, &repeat_public).unwrap();
        assert!((smoking.fine_amount - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classify_unknown() {
        let err = Ontology::example()
            .classify("jaywalking", None, &FineContext::default())
            .unwrap_err();
        assert!(matches!(err, OntologyError::UnknownViolation(t) if t == "jaywalking"));
    }

    #[test]
    fn test_validate_missing_type() {
        let mut records = BTreeMap::new();
        if let Some(record) = Ontology::example().get("smoking") {
            records.insert("smoking".to_owned(), record.clone());
        }
        let ontology = Ontology::new(records);

        assert!(matches!(
            ontology.validate(),
            Err(OntologyError::MissingViolation("littering"))
        ));
        assert_eq!(
            ontology.missing_types(),
            vec![ViolationType::Littering, ViolationType::Graffiti]
        );
    }

    #[test]
    fn test_validate_all_reports_each_entry() {
        let mut ontology = Ontology::example();
        if let Some(record) = ontology.records.get_mut("graffiti") {
            record.article.clear();
        }
        if let Some(record) = ontology.records.get_mut("smoking") {
            record.fine_amount = -1.0;
        }

        let results = ontology.validate_all();
        assert_eq!(results.len(), 3);
        assert!(matches!(
            &results[0],
            (key, Err(OntologyError::EmptyField { field: "article", .. })) if key == "graffiti"
        ));
        assert!(results[1].1.is_ok());
        assert!(matches!(&results[2].1, Err(OntologyError::InvalidFine { .. })));
    }
}

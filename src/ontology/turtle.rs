//! Turtle reading for violation knowledge bases.
//!
//! Parsing is done by `oxttl`. This module flattens its triples into the
//! small shape the knowledge base needs: IRI subjects and plain objects.
//! Blank-node subjects and objects carry no violation data and are dropped.

use oxrdf::vocab::xsd;
use oxrdf::{Literal, Subject, Term as RdfTerm};
use oxttl::TurtleParser;
use thiserror::Error;

/// Turtle syntax error as reported by the parser.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Turtle syntax error: {message}")]
pub struct TurtleError {
    pub message: String,
}

/// Object position of a triple.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Iri(String),
    Literal(String),
    Number(f64),
    Boolean(bool),
}

impl Term {
    /// Returns the term as plain text.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Iri(iri) | Self::Literal(iri) => iri.clone(),
            Self::Number(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }

    /// Returns the term as a number if it is numeric or a numeric string.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Literal(s) => s.trim().parse().ok(),
            Self::Iri(_) | Self::Boolean(_) => None,
        }
    }
}

/// A subject-predicate-object statement with expanded IRIs.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

/// Parses Turtle text into triples.
///
/// # Errors
///
/// Returns the first syntax error encountered.
pub fn parse(input: &str) -> Result<Vec<Triple>, TurtleError> {
    let mut triples = Vec::new();

    for triple in TurtleParser::new().for_slice(input.as_bytes()) {
        let triple = triple.map_err(|e| TurtleError {
            message: e.to_string(),
        })?;

        let Subject::NamedNode(subject) = triple.subject else {
            continue;
        };
        let object = match triple.object {
            RdfTerm::NamedNode(node) => Term::Iri(node.into_string()),
            RdfTerm::Literal(literal) => literal_term(&literal),
            _ => continue,
        };

        triples.push(Triple {
            subject: subject.into_string(),
            predicate: triple.predicate.into_string(),
            object,
        });
    }

    Ok(triples)
}

fn literal_term(literal: &Literal) -> Term {
    let value = literal.value();
    let datatype = literal.datatype().as_str();

    if datatype == xsd::BOOLEAN.as_str() {
        match value.trim() {
            "true" | "1" => return Term::Boolean(true),
            "false" | "0" => return Term::Boolean(false),
            _ => {}
        }
    }

    let numeric = [xsd::INTEGER, xsd::DECIMAL, xsd::DOUBLE, xsd::FLOAT];
    if numeric.iter().any(|kind| kind.as_str() == datatype)
        && let Ok(n) = value.trim().parse()
    {
        return Term::Number(n);
    }

    Term::Literal(value.to_owned())
}

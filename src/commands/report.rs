//! Summary of a photo analysis.

use std::collections::BTreeMap;

use crate::detection::{ViolationCandidate, ViolationType};
use crate::ontology::{FineContext, Ontology, OntologyError, Violation};

/// Maximum number of violation lines in a reply.
const MAX_LINES: usize = 3;

pub const NO_VIOLATIONS_TEXT: &str = "✅ Нарушений не обнаружено";
const VIOLATIONS_HEADER: &str = "✅ Обнаружены нарушения:";

/// Classified violations of one photo, strongest first.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    violations: Vec<Violation>,
}

impl AnalysisReport {
    /// Keeps the best candidate per violation type and classifies the strongest ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a violation type is missing from the knowledge base.
    pub fn build(
        candidates: &[ViolationCandidate],
        ontology: &Ontology,
        location: &str,
    ) -> Result<Self, OntologyError> {
        let mut best: BTreeMap<ViolationType, f64> = BTreeMap::new();
        for candidate in candidates {
            best.entry(candidate.kind)
                .and_modify(|c| *c = c.max(candidate.confidence))
                .or_insert(candidate.confidence);
        }

        let mut ordered: Vec<(ViolationType, f64)> = best.into_iter().collect();
        ordered.sort_by(|a, b| b.1.total_cmp(&a.1));
        ordered.truncate(MAX_LINES);

        let violations = ordered
            .into_iter()
            .map(|(kind, confidence)| {
                ontology.classify(
                    kind.as_str(),
                    Some(location),
                    &FineContext::with_confidence(confidence),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { violations })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Plain-text reply.
    #[must_use]
    pub fn render(&self) -> String {
        if self.violations.is_empty() {
            return NO_VIOLATIONS_TEXT.to_owned();
        }

        let mut lines = vec![VIOLATIONS_HEADER.to_owned()];
        lines.extend(self.violations.iter().map(|v| {
            format!(
                "- {}: {:.1}% | {} | {:.0} {}",
                v.description,
                v.confidence.unwrap_or_default() * 100.0,
                v.article,
                v.fine_amount,
                v.fine_currency
            )
        }));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn candidate(kind: ViolationType, confidence: f64) -> ViolationCandidate {
        ViolationCandidate {
            kind,
            confidence,
            bbox: BoundingBox::new(0, 0, 10, 10),
        }
    }

    #[test]
    fn test_empty_report() {
        let report = AnalysisReport::build(&[], &Ontology::example(), "test").unwrap();
        assert!(report.is_empty());
        assert_eq!(report.render(), "✅ Нарушений не обнаружено");
    }

    #[test]
    fn test_best_per_type_sorted_descending() {
        let candidates = [
            candidate(ViolationType::Smoking, 0.55),
            candidate(ViolationType::Littering, 0.62),
            candidate(ViolationType::Smoking, 0.72),
            candidate(ViolationType::Graffiti, 0.51),
        ];
        let report = AnalysisReport::build(&candidates, &Ontology::example(), "test").unwrap();

        let kinds: Vec<&str> = report
            .violations()
            .iter()
            .map(|v| v.violation_type.as_str())
            .collect();
        assert_eq!(kinds, vec!["smoking", "littering", "graffiti"]);
        assert_eq!(report.violations()[0].confidence, Some(0.72));
    }

    #[test]
    fn test_render_lines() {
        let candidates = [
            candidate(ViolationType::Littering, 0.616),
            candidate(ViolationType::Smoking, 0.72),
        ];
        let report = AnalysisReport::build(&candidates, &Ontology::example(), "test").unwrap();

        assert_eq!(
            report.render(),
            "✅ Обнаружены нарушения:\n\
             - Курение в неустановленном месте: 72.0% | ст. 6.24 ч. 1 КоАП РФ | 500 RUB\n\
             - Выброс мусора в общественном месте: 61.6% | ст. 8.2 КоАП РФ | 1000 RUB"
        );
    }

    #[test]
    fn test_unknown_type_is_error() {
        let ontology = Ontology::new(BTreeMap::new());
        let result = AnalysisReport::build(&[candidate(ViolationType::Smoking, 0.9)], &ontology, "test");
        assert!(matches!(result, Err(OntologyError::UnknownViolation(_))));
    }
}

//! # BIO Labels for Named Entity Recognition
//!
//! Parses `B-XXX` / `I-XXX` / `O` label strings and groups tagged tokens into
//! entity spans.

use std::fmt;

/// A label in the BIO (Begin-Inside-Outside) scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BioLabel {
    Begin(String),
    Inside(String),
    Outside,
}

impl BioLabel {
    /// Parse a label string. Anything without a `B-` or `I-` prefix is
    /// treated as outside.
    pub fn parse(label: &str) -> Self {
        if let Some(kind) = label.strip_prefix("B-") {
            BioLabel::Begin(kind.to_string())
        } else if let Some(kind) = label.strip_prefix("I-") {
            BioLabel::Inside(kind.to_string())
        } else {
            BioLabel::Outside
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, BioLabel::Inside(_))
    }

    /// The entity type (e.g. `PER`), or `None` for outside.
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            BioLabel::Begin(kind) | BioLabel::Inside(kind) => Some(kind),
            BioLabel::Outside => None,
        }
    }

    /// Check if `to` may follow `from`.
    ///
    /// An inside label must continue an entity of the same type.
    pub fn is_valid_transition(from: &BioLabel, to: &BioLabel) -> bool {
        match to {
            BioLabel::Inside(kind) => from.entity_type() == Some(kind.as_str()),
            _ => true,
        }
    }
}

impl fmt::Display for BioLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BioLabel::Begin(kind) => write!(f, "B-{kind}"),
            BioLabel::Inside(kind) => write!(f, "I-{kind}"),
            BioLabel::Outside => write!(f, "O"),
        }
    }
}

/// An extracted entity with token indices (`end_token` is exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub entity_type: String,
    pub start_token: usize,
    pub end_token: usize,
    pub text: String,
}

/// Group tagged tokens into entities.
///
/// An entity starts at a `B-` label, or at an `I-` label that does not
/// continue the previous entity, and extends over following `I-` labels of
/// the same type.
pub fn extract_entities<S: AsRef<str>, T: AsRef<str>>(tokens: &[S], tags: &[T]) -> Vec<Entity> {
    let labels: Vec<BioLabel> = tags.iter().map(|t| BioLabel::parse(t.as_ref())).collect();
    let len = tokens.len().min(labels.len());

    let mut entities = Vec::new();
    let mut i = 0;

    while i < len {
        let Some(kind) = labels[i].entity_type() else {
            i += 1;
            continue;
        };

        let start = i;
        i += 1;
        while i < len
            && labels[i].is_inside()
            && BioLabel::is_valid_transition(&labels[i - 1], &labels[i])
        {
            i += 1;
        }

        let text = tokens[start..i]
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");

        entities.push(Entity {
            entity_type: kind.to_string(),
            start_token: start,
            end_token: i,
            text,
        });
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_roundtrip() {
        for raw in ["B-PER", "I-LOC", "O"] {
            assert_eq!(BioLabel::parse(raw).to_string(), raw);
        }
        assert_eq!(BioLabel::parse("MISC"), BioLabel::Outside);
    }

    #[test]
    fn test_valid_transitions() {
        let b_per = BioLabel::parse("B-PER");
        let i_per = BioLabel::parse("I-PER");
        let i_loc = BioLabel::parse("I-LOC");
        let o = BioLabel::Outside;

        assert!(BioLabel::is_valid_transition(&b_per, &i_per));
        assert!(BioLabel::is_valid_transition(&i_per, &i_per));
        assert!(BioLabel::is_valid_transition(&o, &b_per));
        assert!(!BioLabel::is_valid_transition(&o, &i_per));
        assert!(!BioLabel::is_valid_transition(&i_per, &i_loc));
    }

    #[test]
    fn test_extract_entities() {
        let tokens = ["Jens", "Peter", "Hansen", "bor", "i", "Aarhus"];
        let tags = ["B-PER", "I-PER", "I-PER", "O", "O", "B-LOC"];

        let entities = extract_entities(&tokens, &tags);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_type, "PER");
        assert_eq!(entities[0].text, "Jens Peter Hansen");
        assert_eq!((entities[0].start_token, entities[0].end_token), (0, 3));
        assert_eq!(entities[1].text, "Aarhus");
    }

    #[test]
    fn test_extract_entities_type_switch() {
        let tokens = ["a", "b", "c"];
        let tags = ["B-ORG", "I-LOC", "I-LOC"];

        let entities = extract_entities(&tokens, &tags);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_type, "ORG");
        assert_eq!(entities[1].entity_type, "LOC");
        assert_eq!(entities[1].text, "b c");
    }

    #[test]
    fn test_extract_entities_inside_after_outside_starts_entity() {
        let tokens = ["x", "Novo", "Nordisk", "y", "z"];
        let tags = ["O", "I-ORG", "I-ORG", "O", "I-MISC"];

        let entities = extract_entities(&tokens, &tags);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].text, "Novo Nordisk");
        assert_eq!((entities[1].start_token, entities[1].end_token), (4, 5));
    }
}

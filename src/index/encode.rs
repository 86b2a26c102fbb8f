//! Document encoding.
//!
//! Turns a [`Document`] into index terms. The payload is always stored
//! verbatim; scalars are additionally projected into typed families so they
//! can be searched by field:
//!
//! ```text
//! FieldValue            family   encoded as
//! ────────────────────  ───────  ─────────────────────────────
//! Bool(true/false)      long     i64 point 1 / 0
//! Int(i)                long     i64 point i
//! Float(f)              double   f64 point f (-0.0 as 0.0)
//! Char(c)               exact    c
//! Str("hello")          exact    hello
//! Str("hello world")    text     hello, world (one term each)
//! Null, Bytes           -        omitted
//! Float(NaN / ±inf)     -        omitted
//! ```

use super::schema::{json_path, projected_term, text_analyzer, IndexFields};
use crate::document::{Document, FieldValue};
use crate::error::{StoreError, StoreResult};
use std::collections::BTreeMap;
use tantivy::schema::{Field, OwnedValue};
use tantivy::tokenizer::{Token, TokenStream};
use tantivy::{TantivyDocument, Term};

/// Term family a scalar is projected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    Long,
    Double,
    Exact,
    Text,
}

impl Family {
    pub fn field(self, fields: &IndexFields) -> Field {
        match self {
            Family::Long => fields.long,
            Family::Double => fields.double,
            Family::Exact => fields.exact,
            Family::Text => fields.text,
        }
    }
}

/// The typed, indexable form of one document scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexedField {
    Long(i64),
    Double(f64),
    Exact(String),
    Text(String),
}

/// Picks the encoding for a scalar. Returns `None` for values that are not
/// indexed (null, raw bytes and non-finite floats).
pub fn classify(value: &FieldValue) -> Option<IndexedField> {
    match value {
        FieldValue::Bool(b) => Some(IndexedField::Long(i64::from(*b))),
        FieldValue::Int(i) => Some(IndexedField::Long(*i)),
        FieldValue::Float(f) if f.is_finite() => Some(IndexedField::Double(canonical_double(*f))),
        FieldValue::Char(c) => Some(IndexedField::Exact(c.to_string())),
        FieldValue::Str(s) if s.chars().any(char::is_whitespace) => {
            Some(IndexedField::Text(s.clone()))
        }
        FieldValue::Str(s) => Some(IndexedField::Exact(s.clone())),
        FieldValue::Float(_) | FieldValue::Null | FieldValue::Bytes(_) => None,
    }
}

/// -0.0 and 0.0 compare equal, so they must share a point.
fn canonical_double(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = text_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    stream.process(&mut |token: &Token| tokens.push(token.text.clone()));
    tokens
}

/// One searchable unit of a projected document.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedTerm {
    Long { name: String, value: i64 },
    Double { name: String, value: f64 },
    /// `name` + separator + whole value
    Exact(String),
    /// `name` + separator + one token
    Text(String),
}

impl ProjectedTerm {
    pub fn family(&self) -> Family {
        match self {
            ProjectedTerm::Long { .. } => Family::Long,
            ProjectedTerm::Double { .. } => Family::Double,
            ProjectedTerm::Exact(_) => Family::Exact,
            ProjectedTerm::Text(_) => Family::Text,
        }
    }

    /// Index terms any one of which satisfies this unit.
    ///
    /// The engine may narrow a JSON number to the smallest numeric type
    /// holding it, so numeric units also accept the narrower encodings.
    pub fn index_terms(&self, fields: &IndexFields) -> Vec<Term> {
        let field = self.family().field(fields);
        match self {
            ProjectedTerm::Long { name, value } => {
                let mut terms = vec![numeric_term(field, name, *value)];
                if let Ok(unsigned) = u64::try_from(*value) {
                    terms.push(numeric_term(field, name, unsigned));
                }
                terms
            }
            ProjectedTerm::Double { name, value } => {
                let mut terms = vec![numeric_term(field, name, *value)];
                if value.fract() == 0.0 && value.abs() < 9.0e15 {
                    let whole = *value as i64;
                    terms.push(numeric_term(field, name, whole));
                    if let Ok(unsigned) = u64::try_from(whole) {
                        terms.push(numeric_term(field, name, unsigned));
                    }
                }
                terms
            }
            ProjectedTerm::Exact(term) | ProjectedTerm::Text(term) => {
                vec![Term::from_field_text(field, term)]
            }
        }
    }
}

fn numeric_term<T: tantivy::fastfield::FastValue>(field: Field, name: &str, value: T) -> Term {
    let mut term = Term::from_field_json_path(field, &json_path(name), false);
    term.append_type_and_fast_value(value);
    term
}

/// Projected terms for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    terms: Vec<ProjectedTerm>,
}

impl Projection {
    /// Projects every indexable scalar of `doc`.
    pub fn of(doc: &Document) -> Self {
        let mut terms = Vec::new();

        for (name, value) in doc.iter() {
            match classify(value) {
                Some(IndexedField::Long(value)) => terms.push(ProjectedTerm::Long {
                    name: name.to_string(),
                    value,
                }),
                Some(IndexedField::Double(value)) => terms.push(ProjectedTerm::Double {
                    name: name.to_string(),
                    value,
                }),
                Some(IndexedField::Exact(s)) => {
                    terms.push(ProjectedTerm::Exact(projected_term(name, &s)))
                }
                Some(IndexedField::Text(s)) => {
                    for token in tokenize(&s) {
                        terms.push(ProjectedTerm::Text(projected_term(name, &token)));
                    }
                }
                None => {}
            }
        }

        Self { terms }
    }

    pub fn terms(&self) -> impl Iterator<Item = &ProjectedTerm> {
        self.terms.iter()
    }

    pub fn contains(&self, term: &ProjectedTerm) -> bool {
        self.terms.iter().any(|t| t == term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// What a field search should match.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMatch {
    /// Every token of the string appears in a full-text field
    Token(String),
    /// A whitespace-free string or char field equals the value
    Exact(String),
    /// An integer or boolean field equals the value (booleans are 1 / 0)
    Long(i64),
    /// A float field equals the value; must be finite
    Double(f64),
}

impl FieldMatch {
    /// The units a record must carry, all of them, to match on field `name`.
    pub fn terms(&self, name: &str) -> StoreResult<Vec<ProjectedTerm>> {
        if name.is_empty() || name.chars().any(char::is_control) {
            return Err(StoreError::InvalidQuery(format!(
                "field name {:?} is not searchable",
                name
            )));
        }

        let terms = match self {
            FieldMatch::Long(value) => vec![ProjectedTerm::Long {
                name: name.to_string(),
                value: *value,
            }],
            FieldMatch::Double(value) if value.is_finite() => vec![ProjectedTerm::Double {
                name: name.to_string(),
                value: canonical_double(*value),
            }],
            FieldMatch::Double(value) => {
                return Err(StoreError::InvalidQuery(format!(
                    "{} is not indexed, only finite floats are",
                    value
                )))
            }
            FieldMatch::Exact(s) => vec![ProjectedTerm::Exact(projected_term(name, s))],
            FieldMatch::Token(s) => {
                let terms: Vec<ProjectedTerm> = tokenize(s)
                    .iter()
                    .map(|token| ProjectedTerm::Text(projected_term(name, token)))
                    .collect();
                if terms.is_empty() {
                    return Err(StoreError::InvalidQuery(format!(
                        "{:?} contains no searchable tokens",
                        s
                    )));
                }
                terms
            }
        };

        Ok(terms)
    }
}

/// Builds the index record for one entry.
pub fn build_record(
    fields: &IndexFields,
    space: &str,
    key: &str,
    composite: &str,
    payload: &[u8],
    projection: Option<&Projection>,
) -> TantivyDocument {
    let mut record = TantivyDocument::default();
    record.add_text(fields.space, space);
    record.add_text(fields.key, key);
    record.add_text(fields.id, composite);
    record.add_bytes(fields.payload, payload);

    let Some(projection) = projection else {
        return record;
    };

    let mut longs = BTreeMap::new();
    let mut doubles = BTreeMap::new();
    for term in projection.terms() {
        match term {
            ProjectedTerm::Long { name, value } => {
                longs.insert(name.clone(), OwnedValue::I64(*value));
            }
            ProjectedTerm::Double { name, value } => {
                doubles.insert(name.clone(), OwnedValue::F64(*value));
            }
            ProjectedTerm::Exact(text) => record.add_text(fields.exact, text),
            ProjectedTerm::Text(text) => record.add_text(fields.text, text),
        }
    }
    if !longs.is_empty() {
        record.add_object(fields.long, longs);
    }
    if !doubles.is_empty() {
        record.add_object(fields.double, doubles);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::build_schema;

    fn long(name: &str, value: i64) -> ProjectedTerm {
        ProjectedTerm::Long {
            name: name.to_string(),
            value,
        }
    }

    fn double(name: &str, value: f64) -> ProjectedTerm {
        ProjectedTerm::Double {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&true.into()), Some(IndexedField::Long(1)));
        assert_eq!(classify(&false.into()), Some(IndexedField::Long(0)));
        assert_eq!(classify(&36u8.into()), Some(IndexedField::Long(36)));
        assert_eq!(classify(&1.5f32.into()), Some(IndexedField::Double(1.5)));
        assert_eq!(
            classify(&'x'.into()),
            Some(IndexedField::Exact("x".to_string()))
        );
        assert_eq!(
            classify(&"hello".into()),
            Some(IndexedField::Exact("hello".to_string()))
        );
        assert_eq!(
            classify(&"hello world".into()),
            Some(IndexedField::Text("hello world".to_string()))
        );
        assert_eq!(classify(&FieldValue::Null), None);
        assert_eq!(classify(&vec![1u8, 2, 3].into()), None);
        assert_eq!(classify(&f64::NAN.into()), None);
        assert_eq!(classify(&f64::NEG_INFINITY.into()), None);
    }

    #[test]
    fn test_projection() {
        let doc = Document::new()
            .with("name", "Ada Lovelace")
            .with("age", 36)
            .with("active", true)
            .with("score", 9.5)
            .with("nick", "ada")
            .with("avatar", vec![0u8, 1])
            .with("manager", FieldValue::Null)
            .with("ratio", f64::NAN);

        let projection = Projection::of(&doc);

        assert!(projection.contains(&long("age", 36)));
        assert!(projection.contains(&long("active", 1)));
        assert!(projection.contains(&double("score", 9.5)));
        assert!(projection.contains(&ProjectedTerm::Exact("nick\u{1f}ada".into())));
        assert!(projection.contains(&ProjectedTerm::Text("name\u{1f}ada".into())));
        assert!(projection.contains(&ProjectedTerm::Text("name\u{1f}lovelace".into())));
        assert!(!projection.contains(&ProjectedTerm::Exact("name\u{1f}Ada Lovelace".into())));
        assert_eq!(projection.len(), 6);
    }

    #[test]
    fn test_field_match_terms() {
        let terms = FieldMatch::Token("Hello".into()).terms("bio").unwrap();
        assert_eq!(terms, vec![ProjectedTerm::Text("bio\u{1f}hello".into())]);

        let terms = FieldMatch::Double(-0.0).terms("score").unwrap();
        assert_eq!(terms, vec![double("score", 0.0)]);
        assert!(terms[0] == double("score", -0.0));

        assert!(matches!(
            FieldMatch::Exact("x".into()).terms(""),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            FieldMatch::Token("  ".into()).terms("bio"),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            FieldMatch::Double(f64::NAN).terms("score"),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_numeric_units_are_typed_points() {
        let (_, fields) = build_schema();

        let terms = long("age", 36).index_terms(&fields);
        assert_eq!(terms.len(), 2);
        assert!(terms.iter().all(|t| t.field() == fields.long));
        assert_ne!(terms[0], terms[1]);

        // Negative values have no unsigned form
        assert_eq!(long("delta", -4).index_terms(&fields).len(), 1);

        let terms = double("score", 9.5).index_terms(&fields);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].field(), fields.double);
        assert_eq!(double("score", 7.0).index_terms(&fields).len(), 3);

        // Same value, different field name, different point
        assert_ne!(
            long("age", 36).index_terms(&fields)[0],
            long("size", 36).index_terms(&fields)[0]
        );
    }
}

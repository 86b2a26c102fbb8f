//! Fixed index schema.
//!
//! Every record carries its addressing fields and the stored payload. Document
//! scalars are projected into four fields, one per encoding family.
//!
//! Numbers go into JSON object fields keyed by document field name, so
//! `age = 36` is the 64-bit integer point `age: 36` of the `long` field and
//! can be searched by value or by range. Strings go into multi-valued term
//! fields where a term is the document field name and the value joined by
//! [`TERM_SEPARATOR`], so `nick = "ada"` becomes the `exact` term
//! `nick\u{1f}ada`.
//!
//! | field      | terms                               | stored |
//! |------------|-------------------------------------|--------|
//! | `space`    | the space                           | yes    |
//! | `key`      | the key                             | yes    |
//! | `entry_id` | `space:key`, unique lookup term     | no     |
//! | `payload`  | none                                | yes    |
//! | `long`     | name → i64 point                    | no     |
//! | `double`   | name → f64 point                    | no     |
//! | `exact`    | name + whole string                 | no     |
//! | `text`     | name + each token of the string     | no     |

use tantivy::schema::{
    Field, IndexRecordOption, JsonObjectOptions, Schema, TextFieldIndexing, STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer};

pub const SPACE_FIELD: &str = "space";
pub const KEY_FIELD: &str = "key";
pub const ID_FIELD: &str = "entry_id";
pub const PAYLOAD_FIELD: &str = "payload";
pub const LONG_FIELD: &str = "long";
pub const DOUBLE_FIELD: &str = "double";
pub const EXACT_FIELD: &str = "exact";
pub const TEXT_FIELD: &str = "text";

/// Joins a document field name to its encoded value inside a projected term.
pub const TERM_SEPARATOR: char = '\u{1f}';

/// Tokens longer than this are dropped from full-text projections.
const MAX_TOKEN_LEN: usize = 40;

/// Handles to the schema's fields.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub space: Field,
    pub key: Field,
    pub id: Field,
    pub payload: Field,
    pub long: Field,
    pub double: Field,
    pub exact: Field,
    pub text: Field,
}

/// Builds the schema shared by every index.
pub fn build_schema() -> (Schema, IndexFields) {
    let mut builder = Schema::builder();

    let space = builder.add_text_field(SPACE_FIELD, STRING | STORED);
    let key = builder.add_text_field(KEY_FIELD, STRING | STORED);
    let id = builder.add_text_field(ID_FIELD, STRING);
    let payload = builder.add_bytes_field(PAYLOAD_FIELD, STORED);

    let long = builder.add_json_field(LONG_FIELD, numeric_points());
    let double = builder.add_json_field(DOUBLE_FIELD, numeric_points());
    let exact = builder.add_text_field(EXACT_FIELD, STRING);
    let text = builder.add_text_field(TEXT_FIELD, STRING);

    let fields = IndexFields {
        space,
        key,
        id,
        payload,
        long,
        double,
        exact,
        text,
    };

    (builder.build(), fields)
}

/// Indexed, unstored JSON objects holding only numbers.
fn numeric_points() -> JsonObjectOptions {
    JsonObjectOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::Basic),
    )
}

/// Escapes a document field name for use as a JSON path.
///
/// Field names are single path segments; dots inside them are literal.
pub fn json_path(name: &str) -> String {
    let mut path = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '.' || c == '\\' {
            path.push('\\');
        }
        path.push(c);
    }
    path
}

/// The analyzer used to split full-text values into tokens.
///
/// Same chain as the index engine's `default` tokenizer: split on
/// non-alphanumerics, drop very long tokens, lowercase.
pub fn text_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .build()
}

/// Builds the projected term for `name` and an encoded value.
pub fn projected_term(name: &str, encoded: &str) -> String {
    let mut term = String::with_capacity(name.len() + encoded.len() + 1);
    term.push_str(name);
    term.push(TERM_SEPARATOR);
    term.push_str(encoded);
    term
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_deterministic() {
        let (first, _) = build_schema();
        let (second, _) = build_schema();
        assert_eq!(first, second);
    }

    #[test]
    fn test_field_names() {
        let (schema, fields) = build_schema();
        assert_eq!(schema.get_field_name(fields.id), ID_FIELD);
        assert_eq!(schema.get_field_name(fields.text), TEXT_FIELD);
        assert_eq!(schema.get_field(SPACE_FIELD).unwrap(), fields.space);
    }

    #[test]
    fn test_numeric_fields_are_json_points() {
        use tantivy::schema::FieldType;

        let (schema, fields) = build_schema();
        for field in [fields.long, fields.double] {
            match schema.get_field_entry(field).field_type() {
                FieldType::JsonObject(options) => {
                    assert!(options.get_text_indexing_options().is_some());
                    assert!(!options.is_stored());
                }
                other => panic!("expected a JSON field, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_json_path_escapes_dots() {
        assert_eq!(json_path("age"), "age");
        assert_eq!(json_path("address.city"), "address\\.city");
        assert_eq!(json_path("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_projected_term() {
        assert_eq!(projected_term("age", "36"), "age\u{1f}36");
    }
}

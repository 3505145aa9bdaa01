use crate::error::{IndexError, IndexResult};
use crate::language::ANALYZER_NAME;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, SchemaBuilder, TantivyDocument, TextFieldIndexing,
    TextOptions, STORED, STRING,
};

pub const UID: &str = "uid";
pub const ITEM_ID: &str = "item_id";
pub const ITEM_TYPE: &str = "item_type";
pub const TITLE: &str = "title";
pub const TITLE_KEY: &str = "title_key";
pub const BODY: &str = "body";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";
pub const ATTRIBUTES: &str = "attributes";

/// Storage, tokenization and boost policy of an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Tokenized, stored, highest relevance weight.
    Title,
    /// Tokenized, stored.
    Body,
    /// Indexed as a single raw term, stored.
    Exact,
    /// Stored for retrieval, never searched.
    Opaque,
}

impl FieldKind {
    pub fn stored(self) -> bool {
        true
    }

    pub fn indexed(self) -> bool {
        !matches!(self, FieldKind::Opaque)
    }

    pub fn tokenized(self) -> bool {
        matches!(self, FieldKind::Title | FieldKind::Body)
    }

    pub fn boost(self) -> f32 {
        match self {
            FieldKind::Title => 2.0,
            FieldKind::Body | FieldKind::Exact => 1.0,
            FieldKind::Opaque => 0.0,
        }
    }

    pub fn field(self, name: &'static str, value: impl Into<String>) -> IndexField {
        IndexField {
            name,
            kind: self,
            value: value.into(),
        }
    }

    fn text_options(self) -> TextOptions {
        match self {
            FieldKind::Title | FieldKind::Body => TextOptions::default()
                .set_indexing_options(
                    TextFieldIndexing::default()
                        .set_tokenizer(ANALYZER_NAME)
                        .set_index_option(IndexRecordOption::WithFreqsAndPositions),
                )
                .set_stored(),
            FieldKind::Exact => STRING | STORED,
            FieldKind::Opaque => TextOptions::default().set_stored(),
        }
    }
}

/// Every field a document may carry, with its fixed kind.
pub const DOCUMENT_FIELDS: &[(&str, FieldKind)] = &[
    (UID, FieldKind::Exact),
    (ITEM_ID, FieldKind::Exact),
    (ITEM_TYPE, FieldKind::Exact),
    (TITLE, FieldKind::Title),
    (TITLE_KEY, FieldKind::Exact),
    (BODY, FieldKind::Body),
    (CREATED, FieldKind::Opaque),
    (MODIFIED, FieldKind::Opaque),
    (ATTRIBUTES, FieldKind::Opaque),
];

pub fn kind_of(name: &str) -> Option<FieldKind> {
    DOCUMENT_FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub value: String,
}

/// The fields produced for one entity. Built fresh, never edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDocument {
    fields: Vec<IndexField>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    pub fn to_tantivy(&self, schema: &Schema) -> IndexResult<TantivyDocument> {
        let mut doc = TantivyDocument::new();
        for field in &self.fields {
            let handle = schema
                .get_field(field.name)
                .map_err(|_| IndexError::FieldNotFound(field.name.to_string()))?;
            doc.add_text(handle, &field.value);
        }
        Ok(doc)
    }
}

pub fn build_schema() -> Schema {
    let mut builder = SchemaBuilder::default();
    for (name, kind) in DOCUMENT_FIELDS {
        builder.add_text_field(name, kind.text_options());
    }
    builder.build()
}

#[derive(Debug, Clone)]
pub struct IndexFields {
    pub uid: Field,
    pub item_id: Field,
    pub item_type: Field,
    pub title: Field,
    pub title_key: Field,
    pub body: Field,
    pub modified: Field,
}

impl IndexFields {
    pub fn resolve(schema: &Schema) -> IndexResult<Self> {
        Ok(Self {
            uid: field(schema, UID)?,
            item_id: field(schema, ITEM_ID)?,
            item_type: field(schema, ITEM_TYPE)?,
            title: field(schema, TITLE)?,
            title_key: field(schema, TITLE_KEY)?,
            body: field(schema, BODY)?,
            modified: field(schema, MODIFIED)?,
        })
    }
}

fn field(schema: &Schema, name: &str) -> IndexResult<Field> {
    schema
        .get_field(name)
        .map_err(|_| IndexError::FieldNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::Value;

    #[test]
    fn kinds_carry_fixed_policy() {
        assert!(FieldKind::Title.tokenized() && FieldKind::Title.stored());
        assert!(FieldKind::Body.tokenized() && FieldKind::Body.stored());
        assert!(!FieldKind::Exact.tokenized() && FieldKind::Exact.indexed());
        assert!(!FieldKind::Opaque.indexed() && FieldKind::Opaque.stored());
        assert!(FieldKind::Title.boost() > FieldKind::Body.boost());
    }

    #[test]
    fn empty_value_is_a_valid_field() {
        let field = FieldKind::Title.field(TITLE, "");
        assert_eq!(field.value, "");
        assert_eq!(field.kind, FieldKind::Title);
    }

    #[test]
    fn schema_matches_field_table() {
        let schema = build_schema();
        for (name, kind) in DOCUMENT_FIELDS {
            let entry = schema.get_field_entry(schema.get_field(name).unwrap());
            assert_eq!(entry.is_indexed(), kind.indexed(), "{name}");
            assert!(entry.is_stored(), "{name}");
        }
        assert_eq!(kind_of(BODY), Some(FieldKind::Body));
        assert_eq!(kind_of("nope"), None);
    }

    #[test]
    fn converts_documents_to_tantivy() {
        let schema = build_schema();
        let doc = IndexDocument::new()
            .with(FieldKind::Exact.field(UID, "term:1"))
            .with(FieldKind::Title.field(TITLE, "Ontology"));
        let converted = doc.to_tantivy(&schema).unwrap();
        let title = schema.get_field(TITLE).unwrap();
        assert_eq!(
            converted.get_first(title).and_then(|v| v.as_str()),
            Some("Ontology")
        );
    }

    #[test]
    fn rejects_unknown_field_names() {
        let schema = build_schema();
        let doc = IndexDocument::new().with(FieldKind::Body.field("summary", "x"));
        assert!(matches!(
            doc.to_tantivy(&schema),
            Err(IndexError::FieldNotFound(name)) if name == "summary"
        ));
    }
}

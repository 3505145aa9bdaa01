//! Per-type conversion of domain items into index documents.

use crate::entity::{EntityType, IndexedEntity};
use crate::schema::{
    FieldKind, IndexDocument, ATTRIBUTES, BODY, CREATED, ITEM_ID, ITEM_TYPE, MODIFIED, TITLE,
    TITLE_KEY, UID,
};
use chrono::SecondsFormat;

/// Knows how items of one type are represented in the index.
pub trait EntityHelper: Send + Sync {
    fn entity_type(&self) -> EntityType;

    fn title(&self, entity: &IndexedEntity) -> String {
        entity.title.trim().to_string()
    }

    /// Everything searchable beyond the title.
    fn full_text(&self, entity: &IndexedEntity) -> String {
        entity.body.clone()
    }

    fn document(&self, entity: &IndexedEntity) -> IndexDocument {
        let title = self.title(entity);
        let attributes = if entity.attributes.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&entity.attributes).unwrap_or_default()
        };

        IndexDocument::new()
            .with(FieldKind::Exact.field(UID, entity.uid()))
            .with(FieldKind::Exact.field(ITEM_ID, entity.id.to_string()))
            .with(FieldKind::Exact.field(ITEM_TYPE, self.entity_type().as_str()))
            .with(FieldKind::Title.field(TITLE, title.clone()))
            .with(FieldKind::Exact.field(TITLE_KEY, title.to_lowercase()))
            .with(FieldKind::Body.field(BODY, self.full_text(entity)))
            .with(FieldKind::Opaque.field(CREATED, timestamp(entity.created)))
            .with(FieldKind::Opaque.field(MODIFIED, timestamp(entity.modified)))
            .with(FieldKind::Opaque.field(ATTRIBUTES, attributes))
    }
}

fn timestamp(value: chrono::DateTime<chrono::Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn join_text<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TermHelper;

impl EntityHelper for TermHelper {
    fn entity_type(&self) -> EntityType {
        EntityType::Term
    }
}

/// Texts are found by their bibliographic data as well as their content.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHelper;

impl TextHelper {
    const BIBLIOGRAPHIC: [&'static str; 5] = ["author", "coauthors", "publisher", "publication", "year"];
}

impl EntityHelper for TextHelper {
    fn entity_type(&self) -> EntityType {
        EntityType::Text
    }

    fn full_text(&self, entity: &IndexedEntity) -> String {
        let mut parts = vec![entity.body.as_str()];
        parts.extend(
            Self::BIBLIOGRAPHIC
                .iter()
                .filter_map(|key| entity.attribute(key)),
        );
        join_text(parts)
    }
}

/// Persons are titled "first name name".
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonHelper;

impl EntityHelper for PersonHelper {
    fn entity_type(&self) -> EntityType {
        EntityType::Person
    }

    fn title(&self, entity: &IndexedEntity) -> String {
        match entity.attribute("firstname") {
            Some(first) => format!("{} {}", first.trim(), entity.title.trim())
                .trim()
                .to_string(),
            None => entity.title.trim().to_string(),
        }
    }

    fn full_text(&self, entity: &IndexedEntity) -> String {
        join_text([
            entity.body.as_str(),
            entity.attribute("from").unwrap_or_default(),
            entity.attribute("to").unwrap_or_default(),
        ])
    }
}

/// Term, text and person helpers, in refresh order.
pub fn default_helpers() -> Vec<Box<dyn EntityHelper>> {
    vec![
        Box::new(TermHelper),
        Box::new(TextHelper),
        Box::new(PersonHelper),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn entity(entity_type: EntityType, title: &str, body: &str) -> IndexedEntity {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        IndexedEntity {
            id: 7,
            entity_type,
            title: title.into(),
            body: body.into(),
            created: at,
            modified: at,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn term_document_maps_core_fields() {
        let doc = TermHelper.document(&entity(EntityType::Term, " Ontology ", "study of being"));
        assert_eq!(doc.get(UID), Some("term:7"));
        assert_eq!(doc.get(ITEM_ID), Some("7"));
        assert_eq!(doc.get(ITEM_TYPE), Some("term"));
        assert_eq!(doc.get(TITLE), Some("Ontology"));
        assert_eq!(doc.get(TITLE_KEY), Some("ontology"));
        assert_eq!(doc.get(BODY), Some("study of being"));
        assert_eq!(doc.get(CREATED), Some("2024-03-01T12:00:00.000Z"));
        assert_eq!(doc.get(ATTRIBUTES), Some(""));
    }

    #[test]
    fn missing_title_still_yields_title_and_type() {
        let doc = TermHelper.document(&entity(EntityType::Term, "", ""));
        assert_eq!(doc.get(TITLE), Some(""));
        assert_eq!(doc.get(ITEM_TYPE), Some("term"));
    }

    #[test]
    fn text_body_includes_bibliography() {
        let mut text = entity(EntityType::Text, "Being and Time", "notes");
        text.attributes.insert("author".into(), "Heidegger".into());
        text.attributes.insert("year".into(), "1927".into());
        text.attributes.insert("publisher".into(), "  ".into());

        let doc = TextHelper.document(&text);
        assert_eq!(doc.get(BODY), Some("notes\nHeidegger\n1927"));
        assert_eq!(doc.get(ITEM_TYPE), Some("text"));
        let stored: BTreeMap<String, String> =
            serde_json::from_str(doc.get(ATTRIBUTES).unwrap()).unwrap();
        assert_eq!(stored.get("author").map(String::as_str), Some("Heidegger"));
    }

    #[test]
    fn person_title_prefixes_first_name() {
        let mut person = entity(EntityType::Person, "Arendt", "political theorist");
        person.attributes.insert("firstname".into(), "Hannah".into());
        let doc = PersonHelper.document(&person);
        assert_eq!(doc.get(TITLE), Some("Hannah Arendt"));
        assert_eq!(doc.get(TITLE_KEY), Some("hannah arendt"));

        let anonymous = entity(EntityType::Person, "Anonymous", "");
        assert_eq!(PersonHelper.title(&anonymous), "Anonymous");
    }

    #[test]
    fn default_helpers_cover_every_type_in_order() {
        let types: Vec<EntityType> = default_helpers().iter().map(|h| h.entity_type()).collect();
        assert_eq!(types, EntityType::ALL.to_vec());
    }
}

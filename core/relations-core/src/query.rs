use crate::directory::DirectoryManager;
use crate::entity::EntityType;
use crate::error::IndexResult;
use crate::language::AnalyzerLanguage;
use crate::schema::FieldKind;
use chrono::{DateTime, Utc};
use regex::escape;
use std::cmp::Ordering;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, TantivyDocument, Value};
use tantivy::Term;
use tracing::debug;

const PREFIX_BOOST: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    /// ISO-639 code of the index to search.
    pub language: String,
    /// Restricts hits to these item types; empty means all.
    pub item_types: Vec<EntityType>,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        SearchQuery {
            text: text.into(),
            language: language.into(),
            ..SearchQuery::default()
        }
    }

    pub fn with_types(mut self, item_types: &[EntityType]) -> Self {
        self.item_types = item_types.to_vec();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            text: String::new(),
            language: "en".to_string(),
            item_types: Vec::new(),
            limit: 50,
        }
    }
}

/// Lightweight projection of a matching item.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultItem {
    pub id: u64,
    pub title: String,
    pub item_type: EntityType,
    pub score: f32,
    pub modified: Option<DateTime<Utc>>,
}

/// Runs `query` against its language's index. An index that was never
/// built yields no hits rather than an error.
pub fn search(directories: &DirectoryManager, query: &SearchQuery) -> IndexResult<Vec<ResultItem>> {
    let trimmed = query.text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let language = AnalyzerLanguage::parse(&query.language)?;
    let Some(directory) = directories.existing(&language)? else {
        debug!(language = %language, "no index for language, returning no hits");
        return Ok(Vec::new());
    };

    let open = directory.read()?;
    let fields = &open.fields;

    let mut parser = QueryParser::for_index(&open.index, vec![fields.title, fields.body]);
    parser.set_field_boost(fields.title, FieldKind::Title.boost());
    parser.set_field_boost(fields.body, FieldKind::Body.boost());
    parser.set_conjunction_by_default();
    let parsed = parser.parse_query(trimmed)?;

    let mut matchers: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Should, parsed)];
    if !trimmed.contains(char::is_whitespace) {
        let pattern = format!("{}.*", escape(&trimmed.to_lowercase()));
        if let Ok(prefix) = RegexQuery::from_pattern(&pattern, fields.title_key) {
            matchers.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(prefix), PREFIX_BOOST)),
            ));
        }
    }
    let matching: Box<dyn Query> = if matchers.len() == 1 {
        matchers.remove(0).1
    } else {
        Box::new(BooleanQuery::new(matchers))
    };

    let combined: Box<dyn Query> = if query.item_types.is_empty() {
        matching
    } else {
        let types: Vec<(Occur, Box<dyn Query>)> = query
            .item_types
            .iter()
            .map(|item_type| {
                let term = Term::from_field_text(fields.item_type, item_type.as_str());
                let clause: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                (Occur::Should, clause)
            })
            .collect();
        Box::new(BooleanQuery::new(vec![
            (Occur::Must, matching),
            (Occur::Must, Box::new(BooleanQuery::new(types))),
        ]))
    };

    let limit = query.limit.max(1);
    let searcher = open.reader.searcher();

    // Widen the window until every hit tied with the last kept score is in
    // it, so the id tie-break decides what survives the cut.
    let total = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1);
    let mut window = limit.min(total);
    let top_docs = loop {
        let top_docs = searcher.search(&combined, &TopDocs::with_limit(window))?;
        let cutoff = top_docs.get(limit - 1).map(|(score, _)| *score);
        let last = top_docs.last().map(|(score, _)| *score);
        match (cutoff, last) {
            (Some(cutoff), Some(last))
                if top_docs.len() == window && window < total && last >= cutoff =>
            {
                window = window.saturating_mul(2).min(total);
            }
            _ => break top_docs,
        }
    };

    let mut hits = Vec::with_capacity(top_docs.len());
    for (score, address) in top_docs {
        let doc: TantivyDocument = searcher.doc(address)?;
        let Some(id) = field_text(&doc, fields.item_id).and_then(|id| id.parse::<u64>().ok())
        else {
            continue;
        };
        let Some(item_type) =
            field_text(&doc, fields.item_type).and_then(|tag| tag.parse::<EntityType>().ok())
        else {
            continue;
        };

        hits.push(ResultItem {
            id,
            title: field_text(&doc, fields.title).unwrap_or_default().to_string(),
            item_type,
            score,
            modified: field_text(&doc, fields.modified)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| at.with_timezone(&Utc)),
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
            .then_with(|| a.item_type.cmp(&b.item_type))
    });
    hits.truncate(limit);

    debug!(
        language = %language,
        query = trimmed,
        hits = hits.len(),
        "search executed"
    );
    Ok(hits)
}

fn field_text(doc: &TantivyDocument, field: Field) -> Option<&str> {
    doc.get_first(field).and_then(|value| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::{search, SearchQuery};
    use crate::config::IndexSettings;
    use crate::directory::{DirectoryLocation, DirectoryManager};
    use crate::entity::{EntityType, IndexedEntity};
    use crate::helpers::{EntityHelper, PersonHelper, TermHelper, TextHelper};
    use crate::indexer::TantivyIndexer;
    use crate::language::AnalyzerLanguage;
    use crate::registration::Indexer;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn entity(entity_type: EntityType, id: u64, title: &str, body: &str) -> IndexedEntity {
        let at = Utc.with_ymd_and_hms(2023, 11, 2, 9, 0, 0).unwrap();
        IndexedEntity {
            id,
            entity_type,
            title: title.into(),
            body: body.into(),
            created: at,
            modified: at,
            attributes: BTreeMap::new(),
        }
    }

    fn index(
        manager: &DirectoryManager,
        code: &str,
        helper: &dyn EntityHelper,
        entities: &[IndexedEntity],
    ) {
        let language = AnalyzerLanguage::parse(code).unwrap();
        let indexer = TantivyIndexer::new(vec![language.clone()], IndexSettings::default());
        let directory = manager.directory(&language).unwrap();
        indexer.process_indexer(helper, entities, &directory).unwrap();
    }

    #[test]
    fn never_indexed_language_has_no_hits() {
        let dir = tempdir().unwrap();
        let manager = DirectoryManager::new(DirectoryLocation::Disk(dir.path().to_path_buf()));
        let hits = search(&manager, &SearchQuery::new("anything", "de")).unwrap();
        assert!(hits.is_empty());
        assert!(!dir.path().join("de").exists());
    }

    #[test]
    fn blank_query_has_no_hits() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(&manager, "en", &TermHelper, &[entity(EntityType::Term, 1, "x", "")]);
        assert!(search(&manager, &SearchQuery::new("   ", "en")).unwrap().is_empty());
    }

    #[test]
    fn title_matches_outrank_body_matches() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(
            &manager,
            "en",
            &TermHelper,
            &[
                entity(EntityType::Term, 1, "Notes", "a remark on dialectics"),
                entity(EntityType::Term, 2, "Dialectics", "method of argument"),
            ],
        );

        let hits = search(&manager, &SearchQuery::new("dialectics", "en")).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 2);
        assert_eq!(hits[0].title, "Dialectics");
        assert_eq!(hits[0].item_type, EntityType::Term);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[0].modified.is_some());
    }

    #[test]
    fn stemming_follows_the_index_language() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        let terms = [entity(EntityType::Term, 1, "Relations", "connecting ideas")];
        index(&manager, "en", &TermHelper, &terms);

        let hits = search(&manager, &SearchQuery::new("connected", "en")).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn equal_scores_are_ordered_by_id() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(
            &manager,
            "en",
            &TermHelper,
            &[
                entity(EntityType::Term, 30, "Same", "body"),
                entity(EntityType::Term, 4, "Same", "body"),
                entity(EntityType::Term, 12, "Same", "body"),
            ],
        );
        let hits = search(&manager, &SearchQuery::new("body", "en")).unwrap();
        let ids: Vec<u64> = hits.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec![4, 12, 30]);
    }

    #[test]
    fn filters_by_item_type() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(&manager, "en", &TermHelper, &[entity(EntityType::Term, 1, "Freedom", "")]);
        index(&manager, "en", &TextHelper, &[entity(EntityType::Text, 1, "On Freedom", "")]);
        index(&manager, "en", &PersonHelper, &[entity(EntityType::Person, 2, "Mill", "freedom")]);

        let all = search(&manager, &SearchQuery::new("freedom", "en")).unwrap();
        assert_eq!(all.len(), 3);

        let texts = search(
            &manager,
            &SearchQuery::new("freedom", "en").with_types(&[EntityType::Text]),
        )
        .unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].item_type, EntityType::Text);
    }

    #[test]
    fn single_word_matches_title_prefix() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(
            &manager,
            "en",
            &TermHelper,
            &[entity(EntityType::Term, 1, "Phenomenology", "")],
        );
        let hits = search(&manager, &SearchQuery::new("phenom", "en")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Phenomenology");
    }

    #[test]
    fn respects_limit() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        let terms: Vec<IndexedEntity> = (1..=5)
            .map(|id| entity(EntityType::Term, id, "logic", ""))
            .collect();
        index(&manager, "en", &TermHelper, &terms);
        let hits = search(&manager, &SearchQuery::new("logic", "en").with_limit(2)).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn ties_at_the_limit_keep_the_lowest_ids() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(
            &manager,
            "en",
            &TermHelper,
            &[
                entity(EntityType::Term, 30, "Same", "body"),
                entity(EntityType::Term, 4, "Same", "body"),
                entity(EntityType::Term, 12, "Same", "body"),
            ],
        );

        let first = search(&manager, &SearchQuery::new("body", "en").with_limit(1)).unwrap();
        let ids: Vec<u64> = first.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec![4]);

        let two = search(&manager, &SearchQuery::new("body", "en").with_limit(2)).unwrap();
        let ids: Vec<u64> = two.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec![4, 12]);
    }

    #[test]
    fn higher_scores_beat_lower_ids_at_the_limit() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        index(
            &manager,
            "en",
            &TermHelper,
            &[
                entity(EntityType::Term, 1, "Notes", "a remark on dialectics"),
                entity(EntityType::Term, 9, "Dialectics", "method of argument"),
            ],
        );
        let hits = search(&manager, &SearchQuery::new("dialectics", "en").with_limit(1)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 9);
    }

    #[test]
    fn invalid_language_is_rejected() {
        let manager = DirectoryManager::new(DirectoryLocation::Memory);
        assert!(matches!(
            search(&manager, &SearchQuery::new("x", "english")),
            Err(crate::IndexError::InvalidLanguage(_))
        ));
    }
}

use async_trait::async_trait;
use tracing::debug;

use trendwire_common::{EntityType, PipelineError};
use wikidata_client::WikidataClient;

/// A knowledge-base answer for a name.
#[derive(Debug, Clone, PartialEq)]
pub struct KbEntry {
    pub label: String,
    pub description: Option<String>,
}

impl KbEntry {
    pub fn entity_type(&self) -> EntityType {
        self.description
            .as_deref()
            .map(classify_description)
            .unwrap_or(EntityType::Unknown)
    }
}

/// External name lookup. Best-effort: callers degrade on error.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Option<KbEntry>, PipelineError>;
}

#[async_trait]
impl KnowledgeBase for WikidataClient {
    async fn lookup(&self, name: &str) -> Result<Option<KbEntry>, PipelineError> {
        let hit = self
            .best_match(name)
            .await
            .map_err(|e| PipelineError::ResolutionLookup {
                entity: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(hit.and_then(|hit| {
            let label = hit.label?.trim().to_string();
            if label.is_empty() {
                return None;
            }
            debug!(name, id = hit.id.as_str(), label = label.as_str(), "Wikidata match");
            Some(KbEntry {
                label,
                description: hit.description,
            })
        }))
    }
}

const PERSON_HINTS: &[&str] = &[
    "politician", "president", "senator", "governor", "minister", "businessperson",
    "businessman", "businesswoman", "actor", "actress", "singer", "musician", "rapper",
    "player", "athlete", "footballer", "journalist", "judge", "lawyer", "author", "writer",
    "executive", "entrepreneur", "official", "diplomat", "activist", "born",
];

const ORG_HINTS: &[&str] = &[
    "organization", "organisation", "agency", "party", "company", "corporation", "business",
    "enterprise", "bank", "union", "alliance", "department", "ministry", "court", "legislature",
    "committee", "university", "team", "club", "network", "manufacturer", "government",
    "institution", "foundation", "nonprofit",
];

const LOCATION_HINTS: &[&str] = &[
    "country", "city", "state", "region", "province", "county", "territory", "capital",
    "island", "town", "village", "municipality", "district", "sovereign", "continent", "river",
    "strip",
];

/// Entity type from a knowledge-base description by keyword bucket.
/// Person hints are checked first: "president of France" is a person.
pub fn classify_description(description: &str) -> EntityType {
    let words: Vec<String> = description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let has = |hints: &[&str]| words.iter().any(|w| hints.contains(&w.as_str()));

    if has(PERSON_HINTS) {
        EntityType::Person
    } else if has(ORG_HINTS) {
        EntityType::Organization
    } else if has(LOCATION_HINTS) {
        EntityType::Location
    } else {
        EntityType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_descriptions() {
        assert_eq!(
            classify_description("46th president of the United States"),
            EntityType::Person
        );
        assert_eq!(
            classify_description("intergovernmental military alliance"),
            EntityType::Organization
        );
        assert_eq!(
            classify_description("sovereign state in Eastern Europe"),
            EntityType::Location
        );
        assert_eq!(classify_description("Wikimedia disambiguation page"), EntityType::Unknown);
    }

    #[test]
    fn entry_without_description_is_unknown() {
        let entry = KbEntry {
            label: "Gaza".into(),
            description: None,
        };
        assert_eq!(entry.entity_type(), EntityType::Unknown);
    }
}

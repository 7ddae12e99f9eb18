use serde::Deserialize;

/// Envelope returned by `action=wbsearchentities`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub search: Vec<SearchHit>,
}

/// One entity hit from a Wikidata search.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Q-identifier, e.g. `Q30`.
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

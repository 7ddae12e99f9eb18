//! Curated canonical entities with their common aliases. Fuzzy resolution
//! searches canonical names and aliases together.

use trendwire_common::text::normalize_entity;
use trendwire_common::EntityType;

#[derive(Debug, Clone)]
pub struct KnownEntity {
    pub canonical: String,
    pub entity_type: EntityType,
    pub aliases: Vec<String>,
}

impl KnownEntity {
    pub fn new(canonical: &str, entity_type: EntityType, aliases: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            entity_type,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Best dictionary hit for a normalized name.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyHit {
    pub canonical: String,
    pub entity_type: EntityType,
    /// `1 - normalized_levenshtein`, in [0, 1].
    pub distance: f64,
}

pub struct EntityDictionary {
    /// (normalized surface form, index into `entities`)
    forms: Vec<(String, usize)>,
    entities: Vec<KnownEntity>,
}

impl EntityDictionary {
    pub fn new(entities: Vec<KnownEntity>) -> Self {
        let mut forms = Vec::new();
        for (i, entity) in entities.iter().enumerate() {
            forms.push((normalize_entity(&entity.canonical), i));
            for alias in &entity.aliases {
                forms.push((normalize_entity(alias), i));
            }
        }
        Self { forms, entities }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Closest surface form by normalized edit distance. Ties keep the
    /// earlier entry.
    pub fn best_match(&self, normalized: &str) -> Option<FuzzyHit> {
        let mut best: Option<(f64, usize)> = None;
        for (form, idx) in &self.forms {
            let distance = 1.0 - strsim::normalized_levenshtein(normalized, form);
            match best {
                Some((d, _)) if distance >= d => {}
                _ => best = Some((distance, *idx)),
            }
        }
        best.map(|(distance, idx)| {
            let entity = &self.entities[idx];
            FuzzyHit {
                canonical: entity.canonical.clone(),
                entity_type: entity.entity_type,
                distance,
            }
        })
    }
}

impl Default for EntityDictionary {
    fn default() -> Self {
        Self::new(default_entities())
    }
}

/// Frequently-covered entities and their spellings in headlines.
pub fn default_entities() -> Vec<KnownEntity> {
    use EntityType::*;
    vec![
        // People
        KnownEntity::new("Donald Trump", Person, &["trump", "donald j trump", "president trump"]),
        KnownEntity::new("Joe Biden", Person, &["biden", "joseph biden", "president biden"]),
        KnownEntity::new("Kamala Harris", Person, &["harris", "vice president harris"]),
        KnownEntity::new("Elon Musk", Person, &["musk"]),
        KnownEntity::new("Jerome Powell", Person, &["powell", "fed chair powell"]),
        KnownEntity::new("Vladimir Putin", Person, &["putin"]),
        KnownEntity::new("Volodymyr Zelensky", Person, &["zelensky", "zelenskyy", "zelenskiy"]),
        KnownEntity::new("Xi Jinping", Person, &["president xi"]),
        KnownEntity::new("Benjamin Netanyahu", Person, &["netanyahu", "bibi netanyahu"]),
        KnownEntity::new("Taylor Swift", Person, &["swift"]),
        // Organizations
        KnownEntity::new("Federal Reserve", Organization, &["the fed", "fed", "federal reserve board"]),
        KnownEntity::new("FBI", Organization, &["federal bureau of investigation"]),
        KnownEntity::new("Supreme Court", Organization, &["scotus", "us supreme court", "u.s. supreme court"]),
        KnownEntity::new("NATO", Organization, &["north atlantic treaty organization"]),
        KnownEntity::new("United Nations", Organization, &["un", "u.n."]),
        KnownEntity::new("European Union", Organization, &["eu", "e.u."]),
        KnownEntity::new("Congress", Organization, &["us congress", "u.s. congress"]),
        KnownEntity::new("OpenAI", Organization, &["open ai"]),
        KnownEntity::new("Tesla", Organization, &["tesla inc", "tesla motors"]),
        KnownEntity::new("Alphabet", Organization, &["google", "alphabet inc"]),
        KnownEntity::new("Meta", Organization, &["facebook", "meta platforms"]),
        KnownEntity::new("Microsoft", Organization, &["msft"]),
        KnownEntity::new("Apple", Organization, &["apple inc"]),
        KnownEntity::new("Amazon", Organization, &["amazon.com", "amzn"]),
        // Locations
        KnownEntity::new("United States", Location, &["us", "u.s.", "usa", "u.s.a.", "america"]),
        KnownEntity::new("United Kingdom", Location, &["uk", "u.k.", "britain", "great britain"]),
        KnownEntity::new("Ukraine", Location, &[]),
        KnownEntity::new("Russia", Location, &["russian federation"]),
        KnownEntity::new("China", Location, &["prc", "people's republic of china"]),
        KnownEntity::new("Israel", Location, &[]),
        KnownEntity::new("Gaza", Location, &["gaza strip"]),
        KnownEntity::new("Iran", Location, &[]),
        KnownEntity::new("Washington, D.C.", Location, &["washington dc", "d.c."]),
        KnownEntity::new("New York City", Location, &["nyc", "new york"]),
        KnownEntity::new("California", Location, &["calif"]),
        KnownEntity::new("Texas", Location, &[]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_alias_has_zero_distance() {
        let dict = EntityDictionary::default();
        let hit = dict.best_match("zelenskyy").unwrap();
        assert_eq!(hit.canonical, "Volodymyr Zelensky");
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn misspelling_lands_close() {
        let dict = EntityDictionary::default();
        let hit = dict.best_match("netanyahoo").unwrap();
        assert_eq!(hit.canonical, "Benjamin Netanyahu");
        assert!(hit.distance < 0.3);
    }

    #[test]
    fn unrelated_phrase_is_far() {
        let dict = EntityDictionary::default();
        let hit = dict.best_match("senate passes border bill").unwrap();
        assert!(hit.distance >= 0.3);
    }

    #[test]
    fn empty_dictionary_has_no_match() {
        assert!(EntityDictionary::empty().best_match("trump").is_none());
    }
}

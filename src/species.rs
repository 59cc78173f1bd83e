//! Species catalog
//!
//! Fixed species → category table. Every species code belongs to exactly one
//! of PEST, DISEASE or BENEFICIAL. Codes are matched case-insensitively and
//! normalized to SCREAMING_SNAKE_CASE.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ScoutingError, ScoutingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeciesCategory {
    Pest,
    Disease,
    Beneficial,
}

const REFERENCE_PESTS: &[&str] = &[
    "THRIPS",
    "WHITEFLY",
    "APHIDS",
    "SPIDER_MITES",
    "FUNGUS_GNATS",
    "MEALYBUGS",
    "LEAFMINERS",
    "CATERPILLARS",
    "SCALE_INSECTS",
    "SHORE_FLIES",
];

const REFERENCE_DISEASES: &[&str] = &[
    "POWDERY_MILDEW",
    "DOWNY_MILDEW",
    "BOTRYTIS",
    "ROOT_ROT",
    "LEAF_SPOT",
    "RUST",
    "BACTERIAL_BLIGHT",
    "VIRUS",
];

const REFERENCE_BENEFICIALS: &[&str] = &[
    "LADYBUGS",
    "LACEWINGS",
    "PREDATORY_MITES",
    "PARASITIC_WASPS",
    "MINUTE_PIRATE_BUGS",
    "HOVERFLIES",
];

/// Species code → category lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesCatalog {
    entries: FxHashMap<String, SpeciesCategory>,
}

impl Default for SpeciesCatalog {
    fn default() -> Self {
        let mut entries = FxHashMap::default();
        for (codes, category) in [
            (REFERENCE_PESTS, SpeciesCategory::Pest),
            (REFERENCE_DISEASES, SpeciesCategory::Disease),
            (REFERENCE_BENEFICIALS, SpeciesCategory::Beneficial),
        ] {
            for code in codes {
                entries.insert(code.to_string(), category);
            }
        }
        Self { entries }
    }
}

impl SpeciesCatalog {
    /// Build a catalog from explicit entries (codes are normalized)
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SpeciesCategory)>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(code, category)| (normalize_code(code.as_ref()), category))
            .collect();
        Self { entries }
    }

    /// Load catalog from a JSON object `{ "CODE": "PEST", ... }`
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read species catalog: {:?}", path))?;

        let raw: FxHashMap<String, SpeciesCategory> = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse species catalog JSON")?;

        if raw.is_empty() {
            anyhow::bail!("Species catalog {:?} is empty", path);
        }

        tracing::info!("Loaded species catalog ({} codes) from {:?}", raw.len(), path);
        Ok(Self::from_entries(raw))
    }

    /// Category of a species code; unknown codes are an error
    pub fn category_of(&self, code: &str) -> ScoutingResult<SpeciesCategory> {
        let normalized = normalize_code(code);
        self.entries
            .get(&normalized)
            .copied()
            .ok_or(ScoutingError::UnknownSpecies { code: normalized })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(&normalize_code(code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// "powdery mildew" / "Powdery-Mildew" → "POWDERY_MILDEW"
pub fn normalize_code(code: &str) -> String {
    code.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

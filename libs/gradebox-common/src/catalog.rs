// Challenge catalog
// Immutable challenge definitions, loaded once at startup and shared read-only

use crate::types::Challenge;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const BUILTIN_CATALOG: &str = include_str!("../catalog/challenges.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate challenge id: {0}")]
    DuplicateId(String),

    #[error("Challenge '{0}' has no test cases")]
    NoTestCases(String),

    #[error("Challenge '{id}' declares an invalid entry point '{name}'")]
    InvalidEntryPoint { id: String, name: String },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    challenges: BTreeMap<String, Challenge>,
}

impl Catalog {
    /// Catalog bundled with the crate
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::from_challenges(file.challenges)
    }

    pub fn from_challenges(challenges: Vec<Challenge>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for challenge in challenges {
            if challenge.test_cases.is_empty() {
                return Err(CatalogError::NoTestCases(challenge.id));
            }
            if let Some(entry) = &challenge.entry_point {
                if !entry.is_valid() {
                    return Err(CatalogError::InvalidEntryPoint {
                        id: challenge.id,
                        name: entry.name.clone(),
                    });
                }
            }
            if map.contains_key(&challenge.id) {
                return Err(CatalogError::DuplicateId(challenge.id));
            }
            debug!(
                id = %challenge.id,
                language = %challenge.language,
                test_cases = challenge.test_cases.len(),
                "Registered challenge"
            );
            map.insert(challenge.id.clone(), challenge);
        }
        Ok(Self { challenges: map })
    }

    /// Unknown ids are a normal outcome, never an error
    pub fn get(&self, id: &str) -> Option<&Challenge> {
        self.challenges.get(id)
    }

    /// All challenges, ordered by id
    pub fn list(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

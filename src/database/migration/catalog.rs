//! Migration catalog
//!
//! The catalog is the authoritative, ordered list of schema changes. Each
//! [`MigrationStep`] names the version it produces and the statements that
//! produce it. Catalogs are validated once at construction and never change
//! afterwards.

use super::error::CatalogError;
use serde::{Deserialize, Serialize};

/// One batch of statements that brings the schema to `to_version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    to_version: u32,
    statements: Vec<String>,
}

impl MigrationStep {
    /// Create a step from raw statement text
    pub fn new<I, S>(to_version: u32, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to_version,
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    /// Version the schema is at once this step has been applied
    pub fn to_version(&self) -> u32 {
        self.to_version
    }

    /// Statements of this batch, in execution order
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

/// Ordered, immutable set of migration steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCatalog {
    steps: Vec<MigrationStep>,
}

impl MigrationCatalog {
    /// Build a catalog, rejecting steps that are not in strictly ascending
    /// version order or that target version 0.
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self, CatalogError> {
        let mut previous: Option<u32> = None;
        for (position, step) in steps.iter().enumerate() {
            if step.to_version == 0 {
                return Err(CatalogError::ZeroVersion { position });
            }
            if let Some(prev) = previous {
                if step.to_version <= prev {
                    return Err(CatalogError::NonMonotonicVersion {
                        previous: prev,
                        found: step.to_version,
                    });
                }
            }
            previous = Some(step.to_version);
        }

        Ok(Self { steps })
    }

    /// Every step with `to_version > current`, in ascending order
    pub fn steps_after(&self, current: u32) -> &[MigrationStep] {
        let start = self.steps.partition_point(|s| s.to_version <= current);
        &self.steps[start..]
    }

    /// Steps with `current < to_version <= target`, in ascending order
    ///
    /// `None` as target means "up to the latest step".
    pub fn steps_between(&self, current: u32, target: Option<u32>) -> &[MigrationStep] {
        let pending = self.steps_after(current);
        match target {
            Some(target) => {
                let end = pending.partition_point(|s| s.to_version <= target);
                &pending[..end]
            }
            None => pending,
        }
    }

    /// Highest version in the catalog, 0 for an empty catalog
    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|s| s.to_version).unwrap_or(0)
    }

    /// Look up the step producing `version`
    pub fn get(&self, version: u32) -> Option<&MigrationStep> {
        self.steps
            .binary_search_by_key(&version, |s| s.to_version)
            .ok()
            .map(|idx| &self.steps[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<'de> Deserialize<'de> for MigrationCatalog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let steps = Vec::<MigrationStep>::deserialize(deserializer)?;
        MigrationCatalog::new(steps).map_err(serde::de::Error::custom)
    }
}

//! Decoded installation state
//!
//! The top level of the state artifact maps unit names to per-unit records.
//! Only that top level is checked here; the shape of each unit is the
//! verifier's concern, so operators get a precise diagnostic for it.

use crate::literal::{write_quoted, Literal};
use std::fmt;

/// Unit name to unit record, in artifact order. Read-only once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstallationState {
    units: Vec<(String, Literal)>,
}

/// Why a literal cannot be an installation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TopLevelRejection {
    NotAMapping(&'static str),
    NonStringKey(&'static str),
    DuplicateUnit(String),
}

impl InstallationState {
    pub(crate) fn from_literal(literal: Literal) -> Result<Self, TopLevelRejection> {
        let pairs = match literal {
            Literal::Dict(pairs) => pairs,
            other => return Err(TopLevelRejection::NotAMapping(other.type_name())),
        };

        let mut units: Vec<(String, Literal)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let name = match key {
                Literal::Str(name) => name,
                other => return Err(TopLevelRejection::NonStringKey(other.type_name())),
            };
            if units.iter().any(|(existing, _)| *existing == name) {
                return Err(TopLevelRejection::DuplicateUnit(name));
            }
            units.push((name, value));
        }
        Ok(Self { units })
    }

    /// Units in their natural (artifact) order
    pub fn units(&self) -> impl Iterator<Item = (&str, &Literal)> {
        self.units.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn unit(&self, name: &str) -> Option<&Literal> {
        self.units
            .iter()
            .find(|(unit, _)| unit == name)
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Renders in the same literal syntax the artifact uses
impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, record)) in self.units.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_quoted(f, name)?;
            write!(f, ": {}", record)?;
        }
        f.write_str("}")
    }
}

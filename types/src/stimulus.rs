//! Stimulus items and catalogs.
//!
//! A catalog is the ordered, non-empty list of items for one experimental
//! domain. Catalogs are configuration data; nothing here knows about any
//! particular alphabet or word list.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::NonEmptyString;

/// Stable numeric identity of a stimulus within a catalog.
///
/// Assigned in first-seen order, so the same label list always yields the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StimulusId(u32);

impl StimulusId {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StimulusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of thing a stimulus is. Used by presentation layers (e.g. tones need playback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StimulusDomain {
    Letter,
    Digit,
    #[default]
    Word,
    Tone,
}

impl StimulusDomain {
    /// Guess the domain from the label text. Tones are never inferred.
    #[must_use]
    pub fn infer(label: &str) -> Self {
        let mut chars = label.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_alphabetic() => StimulusDomain::Letter,
            _ if !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()) => {
                StimulusDomain::Digit
            }
            _ => StimulusDomain::Word,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StimulusDomain::Letter => "letter",
            StimulusDomain::Digit => "digit",
            StimulusDomain::Word => "word",
            StimulusDomain::Tone => "tone",
        }
    }

    /// Whether presenting this stimulus requires an exclusive playback resource.
    #[must_use]
    pub fn needs_playback(self) -> bool {
        matches!(self, StimulusDomain::Tone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusItem {
    pub id: StimulusId,
    pub label: NonEmptyString,
    pub domain: StimulusDomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("stimulus catalog must not be empty")]
    Empty,
    #[error("stimulus label at position {index} is blank")]
    BlankLabel { index: usize },
    #[error("stimulus label {label:?} appears more than once")]
    DuplicateLabel { label: String },
}

/// Ordered, non-empty, duplicate-free list of stimulus items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StimulusCatalog {
    items: Vec<StimulusItem>,
}

impl StimulusCatalog {
    /// Build a catalog from labels.
    ///
    /// `domain` of `None` infers the domain per label.
    pub fn from_labels<I, S>(labels: I, domain: Option<StimulusDomain>) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for (index, raw) in labels.into_iter().enumerate() {
            let label =
                NonEmptyString::new(raw).map_err(|_| CatalogError::BlankLabel { index })?;
            if !seen.insert(label.clone()) {
                return Err(CatalogError::DuplicateLabel {
                    label: label.into_inner(),
                });
            }
            let domain = domain.unwrap_or_else(|| StimulusDomain::infer(&label));
            items.push(StimulusItem {
                id: StimulusId::new(items.len() as u32),
                label,
                domain,
            });
        }
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { items })
    }

    #[must_use]
    pub fn items(&self) -> &[StimulusItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for API symmetry with slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: StimulusId) -> Option<&StimulusItem> {
        self.items.get(id.value() as usize)
    }

    #[must_use]
    pub fn find(&self, label: &str) -> Option<&StimulusItem> {
        self.items.iter().find(|item| item.label.as_str() == label.trim())
    }
}

//! Label decoding strategies
//!
//! Corpus naming conventions are decoupled from the pipeline behind the
//! [`LabelDecoder`] trait: a pure function from a raw identifier (filename or
//! directory name) to an activity label. Two conventions are shipped:
//!
//! - [`FolderDecoder`]: the per-activity-subfolder convention, where the
//!   folder name *is* the label (used by training corpora).
//! - [`CodeDecoder`]: underscore-delimited code letters embedded in trial
//!   names, e.g. `002_L_3` → walk (used by evaluation corpora).

use std::collections::BTreeMap;
use thiserror::Error;

/// A raw identifier whose label code does not map to a known activity.
/// Callers skip the item with a warning; this is never fatal to a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown activity label in identifier {identifier:?}")]
pub struct UnknownLabelError {
    pub identifier: String,
}

/// Pure mapping from a raw corpus identifier to an activity label.
pub trait LabelDecoder: Send + Sync {
    fn decode(&self, identifier: &str) -> Result<String, UnknownLabelError>;
}

// ============================================================================
// Folder Convention
// ============================================================================

/// The directory name is the activity label, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderDecoder;

impl LabelDecoder for FolderDecoder {
    fn decode(&self, identifier: &str) -> Result<String, UnknownLabelError> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(UnknownLabelError {
                identifier: identifier.to_string(),
            });
        }
        Ok(trimmed.to_string())
    }
}

// ============================================================================
// Code Convention
// ============================================================================

/// Underscore-delimited code letters: `002_L_3` has code `L`. The code table
/// is injectable; [`CodeDecoder::default`] ships the recording convention
/// (`L` → walk, `O` → run, `S` → stair up).
#[derive(Debug, Clone)]
pub struct CodeDecoder {
    codes: BTreeMap<String, String>,
}

impl Default for CodeDecoder {
    fn default() -> Self {
        let mut codes = BTreeMap::new();
        codes.insert("L".to_string(), "walk".to_string());
        codes.insert("O".to_string(), "run".to_string());
        codes.insert("S".to_string(), "stair up".to_string());
        Self { codes }
    }
}

impl CodeDecoder {
    /// Build a decoder from an explicit code → label table.
    pub fn new<I, K, V>(codes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl LabelDecoder for CodeDecoder {
    fn decode(&self, identifier: &str) -> Result<String, UnknownLabelError> {
        // Strip any path/extension noise before splitting.
        let stem = identifier
            .rsplit('/')
            .next()
            .unwrap_or(identifier)
            .trim_end_matches(".csv");

        let mut parts = stem.split('_');
        let _prefix = parts.next();
        let code = parts.next().ok_or_else(|| UnknownLabelError {
            identifier: identifier.to_string(),
        })?;

        self.codes
            .get(code)
            .cloned()
            .ok_or_else(|| UnknownLabelError {
                identifier: identifier.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_decoder_passes_name_through() {
        assert_eq!(FolderDecoder.decode("walk").unwrap(), "walk");
        assert_eq!(FolderDecoder.decode("stair up").unwrap(), "stair up");
        assert!(FolderDecoder.decode("  ").is_err());
    }

    #[test]
    fn code_decoder_maps_default_codes() {
        let d = CodeDecoder::default();
        assert_eq!(d.decode("002_L_3").unwrap(), "walk");
        assert_eq!(d.decode("017_O_1").unwrap(), "run");
        assert_eq!(d.decode("004_S_2.csv").unwrap(), "stair up");
    }

    #[test]
    fn code_decoder_rejects_unknown_code() {
        let d = CodeDecoder::default();
        let err = d.decode("002_X_3").unwrap_err();
        assert_eq!(err.identifier, "002_X_3");
        assert!(d.decode("nodelimiters").is_err());
    }

    #[test]
    fn code_decoder_custom_table() {
        let d = CodeDecoder::new([("W", "walk"), ("J", "jog")]);
        assert_eq!(d.decode("001_J_9").unwrap(), "jog");
        assert!(d.decode("001_L_9").is_err());
    }
}

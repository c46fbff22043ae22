// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::borrow::Cow;

/// Diagnostics schema version for idealization run metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Structured diagnostics captured from an idealization stage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub n: usize,
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub algorithm: Cow<'static, str>,
    pub seed: Option<u64>,
    pub soft_budget_exceeded: bool,
    #[cfg(feature = "serde")]
    pub params_json: Option<serde_json::Value>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            n: 0,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            algorithm: Cow::Borrowed(""),
            seed: None,
            soft_budget_exceeded: false,
            #[cfg(feature = "serde")]
            params_json: None,
        }
    }
}

impl Diagnostics {
    pub fn for_algorithm(algorithm: &'static str, n: usize) -> Self {
        Self {
            n,
            algorithm: Cow::Borrowed(algorithm),
            ..Self::default()
        }
    }

    /// Records a recoverable condition and emits it as a `tracing` warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(algorithm = %self.algorithm, n = self.n, "{message}");
        self.warnings.push(message);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    /// Folds another stage's diagnostics into this one.
    pub fn absorb(&mut self, other: Diagnostics) {
        self.notes.extend(other.notes);
        self.warnings.extend(other.warnings);
        self.soft_budget_exceeded |= other.soft_budget_exceeded;
    }
}

#[cfg(test)]
mod tests {
    use super::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
    use std::borrow::Cow;

    #[test]
    fn diagnostics_default_sets_schema_and_engine_version() {
        let diagnostics = Diagnostics::default();
        assert_eq!(diagnostics.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
        assert_eq!(
            diagnostics.engine_version,
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
        assert!(diagnostics.notes.is_empty());
        assert!(diagnostics.warnings.is_empty());
        assert!(!diagnostics.soft_budget_exceeded);
    }

    #[test]
    fn warn_and_absorb_accumulate_messages() {
        let mut outer = Diagnostics::for_algorithm("threshold_crossing", 6);
        assert_eq!(outer.algorithm, Cow::Borrowed("threshold_crossing"));
        outer.warn("thresholds recomputed");

        let mut inner = Diagnostics::for_algorithm("resolution", 6);
        inner.note("merged 2 events");
        inner.soft_budget_exceeded = true;
        outer.absorb(inner);

        assert_eq!(outer.warnings, vec!["thresholds recomputed".to_string()]);
        assert_eq!(outer.notes, vec!["merged 2 events".to_string()]);
        assert!(outer.soft_budget_exceeded);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn diagnostics_serde_roundtrip_preserves_fields() {
        let diagnostics = Diagnostics {
            n: 1_024,
            runtime_ms: Some(12),
            notes: vec!["states=3".to_string()],
            warnings: vec!["resolution not fully enforced".to_string()],
            algorithm: Cow::Owned("disc".to_string()),
            seed: Some(7),
            params_json: Some(serde_json::json!({ "min_seg_length": 3 })),
            ..Diagnostics::default()
        };

        let encoded = serde_json::to_string(&diagnostics).expect("diagnostics should serialize");
        let decoded: Diagnostics =
            serde_json::from_str(&encoded).expect("diagnostics should deserialize");
        assert_eq!(decoded, diagnostics);
    }
}

//! Text prompts for an external music generator.

use serde::{Deserialize, Serialize};

use crate::melody::MelodyAnalysis;

/// Musical style requested alongside the sung melody.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSpec {
    pub genre: String,
    pub mood: String,
    #[serde(default)]
    pub instruments: Vec<String>,
    #[serde(default)]
    pub arrangement: Option<String>,
}

/// Builds a comma-separated generation prompt from a melody and a style.
///
/// The instruments clause is left out when no instruments are given, and
/// the arrangement clause when no arrangement is set.
pub fn compose(melody: &MelodyAnalysis, style: &StyleSpec) -> String {
    let mut parts = vec![format!("{} {} instrumental", style.mood, style.genre)];
    if !style.instruments.is_empty() {
        parts.push(format!("featuring {}", style.instruments.join(", ")));
    }
    parts.push(format!("in {}", melody.key));
    parts.push(format!("{} BPM", melody.tempo_bpm));
    if let Some(arrangement) = &style.arrangement {
        parts.push(format!("{arrangement} arrangement"));
    }
    parts.join(", ")
}

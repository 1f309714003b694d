//! Meditation script: the ordered narrative sections a render is planned from.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// What a section of the narration is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Intro,
    Breathing,
    BodyScan,
    Visualization,
    Silence,
    #[serde(alias = "closing")]
    Outro,
}

/// Biome of the ambience bed under a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ambience {
    #[default]
    Forest,
    Rain,
    Ocean,
    Fire,
    Space,
    Silence,
}

/// One planned section, reduced to what the engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSection {
    pub kind: SectionKind,
    /// Character count of the spoken text; drives the section's share of
    /// the narration.
    pub text_length: usize,
    /// Silence after the section, in seconds.
    pub pause_seconds: f64,
    pub ambience: Ambience,
}

impl ScriptSection {
    pub fn new(kind: SectionKind, text_length: usize, pause_seconds: f64, ambience: Ambience) -> Self {
        ScriptSection {
            kind,
            text_length,
            pause_seconds,
            ambience,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.pause_seconds.is_finite() || self.pause_seconds < 0.0 {
            return Err(RenderError::script(format!(
                "pause must be a finite, non-negative number of seconds, got {}",
                self.pause_seconds
            )));
        }
        Ok(())
    }
}

/// Check every section, reporting the first offender by index.
pub fn validate_sections(sections: &[ScriptSection]) -> Result<()> {
    for (i, section) in sections.iter().enumerate() {
        section
            .validate()
            .map_err(|e| RenderError::script(format!("section {i}: {e}")))?;
    }
    Ok(())
}

/// A section as produced by the script writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDocument {
    #[serde(rename = "type")]
    pub kind: SectionKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pause_seconds: f64,
    #[serde(default)]
    pub ambient_hint: Ambience,
}

impl From<&SectionDocument> for ScriptSection {
    fn from(doc: &SectionDocument) -> Self {
        ScriptSection::new(
            doc.kind,
            doc.content.chars().count(),
            doc.pause_seconds,
            doc.ambient_hint,
        )
    }
}

/// The script document: a title and its sections in narrative order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeditationScript {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<SectionDocument>,
}

impl MeditationScript {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The validated engine view of the sections.
    pub fn sections(&self) -> Result<Vec<ScriptSection>> {
        let sections: Vec<ScriptSection> = self.sections.iter().map(ScriptSection::from).collect();
        validate_sections(&sections)?;
        Ok(sections)
    }
}

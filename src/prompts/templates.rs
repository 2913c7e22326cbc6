//! Built-in prompt templates and template loading
//!
//! Three templates drive a game: the opening scene, each continuation turn,
//! and summary compaction. A template directory may override any of them
//! with a JSON file; missing files fall back to the built-in text.

use super::{PromptComposer, Section};
use crate::error::Result;
use std::path::Path;

const OPENING_PRE: &str = "You are the narrator of an immersive text adventure. \
The player acts only through the choices they type; you describe the world, \
its characters and the consequences of every action.";

const OPENING_BODY: &str = "Write the opening scene. Establish where the player is, \
what they can perceive and one immediate tension that invites action. \
Keep the player's agency intact: never decide what they do next.";

const CONTINUATION_PRE: &str = "You are the narrator of an ongoing immersive text adventure. \
Stay consistent with everything that has already happened.";

const CONTINUATION_BODY: &str = "Story so far:\n{history_story}\n\n\
Current scene:\n{current_scene}\n\n\
The player now does: {player_action}\n\n\
Describe what happens as a result of this action. Advance the story, \
let the world react believably and end on a moment that invites the next choice.";

const STORY_POST: &str = "Reply with a single JSON object and nothing else:\n\
{\"description\": \"<the narrative text shown to the player>\", \
\"summary\": \"<one or two sentences recording what happened this turn, \
including items gained or lost and important facts>\"}";

const SUMMARY_PRE: &str = "You maintain the long-term memory of a text adventure.";

const SUMMARY_BODY: &str = "Merge the story summaries below into one concise summary. \
Keep names, places, unresolved threads, items the player still holds and facts \
that later events may depend on. Drop items that were used up and details \
that no longer matter.";

const SUMMARY_POST: &str = "Reply with a single JSON object and nothing else:\n\
{\"summary\": \"<the merged summary>\"}";

/// The three templates a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// First turn of a new game
    Opening,
    /// Every later turn
    Continuation,
    /// Summary compaction
    Summary,
}

impl TemplateKind {
    /// All template kinds
    pub const ALL: [TemplateKind; 3] = [
        TemplateKind::Opening,
        TemplateKind::Continuation,
        TemplateKind::Summary,
    ];

    /// File name looked up in the template directory
    pub fn file_name(&self) -> &'static str {
        match self {
            TemplateKind::Opening => "opening_prompt.json",
            TemplateKind::Continuation => "continuation_prompt.json",
            TemplateKind::Summary => "summary_prompt.json",
        }
    }

    /// Built-in template for this kind
    pub fn builtin(&self) -> PromptComposer {
        match self {
            TemplateKind::Opening => PromptComposer::with_protected([
                (Section::PrePrompt, OPENING_PRE),
                (Section::Body, OPENING_BODY),
                (Section::PostPrompt, STORY_POST),
            ]),
            TemplateKind::Continuation => PromptComposer::with_protected([
                (Section::PrePrompt, CONTINUATION_PRE),
                (Section::Body, CONTINUATION_BODY),
                (Section::PostPrompt, STORY_POST),
            ]),
            TemplateKind::Summary => PromptComposer::with_protected([
                (Section::PrePrompt, SUMMARY_PRE),
                (Section::Body, SUMMARY_BODY),
                (Section::PostPrompt, SUMMARY_POST),
            ]),
        }
    }
}

/// The template set used by the turn engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    /// Opening scene template
    pub opening: PromptComposer,
    /// Continuation template with `{history_story}`, `{current_scene}`
    /// and `{player_action}` placeholders
    pub continuation: PromptComposer,
    /// Summary compaction template
    pub summary: PromptComposer,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptTemplates {
    /// Built-in templates
    pub fn builtin() -> Self {
        Self {
            opening: TemplateKind::Opening.builtin(),
            continuation: TemplateKind::Continuation.builtin(),
            summary: TemplateKind::Summary.builtin(),
        }
    }

    /// Loads templates from a directory
    ///
    /// # Arguments
    ///
    /// * `dir` - Template directory, or `None` for built-ins only
    ///
    /// # Errors
    ///
    /// Returns error if a template file exists but cannot be parsed
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::builtin();
        let Some(dir) = dir else {
            return Ok(templates);
        };

        for kind in TemplateKind::ALL {
            let path = dir.join(kind.file_name());
            if path.exists() {
                tracing::debug!("Loading prompt template {}", path.display());
                *templates.get_mut(kind) = PromptComposer::load_from_file(&path)?;
            } else {
                tracing::debug!(
                    "No {} in {}, using built-in template",
                    kind.file_name(),
                    dir.display()
                );
            }
        }
        Ok(templates)
    }

    /// Writes every template into a directory
    pub fn save(&self, dir: &Path) -> Result<()> {
        for kind in TemplateKind::ALL {
            self.get(kind).save_to_file(&dir.join(kind.file_name()))?;
        }
        Ok(())
    }

    /// Template of the given kind
    pub fn get(&self, kind: TemplateKind) -> &PromptComposer {
        match kind {
            TemplateKind::Opening => &self.opening,
            TemplateKind::Continuation => &self.continuation,
            TemplateKind::Summary => &self.summary,
        }
    }

    /// Mutable template of the given kind
    pub fn get_mut(&mut self, kind: TemplateKind) -> &mut PromptComposer {
        match kind {
            TemplateKind::Opening => &mut self.opening,
            TemplateKind::Continuation => &mut self.continuation,
            TemplateKind::Summary => &mut self.summary,
        }
    }
}

//! Prompt composition for Storyloom
//!
//! A prompt is built from four fixed sections rendered in order. Each
//! section holds an ordered list of named fragments. At most one fragment
//! per section is protected (system-authored); it always sits first and
//! cannot be removed or moved. Per-call overrides are appended to each
//! section at render time without touching the stored fragments.

pub mod templates;

pub use templates::{PromptTemplates, TemplateKind};

use crate::error::{Result, StoryloomError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// Default id given to a section's protected fragment
pub const PROTECTED_ID: &str = "system";

/// Prompt sections in render order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// Identity and framing
    PrePrompt,
    /// Main instructions
    Body,
    /// The per-turn material (premise, summaries)
    UserInput,
    /// Output format and closing rules
    PostPrompt,
}

impl Section {
    /// All sections in render order
    pub const ALL: [Section; 4] = [
        Section::PrePrompt,
        Section::Body,
        Section::UserInput,
        Section::PostPrompt,
    ];

    /// Serialized name of this section
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::PrePrompt => "pre_prompt",
            Section::Body => "body",
            Section::UserInput => "user_input",
            Section::PostPrompt => "post_prompt",
        }
    }

    /// Parses a section name, case-insensitively
    ///
    /// Accepts the serialized names plus the upper-case forms used by older
    /// template files (`PRE_PROMPT`, `BODY_PROMPT`, `USER_INPUT`, `POST_PROMPT`).
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::prompts::Section;
    ///
    /// assert_eq!(Section::parse("body"), Some(Section::Body));
    /// assert_eq!(Section::parse("BODY_PROMPT"), Some(Section::Body));
    /// assert_eq!(Section::parse("footer"), None);
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pre_prompt" | "pre" => Some(Section::PrePrompt),
            "body" | "body_prompt" => Some(Section::Body),
            "user_input" | "input" => Some(Section::UserInput),
            "post_prompt" | "post" => Some(Section::PostPrompt),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named piece of prompt text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Fragment id, unique within its section
    pub id: String,
    /// Prompt text
    pub content: String,
    /// Whether this fragment is system-authored
    pub protected: bool,
}

/// On-disk record of a fragment
#[derive(Debug, Serialize, Deserialize)]
struct FragmentRecord {
    content: String,
    #[serde(default, alias = "is_system")]
    protected: bool,
}

/// Per-call text appended after each section's fragments
pub type Overrides = BTreeMap<Section, String>;

/// Ordered, sectioned prompt builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptComposer {
    sections: [Vec<Fragment>; 4],
}

impl PromptComposer {
    /// Creates an empty composer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a composer with one protected fragment per given section
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::prompts::{PromptComposer, Section};
    ///
    /// let composer = PromptComposer::with_protected([
    ///     (Section::PrePrompt, "You are a narrator."),
    ///     (Section::PostPrompt, "Reply in JSON."),
    /// ]);
    /// assert_eq!(composer.render(&Default::default()), "You are a narrator.\nReply in JSON.");
    /// ```
    pub fn with_protected<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = (Section, S)>,
        S: Into<String>,
    {
        let mut composer = Self::new();
        for (section, content) in initial {
            composer.sections[section.index()] = vec![Fragment {
                id: PROTECTED_ID.to_string(),
                content: content.into(),
                protected: true,
            }];
        }
        composer
    }

    fn fragments(&self, section: Section) -> &Vec<Fragment> {
        &self.sections[section.index()]
    }

    fn fragments_mut(&mut self, section: Section) -> &mut Vec<Fragment> {
        &mut self.sections[section.index()]
    }

    fn position(&self, section: Section, id: &str) -> Option<usize> {
        self.fragments(section).iter().position(|f| f.id == id)
    }

    fn protected_id(&self, section: Section) -> Option<&str> {
        self.fragments(section)
            .first()
            .filter(|f| f.protected)
            .map(|f| f.id.as_str())
    }

    /// Adds a non-protected fragment
    ///
    /// Without an anchor the fragment goes right after the protected one,
    /// or at the end when the section has none. An unknown anchor appends
    /// at the end. An existing id has its content replaced in place.
    ///
    /// # Errors
    ///
    /// Returns `ProtectedFragment` when `id` is the protected fragment's id
    pub fn add(
        &mut self,
        section: Section,
        id: &str,
        content: impl Into<String>,
        after: Option<&str>,
    ) -> Result<()> {
        let content = content.into();
        if self.protected_id(section) == Some(id) || id == PROTECTED_ID {
            return Err(StoryloomError::ProtectedFragment(format!(
                "'{}' is reserved in section {}",
                id, section
            ))
            .into());
        }

        if let Some(pos) = self.position(section, id) {
            tracing::warn!(
                "Fragment '{}' already exists in {}, replacing its content",
                id,
                section
            );
            self.fragments_mut(section)[pos].content = content;
            return Ok(());
        }

        let fragment = Fragment {
            id: id.to_string(),
            content,
            protected: false,
        };

        let index = match after {
            Some(anchor) => match self.position(section, anchor) {
                Some(pos) => pos + 1,
                None => {
                    tracing::warn!(
                        "Anchor fragment '{}' not found in {}, appending '{}' at the end",
                        anchor,
                        section,
                        id
                    );
                    self.fragments(section).len()
                }
            },
            None => {
                if self.protected_id(section).is_some() {
                    1
                } else {
                    self.fragments(section).len()
                }
            }
        };
        self.fragments_mut(section).insert(index, fragment);
        Ok(())
    }

    /// Removes a non-protected fragment
    ///
    /// # Errors
    ///
    /// Returns `ProtectedFragment` for the protected fragment and `Prompt`
    /// for an unknown id
    pub fn remove(&mut self, section: Section, id: &str) -> Result<()> {
        let pos = self.require(section, id)?;
        if self.fragments(section)[pos].protected {
            return Err(StoryloomError::ProtectedFragment(id.to_string()).into());
        }
        self.fragments_mut(section).remove(pos);
        Ok(())
    }

    /// Moves a fragment before or after another one
    ///
    /// # Errors
    ///
    /// Refuses to move the protected fragment, to place anything before it,
    /// and to reference unknown fragments
    pub fn move_fragment(
        &mut self,
        section: Section,
        id: &str,
        target: &str,
        before: bool,
    ) -> Result<()> {
        let pos = self.require(section, id)?;
        if self.fragments(section)[pos].protected {
            return Err(StoryloomError::ProtectedFragment(id.to_string()).into());
        }
        let target_pos = self.require(section, target)?;
        if before && self.fragments(section)[target_pos].protected {
            return Err(StoryloomError::ProtectedFragment(format!(
                "cannot place '{}' before '{}'",
                id, target
            ))
            .into());
        }
        if id == target {
            return Ok(());
        }

        let fragment = self.fragments_mut(section).remove(pos);
        let mut index = self
            .position(section, target)
            .ok_or_else(|| StoryloomError::Prompt(format!("Unknown fragment '{}'", target)))?;
        if !before {
            index += 1;
        }
        self.fragments_mut(section).insert(index, fragment);
        Ok(())
    }

    /// Replaces a fragment's content in place
    ///
    /// Replacing protected content is allowed and logged.
    pub fn update(&mut self, section: Section, id: &str, content: impl Into<String>) -> Result<()> {
        let pos = self.require(section, id)?;
        if self.fragments(section)[pos].protected {
            tracing::warn!("Replacing protected fragment '{}' in {}", id, section);
        }
        self.fragments_mut(section)[pos].content = content.into();
        Ok(())
    }

    /// Removes every fragment except the protected one
    pub fn clear_section(&mut self, section: Section) {
        self.fragments_mut(section).retain(|f| f.protected);
    }

    /// Fragment ids of a section in render order
    pub fn section_order(&self, section: Section) -> Vec<String> {
        self.fragments(section).iter().map(|f| f.id.clone()).collect()
    }

    /// Fragments of a section in render order
    pub fn section_fragments(&self, section: Section) -> &[Fragment] {
        self.fragments(section)
    }

    /// Copies a whole section over another one
    pub fn copy_section(&mut self, from: Section, to: Section) {
        let copied = self.fragments(from).clone();
        *self.fragments_mut(to) = copied;
    }

    /// Newline-joined content of one section
    pub fn section_content(&self, section: Section) -> String {
        self.fragments(section)
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Renders the full prompt with per-call overrides
    pub fn render(&self, overrides: &Overrides) -> String {
        self.render_with_vars(overrides, &[])
    }

    /// Renders the full prompt, substituting `{name}` placeholders
    ///
    /// Placeholders are resolved in a single pass over the stored fragments
    /// only, so substituted text and overrides are never rescanned.
    /// Unknown placeholders are left as written.
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::prompts::{PromptComposer, Section};
    ///
    /// let composer = PromptComposer::with_protected([
    ///     (Section::Body, "Scene: {current_scene}"),
    /// ]);
    /// let prompt = composer.render_with_vars(
    ///     &Default::default(),
    ///     &[("current_scene", "a {player_action} cave")],
    /// );
    /// assert_eq!(prompt, "Scene: a {player_action} cave");
    /// ```
    pub fn render_with_vars(&self, overrides: &Overrides, vars: &[(&str, &str)]) -> String {
        let mut parts = Vec::new();
        for section in Section::ALL {
            let content = self
                .fragments(section)
                .iter()
                .map(|f| substitute(&f.content, vars))
                .collect::<Vec<_>>()
                .join("\n");
            if !content.is_empty() {
                parts.push(content);
            }
            if let Some(extra) = overrides.get(&section) {
                if !extra.is_empty() {
                    parts.push(extra.clone());
                }
            }
        }
        parts.join("\n")
    }

    /// Serializes to a `section -> id -> {content, protected}` document
    pub fn to_value(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for section in Section::ALL {
            let mut entries = serde_json::Map::new();
            for fragment in self.fragments(section) {
                let record = FragmentRecord {
                    content: fragment.content.clone(),
                    protected: fragment.protected,
                };
                entries.insert(
                    fragment.id.clone(),
                    serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
                );
            }
            root.insert(section.as_str().to_string(), serde_json::Value::Object(entries));
        }
        serde_json::Value::Object(root)
    }

    /// Builds a composer from a serialized document
    ///
    /// Unknown sections are skipped with a warning. A protected fragment
    /// found after other fragments is moved first; extra protected
    /// fragments in one section are kept as ordinary fragments.
    ///
    /// # Errors
    ///
    /// Returns `Prompt` when the document or a fragment has the wrong shape
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| StoryloomError::Prompt("Template must be a JSON object".into()))?;
        let mut composer = Self::new();

        for (name, entries) in root {
            let Some(section) = Section::parse(name) else {
                tracing::warn!("Unknown prompt section '{}', skipping", name);
                continue;
            };
            let entries = entries.as_object().ok_or_else(|| {
                StoryloomError::Prompt(format!("Section '{}' must be a JSON object", name))
            })?;

            let mut fragments: Vec<Fragment> = Vec::with_capacity(entries.len());
            for (id, record) in entries {
                let record: FragmentRecord =
                    serde_json::from_value(record.clone()).map_err(|e| {
                        StoryloomError::Prompt(format!("Fragment '{}' in '{}': {}", id, name, e))
                    })?;
                let mut fragment = Fragment {
                    id: id.clone(),
                    content: record.content,
                    protected: record.protected,
                };
                if fragment.protected && fragments.iter().any(|f| f.protected) {
                    tracing::warn!(
                        "Section '{}' has more than one protected fragment, '{}' kept unprotected",
                        name,
                        id
                    );
                    fragment.protected = false;
                }
                fragments.push(fragment);
            }

            if let Some(pos) = fragments.iter().position(|f| f.protected) {
                if pos != 0 {
                    tracing::warn!("Protected fragment in '{}' moved to the front", name);
                    let protected = fragments.remove(pos);
                    fragments.insert(0, protected);
                }
            }

            composer.sections[section.index()] = fragments;
        }

        Ok(composer)
    }

    /// Loads a composer from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            StoryloomError::Prompt(format!("{} is not valid JSON: {}", path.display(), e))
        })?;
        Self::from_value(&value)
    }

    /// Writes the composer as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.to_value())?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved prompt template to {}", path.display());
        Ok(())
    }

    fn require(&self, section: Section, id: &str) -> Result<usize> {
        self.position(section, id).ok_or_else(|| {
            StoryloomError::Prompt(format!("Unknown fragment '{}' in section {}", id, section))
                .into()
        })
    }
}

impl fmt::Display for PromptComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for section in Section::ALL {
            let fragments = self.fragments(section);
            if fragments.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "=== {} ===", section)?;
            for fragment in fragments {
                let marker = if fragment.protected { "[protected]" } else { "[custom]" };
                let preview: String = fragment.content.chars().take(60).collect();
                let ellipsis = if fragment.content.chars().count() > 60 { "..." } else { "" };
                write!(f, "\n  {} {}: {}{}", fragment.id, marker, preview, ellipsis)?;
            }
        }
        Ok(())
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"))
}

fn substitute(text: &str, vars: &[(&str, &str)]) -> String {
    if vars.is_empty() {
        return text.to_string();
    }
    placeholder_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> PromptComposer {
        PromptComposer::with_protected([
            (Section::PrePrompt, "pre"),
            (Section::Body, "body"),
            (Section::PostPrompt, "post"),
        ])
    }

    fn err_kind(result: Result<()>) -> StoryloomError {
        match result.unwrap_err().downcast::<StoryloomError>() {
            Ok(e) => e,
            Err(e) => panic!("unexpected error type: {}", e),
        }
    }

    #[test]
    fn test_add_defaults_after_protected() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "b", "B", None).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "b", "a"]);
    }

    #[test]
    fn test_add_without_protected_appends() {
        let mut c = composer();
        c.add(Section::UserInput, "a", "A", None).unwrap();
        c.add(Section::UserInput, "b", "B", None).unwrap();
        assert_eq!(c.section_order(Section::UserInput), vec!["a", "b"]);
    }

    #[test]
    fn test_add_after_anchor() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "c", "C", Some("a")).unwrap();
        c.add(Section::Body, "b", "B", Some("a")).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "a", "b", "c"]);
    }

    #[test]
    fn test_add_unknown_anchor_appends() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "z", "Z", Some("missing")).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "a", "z"]);
    }

    #[test]
    fn test_add_existing_replaces_content() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "a", "A2", None).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "a"]);
        assert_eq!(c.section_content(Section::Body), "body\nA2");
    }

    #[test]
    fn test_add_protected_id_refused() {
        let mut c = composer();
        let err = err_kind(c.add(Section::Body, "system", "x", None));
        assert!(matches!(err, StoryloomError::ProtectedFragment(_)));
    }

    #[test]
    fn test_remove_protected_refused() {
        let mut c = composer();
        let err = err_kind(c.remove(Section::Body, "system"));
        assert!(matches!(err, StoryloomError::ProtectedFragment(_)));
        assert_eq!(c.section_order(Section::Body), vec!["system"]);
    }

    #[test]
    fn test_remove_unknown_refused() {
        let mut c = composer();
        let err = err_kind(c.remove(Section::Body, "ghost"));
        assert!(matches!(err, StoryloomError::Prompt(_)));
    }

    #[test]
    fn test_remove_updates_order_and_content() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "b", "B", Some("a")).unwrap();
        c.remove(Section::Body, "a").unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "b"]);
        assert_eq!(c.section_content(Section::Body), "body\nB");
    }

    #[test]
    fn test_move_before_and_after() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "b", "B", Some("a")).unwrap();
        c.add(Section::Body, "c", "C", Some("b")).unwrap();

        c.move_fragment(Section::Body, "c", "a", true).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "c", "a", "b"]);

        c.move_fragment(Section::Body, "c", "b", false).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "a", "b", "c"]);
    }

    #[test]
    fn test_move_after_protected_allowed() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "b", "B", Some("a")).unwrap();
        c.move_fragment(Section::Body, "b", "system", false).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["system", "b", "a"]);
    }

    #[test]
    fn test_move_refusals() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();

        let err = err_kind(c.move_fragment(Section::Body, "system", "a", false));
        assert!(matches!(err, StoryloomError::ProtectedFragment(_)));

        let err = err_kind(c.move_fragment(Section::Body, "a", "system", true));
        assert!(matches!(err, StoryloomError::ProtectedFragment(_)));

        let err = err_kind(c.move_fragment(Section::Body, "a", "ghost", true));
        assert!(matches!(err, StoryloomError::Prompt(_)));

        assert_eq!(c.section_order(Section::Body), vec!["system", "a"]);
    }

    #[test]
    fn test_update_protected_allowed() {
        let mut c = composer();
        c.update(Section::Body, "system", "new body").unwrap();
        assert_eq!(c.section_content(Section::Body), "new body");
    }

    #[test]
    fn test_clear_section_keeps_protected() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        c.add(Section::Body, "b", "B", None).unwrap();
        c.clear_section(Section::Body);
        assert_eq!(c.section_order(Section::Body), vec!["system"]);
    }

    #[test]
    fn test_render_protected_first_with_overrides() {
        let mut c = composer();
        c.add(Section::Body, "style", "Be terse.", None).unwrap();
        let mut overrides = Overrides::new();
        overrides.insert(Section::PrePrompt, "Player: Ana".to_string());
        overrides.insert(Section::UserInput, "Begin in a forest".to_string());
        overrides.insert(Section::PostPrompt, String::new());

        let prompt = c.render(&overrides);
        assert_eq!(
            prompt,
            "pre\nPlayer: Ana\nbody\nBe terse.\nBegin in a forest\npost"
        );
    }

    #[test]
    fn test_render_empty_composer() {
        assert_eq!(PromptComposer::new().render(&Overrides::new()), "");
    }

    #[test]
    fn test_placeholders_single_pass() {
        let c = PromptComposer::with_protected([(
            Section::Body,
            "{history_story}|{current_scene}|{player_action}|{unknown}",
        )]);
        let prompt = c.render_with_vars(
            &Overrides::new(),
            &[
                ("history_story", "{current_scene}"),
                ("current_scene", "hall"),
                ("player_action", "open"),
            ],
        );
        assert_eq!(prompt, "{current_scene}|hall|open|{unknown}");
    }

    #[test]
    fn test_value_round_trip_preserves_order() {
        let mut c = composer();
        c.add(Section::Body, "zeta", "Z", None).unwrap();
        c.add(Section::Body, "alpha", "A", Some("zeta")).unwrap();
        let restored = PromptComposer::from_value(&c.to_value()).unwrap();
        assert_eq!(restored, c);
        assert_eq!(
            restored.section_order(Section::Body),
            vec!["system", "zeta", "alpha"]
        );
    }

    #[test]
    fn test_from_value_accepts_legacy_names() {
        let value = serde_json::json!({
            "PRE_PROMPT": {"system": {"content": "hello", "is_system": true}},
            "BODY_PROMPT": {"rules": {"content": "rules"}},
            "FOOTER": {"x": {"content": "ignored"}}
        });
        let c = PromptComposer::from_value(&value).unwrap();
        assert_eq!(c.section_fragments(Section::PrePrompt)[0].protected, true);
        assert_eq!(c.section_content(Section::Body), "rules");
        assert_eq!(c.render(&Overrides::new()), "hello\nrules");
    }

    #[test]
    fn test_from_value_moves_protected_first() {
        let value = serde_json::json!({
            "body": {
                "a": {"content": "A"},
                "core": {"content": "CORE", "protected": true},
                "other": {"content": "O", "protected": true}
            }
        });
        let c = PromptComposer::from_value(&value).unwrap();
        assert_eq!(c.section_order(Section::Body), vec!["core", "a", "other"]);
        assert!(!c.section_fragments(Section::Body)[2].protected);
        let mut c = c;
        let err = err_kind(c.add(Section::Body, "core", "x", None));
        assert!(matches!(err, StoryloomError::ProtectedFragment(_)));
    }

    #[test]
    fn test_from_value_rejects_bad_shape() {
        assert!(PromptComposer::from_value(&serde_json::json!([1, 2])).is_err());
        assert!(PromptComposer::from_value(&serde_json::json!({"body": "text"})).is_err());
    }

    #[test]
    fn test_copy_section() {
        let mut c = composer();
        c.copy_section(Section::Body, Section::UserInput);
        assert_eq!(c.section_content(Section::UserInput), "body");
    }

    #[test]
    fn test_display_marks_protected() {
        let mut c = composer();
        c.add(Section::Body, "a", "A", None).unwrap();
        let shown = c.to_string();
        assert!(shown.contains("=== body ==="));
        assert!(shown.contains("system [protected]: body"));
        assert!(shown.contains("a [custom]: A"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.json");
        let c = composer();
        c.save_to_file(&path).unwrap();
        assert_eq!(PromptComposer::load_from_file(&path).unwrap(), c);
    }
}

//! Prompt templating.
//!
//! Templates are plain text with minijinja syntax. Two are built in:
//! `condense_question_prompt.txt` (variables `question`, `chat_history`) and
//! `rag_prompt.txt` (variables `question`, `docs`, `chat_history`). Either
//! can be overridden from a directory at startup.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;
use tracing::info;

use docqa_core::error::DocqaError;

/// Name of the question condensation template.
pub const CONDENSE_QUESTION_PROMPT: &str = "condense_question_prompt.txt";
/// Name of the answer template.
pub const RAG_PROMPT: &str = "rag_prompt.txt";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        CONDENSE_QUESTION_PROMPT,
        include_str!("../templates/condense_question_prompt.txt"),
    ),
    (RAG_PROMPT, include_str!("../templates/rag_prompt.txt")),
];

/// Renders named templates against serializable variables.
///
/// Rendering is pure: the same name and variables always give the same text.
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    /// Renderer with the built-in templates.
    pub fn new() -> Self {
        let mut env = Environment::new();
        for &(name, source) in BUILTIN_TEMPLATES {
            if let Err(e) = env.add_template(name, source) {
                tracing::error!(template = name, error = %e, "Built-in template failed to parse");
            }
        }
        Self { env }
    }

    /// Built-in templates, overridden by every `*.txt` file in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, DocqaError> {
        let mut renderer = Self::new();
        let entries = std::fs::read_dir(dir)?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)?;
            renderer = renderer.with_template(name, &source)?;
            info!(template = name, "Loaded prompt template override");
        }
        Ok(renderer)
    }

    /// Add or replace a template.
    pub fn with_template(mut self, name: &str, source: &str) -> Result<Self, DocqaError> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| DocqaError::Prompt(format!("template '{}': {}", name, e)))?;
        Ok(self)
    }

    /// Render a template by name.
    pub fn render<S: Serialize>(&self, name: &str, variables: S) -> Result<String, DocqaError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| DocqaError::Prompt(format!("template '{}': {}", name, e)))?;
        template
            .render(variables)
            .map_err(|e| DocqaError::Prompt(format!("rendering '{}': {}", name, e)))
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.env.templates().map(|(name, _)| name).collect();
        f.debug_struct("PromptRenderer")
            .field("templates", &names)
            .finish()
    }
}

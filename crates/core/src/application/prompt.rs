// Prompt Template Rendering

use crate::application::sampling::FileSample;
use crate::domain::{RepositoryMetadata, RepositoryTag};
use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::OnceCell;

const README_CLIP_CHARS: usize = 4_000;

/// Loads the prompt template from disk once per process and renders it
/// with `{{placeholder}}` substitution. Placeholders without a value
/// render as empty strings.
pub struct PromptTemplate {
    path: PathBuf,
    cached: OnceCell<String>,
}

impl PromptTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    async fn template(&self) -> Result<&str> {
        let text = self
            .cached
            .get_or_try_init(|| async { tokio::fs::read_to_string(&self.path).await })
            .await?;
        Ok(text.as_str())
    }

    pub async fn render(&self, vars: &HashMap<&str, String>) -> Result<String> {
        Ok(interpolate(self.template().await?, vars))
    }

    /// Render the tagging prompt from the pipeline's gathered context.
    pub async fn render_tagging_prompt(
        &self,
        metadata: &RepositoryMetadata,
        samples: &[FileSample],
    ) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("repository_summary", repository_summary(metadata));
        vars.insert("existing_tags", existing_tags(&metadata.tags));
        vars.insert("readme", readme_excerpt(metadata.readme.as_deref()));
        vars.insert("file_summaries", file_summaries(samples));
        self.render(&vars).await
    }
}

/// Replace every `{{name}}` occurrence with its value, or the empty
/// string when `name` is not in `vars`.
pub fn interpolate(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let name = after_open[..close].trim();
                if let Some(value) = vars.get(name) {
                    out.push_str(value);
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unclosed marker: emit verbatim.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn repository_summary(metadata: &RepositoryMetadata) -> String {
    let mut lines = vec![format!("Name: {}", metadata.display_name())];
    if let Some(description) = &metadata.description {
        lines.push(format!("Description: {description}"));
    }
    if let Some(branch) = &metadata.default_branch {
        lines.push(format!("Default branch: {branch}"));
    }
    if let Some(url) = &metadata.repo_url {
        lines.push(format!("Repository URL: {url}"));
    }
    lines.join("\n")
}

fn existing_tags(tags: &[RepositoryTag]) -> String {
    if tags.is_empty() {
        return "No existing tags.".to_string();
    }
    tags.iter()
        .map(|t| format!("- {}: {}", t.key, t.value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn readme_excerpt(readme: Option<&str>) -> String {
    match readme {
        Some(text) if !text.is_empty() => text.chars().take(README_CLIP_CHARS).collect(),
        _ => "README not available.".to_string(),
    }
}

fn file_summaries(samples: &[FileSample]) -> String {
    samples
        .iter()
        .map(|s| format!("## {}\n{}\n", s.path, s.snippet))
        .collect::<Vec<_>>()
        .join("")
}

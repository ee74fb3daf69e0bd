// Tag Payloads & Normalization

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single in-flight tag as produced by the model and carried through
/// normalize -> diff -> apply. Identity is the `(key, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPayload {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TagPayload {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Dedup identity within one normalized list.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

/// Tags scoped to one file path within a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTagPayload {
    pub path: String,
    pub tags: Vec<TagPayload>,
}

/// Normalize a tag key: lowercase, collapse runs of non-alphanumeric
/// characters into a single underscore, trim leading/trailing underscores.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

fn clamp_confidence(confidence: Option<f64>) -> Option<f64> {
    match confidence {
        Some(c) if c.is_nan() => None,
        Some(c) => Some(c.clamp(0.0, 1.0)),
        None => None,
    }
}

/// Normalize a list of tags: normalized key, trimmed lowercase value,
/// empty entries dropped, `(key, value)` duplicates removed keeping the
/// first occurrence, confidence clamped into [0, 1].
pub fn normalize_tags(tags: &[TagPayload]) -> Vec<TagPayload> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(tags.len());

    for tag in tags {
        let key = normalize_key(&tag.key);
        let value = tag.value.trim().to_lowercase();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        let normalized = TagPayload {
            key,
            value,
            confidence: clamp_confidence(tag.confidence),
        };
        if seen.insert(normalized.identity()) {
            out.push(normalized);
        }
    }

    out
}

/// Normalize per-file tag lists; files whose list normalizes to empty are
/// dropped entirely.
pub fn normalize_file_tags(files: &[FileTagPayload]) -> Vec<FileTagPayload> {
    files
        .iter()
        .filter_map(|file| {
            let tags = normalize_tags(&file.tags);
            if tags.is_empty() {
                None
            } else {
                Some(FileTagPayload {
                    path: file.path.clone(),
                    tags,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalization_collapses_and_trims() {
        assert_eq!(normalize_key(" Framework "), "framework");
        assert_eq!(normalize_key("CI/CD -- Pipeline"), "ci_cd_pipeline");
        assert_eq!(normalize_key("__lang__"), "lang");
        assert_eq!(normalize_key("!!!"), "");
    }

    #[test]
    fn duplicate_tags_collapse_with_clamped_confidence() {
        let tags = vec![
            TagPayload::new("Language", "TypeScript").with_confidence(2.0),
            TagPayload::new("language", "typescript"),
        ];

        let normalized = normalize_tags(&tags);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].key, "language");
        assert_eq!(normalized[0].value, "typescript");
        assert_eq!(normalized[0].confidence, Some(1.0));
    }

    #[test]
    fn values_are_trimmed_and_lowercased() {
        let tags = vec![TagPayload::new(" Framework ", " Fastify ")];
        let normalized = normalize_tags(&tags);
        assert_eq!(normalized[0].key, "framework");
        assert_eq!(normalized[0].value, "fastify");
    }

    #[test]
    fn empty_keys_and_values_are_dropped() {
        let tags = vec![
            TagPayload::new("", "rust"),
            TagPayload::new("language", "   "),
            TagPayload::new("language", "rust"),
        ];
        let normalized = normalize_tags(&tags);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].key, "language");
    }

    #[test]
    fn confidence_edge_values() {
        let tags = vec![
            TagPayload::new("a", "1").with_confidence(-0.5),
            TagPayload::new("b", "2").with_confidence(f64::NAN),
            TagPayload::new("c", "3").with_confidence(0.42),
        ];
        let normalized = normalize_tags(&tags);
        assert_eq!(normalized[0].confidence, Some(0.0));
        assert_eq!(normalized[1].confidence, None);
        assert_eq!(normalized[2].confidence, Some(0.42));
    }

    #[test]
    fn normalization_is_idempotent() {
        let tags = vec![
            TagPayload::new(" Language ", " TypeScript ").with_confidence(1.7),
            TagPayload::new("CI/CD", "GitHub Actions"),
        ];
        let once = normalize_tags(&tags);
        let twice = normalize_tags(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn file_lists_that_normalize_empty_are_dropped() {
        let files = vec![
            FileTagPayload {
                path: "src/main.rs".into(),
                tags: vec![TagPayload::new("", "")],
            },
            FileTagPayload {
                path: "README.md".into(),
                tags: vec![TagPayload::new("Doc", "Readme")],
            },
        ];
        let normalized = normalize_file_tags(&files);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].path, "README.md");
        assert_eq!(normalized[0].tags[0].key, "doc");
    }
}

// Tag Diffing

use crate::domain::repository::RepositoryTag;
use crate::domain::tag::{FileTagPayload, TagPayload};
use crate::TAG_SOURCE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bare `(key, value)` reference used for removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub key: String,
    pub value: String,
}

/// Result of reconciling a normalized tag set against existing tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDiff {
    pub apply: Vec<TagPayload>,
    pub remove: Vec<TagRef>,
}

/// Per-file diff. The explorer does not report prior tags, so removals
/// are always empty today; the shape keeps apply/remove symmetric with
/// the repository diff.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTagDiff {
    pub path: String,
    pub apply: Vec<TagPayload>,
    pub remove: Vec<TagRef>,
}

/// Reconcile the new normalized repository tags against the tags the
/// catalog already carries. Only existing tags this service owns (source
/// absent or equal to ours) participate; tags from other sources are left
/// untouched. Identity is the `(key, value)` pair.
pub fn diff_repository_tags(new: &[TagPayload], existing: &[RepositoryTag]) -> TagDiff {
    let new_identities: HashSet<(String, String)> = new
        .iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect();

    let remove = existing
        .iter()
        .filter(|t| match &t.source {
            None => true,
            Some(source) => source == TAG_SOURCE,
        })
        .filter(|t| !new_identities.contains(&(t.key.clone(), t.value.clone())))
        .map(|t| TagRef {
            key: t.key.clone(),
            value: t.value.clone(),
        })
        .collect();

    TagDiff {
        apply: new.to_vec(),
        remove,
    }
}

pub fn diff_file_tags(files: &[FileTagPayload]) -> Vec<FileTagDiff> {
    files
        .iter()
        .map(|file| FileTagDiff {
            path: file.path.clone(),
            apply: file.tags.clone(),
            remove: Vec::new(),
        })
        .collect()
}

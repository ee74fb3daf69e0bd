// File Sampling - explorer hits with local checkout fallback

use crate::port::FileExplorerClient;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

pub const MAX_SAMPLE_FILES: usize = 20;
pub const SNIPPET_MAX_BYTES: usize = 800;
pub const LARGE_FILE_THRESHOLD: u64 = 200_000;
pub const LARGE_FILE_READ_BYTES: usize = 2_000;
const TRUNCATION_MARKER: &str = "\n...";

/// Directories never descended into during local discovery.
const SKIPPED_DIRS: [&str; 6] = [".git", "node_modules", "dist", "build", "out", "venv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSample {
    pub path: String,
    pub snippet: String,
}

/// Collect up to 20 file samples for the prompt. The explorer's ranked
/// hits are preferred (with their previews when present); if the search
/// fails the checkout itself is walked instead.
pub async fn sample_repository_files(
    explorer: &dyn FileExplorerClient,
    repository_id: &str,
    checkout: &Path,
) -> Vec<FileSample> {
    let paths_with_previews: Vec<(String, Option<String>)> =
        match explorer.search_files(repository_id, MAX_SAMPLE_FILES).await {
            Ok(hits) => hits
                .into_iter()
                .take(MAX_SAMPLE_FILES)
                .map(|hit| (hit.path, hit.preview))
                .collect(),
            Err(e) => {
                warn!(
                    repository_id = %repository_id,
                    error = %e,
                    "File search failed, falling back to local discovery"
                );
                discover_local_files(checkout)
                    .into_iter()
                    .map(|path| (path, None))
                    .collect()
            }
        };

    let mut samples = Vec::with_capacity(paths_with_previews.len());
    for (path, preview) in paths_with_previews {
        let snippet = match preview {
            Some(preview) if !preview.is_empty() => truncate_snippet(&preview),
            _ => read_snippet(&checkout.join(&path)).await,
        };
        samples.push(FileSample { path, snippet });
    }
    samples
}

/// Walk the checkout depth-first (stack-pop order) and collect up to 20
/// file paths relative to the checkout root.
pub fn discover_local_files(checkout: &Path) -> Vec<String> {
    let mut stack: Vec<PathBuf> = vec![checkout.to_path_buf()];
    let mut files = Vec::new();

    while let Some(current) = stack.pop() {
        if files.len() >= MAX_SAMPLE_FILES {
            break;
        }
        if current.is_dir() {
            let name = current.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if current.as_path() != checkout && SKIPPED_DIRS.contains(&name) {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(&current) else {
                debug!(path = %current.display(), "Unreadable directory during discovery");
                continue;
            };
            for entry in entries.flatten() {
                stack.push(entry.path());
            }
        } else if current.is_file() {
            if let Ok(relative) = current.strip_prefix(checkout) {
                files.push(relative.to_string_lossy().into_owned());
            }
        }
    }

    files
}

/// Read a snippet from a local file. Regular files are read up to 800
/// bytes; very large files get their first 2 000 bytes before the same
/// truncation. Unreadable files yield an empty snippet.
pub async fn read_snippet(path: &Path) -> String {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return String::new();
    };
    let read_limit = if metadata.len() > LARGE_FILE_THRESHOLD {
        LARGE_FILE_READ_BYTES
    } else {
        SNIPPET_MAX_BYTES
    };

    let Ok(file) = tokio::fs::File::open(path).await else {
        return String::new();
    };
    let mut buf = Vec::with_capacity(read_limit);
    let mut limited = file.take(read_limit as u64);
    if limited.read_to_end(&mut buf).await.is_err() {
        return String::new();
    }

    truncate_snippet(&String::from_utf8_lossy(&buf))
}

/// Cap a snippet at 800 bytes on a char boundary, appending the marker
/// when anything was cut.
fn truncate_snippet(snippet: &str) -> String {
    if snippet.len() <= SNIPPET_MAX_BYTES {
        return snippet.to_string();
    }
    let mut cut = SNIPPET_MAX_BYTES;
    while !snippet.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &snippet[..cut], TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileSearchHit, TagPayload};
    use crate::error::{AppError, Result};
    use async_trait::async_trait;
    use std::io::Write as _;

    struct StubExplorer {
        hits: Option<Vec<FileSearchHit>>,
    }

    #[async_trait]
    impl FileExplorerClient for StubExplorer {
        async fn search_files(
            &self,
            _repository_id: &str,
            _limit: usize,
        ) -> Result<Vec<FileSearchHit>> {
            match &self.hits {
                Some(hits) => Ok(hits.clone()),
                None => Err(AppError::Http("search unavailable".to_string())),
            }
        }
        async fn apply_file_tags(
            &self,
            _repository_id: &str,
            _path: &str,
            _tags: &[TagPayload],
        ) -> Result<()> {
            Ok(())
        }
        async fn remove_file_tags(
            &self,
            _repository_id: &str,
            _path: &str,
            _tags: &[TagPayload],
        ) -> Result<()> {
            Ok(())
        }
    }

    fn write_file(dir: &Path, rel: &str, contents: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn discovery_skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/main.rs", b"fn main() {}");
        write_file(dir.path(), "node_modules/pkg/index.js", b"ignored");
        write_file(dir.path(), ".git/HEAD", b"ignored");
        write_file(dir.path(), "README.md", b"# readme");

        let files = discover_local_files(dir.path());
        assert!(files.iter().any(|f| f.ends_with("main.rs")));
        assert!(files.iter().any(|f| f == "README.md"));
        assert!(!files.iter().any(|f| f.contains("node_modules")));
        assert!(!files.iter().any(|f| f.contains(".git")));
    }

    #[test]
    fn discovery_caps_at_twenty_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..30 {
            write_file(dir.path(), &format!("file-{i:02}.txt"), b"x");
        }
        let files = discover_local_files(dir.path());
        assert_eq!(files.len(), MAX_SAMPLE_FILES);
    }

    #[tokio::test]
    async fn medium_files_read_the_snippet_limit_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "medium.txt", "a".repeat(5_000).as_bytes());

        let snippet = read_snippet(&dir.path().join("medium.txt")).await;
        assert_eq!(snippet.len(), SNIPPET_MAX_BYTES);
        assert!(!snippet.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn huge_files_read_more_then_truncate_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "huge.txt", "a".repeat(250_000).as_bytes());

        let snippet = read_snippet(&dir.path().join("huge.txt")).await;
        assert!(snippet.ends_with(TRUNCATION_MARKER));
        assert_eq!(snippet.len(), SNIPPET_MAX_BYTES + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn small_files_are_read_whole() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "small.txt", b"hello");
        assert_eq!(read_snippet(&dir.path().join("small.txt")).await, "hello");
    }

    #[tokio::test]
    async fn unreadable_files_yield_empty_snippet() {
        let snippet = read_snippet(Path::new("/definitely/not/here.txt")).await;
        assert_eq!(snippet, "");
    }

    #[tokio::test]
    async fn explorer_previews_are_preferred() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/lib.rs", b"on disk");

        let explorer = StubExplorer {
            hits: Some(vec![FileSearchHit {
                path: "src/lib.rs".into(),
                score: Some(0.9),
                preview: Some("from explorer".into()),
            }]),
        };

        let samples = sample_repository_files(&explorer, "r1", dir.path()).await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].snippet, "from explorer");
    }

    #[tokio::test]
    async fn search_failure_falls_back_to_local_walk() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/lib.rs", b"local contents");

        let explorer = StubExplorer { hits: None };
        let samples = sample_repository_files(&explorer, "r1", dir.path()).await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].snippet, "local contents");
    }

    #[tokio::test]
    async fn hit_without_preview_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/lib.rs", b"local contents");

        let explorer = StubExplorer {
            hits: Some(vec![FileSearchHit {
                path: "src/lib.rs".into(),
                score: None,
                preview: None,
            }]),
        };
        let samples = sample_repository_files(&explorer, "r1", dir.path()).await;
        assert_eq!(samples[0].snippet, "local contents");
    }
}

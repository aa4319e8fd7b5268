//! Per-file indent-based complexity measurement.

use std::collections::HashMap;

use gitmem_types::{ChangeType, CommitFile, Complexity};

use crate::error::GitmemError;
use crate::git::GitAdapter;
use crate::ports::CommitStore;

const DEFAULT_TAB_WIDTH: usize = 4;

/// Lockfiles excluded by exact basename, regardless of extension.
const GENERATED_BASENAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "composer.lock",
    "Gemfile.lock",
    "poetry.lock",
    "Pipfile.lock",
    "Cargo.lock",
];

/// Suffixes that always short-circuit measurement regardless of basename.
const GENERATED_EXTENSIONS: &[&str] = &[".min.js", ".min.css", ".map", ".lock"];

/// Chunk size for `file_contents_batch` calls; also the batch size for the
/// persisted complexity update.
const MEASURE_CHUNK_SIZE: usize = 500;

pub fn is_generated_or_vendored(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    if GENERATED_BASENAMES.contains(&basename) {
        return true;
    }
    GENERATED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

/// Computes lines-of-code, summed indent, and max indent for file content,
/// treating a tab as `tab_width` spaces and stopping the leading-whitespace
/// scan at the first non-whitespace character on each line.
pub fn compute_complexity(content: &[u8], tab_width: usize) -> Complexity {
    let text = String::from_utf8_lossy(content);
    let mut lines_of_code = 0i64;
    let mut indent_complexity = 0i64;
    let mut max_indent = 0i64;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        lines_of_code += 1;

        let mut spaces = 0usize;
        for ch in line.chars() {
            match ch {
                ' ' => spaces += 1,
                '\t' => spaces += tab_width,
                _ => break,
            }
        }
        let indent = (spaces / tab_width) as i64;
        indent_complexity += indent;
        max_indent = max_indent.max(indent);
    }

    Complexity {
        lines_of_code,
        indent_complexity,
        max_indent,
    }
}

pub struct Measurer {
    tab_width: usize,
}

impl Default for Measurer {
    fn default() -> Self {
        Self {
            tab_width: DEFAULT_TAB_WIDTH,
        }
    }
}

impl Measurer {
    pub fn with_tab_width(tab_width: usize) -> Self {
        Self { tab_width }
    }

    /// Measures every commit-file row still missing a complexity triple,
    /// chunked so each chunk issues exactly one `file_contents_batch` call
    /// and one persisted batch update, reporting progress after each chunk.
    pub async fn measure_all(
        &self,
        git: &dyn GitAdapter,
        store: &dyn CommitStore,
        mut on_chunk: impl FnMut(usize, usize),
    ) -> Result<(), GitmemError> {
        let mut total_measured = 0usize;
        loop {
            let pending = store.commit_files_missing_complexity(MEASURE_CHUNK_SIZE).await?;
            if pending.is_empty() {
                break;
            }
            let measured = self.measure_chunk(git, pending).await?;
            let chunk_len = measured.len();
            store.update_complexity_batch(measured).await?;
            total_measured += chunk_len;
            on_chunk(total_measured, chunk_len);
            if chunk_len < MEASURE_CHUNK_SIZE {
                break;
            }
        }
        Ok(())
    }

    /// Measures one chunk of commit-file rows, applying short-circuit rules
    /// before ever asking the git adapter for content.
    async fn measure_chunk(
        &self,
        git: &dyn GitAdapter,
        mut files: Vec<CommitFile>,
    ) -> Result<Vec<CommitFile>, GitmemError> {
        let mut needs_content = Vec::new();
        for (idx, f) in files.iter().enumerate() {
            if f.change_type == ChangeType::Deleted || is_generated_or_vendored(&f.file_path) {
                continue;
            }
            needs_content.push((idx, (f.commit_hash.clone(), f.file_path.clone())));
        }

        let refs: Vec<_> = needs_content.iter().map(|(_, r)| r.clone()).collect();
        let contents: HashMap<(String, String), Vec<u8>> = git.file_contents_batch(&refs).await?;

        for (idx, key) in needs_content {
            let complexity = match contents.get(&key) {
                Some(bytes) if is_binary(bytes) => Complexity::ZERO,
                Some(bytes) => compute_complexity(bytes, self.tab_width),
                None => Complexity::ZERO,
            };
            files[idx].complexity = Some(complexity);
        }

        for f in &mut files {
            if f.complexity.is_none() {
                f.complexity = Some(Complexity::ZERO);
            }
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_non_blank_lines() {
        let content = b"fn main() {\n\n    println!(\"hi\");\n}\n";
        let c = compute_complexity(content, 4);
        assert_eq!(c.lines_of_code, 3);
    }

    #[test]
    fn tabs_count_as_tab_width_spaces() {
        let content = b"\tfoo\n        bar\n";
        let c = compute_complexity(content, 4);
        assert_eq!(c.max_indent, 2);
    }

    #[test]
    fn mixed_tabs_and_spaces_stop_at_first_non_whitespace() {
        let content = b" \tfoo\n";
        // one space (1) + one tab (4) = 5 spaces -> 5/4 = 1
        let c = compute_complexity(content, 4);
        assert_eq!(c.max_indent, 1);
    }

    #[test]
    fn detects_binary_via_nul_in_first_8kib() {
        let mut bytes = vec![b'a'; 100];
        bytes.push(0);
        assert!(is_binary(&bytes));
        assert!(!is_binary(b"plain text"));
    }

    #[test]
    fn lockfiles_and_minified_assets_are_generated() {
        assert!(is_generated_or_vendored("package-lock.json"));
        assert!(is_generated_or_vendored("dist/app.min.js"));
        assert!(is_generated_or_vendored("dist/app.js.map"));
        assert!(!is_generated_or_vendored("src/app.ts"));
    }
}

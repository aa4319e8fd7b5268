//! Subprocess-backed implementation of read-only git access.
//!
//! Every batched operation issues a bounded number of `git` invocations
//! regardless of how many hashes or paths are requested; large inputs are
//! chunked and/or passed over stdin to stay under OS argument-length limits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use gitmem_types::{ChangeType, Commit, CommitFile};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::GitError;

/// Commits are batched at this many hashes per `git log --stdin` invocation
/// to keep a single process's stdin and output buffering reasonable.
const COMMIT_BATCH_SIZE: usize = 500;

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';

/// One commit plus its file-change rows, as discovered from git (complexity
/// is always `None` here; the measurer fills it in later).
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub commit: Commit,
    pub files: Vec<CommitFile>,
}

#[async_trait]
pub trait GitAdapter: Send + Sync {
    async fn is_repo(&self) -> bool;
    async fn default_branch(&self) -> Result<String, GitError>;
    async fn commit_hashes(&self, branch: &str) -> Result<Vec<String>, GitError>;
    async fn commit_info_batch(&self, hashes: &[String]) -> Result<Vec<CommitRecord>, GitError>;
    async fn diff_batch(
        &self,
        hashes: &[String],
        max_chars: usize,
    ) -> Result<HashMap<String, String>, GitError>;
    async fn tracked_files(&self) -> Result<Vec<String>, GitError>;
    async fn file_contents_batch(
        &self,
        refs: &[(String, String)],
    ) -> Result<HashMap<(String, String), Vec<u8>>, GitError>;
    async fn total_commit_count(&self, branch: &str) -> Result<usize, GitError>;
}

/// `GitAdapter` backed by the system `git` binary, scoped to one working
/// directory.
pub struct LocalGitAdapter {
    repo_root: PathBuf,
}

impl LocalGitAdapter {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_root);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let output = self
            .command(args)
            .output()
            .await
            .map_err(GitError::Spawn)?;
        if !output.status.success() {
            return Err(GitError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    async fn run_text(&self, args: &[&str]) -> Result<String, GitError> {
        let bytes = self.run(args).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Runs `git log --stdin ...`, feeding `hashes` one per line on stdin and
    /// reading the resulting stdout to completion. Used for both the
    /// commit-info and diff batch forms so neither depends on argv limits.
    async fn run_with_stdin_hashes(
        &self,
        args: &[&str],
        hashes: &[String],
    ) -> Result<Vec<u8>, GitError> {
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn().map_err(GitError::Spawn)?;

        let mut stdin = child.stdin.take().expect("stdin piped above");
        let mut payload = String::new();
        for hash in hashes {
            payload.push_str(hash);
            payload.push('\n');
        }
        stdin.write_all(payload.as_bytes()).await?;
        drop(stdin);

        let mut stdout = Vec::new();
        child
            .stdout
            .take()
            .expect("stdout piped above")
            .read_to_end(&mut stdout)
            .await?;

        let mut stderr = Vec::new();
        if let Some(mut s) = child.stderr.take() {
            s.read_to_end(&mut stderr).await?;
        }

        let status = child.wait().await.map_err(GitError::Spawn)?;
        if !status.success() {
            return Err(GitError::NonZeroExit {
                status: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl GitAdapter for LocalGitAdapter {
    async fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--git-dir"]).await.is_ok()
    }

    async fn default_branch(&self) -> Result<String, GitError> {
        if let Ok(out) = self
            .run_text(&["symbolic-ref", "refs/remotes/origin/HEAD"])
            .await
        {
            if let Some(name) = out.trim().strip_prefix("refs/remotes/origin/") {
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }
        for candidate in ["main", "master"] {
            if self
                .run(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{candidate}")])
                .await
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }
        let head = self.run_text(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(head.trim().to_string())
    }

    async fn commit_hashes(&self, branch: &str) -> Result<Vec<String>, GitError> {
        let out = self.run_text(&["log", "--format=%H", branch]).await?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    async fn commit_info_batch(&self, hashes: &[String]) -> Result<Vec<CommitRecord>, GitError> {
        let mut records = Vec::with_capacity(hashes.len());
        for chunk in hashes.chunks(COMMIT_BATCH_SIZE) {
            let format = format!(
                "--format={rs}%H{fs}%an{fs}%ae{fs}%aI{fs}%B{rs}",
                rs = RECORD_SEP,
                fs = FIELD_SEP,
            );
            let args = ["log", "--no-walk", "--stdin", &format, "--raw", "--numstat"];
            let bytes = self.run_with_stdin_hashes(&args, chunk).await?;
            let text = String::from_utf8_lossy(&bytes);
            records.extend(parse_commit_batch(&text)?);
        }
        Ok(records)
    }

    async fn diff_batch(
        &self,
        hashes: &[String],
        max_chars: usize,
    ) -> Result<HashMap<String, String>, GitError> {
        let mut out = HashMap::with_capacity(hashes.len());
        for chunk in hashes.chunks(COMMIT_BATCH_SIZE) {
            let format = format!("--format={rs}%H{rs}", rs = RECORD_SEP);
            let args = ["log", "--no-walk", "--stdin", &format, "-p", "--unified=3"];
            let bytes = self.run_with_stdin_hashes(&args, chunk).await?;
            let text = String::from_utf8_lossy(&bytes);

            // Format string wraps each hash in RECORD_SEP, so splitting on it
            // yields [<leading empty>, hash1, diff1, hash2, diff2, ...].
            let mut parts = text.split(RECORD_SEP);
            parts.next();
            while let Some(hash_part) = parts.next() {
                let hash = hash_part.trim().to_string();
                let diff_part = parts.next().unwrap_or("");
                if hash.is_empty() {
                    continue;
                }
                let diff = diff_part.trim_start_matches('\n');
                out.insert(hash, truncate_diff_fairly(diff, max_chars));
            }
        }
        for hash in hashes {
            out.entry(hash.clone()).or_default();
        }
        Ok(out)
    }

    async fn tracked_files(&self) -> Result<Vec<String>, GitError> {
        let out = self.run_text(&["ls-files"]).await?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    async fn file_contents_batch(
        &self,
        refs: &[(String, String)],
    ) -> Result<HashMap<(String, String), Vec<u8>>, GitError> {
        let mut cmd = self.command(&["cat-file", "--batch"]);
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn().map_err(GitError::Spawn)?;

        let mut stdin = child.stdin.take().expect("stdin piped above");
        let mut requested = Vec::with_capacity(refs.len());
        for (hash, path) in refs {
            let spec = format!("{hash}:{path}");
            stdin.write_all(spec.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            requested.push((hash.clone(), path.clone()));
        }
        drop(stdin);

        let mut stdout = child.stdout.take().expect("stdout piped above");
        let mut results = HashMap::new();
        for key in requested {
            match read_cat_file_batch_entry(&mut stdout).await? {
                Some(bytes) => {
                    results.insert(key, bytes);
                }
                None => {} // missing blob at that revision: omitted per contract
            }
        }
        let _ = child.wait().await;
        Ok(results)
    }

    async fn total_commit_count(&self, branch: &str) -> Result<usize, GitError> {
        let out = self.run_text(&["rev-list", "--count", branch]).await?;
        out.trim()
            .parse()
            .map_err(|_| GitError::UnexpectedOutput(out))
    }
}

/// Reads one `git cat-file --batch` response: a header line
/// `<sha> <type> <size>` (or `<sha> missing`), then exactly `size` bytes of
/// content, then a trailing newline.
async fn read_cat_file_batch_entry(
    stdout: &mut (impl tokio::io::AsyncRead + Unpin),
) -> Result<Option<Vec<u8>>, GitError> {
    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stdout.read(&mut byte).await?;
        if n == 0 {
            return Ok(None);
        }
        if byte[0] == b'\n' {
            break;
        }
        header.push(byte[0]);
    }
    let header = String::from_utf8_lossy(&header);
    let mut parts = header.split_whitespace();
    let _sha = parts.next();
    let second = parts.next().unwrap_or("");
    if second == "missing" {
        return Ok(None);
    }
    let size: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GitError::UnexpectedOutput(header.to_string()))?;

    let mut content = vec![0u8; size];
    stdout.read_exact(&mut content).await?;
    let mut trailing = [0u8; 1];
    let _ = stdout.read_exact(&mut trailing).await;
    Ok(Some(content))
}

fn parse_commit_batch(text: &str) -> Result<Vec<CommitRecord>, GitError> {
    let mut records = Vec::new();
    for block in text.split(RECORD_SEP) {
        let block = block.trim_start_matches('\n');
        if block.trim().is_empty() {
            continue;
        }
        let Some((header_and_body, name_numstat)) = split_once_after_header(block) else {
            continue;
        };
        let mut fields = header_and_body.splitn(5, FIELD_SEP);
        let hash = fields.next().unwrap_or_default().trim().to_string();
        if hash.is_empty() {
            continue;
        }
        let author_name = fields.next().unwrap_or_default().to_string();
        let author_email = fields.next().unwrap_or_default().to_string();
        let committed_at = fields.next().unwrap_or_default().to_string();
        let message = fields.next().unwrap_or_default().trim_end().to_string();

        let files = parse_raw_and_numstat(&hash, name_numstat);
        records.push(CommitRecord {
            commit: Commit {
                hash,
                author_name,
                author_email,
                committed_at,
                message,
                enrichment: None,
            },
            files,
        });
    }
    Ok(records)
}

/// The header line (ending at the record-sep git emits right after `%B`) is
/// followed by the interleaved raw/numstat body for that commit. We split on
/// the first newline-delimited blank-ish boundary: everything up to the
/// first line that looks like a raw (`:100644 ...`) or numstat
/// (`<digits>\t<digits>\t`) entry belongs to the header.
fn split_once_after_header(block: &str) -> Option<(&str, &str)> {
    let mut idx = 0;
    for (i, line) in LineIndices::new(block) {
        if line.starts_with(':') || is_numstat_line(line) {
            idx = i;
            break;
        }
    }
    if idx == 0 {
        Some((block, ""))
    } else {
        Some((&block[..idx], &block[idx..]))
    }
}

fn is_numstat_line(line: &str) -> bool {
    let mut parts = line.splitn(3, '\t');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(_)) => {
            (a == "-" || a.parse::<u64>().is_ok()) && (b == "-" || b.parse::<u64>().is_ok())
        }
        _ => false,
    }
}

struct LineIndices<'a> {
    rest: &'a str,
    offset: usize,
}

impl<'a> LineIndices<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s, offset: 0 }
    }
}

impl<'a> Iterator for LineIndices<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (line, remainder) = match self.rest.find('\n') {
            Some(pos) => (&self.rest[..pos], &self.rest[pos + 1..]),
            None => (self.rest, ""),
        };
        let start = self.offset;
        self.offset += line.len() + 1;
        self.rest = remainder;
        Some((start, line))
    }
}

fn parse_raw_and_numstat(hash: &str, body: &str) -> Vec<CommitFile> {
    let mut change_types: HashMap<String, ChangeType> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for line in body.lines() {
        if let Some(rest) = line.strip_prefix(':') {
            // ":100644 100644 <old> <new> <status>\t<path>" (rename/copy carry a
            // trailing tab-separated destination path we ignore here, scope
            // tracks the post-rename path only).
            let Some((meta, path)) = rest.split_once('\t') else {
                continue;
            };
            let status = meta.split_whitespace().last().unwrap_or("");
            if let Some(ct) = ChangeType::parse(status) {
                let path = path.split('\t').last().unwrap_or(path).to_string();
                if !change_types.contains_key(&path) {
                    order.push(path.clone());
                }
                change_types.insert(path, ct);
            }
        }
    }

    let mut files = Vec::new();
    for line in body.lines() {
        if is_numstat_line(line) {
            let mut parts = line.splitn(3, '\t');
            let additions = parts.next().unwrap_or("0");
            let deletions = parts.next().unwrap_or("0");
            let path = parts.next().unwrap_or("").trim().to_string();
            if path.is_empty() {
                continue;
            }
            let change_type = change_types.get(&path).copied().unwrap_or(ChangeType::Modified);
            files.push(CommitFile {
                commit_hash: hash.to_string(),
                file_path: path,
                change_type,
                additions: additions.parse().unwrap_or(0),
                deletions: deletions.parse().unwrap_or(0),
                complexity: None,
            });
        }
    }

    // Binary files appear in numstat as "-\t-\t<path>" with no raw twin in
    // some git versions; fall back to whatever raw saw so nothing is lost.
    for path in order {
        if !files.iter().any(|f| f.file_path == path) {
            files.push(CommitFile {
                commit_hash: hash.to_string(),
                file_path: path.clone(),
                change_type: change_types[&path],
                additions: 0,
                deletions: 0,
                complexity: None,
            });
        }
    }

    files
}

/// Per-file unified diff sections, split on git's `diff --git a/... b/...`
/// section boundaries.
fn split_diff_sections(diff: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    for (i, _) in diff.match_indices("\ndiff --git ") {
        if i > start {
            sections.push(&diff[start..=i]);
        }
        start = i + 1;
    }
    if start < diff.len() {
        sections.push(&diff[start..]);
    }
    if sections.is_empty() && !diff.is_empty() {
        sections.push(diff);
    }
    sections
}

const TRUNCATION_MARKER: &str = "\n… [truncated]\n";

/// Fair per-file diff truncation: sections that fit within an equal share of
/// `max_chars` pass through untouched; the remaining budget is distributed
/// equally across the oversized sections. Never splits inside a UTF-16
/// surrogate pair (i.e. always truncates on a `char` boundary, which for
/// Rust's UTF-8 strings is a strictly stronger guarantee).
fn truncate_diff_fairly(diff: &str, max_chars: usize) -> String {
    if diff.chars().count() <= max_chars {
        return diff.to_string();
    }
    let sections = split_diff_sections(diff);
    if sections.is_empty() {
        return String::new();
    }

    let equal_share = max_chars / sections.len().max(1);
    let mut fitting_chars = 0usize;
    let mut oversized: Vec<&str> = Vec::new();
    for s in &sections {
        let len = s.chars().count();
        if len <= equal_share {
            fitting_chars += len;
        } else {
            oversized.push(s);
        }
    }

    let remaining = max_chars.saturating_sub(fitting_chars);
    let per_oversized = if oversized.is_empty() {
        0
    } else {
        remaining / oversized.len()
    };

    let mut out = String::with_capacity(max_chars + TRUNCATION_MARKER.len() * sections.len());
    for s in &sections {
        let len = s.chars().count();
        if len <= equal_share {
            out.push_str(s);
        } else {
            let budget = per_oversized.saturating_sub(TRUNCATION_MARKER.chars().count());
            let truncated: String = s.chars().take(budget).collect();
            out.push_str(&truncated);
            out.push_str(TRUNCATION_MARKER);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_under_budget_passes_through() {
        let diff = "small diff";
        assert_eq!(truncate_diff_fairly(diff, 1000), diff);
    }

    /// Builds a section whose total length (header included) is exactly
    /// `total_len` chars, so test sections match the spec scenario's stated
    /// sizes rather than being that size plus unaccounted header overhead.
    fn section_of_len(header: &str, fill: char, total_len: usize) -> String {
        let header_len = header.chars().count();
        let fill_len = total_len.saturating_sub(header_len);
        format!("{header}{}", fill.to_string().repeat(fill_len))
    }

    #[test]
    fn fair_truncation_lets_small_sections_through_intact() {
        let a = section_of_len("\ndiff --git a/a b/a\n", 'x', 5_000);
        let b = section_of_len("\ndiff --git a/b b/b\n", 'y', 5_000);
        let c = section_of_len("\ndiff --git a/c b/c\n", 'z', 200_000);
        let d = section_of_len("\ndiff --git a/d b/d\n", 'w', 200_000);
        let diff = format!("{a}{b}{c}{d}");

        let out = truncate_diff_fairly(&diff, 20_000);
        assert!(out.contains(&"x".repeat(4_000)));
        assert!(out.contains(&"y".repeat(4_000)));
        assert!(out.contains(TRUNCATION_MARKER.trim()));
        assert!(out.chars().count() <= 20_000 + TRUNCATION_MARKER.len() * 4);
    }

    #[test]
    fn numstat_line_detection_ignores_header_lines() {
        assert!(is_numstat_line("5\t3\tsrc/app.ts"));
        assert!(is_numstat_line("-\t-\tbin/blob"));
        assert!(!is_numstat_line(":100644 100644 aaa bbb M\tsrc/app.ts"));
    }

    #[test]
    fn parses_raw_and_numstat_into_commit_files() {
        let body = "\n:100644 100644 aaa bbb M\tsrc/app.ts\n\n5\t3\tsrc/app.ts\n";
        let files = parse_raw_and_numstat("deadbeef", body);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, "src/app.ts");
        assert_eq!(files[0].additions, 5);
        assert_eq!(files[0].deletions, 3);
        assert_eq!(files[0].change_type, ChangeType::Modified);
    }
}

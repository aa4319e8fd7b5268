//! Inline SQL migrations for the gitmem index database.
//!
//! Each entry is applied at most once, tracked by a `_migrations` table
//! (see `Store::run_migrations`). `ALTER TABLE ADD COLUMN` statements are
//! used for incremental schema growth rather than rewriting `CREATE TABLE`
//! statements, so the migration routine stays idempotent across versions.

pub const MIGRATIONS: &[&str] = &[
    // 1: metadata
    r#"
CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
    // 2: commits
    r#"
CREATE TABLE IF NOT EXISTS commits (
    hash          TEXT PRIMARY KEY,
    author_name   TEXT NOT NULL,
    author_email  TEXT NOT NULL,
    committed_at  TEXT NOT NULL,
    message       TEXT NOT NULL,
    classification TEXT,
    summary       TEXT,
    enriched_at   TEXT,
    model_used    TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_commits_committed_at ON commits(committed_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_commits_enriched_at ON commits(enriched_at);"#,
    // 3: commit_files
    r#"
CREATE TABLE IF NOT EXISTS commit_files (
    commit_hash       TEXT NOT NULL REFERENCES commits(hash) ON DELETE CASCADE,
    file_path         TEXT NOT NULL,
    change_type       TEXT NOT NULL,
    additions         INTEGER NOT NULL DEFAULT 0 CHECK (additions >= 0),
    deletions         INTEGER NOT NULL DEFAULT 0 CHECK (deletions >= 0),
    lines_of_code     INTEGER,
    indent_complexity INTEGER,
    max_indent        INTEGER,
    PRIMARY KEY (commit_hash, file_path)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_commit_files_path ON commit_files(file_path);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_commit_files_complexity_missing ON commit_files(commit_hash) WHERE lines_of_code IS NULL;"#,
    // 4: file_stats (derived, rebuilt wholesale by the aggregator)
    r#"
CREATE TABLE IF NOT EXISTS file_stats (
    file_path          TEXT PRIMARY KEY,
    total_changes      INTEGER NOT NULL DEFAULT 0,
    bug_fix_count      INTEGER NOT NULL DEFAULT 0,
    feature_count      INTEGER NOT NULL DEFAULT 0,
    refactor_count     INTEGER NOT NULL DEFAULT 0,
    docs_count         INTEGER NOT NULL DEFAULT 0,
    chore_count        INTEGER NOT NULL DEFAULT 0,
    perf_count         INTEGER NOT NULL DEFAULT 0,
    test_count         INTEGER NOT NULL DEFAULT 0,
    style_count        INTEGER NOT NULL DEFAULT 0,
    first_seen         TEXT NOT NULL,
    last_changed       TEXT NOT NULL,
    total_additions    INTEGER NOT NULL DEFAULT 0,
    total_deletions    INTEGER NOT NULL DEFAULT 0,
    current_loc        INTEGER,
    current_complexity INTEGER,
    avg_complexity     REAL,
    max_complexity     INTEGER
);
"#,
    // 5: file_contributors (derived)
    r#"
CREATE TABLE IF NOT EXISTS file_contributors (
    file_path    TEXT NOT NULL,
    author_email TEXT NOT NULL,
    author_name  TEXT NOT NULL,
    commit_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (file_path, author_email)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_file_contributors_file ON file_contributors(file_path);"#,
    // 6: file_coupling (derived)
    r#"
CREATE TABLE IF NOT EXISTS file_coupling (
    file_a           TEXT NOT NULL,
    file_b           TEXT NOT NULL,
    co_change_count  INTEGER NOT NULL DEFAULT 0 CHECK (co_change_count >= 1),
    PRIMARY KEY (file_a, file_b),
    CHECK (file_a < file_b)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_file_coupling_a ON file_coupling(file_a);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_file_coupling_b ON file_coupling(file_b);"#,
    // 7: batch_jobs
    r#"
CREATE TABLE IF NOT EXISTS batch_jobs (
    batch_id        TEXT PRIMARY KEY,
    type            TEXT NOT NULL,
    status          TEXT NOT NULL,
    request_count   INTEGER NOT NULL DEFAULT 0,
    succeeded_count INTEGER NOT NULL DEFAULT 0,
    failed_count    INTEGER NOT NULL DEFAULT 0,
    submitted_at    TEXT NOT NULL,
    completed_at    TEXT,
    model_used      TEXT NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_batch_jobs_type_status ON batch_jobs(type, status);"#,
    // 8: check_batch_items
    r#"
CREATE TABLE IF NOT EXISTS check_batch_items (
    batch_id       TEXT NOT NULL REFERENCES batch_jobs(batch_id) ON DELETE CASCADE,
    hash           TEXT NOT NULL,
    classification TEXT NOT NULL,
    summary        TEXT NOT NULL,
    PRIMARY KEY (batch_id, hash)
);
"#,
    // 9: commits_fts — mirrors (hash, message, classification, summary) for
    // every commit; hash is unindexed since it's never searched by term.
    r#"
CREATE VIRTUAL TABLE IF NOT EXISTS commits_fts USING fts5(
    hash UNINDEXED,
    message,
    classification,
    summary,
    tokenize = 'porter unicode61 remove_diacritics 1'
);
"#,
];

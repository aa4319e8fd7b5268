//! `search`/`search_with_scope`: FTS5 `MATCH` queries over `commits_fts`,
//! optionally restricted to commits that touch at least one file within a
//! scope (§4.11's include/exclude patterns, reused verbatim from
//! `gitmem_core::scope`).

use gitmem_core::scope;
use gitmem_types::{Classification, ScopeConfig};
use sqlx::Row;

use crate::types::SearchHit;
use crate::{SearchError, SearchIndex, SearchResult};

impl<'a> SearchIndex<'a> {
    /// Plain full-text search, optionally filtered to one classification.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        classification: Option<Classification>,
    ) -> SearchResult<Vec<SearchHit>> {
        self.search_with_scope(query, limit, classification, &ScopeConfig::default()).await
    }

    /// Like `search`, but additionally restricts to commits touching at
    /// least one file matching `scope`. Degenerates to a plain search when
    /// `scope` is empty (no include/exclude patterns).
    ///
    /// FTS5 syntax errors (unbalanced quotes, stray operators) surface as
    /// `SearchError::InvalidQuery` carrying the original query string, so
    /// the caller can show a quoting hint rather than a raw sqlite message.
    pub async fn search_with_scope(
        &self,
        query: &str,
        limit: usize,
        classification: Option<Classification>,
        scope: &ScopeConfig,
    ) -> SearchResult<Vec<SearchHit>> {
        let mut sql = String::from(
            "SELECT c.hash, c.message, c.classification, c.summary, bm25(commits_fts) AS rank \
             FROM commits_fts \
             JOIN commits c ON c.hash = commits_fts.hash \
             WHERE commits_fts MATCH ?1",
        );
        let mut bind_idx = 2;
        if classification.is_some() {
            sql.push_str(&format!(" AND c.classification = ?{bind_idx}"));
            bind_idx += 1;
        }

        let mut patterns = Vec::new();
        if !scope.is_empty() {
            let (clause, scope_patterns) = scope_exists_clause(scope, bind_idx);
            sql.push_str(" AND ");
            sql.push_str(&clause);
            bind_idx += scope_patterns.len();
            patterns = scope_patterns;
        }
        sql.push_str(&format!(" ORDER BY rank LIMIT ?{bind_idx}"));

        let mut q = sqlx::query(&sql).bind(query);
        if let Some(c) = classification {
            q = q.bind(c.as_str());
        }
        for p in &patterns {
            q = q.bind(p);
        }
        q = q.bind(limit as i64);

        let rows = q.fetch_all(self.pool()).await.map_err(|e| {
            if is_fts_syntax_error(&e) {
                SearchError::InvalidQuery { query: query.to_string() }
            } else {
                SearchError::Sqlx(e)
            }
        })?;

        rows.iter().map(row_to_hit).collect()
    }
}

/// Builds the `EXISTS (... commit_files ... scope clauses ...)` fragment
/// shared between SQL and the bound `LIKE` patterns it needs. Returns the
/// SQL text plus the patterns in bind order.
fn scope_exists_clause(scope: &ScopeConfig, first_placeholder: usize) -> (String, Vec<String>) {
    let mut patterns = Vec::new();
    let mut next = first_placeholder;
    let mut clauses = Vec::new();

    if !scope.include.is_empty() {
        let include_clauses: Vec<String> = scope
            .include
            .iter()
            .map(|p| {
                let ph = format!("cf.file_path LIKE ?{next} ESCAPE '\\'");
                patterns.push(scope::to_like_pattern(p));
                next += 1;
                ph
            })
            .collect();
        clauses.push(format!("({})", include_clauses.join(" OR ")));
    }
    for p in &scope.exclude {
        clauses.push(format!("cf.file_path NOT LIKE ?{next} ESCAPE '\\'"));
        patterns.push(scope::to_like_pattern(p));
        next += 1;
    }

    let inner = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };
    let sql = format!("EXISTS (SELECT 1 FROM commit_files cf WHERE cf.commit_hash = c.hash AND {inner})");
    (sql, patterns)
}

fn row_to_hit(row: &sqlx::sqlite::SqliteRow) -> SearchResult<SearchHit> {
    let classification: Option<String> = row.try_get("classification")?;
    Ok(SearchHit {
        hash: row.try_get("hash")?,
        message: row.try_get("message")?,
        classification: classification.filter(|c| !c.is_empty()).map(|c| Classification::parse_or_chore(&c)),
        summary: row.try_get::<Option<String>, _>("summary")?.filter(|s| !s.is_empty()),
        rank: row.try_get("rank")?,
    })
}

/// SQLite reports a malformed FTS5 `MATCH` expression as a database error
/// whose message mentions `fts5` and `syntax error`/`malformed`; there is no
/// distinct sqlx error variant for it.
fn is_fts_syntax_error(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| {
            let msg = db_err.message().to_lowercase();
            msg.contains("fts5") && (msg.contains("syntax error") || msg.contains("malformed"))
        })
        .unwrap_or(false)
}

/// Free-function entry point for callers holding only a `&Store` — avoids
/// constructing a `SearchIndex` for a one-off scoped query.
pub async fn search_with_scope(
    store: &gitmem_db::Store,
    query: &str,
    limit: usize,
    classification: Option<Classification>,
    scope: &ScopeConfig,
) -> SearchResult<Vec<SearchHit>> {
    SearchIndex::new(store).search_with_scope(query, limit, classification, scope).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmem_core::ports::CommitStore;
    use gitmem_types::Classification;

    async fn enriched_store() -> gitmem_db::Store {
        let store = crate::tests::store_with_commit("a1", "fix bug in parser").await;
        store
            .update_enrichment_batch(
                vec![("a1".to_string(), Classification::BugFix, "Fixed a bug".to_string())],
                "test-model",
            )
            .await
            .unwrap();
        let index = SearchIndex::new(&store);
        index.index_commit("a1").await.unwrap();
        store
    }

    #[tokio::test]
    async fn search_matches_message_term() {
        let store = enriched_store().await;
        let index = SearchIndex::new(&store);
        let hits = index.search("bug", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hash, "a1");
        assert_eq!(hits[0].classification, Some(Classification::BugFix));
    }

    #[tokio::test]
    async fn search_filters_by_classification() {
        let store = enriched_store().await;
        let index = SearchIndex::new(&store);
        let hits = index.search("bug", 10, Some(Classification::Feature)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_with_scope_restricts_to_touched_files() {
        let store = enriched_store().await;
        let scope = ScopeConfig {
            include: vec!["src/".to_string()],
            exclude: vec![],
        };
        let hits = search_with_scope(&store, "bug", 10, None, &scope).await.unwrap();
        assert_eq!(hits.len(), 1);

        let empty_scope = ScopeConfig {
            include: vec!["docs/".to_string()],
            exclude: vec![],
        };
        let hits = search_with_scope(&store, "bug", 10, None, &empty_scope).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn invalid_query_surfaces_dedicated_error() {
        let store = enriched_store().await;
        let err = search_with_scope(&store, "\"unterminated", 10, None, &ScopeConfig::default())
            .await
            .unwrap_err();
        match err {
            SearchError::InvalidQuery { query } => assert_eq!(query, "\"unterminated"),
            other => panic!("expected invalid query error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_scope_degenerates_to_plain_search() {
        let store = enriched_store().await;
        let with_default = search_with_scope(&store, "bug", 10, None, &ScopeConfig::default()).await.unwrap();
        let index = SearchIndex::new(&store);
        let plain = index.search("bug", 10, None).await.unwrap();
        assert_eq!(with_default.len(), plain.len());
    }
}

//! Repository for `legal_cases` operations
//!
//! Vector statements use sqlx with `pgvector::Vector` binds; plain lookups go
//! through SeaORM.

use crate::db::models::*;
use crate::db::store::{CaseMatch, CaseStore};
use crate::db::DbPool;
use crate::embeddings::check_dimension;
use crate::errors::Result;
use async_trait::async_trait;
use pgvector::Vector;
use sea_orm::{EntityTrait, QuerySelect};
use sqlx::Row;
use std::collections::HashSet;

/// Similarity search, highest score first
const NEAREST_SQL: &str = r#"
    SELECT filename, summary, 1 - (embedding <=> $1) AS similarity
    FROM legal_cases
    WHERE embedding IS NOT NULL
    ORDER BY similarity DESC
    LIMIT $2
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO legal_cases (filename, summary, embedding)
    VALUES ($1, $2, $3)
"#;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    dimension: usize,
}

impl Repository {
    /// Create a new repository; `dimension` is the `vector(N)` column size
    pub fn new(pool: DbPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }
}

#[async_trait]
impl CaseStore for Repository {
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<CaseMatch>> {
        check_dimension(embedding, self.dimension)?;

        let rows = sqlx::query(NEAREST_SQL)
            .bind(Vector::from(embedding.to_vec()))
            .bind(limit as i64)
            .fetch_all(self.pool.pg())
            .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            matches.push(CaseMatch {
                filename: row.try_get("filename")?,
                summary: row.try_get("summary")?,
                similarity: row.try_get("similarity")?,
            });
        }

        Ok(matches)
    }

    async fn insert_case(&self, filename: &str, summary: &str, embedding: &[f32]) -> Result<()> {
        check_dimension(embedding, self.dimension)?;

        sqlx::query(INSERT_SQL)
            .bind(filename)
            .bind(summary)
            .bind(Vector::from(embedding.to_vec()))
            .execute(self.pool.pg())
            .await?;

        Ok(())
    }

    async fn known_filenames(&self) -> Result<HashSet<String>> {
        let names: Vec<String> = LegalCaseEntity::find()
            .select_only()
            .column(LegalCaseColumn::Filename)
            .into_tuple()
            .all(self.pool.conn())
            .await?;

        Ok(names.into_iter().collect())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM legal_cases")
            .fetch_one(self.pool.pg())
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::SqlxPostgresConnector;
    use sqlx::postgres::PgPool;

    fn normalized(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_nearest_sql_ranks_by_cosine_similarity() {
        let sql = normalized(NEAREST_SQL);
        assert!(sql.starts_with("SELECT filename, summary, 1 - (embedding <=> $1) AS similarity"));
        assert!(sql.contains("WHERE embedding IS NOT NULL"));
        assert!(sql.ends_with("ORDER BY similarity DESC LIMIT $2"));
    }

    #[test]
    fn test_insert_sql_columns() {
        assert_eq!(
            normalized(INSERT_SQL),
            "INSERT INTO legal_cases (filename, summary, embedding) VALUES ($1, $2, $3)"
        );
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; crate::DEFAULT_EMBEDDING_DIMENSION];
        v[i] = 1.0;
        v
    }

    #[tokio::test]
    #[ignore = "needs PostgreSQL with pgvector at DATABASE_URL"]
    async fn test_pgvector_insert_and_rank() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let pool = PgPool::connect(&url).await.unwrap();
        let db = DbPool {
            conn: SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone()),
            pool,
        };
        db.migrate().await.unwrap();

        let cleanup = "DELETE FROM legal_cases WHERE filename LIKE 'pgvector_test_%'";
        sqlx::query(cleanup).execute(db.pg()).await.unwrap();

        let repo = Repository::new(db.clone(), crate::DEFAULT_EMBEDDING_DIMENSION);
        repo.insert_case("pgvector_test_a.txt", "dismissal", &axis(0)).await.unwrap();
        repo.insert_case("pgvector_test_b.txt", "tenancy", &axis(1)).await.unwrap();

        let known = repo.known_filenames().await.unwrap();
        assert!(known.contains("pgvector_test_a.txt"));
        assert!(known.contains("pgvector_test_b.txt"));

        let total = repo.count().await.unwrap() as usize;
        let ranked: Vec<_> = repo
            .nearest(&axis(0), total)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.filename.starts_with("pgvector_test_"))
            .collect();
        assert_eq!(ranked[0].filename, "pgvector_test_a.txt");
        assert!((ranked[0].similarity - 1.0).abs() < 1e-6);
        assert!(ranked[1].similarity.abs() < 1e-6);

        sqlx::query(cleanup).execute(db.pg()).await.unwrap();
    }
}

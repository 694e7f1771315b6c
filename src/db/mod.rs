mod ballots;
pub mod cycles;
mod results;

use crate::error::VoteError;
use crate::models::{Book, Candidate, Category, Phase};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use log::info;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, migrate::MigrateDatabase};

/// Store handle. Cheap to share; every operation checks a connection out of the
/// pool for its own duration only.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, VoteError> {
        let in_memory = db_url.contains(":memory:");

        // Create database if it doesn't exist
        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        // An in-memory database lives and dies with its single connection
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };
        let pool = options.connect(db_url).await?;

        Self::init_schema(&pool).await?;
        info!("Connected to {}", db_url);

        Ok(Self { pool })
    }

    // Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory database")
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), VoteError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                author TEXT NOT NULL DEFAULT '',
                category_id INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_users (
                user_id INTEGER PRIMARY KEY,
                is_admin BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voting_cycles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phase TEXT NOT NULL,
                starts_at TEXT NOT NULL UNIQUE,
                finishes_at TEXT NOT NULL,
                finalized BOOLEAN NOT NULL DEFAULT FALSE,
                CHECK (finishes_at > starts_at)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ballots (
                cycle_id INTEGER NOT NULL,
                voter_id INTEGER NOT NULL,
                first_id INTEGER NOT NULL,
                second_id INTEGER NOT NULL,
                third_id INTEGER NOT NULL,
                submitted_at TEXT NOT NULL,
                PRIMARY KEY (cycle_id, voter_id),
                FOREIGN KEY (cycle_id) REFERENCES voting_cycles(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cycle_results (
                cycle_id INTEGER PRIMARY KEY,
                phase TEXT NOT NULL,
                first_id INTEGER,
                second_id INTEGER,
                third_id INTEGER,
                computed_at TEXT NOT NULL,
                FOREIGN KEY (cycle_id) REFERENCES voting_cycles(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // Candidate catalogue

    pub async fn add_category(&self, name: &str) -> Result<i64, VoteError> {
        let id = sqlx::query("INSERT INTO categories (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(to_db_time(now()))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        info!("Category {} added: {}", id, name);
        Ok(id)
    }

    pub async fn add_book(
        &self,
        category_id: i64,
        name: &str,
        author: &str,
    ) -> Result<i64, VoteError> {
        let category_exists = sqlx::query("SELECT 1 FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if !category_exists {
            return Err(VoteError::NotFound(format!("category {}", category_id)));
        }

        let id = sqlx::query(
            "INSERT INTO books (name, author, category_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(author)
        .bind(category_id)
        .bind(to_db_time(now()))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        info!("Book {} added to category {}: {}", id, category_id, name);
        Ok(id)
    }

    pub async fn categories(&self) -> Result<Vec<Category>, VoteError> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<Category, VoteError> {
                Ok(Category {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    pub async fn books(&self) -> Result<Vec<Book>, VoteError> {
        let rows = sqlx::query("SELECT id, name, author, category_id FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(book_from_row).collect()
    }

    pub async fn books_in_categories(&self, category_ids: &[i64]) -> Result<Vec<Book>, VoteError> {
        let books = self.books().await?;
        Ok(books
            .into_iter()
            .filter(|book| book.category_id.is_some_and(|id| category_ids.contains(&id)))
            .collect())
    }

    /// Every candidate of the given kind, in id order.
    pub async fn candidates(&self, kind: Phase) -> Result<Vec<Candidate>, VoteError> {
        Ok(match kind {
            Phase::Category => self.categories().await?.into_iter().map(Candidate::from).collect(),
            Phase::Book => self.books().await?.into_iter().map(Candidate::from).collect(),
        })
    }

    // Users

    pub async fn register_voter(&self, user_id: i64) -> Result<(), VoteError> {
        sqlx::query(
            r#"
            INSERT INTO bot_users (user_id, is_admin, created_at)
            VALUES (?, FALSE, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(to_db_time(now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_admin(&self, user_id: i64) -> Result<(), VoteError> {
        sqlx::query(
            r#"
            INSERT INTO bot_users (user_id, is_admin, created_at)
            VALUES (?, TRUE, ?)
            ON CONFLICT(user_id) DO UPDATE SET is_admin = TRUE
            "#,
        )
        .bind(user_id)
        .bind(to_db_time(now()))
        .execute(&self.pool)
        .await?;

        info!("Admin {} added", user_id);
        Ok(())
    }

    pub async fn is_admin(&self, user_id: i64) -> Result<bool, VoteError> {
        let row = sqlx::query("SELECT is_admin FROM bot_users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<bool, _>("is_admin")?),
            None => Ok(false),
        }
    }
}

fn book_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Book, VoteError> {
    Ok(Book {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        author: row.try_get("author")?,
        category_id: row.try_get("category_id")?,
    })
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

// Fixed width so that SQL string comparison follows time order.
fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn from_db_time(text: &str) -> Result<DateTime<Utc>, VoteError> {
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| VoteError::Db(sqlx::Error::Decode(Box::new(e))))
}

//! # PostgreSQL Venue Store
//!
//! Venues live in a single table (name taken from configuration) created on
//! startup if missing. Name uniqueness is enforced by the table's unique
//! constraint; a violation maps to the client-facing duplicate messages.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    parse_id, CapacityFilter, DatabaseError, DatabaseResult, VenueDatabase, DUPLICATE_NAME,
    DUPLICATE_NAME_ON_UPDATE, NO_OPERATIONS, UNKNOWN_ENTITY,
};
use crate::config::DatabaseConfig;
use crate::venue::{
    CreateVenueMessage, DeleteVenueMessage, ReadVenueMessage, UpdateVenueMessage, Venue,
};

pub struct PostgresVenueDatabase {
    pool: PgPool,
    table: String,
}

impl PostgresVenueDatabase {
    /// Connect using the configured pool settings and make sure the table exists
    pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url())
            .await?;

        let database = Self::with_pool(pool, config.table.clone());
        database.ensure_schema().await?;
        info!(table = %database.table, "✅ Venue table ready");
        Ok(database)
    }

    /// Wrap an existing pool; `table` must already be a validated identifier
    pub fn with_pool(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> DatabaseResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                capacity BIGINT NOT NULL,
                color TEXT,
                owner TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;

        let health: i32 = row.try_get("health")?;
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    fn row_to_venue(row: &PgRow) -> DatabaseResult<Venue> {
        let id: Uuid = row.try_get("id")?;
        Ok(Venue {
            id: id.to_string(),
            name: row.try_get("name")?,
            capacity: row.try_get("capacity")?,
            color: row.try_get("color")?,
            user: row.try_get("owner")?,
        })
    }

    fn map_unique_violation(err: sqlx::Error, message: &str) -> DatabaseError {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::client_facing(message)
            }
            _ => DatabaseError::Sqlx(err),
        }
    }
}

/// Escape `LIKE` wildcards so a name filter matches literally
fn like_pattern(name: &str) -> String {
    let escaped = name
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl VenueDatabase for PostgresVenueDatabase {
    async fn query(&self, query: &ReadVenueMessage) -> DatabaseResult<Vec<Venue>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT id, name, capacity, color, owner FROM {} WHERE TRUE",
            self.table
        ));

        if let Some(filter) = &query.id {
            let ids = filter
                .ids()
                .into_iter()
                .map(parse_id)
                .collect::<DatabaseResult<Vec<Uuid>>>()?;
            builder.push(" AND id = ANY(").push_bind(ids).push(")");
        }

        if let Some(name) = &query.name {
            builder.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }

        let capacity = CapacityFilter::from_query(query);
        if let Some(exact) = capacity.exact {
            builder.push(" AND capacity = ").push_bind(exact);
        }
        if let Some(minimum) = capacity.minimum {
            builder.push(" AND capacity >= ").push_bind(minimum);
        }
        if let Some(maximum) = capacity.maximum {
            builder.push(" AND capacity <= ").push_bind(maximum);
        }

        builder.push(" ORDER BY created_at, id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(matched = rows.len(), "Postgres venue query");
        rows.iter().map(Self::row_to_venue).collect()
    }

    async fn create(&self, create: &CreateVenueMessage) -> DatabaseResult<Vec<String>> {
        let id = Uuid::new_v4();
        let statement = format!(
            "INSERT INTO {} (id, name, capacity, color, owner) VALUES ($1, $2, $3, $4, $5)",
            self.table
        );

        sqlx::query(&statement)
            .bind(id)
            .bind(&create.name)
            .bind(create.capacity)
            .bind(&create.color)
            .bind(&create.userid)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_unique_violation(e, DUPLICATE_NAME))?;

        Ok(vec![id.to_string()])
    }

    async fn update(&self, update: &UpdateVenueMessage) -> DatabaseResult<Vec<String>> {
        let id = parse_id(&update.id)?;
        if !update.has_changes() {
            return Err(DatabaseError::client_facing(NO_OPERATIONS));
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", self.table));
        {
            let mut assignments = builder.separated(", ");
            if let Some(name) = &update.name {
                assignments.push("name = ").push_bind_unseparated(name.clone());
            }
            if let Some(capacity) = update.capacity {
                assignments.push("capacity = ").push_bind_unseparated(capacity);
            }
            if let Some(color) = &update.color {
                assignments.push("color = ").push_bind_unseparated(color.clone());
            }
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_unique_violation(e, DUPLICATE_NAME_ON_UPDATE))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::client_facing(UNKNOWN_ENTITY));
        }
        Ok(vec![id.to_string()])
    }

    async fn delete(&self, delete: &DeleteVenueMessage) -> DatabaseResult<Vec<String>> {
        let id = parse_id(&delete.id)?;
        let statement = format!("DELETE FROM {} WHERE id = $1", self.table);

        let result = sqlx::query(&statement)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::client_facing(UNKNOWN_ENTITY));
        }
        Ok(vec![id.to_string()])
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}

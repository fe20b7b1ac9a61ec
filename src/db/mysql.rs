use async_trait::async_trait;
use sqlx::{ConnectOptions, Connection, MySqlConnection, mysql::MySqlConnectOptions};
use tracing::{debug, info, instrument};

use super::{DbError, DbResult, TableCatalog, quote_identifier};
use crate::config::{DatabaseConfig, SelectionConfig};

const STALE_TABLES_QUERY: &str = r"
    SELECT CAST(TABLE_NAME AS CHAR) AS table_name
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME LIKE ? ESCAPE '\\'
      AND CREATE_TIME IS NOT NULL
      AND CREATE_TIME < DATE_SUB(CURDATE(), INTERVAL ? DAY)
";

/// MySQL-backed table catalog.
///
/// Every operation opens its own connection and closes it before returning.
pub struct MySqlCatalog {
    config: DatabaseConfig,
}

impl MySqlCatalog {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .database(&self.config.database);
        if !self.config.password.is_empty() {
            options = options.password(&self.config.password);
        }
        options
    }

    async fn connect(&self) -> DbResult<MySqlConnection> {
        debug!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "Connecting to database"
        );
        tokio::time::timeout(self.config.connect_timeout(), self.connect_options().connect())
            .await
            .map_err(|_| DbError::ConnectTimeout(self.config.connect_timeout_secs))?
            .map_err(DbError::from)
    }
}

#[async_trait]
impl TableCatalog for MySqlCatalog {
    #[instrument(skip(self, selection), fields(pattern = %selection.pattern, retention_days = selection.retention_days))]
    async fn find_stale_tables(&self, selection: &SelectionConfig) -> DbResult<Vec<String>> {
        let mut conn = self.connect().await?;

        let rows: Vec<(String,)> = sqlx::query_as(STALE_TABLES_QUERY)
            .bind(selection.like_pattern())
            .bind(selection.retention_days)
            .fetch_all(&mut conn)
            .await?;

        conn.close().await?;

        let tables: Vec<String> = rows.into_iter().map(|(name,)| name).collect();
        info!(count = tables.len(), "Found stale tables");
        Ok(tables)
    }

    #[instrument(skip(self))]
    async fn drop_table(&self, table: &str) -> DbResult<()> {
        let statement = format!("DROP TABLE IF EXISTS {}", quote_identifier(table)?);

        let mut conn = self.connect().await?;
        sqlx::query(&statement).execute(&mut conn).await?;
        conn.close().await?;

        info!(table, database = %self.config.database, "Dropped table");
        Ok(())
    }

    fn database_name(&self) -> &str {
        &self.config.database
    }
}

/// Integration tests against a real MySQL server.
///
/// These tests are marked #[ignore] by default because they require Docker.
///
/// Run with: `cargo test mysql_integration -- --ignored`
#[cfg(test)]
mod mysql_integration_tests {
    use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

    use super::*;

    async fn exec(config: &DatabaseConfig, sql: &str) {
        let catalog = MySqlCatalog::new(config.clone());
        let mut conn = catalog.connect().await.expect("connect");
        sqlx::query(sql).execute(&mut conn).await.expect(sql);
        conn.close().await.expect("close");
    }

    async fn table_names(config: &DatabaseConfig) -> Vec<String> {
        let catalog = MySqlCatalog::new(config.clone());
        let mut conn = catalog.connect().await.expect("connect");
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = DATABASE()",
        )
        .fetch_all(&mut conn)
        .await
        .expect("list tables");
        conn.close().await.expect("close");
        let mut names: Vec<String> = rows.into_iter().map(|(n,)| n).collect();
        names.sort();
        names
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn mysql_integration_select_and_drop() {
        let container = Mysql::default()
            .start()
            .await
            .expect("Failed to start MySQL container");
        let config = DatabaseConfig {
            host: container.get_host().await.expect("host").to_string(),
            port: container
                .get_host_port_ipv4(3306)
                .await
                .expect("port"),
            username: "root".into(),
            password: String::new(),
            database: "test".into(),
            connect_timeout_secs: 30,
        };

        // CREATE_TIME cannot be back-dated, so only the "too new" side of the
        // age filter is observable here.
        exec(&config, "CREATE TABLE tmp_4475_20230101 (id INT)").await;
        exec(&config, "CREATE TABLE tmp_4475_20230201 (id INT)").await;
        exec(&config, "CREATE TABLE tmpX4475X20230101 (id INT)").await;
        exec(&config, "CREATE TABLE keep_me (id INT)").await;

        let catalog = MySqlCatalog::new(config.clone());

        let fresh = catalog
            .find_stale_tables(&SelectionConfig {
                pattern: "_4475_".into(),
                retention_days: 3650,
            })
            .await
            .unwrap();
        assert!(fresh.is_empty(), "new tables must not be stale: {fresh:?}");

        catalog.drop_table("tmp_4475_20230101").await.unwrap();
        catalog.drop_table("tmp_4475_20230101").await.unwrap();

        let remaining = table_names(&config).await;
        assert_eq!(
            remaining,
            vec!["keep_me", "tmpX4475X20230101", "tmp_4475_20230201"]
        );
    }
}

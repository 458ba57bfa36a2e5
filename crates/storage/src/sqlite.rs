//! SQLite Durable Backend

use crate::{storable_timestamp, Prediction, SensorReading, StorageBackend, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS sensor_readings (
        id TEXT PRIMARY KEY,
        ts TEXT NOT NULL,
        machine_id TEXT NOT NULL,
        air_temperature REAL,
        process_temperature REAL,
        rotational_speed INTEGER,
        torque REAL,
        tool_wear INTEGER,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS sensor_readings_machine_ts
        ON sensor_readings(machine_id, ts DESC);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS predictions (
        id TEXT PRIMARY KEY,
        sensor_reading_id TEXT,
        machine_id TEXT NOT NULL,
        ts TEXT,
        model_version TEXT,
        prediction_label TEXT NOT NULL,
        failure_probability REAL,
        raw_scores TEXT NOT NULL DEFAULT '{}',
        raw_features TEXT NOT NULL DEFAULT '{}',
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS predictions_machine_created
        ON predictions(machine_id, created_at DESC);
    "#,
];

/// Connection settings for the SQLite backend
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// sqlx URL, e.g. `sqlite://maintenance.db?mode=rwc` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://maintenance.db?mode=rwc".to_string(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Durable store backed by a SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the pool and make sure the schema exists
    pub async fn connect(config: &SqliteConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout);

        // every in-memory connection is its own database
        if config.url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.initialize_schema().await?;

        info!(url = %config.url, "Connected to SQLite");
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Close the pool; later calls fail with `Unavailable`
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn reading_from_row(row: &SqliteRow) -> Result<SensorReading, StorageError> {
        Ok(SensorReading {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            machine_id: row.try_get("machine_id")?,
            timestamp: parse_ts(&row.try_get::<String, _>("ts")?)?,
            air_temperature: row.try_get("air_temperature")?,
            process_temperature: row.try_get("process_temperature")?,
            rotational_speed: row.try_get("rotational_speed")?,
            torque: row.try_get("torque")?,
            tool_wear: row.try_get("tool_wear")?,
            metadata: parse_document(&row.try_get::<String, _>("metadata")?)?,
            created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        })
    }

    fn prediction_from_row(row: &SqliteRow) -> Result<Prediction, StorageError> {
        let sensor_reading_id = row
            .try_get::<Option<String>, _>("sensor_reading_id")?
            .map(|s| parse_uuid(&s))
            .transpose()?;
        let reading_timestamp = row
            .try_get::<Option<String>, _>("ts")?
            .map(|s| parse_ts(&s))
            .transpose()?;

        Ok(Prediction {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            sensor_reading_id,
            machine_id: row.try_get("machine_id")?,
            reading_timestamp,
            model_version: row.try_get("model_version")?,
            label: row.try_get("prediction_label")?,
            failure_probability: row.try_get("failure_probability")?,
            raw_scores: parse_document(&row.try_get::<String, _>("raw_scores")?)?,
            raw_features: parse_document(&row.try_get::<String, _>("raw_features")?)?,
            metadata: parse_document(&row.try_get::<String, _>("metadata")?)?,
            created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn write_reading(&self, reading: &SensorReading) -> Result<Uuid, StorageError> {
        let metadata = serde_json::to_string(&reading.metadata)?;
        let ts = storable_timestamp(&reading.timestamp)?;
        let created_at = storable_timestamp(&reading.created_at)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO sensor_readings (
                id, ts, machine_id, air_temperature, process_temperature,
                rotational_speed, torque, tool_wear, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(reading.id.to_string())
        .bind(ts)
        .bind(&reading.machine_id)
        .bind(reading.air_temperature)
        .bind(reading.process_temperature)
        .bind(reading.rotational_speed)
        .bind(reading.torque)
        .bind(reading.tool_wear)
        .bind(metadata)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(id = %reading.id, machine_id = %reading.machine_id, "Inserted reading into SQLite");
        Ok(reading.id)
    }

    async fn query_readings(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SensorReading>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, ts, machine_id, air_temperature, process_temperature,
                   rotational_speed, torque, tool_wear, metadata, created_at
            FROM sensor_readings
            WHERE (?1 IS NULL OR machine_id = ?1)
            ORDER BY ts DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(machine_id)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::reading_from_row).collect()
    }

    async fn write_prediction(&self, prediction: &Prediction) -> Result<Uuid, StorageError> {
        let raw_scores = serde_json::to_string(&prediction.raw_scores)?;
        let raw_features = serde_json::to_string(&prediction.raw_features)?;
        let metadata = serde_json::to_string(&prediction.metadata)?;
        let ts = prediction
            .reading_timestamp
            .as_ref()
            .map(storable_timestamp)
            .transpose()?;
        let created_at = storable_timestamp(&prediction.created_at)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO predictions (
                id, sensor_reading_id, machine_id, ts, model_version, prediction_label,
                failure_probability, raw_scores, raw_features, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(prediction.id.to_string())
        .bind(prediction.sensor_reading_id.map(|id| id.to_string()))
        .bind(&prediction.machine_id)
        .bind(ts)
        .bind(&prediction.model_version)
        .bind(&prediction.label)
        .bind(prediction.failure_probability)
        .bind(raw_scores)
        .bind(raw_features)
        .bind(metadata)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            id = %prediction.id,
            machine_id = %prediction.machine_id,
            "Inserted prediction into SQLite"
        );
        Ok(prediction.id)
    }

    async fn query_predictions(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, sensor_reading_id, machine_id, ts, model_version, prediction_label,
                   failure_probability, raw_scores, raw_features, metadata, created_at
            FROM predictions
            WHERE (?1 IS NULL OR machine_id = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(machine_id)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::prediction_from_row).collect()
    }

    async fn machine_ids(&self) -> Result<Vec<String>, StorageError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT machine_id FROM sensor_readings ORDER BY machine_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Serialization(format!("bad id {s:?}: {e}")))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

fn parse_document(s: &str) -> Result<Value, StorageError> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FallbackStorage;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect(&SqliteConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    fn reading(machine: &str, offset_secs: i64, air: f64) -> SensorReading {
        SensorReading {
            id: Uuid::new_v4(),
            machine_id: machine.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + ChronoDuration::seconds(offset_secs),
            air_temperature: air,
            process_temperature: 310.2,
            rotational_speed: 1500,
            torque: 45.2,
            tool_wear: 120,
            metadata: json!({"location": "factory_A"}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reading_roundtrip_preserves_fields() {
        let store = memory_store().await;
        let r = reading("machine_01", 0, 305.5);

        let id = store.write_reading(&r).await.unwrap();
        assert_eq!(id, r.id);

        let rows = store.query_readings(Some("machine_01"), 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, r.id);
        assert_eq!(rows[0].timestamp, r.timestamp);
        assert_eq!(rows[0].rotational_speed, 1500);
        assert_eq!(rows[0].metadata, json!({"location": "factory_A"}));
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_with_paging() {
        let store = memory_store().await;
        for i in 0..4 {
            store.write_reading(&reading("m1", i * 10, 300.0 + i as f64)).await.unwrap();
        }
        store.write_reading(&reading("m2", 100, 400.0)).await.unwrap();

        let all = store.query_readings(None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].machine_id, "m2");

        let page = store.query_readings(Some("m1"), 2, 1).await.unwrap();
        let temps: Vec<f64> = page.iter().map(|r| r.air_temperature).collect();
        assert_eq!(temps, vec![302.0, 301.0]);

        assert_eq!(store.machine_ids().await.unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_filter_value_is_bound_not_interpolated() {
        let store = memory_store().await;
        store.write_reading(&reading("m1", 0, 300.0)).await.unwrap();

        let rows = store
            .query_readings(Some("m1' OR '1'='1"), 10, 0)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_leaves_no_partial_row() {
        let store = memory_store().await;
        let r = reading("m1", 0, 300.0);
        store.write_reading(&r).await.unwrap();

        let err = store.write_reading(&r).await.unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));
        assert_eq!(store.query_readings(None, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prediction_roundtrip() {
        let store = memory_store().await;
        let r = reading("m1", 0, 300.0);
        let prediction = Prediction {
            id: Uuid::new_v4(),
            sensor_reading_id: Some(r.id),
            machine_id: "m1".to_string(),
            reading_timestamp: Some(r.timestamp),
            model_version: None,
            label: "failure".to_string(),
            failure_probability: None,
            raw_scores: json!({"p": [0.1, 0.9]}),
            raw_features: json!({}),
            metadata: json!({"mock": true}),
            created_at: Utc::now(),
        };

        store.write_prediction(&prediction).await.unwrap();
        let rows = store.query_predictions(Some("m1"), 5, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sensor_reading_id, Some(r.id));
        assert_eq!(rows[0].label, "failure");
        assert_eq!(rows[0].failure_probability, None);
        assert_eq!(rows[0].raw_scores, json!({"p": [0.1, 0.9]}));
    }

    #[tokio::test]
    async fn test_wide_year_is_rejected_and_machine_stays_readable() {
        let store = memory_store().await;
        store.write_reading(&reading("m1", 0, 300.0)).await.unwrap();

        let mut wide = reading("m1", 0, 301.0);
        wide.timestamp = DateTime::from_timestamp(1_714_550_400_000, 0).unwrap();
        let err = store.write_reading(&wide).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));

        let rows = store.query_readings(Some("m1"), 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].air_temperature, 300.0);
    }

    #[tokio::test]
    async fn test_read_only_database_falls_back_to_memory() {
        let path = std::env::temp_dir().join(format!("pm-readonly-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        let writable = SqliteStore::connect(&SqliteConfig {
            url: format!("{url}?mode=rwc"),
            ..Default::default()
        })
        .await
        .unwrap();
        writable.write_reading(&reading("m1", 0, 300.0)).await.unwrap();
        writable.close().await;

        let options = SqliteConnectOptions::from_str(&url).unwrap().read_only(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
        let read_only = SqliteStore { pool };

        let err = read_only.write_reading(&reading("m1", 10, 305.0)).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err:?}");

        let storage = FallbackStorage::new(std::sync::Arc::new(read_only.clone()));
        storage.write_reading(&reading("m1", 20, 310.0)).await.unwrap();
        assert_eq!(storage.volatile_counts().unwrap(), (1, 0));

        let temps: Vec<f64> = storage
            .query_readings(Some("m1"), 10, 0)
            .await
            .unwrap()
            .iter()
            .map(|r| r.air_temperature)
            .collect();
        assert_eq!(temps, vec![310.0, 300.0]);

        read_only.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_closed_pool_reports_unavailable() {
        let store = memory_store().await;
        store.close().await;

        let err = store.write_reading(&reading("m1", 0, 300.0)).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}

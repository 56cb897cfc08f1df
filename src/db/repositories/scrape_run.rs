use crate::entities::{prelude::*, scrape_runs};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde::Serialize;

use crate::db::timestamp;

/// Last completed pass for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeRun {
    pub source: String,
    pub last_run_at: DateTime<Utc>,
    pub summary: serde_json::Value,
}

impl TryFrom<scrape_runs::Model> for ScrapeRun {
    type Error = anyhow::Error;

    fn try_from(m: scrape_runs::Model) -> Result<Self> {
        Ok(Self {
            last_run_at: DateTime::parse_from_rfc3339(&m.last_run_at)?.with_timezone(&Utc),
            summary: serde_json::from_str(&m.last_result_summary)
                .unwrap_or(serde_json::Value::Null),
            source: m.source,
        })
    }
}

pub struct ScrapeRunRepository {
    conn: DatabaseConnection,
}

impl ScrapeRunRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, source: &str) -> Result<Option<ScrapeRun>> {
        ScrapeRuns::find_by_id(source.to_string())
            .one(&self.conn)
            .await?
            .map(ScrapeRun::try_from)
            .transpose()
    }

    pub async fn record(
        &self,
        source: &str,
        at: DateTime<Utc>,
        summary: &serde_json::Value,
    ) -> Result<()> {
        let active_model = scrape_runs::ActiveModel {
            source: Set(source.to_string()),
            last_run_at: Set(timestamp(at)),
            last_result_summary: Set(serde_json::to_string(summary)?),
        };

        ScrapeRuns::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(scrape_runs::Column::Source)
                    .update_columns([
                        scrape_runs::Column::LastRunAt,
                        scrape_runs::Column::LastResultSummary,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ScrapeRun>> {
        ScrapeRuns::find()
            .order_by_asc(scrape_runs::Column::Source)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(ScrapeRun::try_from)
            .collect()
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let result = ScrapeRuns::delete_many().exec(&self.conn).await?;
        Ok(result.rows_affected)
    }
}

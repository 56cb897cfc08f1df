use crate::domain::PropertyRecord;
use crate::entities::{prelude::*, properties};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{NullOrdering, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, NotSet, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::timestamp;
use tracing::warn;

pub const DEFAULT_PAGE_LIMIT: u64 = 100;
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The row had been soft-deleted and is live again under the same id.
    Restored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub source: Option<String>,
    pub location: Option<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub bedrooms_min: Option<i32>,
    pub bathrooms_min: Option<i32>,
    pub parking_min: Option<i32>,
    pub area_min: Option<i32>,
    pub area_max: Option<i32>,
    pub estrato: Option<i32>,
}

impl PropertyFilter {
    /// Range filters compare with SQL operators, so `NULL` (unknown) never
    /// satisfies them.
    fn apply(&self, mut query: Select<Properties>) -> Select<Properties> {
        query = query.filter(properties::Column::DeletedAt.is_null());

        if let Some(source) = &self.source {
            query = query.filter(properties::Column::Source.eq(source.as_str()));
        }
        if let Some(location) = self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            query = query.filter(properties::Column::Location.contains(location));
        }
        if let Some(min) = self.price_min {
            query = query.filter(properties::Column::Price.gte(min));
        }
        if let Some(max) = self.price_max {
            query = query.filter(properties::Column::Price.lte(max));
        }
        if let Some(min) = self.bedrooms_min {
            query = query.filter(properties::Column::Bedrooms.gte(min));
        }
        if let Some(min) = self.bathrooms_min {
            query = query.filter(properties::Column::Bathrooms.gte(min));
        }
        if let Some(min) = self.parking_min {
            query = query.filter(properties::Column::Parking.gte(min));
        }
        if let Some(min) = self.area_min {
            query = query.filter(properties::Column::Area.gte(min));
        }
        if let Some(max) = self.area_max {
            query = query.filter(properties::Column::Area.lte(max));
        }
        if let Some(estrato) = self.estrato {
            query = query.filter(properties::Column::Estrato.eq(estrato));
        }
        query
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    AreaAsc,
    AreaDesc,
}

impl SortOrder {
    fn apply(self, query: Select<Properties>) -> Select<Properties> {
        let query = match self {
            Self::Newest => query.order_by_desc(properties::Column::CreatedAt),
            Self::PriceAsc => query.order_by_with_nulls(
                properties::Column::Price,
                Order::Asc,
                NullOrdering::Last,
            ),
            Self::PriceDesc => query.order_by_with_nulls(
                properties::Column::Price,
                Order::Desc,
                NullOrdering::Last,
            ),
            Self::AreaAsc => query.order_by_with_nulls(
                properties::Column::Area,
                Order::Asc,
                NullOrdering::Last,
            ),
            Self::AreaDesc => query.order_by_with_nulls(
                properties::Column::Area,
                Order::Desc,
                NullOrdering::Last,
            ),
        };
        query.order_by_desc(properties::Column::Id)
    }
}

/// Offset pagination. `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    #[must_use]
    pub fn new(skip: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            skip: skip.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A stored listing as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub id: i32,
    pub source: String,
    pub link: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: Option<i64>,
    pub area: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub parking: Option<i32>,
    pub estrato: Option<i32>,
    pub images: Vec<String>,
    pub image_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<properties::Model> for Property {
    fn from(m: properties::Model) -> Self {
        Self {
            images: serde_json::from_str(&m.images).unwrap_or_default(),
            id: m.id,
            source: m.source,
            link: m.link,
            code: m.code,
            title: m.title,
            description: m.description,
            location: m.location,
            price: m.price,
            area: m.area,
            bedrooms: m.bedrooms,
            bathrooms: m.bathrooms,
            parking: m.parking,
            estrato: m.estrato,
            image_url: m.image_url,
            latitude: m.latitude,
            longitude: m.longitude,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Just enough of a listing to drop a pin on a map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub id: i32,
    pub title: String,
    pub location: String,
    pub price: Option<i64>,
    pub link: String,
    pub image_url: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub inserted: u64,
    pub updated: u64,
    pub restored: u64,
    pub deleted: u64,
    /// Records whose upsert errored and were left as they were.
    pub failed: u64,
}

impl SaveSummary {
    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Restored => self.restored += 1,
        }
    }
}

pub struct PropertyRepository {
    conn: DatabaseConnection,
}

impl PropertyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts the listing or refreshes the row keyed by `(source, link)`.
    /// `created_at` and `id` survive every update.
    ///
    /// The write is a single `INSERT .. ON CONFLICT DO UPDATE`, so concurrent
    /// upserts queue on SQLite's write lock instead of failing a reader to
    /// writer upgrade. The outcome is classified from the row as it was just
    /// before the write.
    pub async fn upsert(&self, record: &PropertyRecord, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        let images = serde_json::to_string(&record.images)?;
        let now = timestamp(now);

        let previous: Option<Option<String>> = Properties::find()
            .select_only()
            .column(properties::Column::DeletedAt)
            .filter(properties::Column::Source.eq(record.source.as_str()))
            .filter(properties::Column::Link.eq(record.link.as_str()))
            .into_tuple::<Option<String>>()
            .one(&self.conn)
            .await?;

        let model = properties::ActiveModel {
            id: NotSet,
            source: Set(record.source.clone()),
            link: Set(record.link.clone()),
            code: Set(record.code.clone()),
            title: Set(record.title.clone()),
            description: Set(record.description.clone()),
            location: Set(record.location.clone()),
            price: Set(record.price),
            area: Set(record.area),
            bedrooms: Set(record.bedrooms),
            bathrooms: Set(record.bathrooms),
            parking: Set(record.parking),
            estrato: Set(record.estrato),
            images: Set(images),
            image_url: Set(record.image_url().map(ToString::to_string)),
            latitude: Set(record.latitude),
            longitude: Set(record.longitude),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            deleted_at: Set(None),
        };

        Properties::insert(model)
            .on_conflict(
                OnConflict::columns([properties::Column::Source, properties::Column::Link])
                    .update_columns([
                        properties::Column::Code,
                        properties::Column::Title,
                        properties::Column::Description,
                        properties::Column::Location,
                        properties::Column::Price,
                        properties::Column::Area,
                        properties::Column::Bedrooms,
                        properties::Column::Bathrooms,
                        properties::Column::Parking,
                        properties::Column::Estrato,
                        properties::Column::Images,
                        properties::Column::ImageUrl,
                        properties::Column::Latitude,
                        properties::Column::Longitude,
                        properties::Column::UpdatedAt,
                        properties::Column::DeletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

        Ok(match previous {
            None => UpsertOutcome::Inserted,
            Some(Some(_)) => UpsertOutcome::Restored,
            Some(None) => UpsertOutcome::Updated,
        })
    }

    /// Soft-deletes live rows of `source` whose link is not in `seen_links`.
    pub async fn soft_delete_missing(
        &self,
        source: &str,
        seen_links: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut condition = Condition::all()
            .add(properties::Column::Source.eq(source))
            .add(properties::Column::DeletedAt.is_null());
        if !seen_links.is_empty() {
            condition = condition.add(properties::Column::Link.is_not_in(seen_links.iter().cloned()));
        }

        let result = Properties::update_many()
            .col_expr(
                properties::Column::DeletedAt,
                sea_orm::sea_query::Expr::value(Some(timestamp(now))),
            )
            .filter(condition)
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn list(
        &self,
        filter: &PropertyFilter,
        sort: SortOrder,
        page: Page,
    ) -> Result<Vec<Property>> {
        let rows = sort
            .apply(filter.apply(Properties::find()))
            .offset(page.skip)
            .limit(page.limit)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Property::from).collect())
    }

    pub async fn count(&self, filter: &PropertyFilter) -> Result<u64> {
        Ok(filter.apply(Properties::find()).count(&self.conn).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<Property>> {
        let row = Properties::find_by_id(id)
            .filter(properties::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await?;
        Ok(row.map(Property::from))
    }

    pub async fn distinct_locations(&self) -> Result<Vec<String>> {
        let locations = Properties::find()
            .select_only()
            .column(properties::Column::Location)
            .distinct()
            .filter(properties::Column::DeletedAt.is_null())
            .filter(properties::Column::Location.ne(""))
            .order_by_asc(properties::Column::Location)
            .into_tuple::<String>()
            .all(&self.conn)
            .await?;
        Ok(locations)
    }

    pub async fn map_points(&self) -> Result<Vec<MapPoint>> {
        let rows = Properties::find()
            .filter(properties::Column::DeletedAt.is_null())
            .filter(properties::Column::Latitude.is_not_null())
            .filter(properties::Column::Longitude.is_not_null())
            .order_by_desc(properties::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|m| {
                Some(MapPoint {
                    latitude: m.latitude?,
                    longitude: m.longitude?,
                    id: m.id,
                    title: m.title,
                    location: m.location,
                    price: m.price,
                    link: m.link,
                    image_url: m.image_url,
                })
            })
            .collect())
    }

    /// Counts live rows per source.
    pub async fn count_by_source(&self, source: &str) -> Result<u64> {
        Ok(Properties::find()
            .filter(properties::Column::Source.eq(source))
            .filter(properties::Column::DeletedAt.is_null())
            .count(&self.conn)
            .await?)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let result = Properties::delete_many().exec(&self.conn).await?;
        Ok(result.rows_affected)
    }

    /// Upserts every record (first occurrence of a link wins), then retires
    /// live rows of `source` that this pass did not find.
    ///
    /// `harvested` holds every link the search pages listed and `removed`
    /// the ones whose detail page said the listing is gone. Retiring only
    /// happens after a complete pass in which every upsert succeeded.
    pub async fn save_batch(
        &self,
        source: &str,
        records: &[PropertyRecord],
        harvested: &HashSet<String>,
        removed: &HashSet<String>,
        complete: bool,
        now: DateTime<Utc>,
    ) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        let mut saved = HashSet::new();

        for record in records {
            if !saved.insert(record.link.as_str()) {
                continue;
            }
            match self.upsert(record, now).await {
                Ok(outcome) => summary.count(outcome),
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        event = "property_upsert_failed",
                        source,
                        link = %record.link,
                        error = %e,
                        "Failed to save listing"
                    );
                }
            }
        }

        // An empty harvest usually means the site changed, not that every
        // listing was rented at once.
        if complete && summary.failed == 0 && !harvested.is_empty() {
            let live: HashSet<String> = harvested.difference(removed).cloned().collect();
            summary.deleted = self.soft_delete_missing(source, &live, now).await?;
        }

        Ok(summary)
    }
}

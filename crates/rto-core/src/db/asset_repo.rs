//! Asset register and service history.

use super::filters::push_review_status;
use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, opt_uuid, parse_enum, parse_opt_ts, parse_opt_uuid,
    parse_ts, parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{Asset, AssetFilter, AssetService, AssetUpdate};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const ASSET_COLUMNS: &str = "id, asset_tag, name, category, location, status, purchase_date, \
     purchase_cost, assigned_to, next_service_date, external_id, created_at, updated_at, deleted_at";

const SERVICE_COLUMNS: &str = "id, asset_id, service_date, service_type, performed_by, cost, notes, \
     next_service_date, created_at";

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn create(&self, asset: &Asset) -> Result<Asset, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Asset>, DbError>;

    async fn get_by_tag(&self, asset_tag: &str) -> Result<Option<Asset>, DbError>;

    async fn list(
        &self,
        filter: &AssetFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Asset>, DbError>;

    async fn list_all(&self, filter: &AssetFilter) -> Result<Vec<Asset>, DbError>;

    async fn update(&self, id: Uuid, update: &AssetUpdate) -> Result<Asset, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Records a service. When the service names a next service date, the
    /// asset's `next_service_date` moves with it in the same transaction.
    async fn record_service(&self, service: &AssetService) -> Result<AssetService, DbError>;

    /// Service history, most recent first.
    async fn list_services(&self, asset_id: Uuid) -> Result<Vec<AssetService>, DbError>;
}

pub struct SqliteAssetRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAssetRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &AssetFilter) -> (String, Vec<String>) {
        let mut from_where = String::from("assets WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(category) = &filter.category {
            from_where.push_str(" AND category = ? COLLATE NOCASE");
            params.push(category.clone());
        }
        if let Some(assigned_to) = filter.assigned_to {
            from_where.push_str(" AND assigned_to = ?");
            params.push(assigned_to.to_string());
        }
        if let Some(service_status) = filter.service_status {
            push_review_status(
                &mut from_where,
                &mut params,
                "next_service_date",
                service_status,
                Utc::now(),
            );
        }
        if let Some(search) = &filter.search {
            from_where.push_str(
                " AND (asset_tag LIKE ? ESCAPE '\\' OR name LIKE ? ESCAPE '\\' OR location LIKE ? ESCAPE '\\')",
            );
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern.clone(), pattern]);
        }

        (from_where, params)
    }
}

#[async_trait]
impl AssetRepository for SqliteAssetRepository {
    async fn create(&self, asset: &Asset) -> Result<Asset, DbError> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, asset_tag, name, category, location, status, purchase_date,
                                purchase_cost, assigned_to, next_service_date, external_id,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset.id.to_string())
        .bind(&asset.asset_tag)
        .bind(&asset.name)
        .bind(&asset.category)
        .bind(&asset.location)
        .bind(asset.status.as_str())
        .bind(fmt_opt_ts(asset.purchase_date))
        .bind(asset.purchase_cost)
        .bind(opt_uuid(asset.assigned_to))
        .bind(fmt_opt_ts(asset.next_service_date))
        .bind(&asset.external_id)
        .bind(fmt_ts(asset.created_at))
        .bind(fmt_ts(asset.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(asset.id)
            .await?
            .ok_or_else(|| DbError::not_found("Asset", asset.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Asset>, DbError> {
        let sql = format!(
            "SELECT {} FROM assets WHERE id = ? AND deleted_at IS NULL",
            ASSET_COLUMNS
        );
        let row: Option<AssetRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_tag(&self, asset_tag: &str) -> Result<Option<Asset>, DbError> {
        let sql = format!(
            "SELECT {} FROM assets WHERE asset_tag = ? COLLATE NOCASE AND deleted_at IS NULL",
            ASSET_COLUMNS
        );
        let row: Option<AssetRow> = sqlx::query_as(&sql)
            .bind(asset_tag.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &AssetFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Asset>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let (rows, total) = fetch_page::<AssetRow>(
            &self.pool,
            ASSET_COLUMNS,
            &from_where,
            "asset_tag ASC",
            &params,
            pagination,
        )
        .await?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn list_all(&self, filter: &AssetFilter) -> Result<Vec<Asset>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let sql = format!("SELECT {} FROM {} ORDER BY asset_tag ASC", ASSET_COLUMNS, from_where);
        let mut query = sqlx::query_as::<_, AssetRow>(&sql);
        for param in &params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &AssetUpdate) -> Result<Asset, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Asset", id))?;

        sqlx::query(
            r#"
            UPDATE assets SET asset_tag = ?, name = ?, category = ?, location = ?, status = ?,
                              purchase_date = ?, purchase_cost = ?, assigned_to = ?,
                              next_service_date = ?, external_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.asset_tag, &existing.asset_tag))
        .bind(merge(&update.name, &existing.name))
        .bind(merge(&update.category, &existing.category))
        .bind(merge(&update.location, &existing.location))
        .bind(update.status.unwrap_or(existing.status).as_str())
        .bind(fmt_opt_ts(merge(&update.purchase_date, &existing.purchase_date)))
        .bind(merge(&update.purchase_cost, &existing.purchase_cost))
        .bind(opt_uuid(merge(&update.assigned_to, &existing.assigned_to)))
        .bind(fmt_opt_ts(merge(&update.next_service_date, &existing.next_service_date)))
        .bind(merge(&update.external_id, &existing.external_id))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Asset", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE assets SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_service(&self, service: &AssetService) -> Result<AssetService, DbError> {
        if self.get(service.asset_id).await?.is_none() {
            return Err(DbError::not_found("Asset", service.asset_id));
        }

        let asset_id = service.asset_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO asset_services (id, asset_id, service_date, service_type, performed_by,
                                        cost, notes, next_service_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service.id.to_string())
        .bind(&asset_id)
        .bind(fmt_ts(service.service_date))
        .bind(&service.service_type)
        .bind(&service.performed_by)
        .bind(service.cost)
        .bind(&service.notes)
        .bind(fmt_opt_ts(service.next_service_date))
        .bind(fmt_ts(service.created_at))
        .execute(&mut *tx)
        .await?;

        if let Some(next) = service.next_service_date {
            sqlx::query("UPDATE assets SET next_service_date = ?, updated_at = ? WHERE id = ?")
                .bind(fmt_ts(next))
                .bind(fmt_ts(Utc::now()))
                .bind(&asset_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(service.clone())
    }

    async fn list_services(&self, asset_id: Uuid) -> Result<Vec<AssetService>, DbError> {
        let sql = format!(
            "SELECT {} FROM asset_services WHERE asset_id = ? ORDER BY service_date DESC",
            SERVICE_COLUMNS
        );
        let rows: Vec<ServiceRow> = sqlx::query_as(&sql)
            .bind(asset_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

pub fn create_asset_repository(pool: &DbPool) -> Box<dyn AssetRepository> {
    Box::new(SqliteAssetRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: String,
    asset_tag: String,
    name: String,
    category: Option<String>,
    location: Option<String>,
    status: String,
    purchase_date: Option<String>,
    purchase_cost: Option<f64>,
    assigned_to: Option<String>,
    next_service_date: Option<String>,
    external_id: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = DbError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        Ok(Asset {
            id: parse_uuid(&row.id)?,
            asset_tag: row.asset_tag,
            name: row.name,
            category: row.category,
            location: row.location,
            status: parse_enum(&row.status)?,
            purchase_date: parse_opt_ts(row.purchase_date)?,
            purchase_cost: row.purchase_cost,
            assigned_to: parse_opt_uuid(row.assigned_to)?,
            next_service_date: parse_opt_ts(row.next_service_date)?,
            external_id: row.external_id,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: String,
    asset_id: String,
    service_date: String,
    service_type: String,
    performed_by: Option<String>,
    cost: Option<f64>,
    notes: Option<String>,
    next_service_date: Option<String>,
    created_at: String,
}

impl TryFrom<ServiceRow> for AssetService {
    type Error = DbError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        Ok(AssetService {
            id: parse_uuid(&row.id)?,
            asset_id: parse_uuid(&row.asset_id)?,
            service_date: parse_ts(&row.service_date)?,
            service_type: row.service_type,
            performed_by: row.performed_by,
            cost: row.cost,
            notes: row.notes,
            next_service_date: parse_opt_ts(row.next_service_date)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;
    use crate::status::ReviewStatus;
    use chrono::Duration;

    #[tokio::test]
    async fn test_service_moves_next_service_date() {
        let pool = test_pool().await;
        let repo = create_asset_repository(&pool);
        let now = Utc::now();

        let mut asset = Asset::new("AST-0001", "Fire extinguisher");
        asset.next_service_date = Some(now - Duration::days(3));
        let asset = repo.create(&asset).await.unwrap();
        assert_eq!(asset.service_status(now), ReviewStatus::Overdue);

        let mut service = AssetService::new(asset.id, now, "inspection");
        service.next_service_date = Some(now + Duration::days(180));
        repo.record_service(&service).await.unwrap();

        let reloaded = repo.get(asset.id).await.unwrap().unwrap();
        assert_eq!(reloaded.service_status(now), ReviewStatus::Current);
        assert_eq!(repo.list_services(asset.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_service_without_next_date_leaves_asset() {
        let pool = test_pool().await;
        let repo = create_asset_repository(&pool);
        let asset = repo.create(&Asset::new("AST-0002", "Projector")).await.unwrap();

        repo.record_service(&AssetService::new(asset.id, Utc::now(), "repair"))
            .await
            .unwrap();
        let reloaded = repo.get(asset.id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_service_date, None);
    }

    #[tokio::test]
    async fn test_service_for_missing_asset() {
        let pool = test_pool().await;
        let repo = create_asset_repository(&pool);
        let err = repo
            .record_service(&AssetService::new(Uuid::new_v4(), Utc::now(), "repair"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_filters() {
        let pool = test_pool().await;
        let repo = create_asset_repository(&pool);
        let now = Utc::now();

        let mut due = Asset::new("AST-0100", "Forklift");
        due.next_service_date = Some(now + Duration::days(5));
        due.location = Some("Workshop B".into());
        repo.create(&due).await.unwrap();
        repo.create(&Asset::new("AST-0101", "Laptop")).await.unwrap();

        let by_service = AssetFilter {
            service_status: Some(ReviewStatus::Due),
            ..Default::default()
        };
        assert_eq!(repo.list_all(&by_service).await.unwrap().len(), 1);

        let by_location = AssetFilter {
            search: Some("workshop".into()),
            ..Default::default()
        };
        let page = repo.list(&by_location, &Pagination::default()).await.unwrap();
        assert_eq!(page.items[0].asset_tag, "AST-0100");

        assert!(repo.get_by_tag("ast-0101").await.unwrap().is_some());
    }
}

//! Training products and SOPs.

use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, opt_uuid, parse_enum, parse_opt_ts, parse_opt_uuid,
    parse_ts, parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{
    Sop, SopFilter, SopUpdate, TrainingProduct, TrainingProductFilter, TrainingProductUpdate,
};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const PRODUCT_COLUMNS: &str = "id, code, title, product_type, status, description, external_id, \
     created_at, updated_at, deleted_at";

const SOP_COLUMNS: &str = "id, title, training_product_id, version, document_url, content, owner_id, \
     review_date, created_at, updated_at, deleted_at";

#[async_trait]
pub trait TrainingProductRepository: Send + Sync {
    async fn create(&self, product: &TrainingProduct) -> Result<TrainingProduct, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<TrainingProduct>, DbError>;

    /// Looks up a live product by its national code, case-insensitively.
    async fn get_by_code(&self, code: &str) -> Result<Option<TrainingProduct>, DbError>;

    async fn list(
        &self,
        filter: &TrainingProductFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<TrainingProduct>, DbError>;

    async fn update(
        &self,
        id: Uuid,
        update: &TrainingProductUpdate,
    ) -> Result<TrainingProduct, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

#[async_trait]
pub trait SopRepository: Send + Sync {
    async fn create(&self, sop: &Sop) -> Result<Sop, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Sop>, DbError>;

    async fn list(
        &self,
        filter: &SopFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Sop>, DbError>;

    async fn update(&self, id: Uuid, update: &SopUpdate) -> Result<Sop, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteTrainingProductRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteTrainingProductRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrainingProductRepository for SqliteTrainingProductRepository {
    async fn create(&self, product: &TrainingProduct) -> Result<TrainingProduct, DbError> {
        sqlx::query(
            r#"
            INSERT INTO training_products (id, code, title, product_type, status, description,
                                           external_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.id.to_string())
        .bind(&product.code)
        .bind(&product.title)
        .bind(product.product_type.as_str())
        .bind(product.status.as_str())
        .bind(&product.description)
        .bind(&product.external_id)
        .bind(fmt_ts(product.created_at))
        .bind(fmt_ts(product.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(product.id)
            .await?
            .ok_or_else(|| DbError::not_found("TrainingProduct", product.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<TrainingProduct>, DbError> {
        let sql = format!(
            "SELECT {} FROM training_products WHERE id = ? AND deleted_at IS NULL",
            PRODUCT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<TrainingProduct>, DbError> {
        let sql = format!(
            "SELECT {} FROM training_products WHERE code = ? COLLATE NOCASE AND deleted_at IS NULL",
            PRODUCT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &TrainingProductFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<TrainingProduct>, DbError> {
        let mut from_where = String::from("training_products WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(product_type) = filter.product_type {
            from_where.push_str(" AND product_type = ?");
            params.push(product_type.as_str().to_string());
        }
        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(search) = &filter.search {
            from_where.push_str(" AND (code LIKE ? ESCAPE '\\' OR title LIKE ? ESCAPE '\\')");
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern]);
        }

        let (rows, total) = fetch_page::<ProductRow>(
            &self.pool,
            PRODUCT_COLUMNS,
            &from_where,
            "code ASC",
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

    async fn update(
        &self,
        id: Uuid,
        update: &TrainingProductUpdate,
    ) -> Result<TrainingProduct, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("TrainingProduct", id))?;

        sqlx::query(
            r#"
            UPDATE training_products SET code = ?, title = ?, product_type = ?, status = ?,
                                         description = ?, external_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.code, &existing.code))
        .bind(merge(&update.title, &existing.title))
        .bind(update.product_type.unwrap_or(existing.product_type).as_str())
        .bind(update.status.unwrap_or(existing.status).as_str())
        .bind(merge(&update.description, &existing.description))
        .bind(merge(&update.external_id, &existing.external_id))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("TrainingProduct", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE training_products SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct SqliteSopRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteSopRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SopRepository for SqliteSopRepository {
    async fn create(&self, sop: &Sop) -> Result<Sop, DbError> {
        sqlx::query(
            r#"
            INSERT INTO sops (id, title, training_product_id, version, document_url, content,
                              owner_id, review_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sop.id.to_string())
        .bind(&sop.title)
        .bind(opt_uuid(sop.training_product_id))
        .bind(&sop.version)
        .bind(&sop.document_url)
        .bind(&sop.content)
        .bind(opt_uuid(sop.owner_id))
        .bind(fmt_opt_ts(sop.review_date))
        .bind(fmt_ts(sop.created_at))
        .bind(fmt_ts(sop.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(sop.id)
            .await?
            .ok_or_else(|| DbError::not_found("Sop", sop.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Sop>, DbError> {
        let sql = format!(
            "SELECT {} FROM sops WHERE id = ? AND deleted_at IS NULL",
            SOP_COLUMNS
        );
        let row: Option<SopRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &SopFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Sop>, DbError> {
        let mut from_where = String::from("sops WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(product_id) = filter.training_product_id {
            from_where.push_str(" AND training_product_id = ?");
            params.push(product_id.to_string());
        }
        if let Some(search) = &filter.search {
            from_where.push_str(" AND title LIKE ? ESCAPE '\\'");
            params.push(make_like_pattern(search));
        }

        let (rows, total) = fetch_page::<SopRow>(
            &self.pool,
            SOP_COLUMNS,
            &from_where,
            "title ASC",
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

    async fn update(&self, id: Uuid, update: &SopUpdate) -> Result<Sop, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sop", id))?;

        sqlx::query(
            r#"
            UPDATE sops SET title = ?, training_product_id = ?, version = ?, document_url = ?,
                            content = ?, owner_id = ?, review_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.title, &existing.title))
        .bind(opt_uuid(merge(&update.training_product_id, &existing.training_product_id)))
        .bind(merge(&update.version, &existing.version))
        .bind(merge(&update.document_url, &existing.document_url))
        .bind(merge(&update.content, &existing.content))
        .bind(opt_uuid(merge(&update.owner_id, &existing.owner_id)))
        .bind(fmt_opt_ts(merge(&update.review_date, &existing.review_date)))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sop", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE sops SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_training_product_repository(pool: &DbPool) -> Box<dyn TrainingProductRepository> {
    Box::new(SqliteTrainingProductRepository::new(pool.inner().clone()))
}

pub fn create_sop_repository(pool: &DbPool) -> Box<dyn SopRepository> {
    Box::new(SqliteSopRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    code: String,
    title: String,
    product_type: String,
    status: String,
    description: Option<String>,
    external_id: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<ProductRow> for TrainingProduct {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(TrainingProduct {
            id: parse_uuid(&row.id)?,
            code: row.code,
            title: row.title,
            product_type: parse_enum(&row.product_type)?,
            status: parse_enum(&row.status)?,
            description: row.description,
            external_id: row.external_id,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SopRow {
    id: String,
    title: String,
    training_product_id: Option<String>,
    version: String,
    document_url: Option<String>,
    content: Option<String>,
    owner_id: Option<String>,
    review_date: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<SopRow> for Sop {
    type Error = DbError;

    fn try_from(row: SopRow) -> Result<Self, Self::Error> {
        Ok(Sop {
            id: parse_uuid(&row.id)?,
            title: row.title,
            training_product_id: parse_opt_uuid(row.training_product_id)?,
            version: row.version,
            document_url: row.document_url,
            content: row.content,
            owner_id: parse_opt_uuid(row.owner_id)?,
            review_date: parse_opt_ts(row.review_date)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;
    use crate::models::{ProductStatus, ProductType};

    #[tokio::test]
    async fn test_product_lookup_by_code() {
        let pool = test_pool().await;
        let repo = create_training_product_repository(&pool);

        let product = repo
            .create(&TrainingProduct::new(
                "BSB50120",
                "Diploma of Business",
                ProductType::Qualification,
            ))
            .await
            .unwrap();

        let found = repo.get_by_code("bsb50120").await.unwrap().unwrap();
        assert_eq!(found.id, product.id);

        let superseded = repo
            .update(
                product.id,
                &TrainingProductUpdate {
                    status: Some(ProductStatus::Superseded),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(superseded.status, ProductStatus::Superseded);

        let filter = TrainingProductFilter {
            status: Some(ProductStatus::Current),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter, &Pagination::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_sops_by_product() {
        let pool = test_pool().await;
        let products = create_training_product_repository(&pool);
        let sops = create_sop_repository(&pool);

        let product = products
            .create(&TrainingProduct::new("HLTAID011", "Provide First Aid", ProductType::Unit))
            .await
            .unwrap();

        let mut linked = Sop::new("First aid delivery");
        linked.training_product_id = Some(product.id);
        sops.create(&linked).await.unwrap();
        sops.create(&Sop::new("Enrolment")).await.unwrap();

        let filter = SopFilter {
            training_product_id: Some(product.id),
            ..Default::default()
        };
        let page = sops.list(&filter, &Pagination::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].version, "1.0");

        let unlinked = sops
            .update(
                page.items[0].id,
                &SopUpdate {
                    training_product_id: Some(None),
                    version: Some("1.1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unlinked.training_product_id, None);
        assert_eq!(unlinked.version, "1.1");
    }
}

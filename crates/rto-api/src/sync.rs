//! Imports from external systems into local records.
//!
//! Xero fixed assets are matched to local assets by asset tag, and
//! Accelerate courses to training products by national code. A record that
//! fails to import is reported in [`SyncReport::errors`] without aborting
//! the run.

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use rto_core::db::{create_asset_repository, create_training_product_repository, DbPool};
use rto_core::models::{
    Asset, AssetStatus, AssetUpdate, ProductStatus, ProductType, TrainingProduct,
    TrainingProductUpdate,
};
use rto_integrations::{AssetSource, CourseSource, ExternalAsset, ExternalCourse};
use rto_observability::INTEGRATION_SYNC_TOTAL;
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::error::ApiError;

/// Outcome of a sync run.
#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct SyncReport {
    pub source: String,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

impl SyncReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, key: &str, result: Result<Outcome, ApiError>) {
        match result {
            Ok(Outcome::Created) => self.created += 1,
            Ok(Outcome::Updated) => self.updated += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(e) => {
                warn!(record = %key, error = %e, "Failed to import record");
                self.errors.push(format!("{}: {}", key, e));
            }
        }
    }
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn record_run(source: &str, outcome: &'static str) {
    counter!(INTEGRATION_SYNC_TOTAL, "source" => source.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Upserts every asset from `source`.
#[instrument(skip_all, fields(source = %source.name()))]
pub async fn sync_assets(db: &DbPool, source: &dyn AssetSource) -> Result<SyncReport, ApiError> {
    let external = match source.list_assets().await {
        Ok(assets) => assets,
        Err(e) => {
            record_run(source.name(), "failure");
            return Err(e.into());
        }
    };

    let mut report = SyncReport::new(source.name());
    for asset in &external {
        let result = upsert_asset(db, asset).await;
        report.record(&asset.asset_number, result);
    }

    record_run(source.name(), "success");
    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Asset sync finished"
    );
    Ok(report)
}

async fn upsert_asset(db: &DbPool, external: &ExternalAsset) -> Result<Outcome, ApiError> {
    let repo = create_asset_repository(db);
    let purchase_date = external.purchase_date.map(start_of_day);

    let Some(existing) = repo.get_by_tag(&external.asset_number).await? else {
        if external.is_disposed() {
            return Ok(Outcome::Skipped);
        }
        let mut asset = Asset::new(&external.asset_number, &external.name);
        asset.purchase_date = purchase_date;
        asset.purchase_cost = external.purchase_price;
        asset.external_id = Some(external.external_id.clone());
        repo.create(&asset).await?;
        return Ok(Outcome::Created);
    };

    let mut update = AssetUpdate::default();
    if existing.name != external.name {
        update.name = Some(external.name.clone());
    }
    if existing.purchase_date != purchase_date && purchase_date.is_some() {
        update.purchase_date = Some(purchase_date);
    }
    if existing.purchase_cost != external.purchase_price && external.purchase_price.is_some() {
        update.purchase_cost = Some(external.purchase_price);
    }
    if existing.external_id.as_deref() != Some(external.external_id.as_str()) {
        update.external_id = Some(Some(external.external_id.clone()));
    }
    if external.is_disposed() && existing.status != AssetStatus::Retired {
        update.status = Some(AssetStatus::Retired);
    }

    let unchanged = update.name.is_none()
        && update.purchase_date.is_none()
        && update.purchase_cost.is_none()
        && update.external_id.is_none()
        && update.status.is_none();
    if unchanged {
        return Ok(Outcome::Skipped);
    }

    repo.update(existing.id, &update).await?;
    Ok(Outcome::Updated)
}

/// Maps an upstream course kind onto a product type. Unknown kinds are
/// imported as plain courses.
pub fn product_type_for(kind: &str) -> ProductType {
    let normalized = kind.trim().to_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "skillset" => ProductType::SkillSet,
        "unit_of_competency" => ProductType::Unit,
        other => other.parse().unwrap_or(ProductType::Course),
    }
}

/// Upserts every course from `source`.
#[instrument(skip_all, fields(source = %source.name()))]
pub async fn sync_courses(db: &DbPool, source: &dyn CourseSource) -> Result<SyncReport, ApiError> {
    let external = match source.list_courses().await {
        Ok(courses) => courses,
        Err(e) => {
            record_run(source.name(), "failure");
            return Err(e.into());
        }
    };

    let mut report = SyncReport::new(source.name());
    for course in &external {
        let result = upsert_course(db, course).await;
        report.record(&course.code, result);
    }

    record_run(source.name(), "success");
    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Course sync finished"
    );
    Ok(report)
}

async fn upsert_course(db: &DbPool, external: &ExternalCourse) -> Result<Outcome, ApiError> {
    let repo = create_training_product_repository(db);
    let product_type = product_type_for(&external.kind);
    let status = if external.is_current {
        ProductStatus::Current
    } else {
        ProductStatus::Superseded
    };

    let Some(existing) = repo.get_by_code(&external.code).await? else {
        let mut product = TrainingProduct::new(&external.code, &external.title, product_type);
        product.status = status;
        product.external_id = Some(external.external_id.clone());
        repo.create(&product).await?;
        return Ok(Outcome::Created);
    };

    let update = TrainingProductUpdate {
        title: (existing.title != external.title).then(|| external.title.clone()),
        product_type: (existing.product_type != product_type).then_some(product_type),
        status: (existing.status != status).then_some(status),
        external_id: (existing.external_id.as_deref() != Some(external.external_id.as_str()))
            .then(|| Some(external.external_id.clone())),
        ..Default::default()
    };

    if update.title.is_none()
        && update.product_type.is_none()
        && update.status.is_none()
        && update.external_id.is_none()
    {
        return Ok(Outcome::Skipped);
    }

    repo.update(existing.id, &update).await?;
    Ok(Outcome::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::setup_test_pool;
    use rto_integrations::{IntegrationError, MockAccelerateClient, MockXeroClient};

    fn xero_asset(number: &str, status: &str) -> ExternalAsset {
        ExternalAsset {
            external_id: format!("xero-{}", number),
            asset_number: number.to_string(),
            name: format!("Laptop {}", number),
            purchase_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            purchase_price: Some(1899.0),
            status: status.to_string(),
        }
    }

    fn course(code: &str, kind: &str, current: bool) -> ExternalCourse {
        ExternalCourse {
            external_id: format!("acc-{}", code),
            code: code.to_string(),
            title: format!("Course {}", code),
            kind: kind.to_string(),
            is_current: current,
        }
    }

    #[tokio::test]
    async fn test_asset_sync_creates_then_skips() {
        let pool = setup_test_pool().await;
        let xero = MockXeroClient::new(vec![
            xero_asset("FA-0001", "Registered"),
            xero_asset("FA-0002", "Registered"),
            xero_asset("FA-0003", "Disposed"),
        ]);

        let first = sync_assets(&pool, &xero).await.unwrap();
        assert_eq!((first.created, first.updated, first.skipped), (2, 0, 1));
        assert!(first.errors.is_empty());

        let second = sync_assets(&pool, &xero).await.unwrap();
        assert_eq!((second.created, second.updated, second.skipped), (0, 0, 3));

        let asset = create_asset_repository(&pool)
            .get_by_tag("FA-0001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(asset.external_id.as_deref(), Some("xero-FA-0001"));
        assert_eq!(asset.purchase_cost, Some(1899.0));
    }

    #[tokio::test]
    async fn test_disposed_asset_is_retired() {
        let pool = setup_test_pool().await;
        let xero = MockXeroClient::new(vec![xero_asset("FA-0001", "Registered")]);
        sync_assets(&pool, &xero).await.unwrap();

        xero.set_assets(vec![xero_asset("FA-0001", "Disposed")]).await;
        let report = sync_assets(&pool, &xero).await.unwrap();
        assert_eq!(report.updated, 1);

        let asset = create_asset_repository(&pool)
            .get_by_tag("FA-0001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(asset.status, AssetStatus::Retired);
    }

    #[tokio::test]
    async fn test_source_failure_is_an_error() {
        let pool = setup_test_pool().await;
        let xero = MockXeroClient::new(vec![]);
        xero.fail_with(IntegrationError::Authentication("expired".into()))
            .await;

        let err = sync_assets(&pool, &xero).await.unwrap_err();
        assert!(matches!(err, ApiError::BadGateway(_)));
    }

    #[tokio::test]
    async fn test_course_sync_upserts_by_code() {
        let pool = setup_test_pool().await;
        let accelerate = MockAccelerateClient::new(vec![
            course("BSB50420", "qualification", true),
            course("HLTAID011", "unit", true),
        ]);
        let first = sync_courses(&pool, &accelerate).await.unwrap();
        assert_eq!(first.created, 2);

        let accelerate = MockAccelerateClient::new(vec![course("BSB50420", "qualification", false)]);
        let second = sync_courses(&pool, &accelerate).await.unwrap();
        assert_eq!((second.created, second.updated), (0, 1));

        let product = create_training_product_repository(&pool)
            .get_by_code("BSB50420")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.status, ProductStatus::Superseded);
        assert_eq!(product.product_type, ProductType::Qualification);
    }

    #[test]
    fn test_product_type_mapping() {
        assert_eq!(product_type_for("Qualification"), ProductType::Qualification);
        assert_eq!(product_type_for("Skill Set"), ProductType::SkillSet);
        assert_eq!(product_type_for("skillset"), ProductType::SkillSet);
        assert_eq!(product_type_for("short course"), ProductType::Course);
    }
}

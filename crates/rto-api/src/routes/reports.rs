//! Compliance reports, downloadable as JSON, CSV or PDF.

use axum::{extract::State, response::Response, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rto_core::db::{
    create_asset_repository, create_complaint_repository, create_credential_repository,
    create_onboarding_repository, create_pd_item_repository, create_policy_repository,
    create_standard_repository, create_user_repository,
};
use rto_core::models::{
    AssetFilter, AssetStatus, ComplaintFilter, ComplaintStatus, CredentialFilter, PdItemFilter,
    PolicyFilter, PolicyStatus,
};
use rto_core::{CredentialStatus, PdStatus, Permission, ReviewStatus, User};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::error::ApiError;
use crate::export::{cell, date_cell, render_report, ReportFormat, ReportTable};
use crate::extract::ApiQuery;
use crate::routes::credentials::validate_expiring_window;
use crate::routes::policies::PolicyResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/credentials", get(credentials_report))
        .route("/policies", get(policies_report))
        .route("/pd", get(pd_report))
        .route("/complaints", get(complaints_report))
        .route("/assets", get(assets_report))
        .route("/compliance-summary", get(compliance_summary))
        .route("/standards-coverage", get(standards_coverage))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Credentials only: expiring within this many days.
    pub expiring_within_days: Option<i64>,
}

impl ReportQuery {
    fn format(&self) -> Result<ReportFormat, ApiError> {
        ReportFormat::parse(self.format.as_deref())
    }

    fn check_range(&self) -> Result<(), ApiError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(ApiError::validation_field(
                "from",
                "Start of range must not be after its end",
            )),
            _ => Ok(()),
        }
    }
}

/// Display names for users, keyed by id. Deactivated users fall back to
/// their id in reports.
async fn user_names(state: &AppState) -> Result<HashMap<Uuid, String>, ApiError> {
    let users = create_user_repository(&state.db).list_active().await?;
    Ok(users
        .into_iter()
        .map(|u: User| (u.id, u.full_name()))
        .collect())
}

fn name_of(names: &HashMap<Uuid, String>, id: Uuid) -> String {
    names.get(&id).cloned().unwrap_or_else(|| id.to_string())
}

#[derive(Debug, Serialize)]
pub struct CredentialRow {
    pub id: Uuid,
    pub holder: String,
    pub name: String,
    pub credential_type: String,
    pub issuer: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
}

async fn credentials_report(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Response, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let format = query.format()?;
    validate_expiring_window("expiring_within_days", query.expiring_within_days)?;

    let filter = CredentialFilter {
        user_id: query.user_id,
        expiring_within_days: query.expiring_within_days,
        ..Default::default()
    };
    let credentials = create_credential_repository(&state.db)
        .list_all(&filter)
        .await?;
    let names = user_names(&state).await?;
    let now = Utc::now();

    let rows: Vec<CredentialRow> = credentials
        .into_iter()
        .map(|c| CredentialRow {
            id: c.id,
            holder: name_of(&names, c.user_id),
            status: c.status(now),
            credential_type: c.credential_type.to_string(),
            name: c.name,
            issuer: c.issuer,
            issued_at: c.issued_at,
            expires_at: c.expires_at,
        })
        .collect();

    render_report(format, "credentials-report", &rows, || {
        let mut table = ReportTable::new(
            "Credentials Report",
            vec!["Holder", "Credential", "Type", "Issuer", "Issued", "Expires", "Status"],
        );
        for row in &rows {
            table.push(vec![
                row.holder.clone(),
                row.name.clone(),
                row.credential_type.clone(),
                cell(row.issuer.as_deref()),
                date_cell(row.issued_at),
                date_cell(row.expires_at),
                row.status.to_string(),
            ]);
        }
        table
    })
}

async fn policies_report(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Response, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let format = query.format()?;

    let now = Utc::now();
    let policies: Vec<PolicyResponse> = create_policy_repository(&state.db)
        .list_all(&PolicyFilter {
            owner_id: query.user_id,
            ..Default::default()
        })
        .await?
        .into_iter()
        .map(|p| PolicyResponse::new(p, now))
        .collect();
    let names = user_names(&state).await?;

    render_report(format, "policies-report", &policies, || {
        let mut table = ReportTable::new(
            "Policies Report",
            vec!["Number", "Title", "Category", "Owner", "Status", "Review Date", "Review"],
        );
        for p in &policies {
            table.push(vec![
                p.policy.policy_number.clone(),
                p.policy.title.clone(),
                cell(p.policy.category.as_deref()),
                cell(p.policy.owner_id.map(|id| name_of(&names, id))),
                p.policy.status.to_string(),
                date_cell(p.policy.review_date),
                p.review_status.to_string(),
            ]);
        }
        table
    })
}

#[derive(Debug, Serialize)]
pub struct PdRow {
    pub id: Uuid,
    pub staff: String,
    pub title: String,
    pub activity_type: String,
    pub hours: f64,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: PdStatus,
}

async fn pd_report(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Response, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let format = query.format()?;
    query.check_range()?;

    let items = create_pd_item_repository(&state.db)
        .list_all(&PdItemFilter {
            user_id: query.user_id,
            ..Default::default()
        })
        .await?;
    let names = user_names(&state).await?;
    let now = Utc::now();

    // The range applies to completion dates; open items are always listed.
    let rows: Vec<PdRow> = items
        .into_iter()
        .filter(|item| match item.completed_at {
            Some(done) => {
                query.from.map_or(true, |f| done >= f) && query.to.map_or(true, |t| done <= t)
            }
            None => true,
        })
        .map(|item| PdRow {
            id: item.id,
            staff: name_of(&names, item.user_id),
            status: item.status(now),
            activity_type: item.activity_type.to_string(),
            title: item.title,
            hours: item.hours,
            due_at: item.due_at,
            completed_at: item.completed_at,
        })
        .collect();

    render_report(format, "pd-report", &rows, || {
        let mut table = ReportTable::new(
            "Professional Development Report",
            vec!["Staff", "Activity", "Type", "Hours", "Due", "Completed", "Status"],
        );
        for row in &rows {
            table.push(vec![
                row.staff.clone(),
                row.title.clone(),
                row.activity_type.clone(),
                format!("{:.1}", row.hours),
                date_cell(row.due_at),
                date_cell(row.completed_at),
                row.status.to_string(),
            ]);
        }
        table
    })
}

#[derive(Debug, Serialize)]
pub struct ComplaintRow {
    pub id: Uuid,
    pub reference: String,
    pub complainant_name: String,
    pub category: Option<String>,
    pub priority: String,
    pub status: ComplaintStatus,
    pub received_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub days_open: i64,
}

async fn complaints_report(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Response, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let format = query.format()?;
    query.check_range()?;

    let filter = ComplaintFilter {
        assigned_to: query.user_id,
        from: query.from,
        to: query.to,
        ..Default::default()
    };
    let now = Utc::now();
    let rows: Vec<ComplaintRow> = create_complaint_repository(&state.db)
        .list_all(&filter)
        .await?
        .into_iter()
        .map(|c| ComplaintRow {
            id: c.id,
            days_open: c.days_open(now),
            priority: c.priority.to_string(),
            reference: c.reference,
            complainant_name: c.complainant_name,
            category: c.category,
            status: c.status,
            received_at: c.received_at,
            resolved_at: c.resolved_at,
        })
        .collect();

    render_report(format, "complaints-report", &rows, || {
        let mut table = ReportTable::new(
            "Complaints Register",
            vec![
                "Reference",
                "Complainant",
                "Category",
                "Priority",
                "Status",
                "Received",
                "Resolved",
                "Days Open",
            ],
        );
        for row in &rows {
            table.push(vec![
                row.reference.clone(),
                row.complainant_name.clone(),
                cell(row.category.as_deref()),
                row.priority.clone(),
                row.status.to_string(),
                date_cell(Some(row.received_at)),
                date_cell(row.resolved_at),
                row.days_open.to_string(),
            ]);
        }
        table
    })
}

#[derive(Debug, Serialize)]
pub struct AssetRow {
    pub id: Uuid,
    pub asset_tag: String,
    pub name: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub status: AssetStatus,
    pub next_service_date: Option<DateTime<Utc>>,
    pub service_status: ReviewStatus,
}

async fn assets_report(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Response, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let format = query.format()?;

    let filter = AssetFilter {
        assigned_to: query.user_id,
        ..Default::default()
    };
    let now = Utc::now();
    let rows: Vec<AssetRow> = create_asset_repository(&state.db)
        .list_all(&filter)
        .await?
        .into_iter()
        .map(|a| AssetRow {
            id: a.id,
            service_status: a.service_status(now),
            asset_tag: a.asset_tag,
            name: a.name,
            category: a.category,
            location: a.location,
            status: a.status,
            next_service_date: a.next_service_date,
        })
        .collect();

    render_report(format, "assets-report", &rows, || {
        let mut table = ReportTable::new(
            "Asset Register",
            vec!["Tag", "Name", "Category", "Location", "Status", "Next Service", "Service"],
        );
        for row in &rows {
            table.push(vec![
                row.asset_tag.clone(),
                row.name.clone(),
                cell(row.category.as_deref()),
                cell(row.location.as_deref()),
                row.status.to_string(),
                date_cell(row.next_service_date),
                row.service_status.to_string(),
            ]);
        }
        table
    })
}

/// Dashboard counts across every compliance area.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ComplianceSummary {
    pub generated_at: DateTime<Utc>,
    pub credentials_by_status: BTreeMap<String, u64>,
    pub credentials_expiring_soon: u64,
    pub policies_by_review_status: BTreeMap<String, u64>,
    pub open_complaints: u64,
    pub overdue_pd_items: u64,
    pub assets_due_service: u64,
    pub active_onboarding: u64,
    pub standards_without_policy: u64,
}

fn tally<I: IntoIterator<Item = String>>(keys: I) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

async fn compliance_summary(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<ComplianceSummary>, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let now = Utc::now();

    let credentials = create_credential_repository(&state.db)
        .list_all(&CredentialFilter::default())
        .await?;
    let expiring_soon = credentials
        .iter()
        .filter(|c| {
            c.status(now) == CredentialStatus::Active
                && c.expires_within(rto_core::DUE_SOON_WINDOW_DAYS, now)
        })
        .count() as u64;

    let policies = create_policy_repository(&state.db)
        .list_all(&PolicyFilter {
            status: Some(PolicyStatus::Published),
            ..Default::default()
        })
        .await?;

    let overdue_pd = create_pd_item_repository(&state.db)
        .list_all(&PdItemFilter {
            status: Some(PdStatus::Overdue),
            ..Default::default()
        })
        .await?
        .len() as u64;

    let assets_due = create_asset_repository(&state.db)
        .list_all(&AssetFilter::default())
        .await?
        .iter()
        .filter(|a| {
            a.status != AssetStatus::Retired
                && matches!(
                    a.service_status(now),
                    ReviewStatus::Due | ReviewStatus::Overdue
                )
        })
        .count() as u64;

    let policy_repo = create_policy_repository(&state.db);
    let mut uncovered = 0;
    for standard in create_standard_repository(&state.db).list_all().await? {
        if policy_repo
            .policies_for_standard(standard.id, true)
            .await?
            .is_empty()
        {
            uncovered += 1;
        }
    }

    Ok(Json(ComplianceSummary {
        generated_at: now,
        credentials_by_status: tally(credentials.iter().map(|c| c.status(now).to_string())),
        credentials_expiring_soon: expiring_soon,
        policies_by_review_status: tally(
            policies.iter().map(|p| p.review_status(now).to_string()),
        ),
        open_complaints: create_complaint_repository(&state.db).count_open().await?,
        overdue_pd_items: overdue_pd,
        assets_due_service: assets_due,
        active_onboarding: create_onboarding_repository(&state.db)
            .count_active_assignments()
            .await?,
        standards_without_policy: uncovered,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StandardCoverage {
    pub standard_id: Uuid,
    pub code: String,
    pub title: String,
    pub policies: Vec<CoveringPolicy>,
    pub covered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CoveringPolicy {
    pub id: Uuid,
    pub policy_number: String,
    pub title: String,
    pub review_status: ReviewStatus,
}

async fn standards_coverage(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Response, ApiError> {
    require_permission(&current, Permission::ReportsRead)?;
    let format = query.format()?;

    let now = Utc::now();
    let policy_repo = create_policy_repository(&state.db);
    let mut coverage = Vec::new();
    for standard in create_standard_repository(&state.db).list_all().await? {
        let policies: Vec<CoveringPolicy> = policy_repo
            .policies_for_standard(standard.id, true)
            .await?
            .into_iter()
            .map(|p| CoveringPolicy {
                id: p.id,
                review_status: p.review_status(now),
                policy_number: p.policy_number,
                title: p.title,
            })
            .collect();
        coverage.push(StandardCoverage {
            standard_id: standard.id,
            covered: !policies.is_empty(),
            code: standard.code,
            title: standard.title,
            policies,
        });
    }

    render_report(format, "standards-coverage", &coverage, || {
        let mut table = ReportTable::new(
            "Standards Coverage",
            vec!["Standard", "Title", "Policies", "Covered"],
        );
        for entry in &coverage {
            let numbers: Vec<&str> = entry
                .policies
                .iter()
                .map(|p| p.policy_number.as_str())
                .collect();
            table.push(vec![
                entry.code.clone(),
                entry.title.clone(),
                numbers.join(", "),
                if entry.covered { "yes" } else { "no" }.to_string(),
            ]);
        }
        table
    })
}

//! Onboarding workflows.
//!
//! A workflow owns an ordered list of task templates. Assigning the workflow
//! to a user expands the templates that apply to that user's role and
//! department into concrete tasks with due dates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::string_enum;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingWorkflow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OnboardingWorkflow {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingTaskTemplate {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i64,
    /// Days after the assignment start date that the task falls due.
    pub due_offset_days: i64,
    /// Restricts the task to users holding this role name.
    pub role_filter: Option<String>,
    /// Restricts the task to users in this department.
    pub department_filter: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OnboardingTaskTemplate {
    pub fn new(workflow_id: Uuid, title: impl Into<String>, sort_order: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            title: title.into(),
            description: None,
            sort_order,
            due_offset_days: 0,
            role_filter: None,
            department_filter: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this template produces a task for a user with the given role
    /// name and department. Filters compare case-insensitively; an unset
    /// filter matches everyone, a set filter never matches a missing value.
    pub fn applies_to(&self, role_name: &str, department: Option<&str>) -> bool {
        let role_ok = self
            .role_filter
            .as_deref()
            .map_or(true, |f| f.eq_ignore_ascii_case(role_name));
        let department_ok = match (self.department_filter.as_deref(), department) {
            (None, _) => true,
            (Some(f), Some(d)) => f.eq_ignore_ascii_case(d),
            (Some(_), None) => false,
        };
        role_ok && department_ok
    }

    pub fn due_date(&self, start_date: DateTime<Utc>) -> DateTime<Utc> {
        start_date + Duration::days(self.due_offset_days)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskTemplateUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub sort_order: Option<i64>,
    pub due_offset_days: Option<i64>,
    pub role_filter: Option<Option<String>>,
    pub department_filter: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    InProgress,
    Completed,
    Cancelled,
}

string_enum!(AssignmentStatus {
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingAssignment {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub status: AssignmentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub user_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Skipped,
}

string_enum!(TaskStatus {
    Pending => "pending",
    Completed => "completed",
    Skipped => "skipped",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingTask {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub template_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub sort_order: i64,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub notes: Option<String>,
}

/// Completion counters for an assignment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AssignmentProgress {
    pub total: u64,
    pub completed: u64,
    pub skipped: u64,
    pub pending: u64,
    pub percent_complete: f64,
}

impl AssignmentProgress {
    pub fn from_tasks(tasks: &[OnboardingTask]) -> Self {
        let total = tasks.len() as u64;
        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count() as u64;
        let skipped = tasks.iter().filter(|t| t.status == TaskStatus::Skipped).count() as u64;
        let pending = total - completed - skipped;
        let percent_complete = if total == 0 {
            100.0
        } else {
            ((completed + skipped) as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            total,
            completed,
            skipped,
            pending,
            percent_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(role: Option<&str>, department: Option<&str>) -> OnboardingTaskTemplate {
        let mut t = OnboardingTaskTemplate::new(Uuid::new_v4(), "Induction", 1);
        t.role_filter = role.map(String::from);
        t.department_filter = department.map(String::from);
        t
    }

    #[test]
    fn test_unfiltered_template_applies_to_everyone() {
        assert!(template(None, None).applies_to("staff", None));
        assert!(template(None, None).applies_to("trainer", Some("Construction")));
    }

    #[test]
    fn test_role_filter_is_case_insensitive() {
        let t = template(Some("Trainer"), None);
        assert!(t.applies_to("trainer", None));
        assert!(!t.applies_to("staff", None));
    }

    #[test]
    fn test_department_filter_requires_department() {
        let t = template(None, Some("Hospitality"));
        assert!(t.applies_to("staff", Some("hospitality")));
        assert!(!t.applies_to("staff", Some("Construction")));
        assert!(!t.applies_to("staff", None));
    }

    #[test]
    fn test_both_filters_must_match() {
        let t = template(Some("trainer"), Some("Hospitality"));
        assert!(t.applies_to("trainer", Some("Hospitality")));
        assert!(!t.applies_to("staff", Some("Hospitality")));
        assert!(!t.applies_to("trainer", Some("Admin")));
    }

    #[test]
    fn test_progress() {
        let mk = |status| OnboardingTask {
            id: Uuid::new_v4(),
            assignment_id: Uuid::nil(),
            template_id: None,
            title: "t".into(),
            description: None,
            due_date: None,
            sort_order: 0,
            status,
            completed_at: None,
            completed_by: None,
            notes: None,
        };
        let tasks = vec![
            mk(TaskStatus::Completed),
            mk(TaskStatus::Skipped),
            mk(TaskStatus::Pending),
        ];
        let progress = AssignmentProgress::from_tasks(&tasks);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.percent_complete, 66.7);

        assert_eq!(AssignmentProgress::from_tasks(&[]).percent_complete, 100.0);
    }
}

//! Domain records for the compliance register.

pub mod asset;
pub mod audit;
pub mod complaint;
pub mod credential;
pub mod drive;
pub mod email;
pub mod feedback;
pub mod onboarding;
pub mod pd;
pub mod policy;
pub mod standard;
pub mod training;

pub use asset::{Asset, AssetFilter, AssetService, AssetStatus, AssetUpdate};
pub use audit::{AuditLog, AuditLogFilter};
pub use complaint::{
    complaint_reference, ComplainantType, Complaint, ComplaintFilter, ComplaintNote,
    ComplaintPriority, ComplaintStatus, ComplaintUpdate,
};
pub use credential::{Credential, CredentialFilter, CredentialType, CredentialUpdate};
pub use drive::{GoogleDriveConnection, GoogleDriveFile, GoogleDriveFolder};
pub use email::{EmailLog, EmailLogFilter, EmailStatus};
pub use feedback::{
    Feedback, FeedbackFilter, FeedbackStatus, FeedbackSummary, FeedbackType, FeedbackUpdate,
};
pub use onboarding::{
    AssignmentFilter, AssignmentProgress, AssignmentStatus, OnboardingAssignment, OnboardingTask,
    OnboardingTaskTemplate, OnboardingWorkflow, TaskStatus, TaskTemplateUpdate, WorkflowUpdate,
};
pub use pd::{ActivityType, PdItem, PdItemFilter, PdItemUpdate, PdSummary};
pub use policy::{Policy, PolicyFilter, PolicyStatus, PolicyUpdate, PolicyVersion};
pub use standard::{Standard, StandardFilter, StandardUpdate};
pub use training::{
    ProductStatus, ProductType, Sop, SopFilter, SopUpdate, TrainingProduct, TrainingProductFilter,
    TrainingProductUpdate,
};

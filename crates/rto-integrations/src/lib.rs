//! External system connectors for the RTO compliance platform.
//!
//! Each connector sits behind a trait in [`traits`] with a mock in [`mock`],
//! so the API layer can be tested without network access.

pub mod accelerate;
pub mod error;
pub mod google_drive;
pub mod http;
pub mod mock;
pub mod traits;
pub mod xero;

pub use accelerate::{AccelerateClient, AccelerateConfig};
pub use error::{IntegrationError, IntegrationResult};
pub use google_drive::{GoogleDriveClient, GoogleDriveConfig, FOLDER_MIME_TYPE};
pub use http::{HttpAuth, HttpClient, HttpClientConfig, RateLimitConfig};
pub use mock::{MockAccelerateClient, MockGoogleDrive, MockXeroClient};
pub use traits::{
    AssetSource, CourseSource, DriveApi, DriveItem, ExternalAsset, ExternalCourse, OAuthTokens,
};
pub use xero::{XeroClient, XeroConfig};

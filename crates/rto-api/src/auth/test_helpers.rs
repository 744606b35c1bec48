//! Test helpers for authentication.
//!
//! Lets in-crate handler tests act as a user without issuing tokens.

use axum::{extract::Request, middleware::Next, response::Response};
use rto_core::auth::{system_role_permissions, system_roles, Role};
use rto_core::{CurrentUser, User};

/// Extension type for injecting a test user into requests.
#[derive(Clone)]
pub struct TestUser(pub CurrentUser);

impl TestUser {
    fn with_role(name: &str, email: &str) -> Self {
        let permissions = system_role_permissions(name).unwrap_or_default();
        let role = Role::new(name, None, permissions);
        let user = User::new(email, "Test", name, "not_used", role.id);
        TestUser(CurrentUser { user, role })
    }

    pub fn admin() -> Self {
        Self::with_role(system_roles::ADMIN, "admin@test.local")
    }

    pub fn staff() -> Self {
        Self::with_role(system_roles::STAFF, "staff@test.local")
    }
}

/// Middleware that injects a test user into the request extensions.
///
/// ```ignore
/// let router = routes::policies::routes()
///     .layer(axum::middleware::from_fn(move |req, next| {
///         inject_test_user(TestUser::admin(), req, next)
///     }));
/// ```
pub async fn inject_test_user(test_user: TestUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(test_user);
    next.run(request).await
}

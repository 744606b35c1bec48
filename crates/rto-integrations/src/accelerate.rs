//! Accelerate student management system: course catalogue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{IntegrationError, IntegrationResult};
use crate::http::{HttpAuth, HttpClient, HttpClientConfig};
use crate::traits::{CourseSource, ExternalCourse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelerateConfig {
    pub base_url: String,
    pub api_token: String,
}

impl AccelerateConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.base_url.starts_with("http") {
            problems.push(format!(
                "accelerate.base_url '{}' must be an http(s) URL",
                self.base_url
            ));
        }
        if self.api_token.is_empty() {
            problems.push("accelerate.api_token is empty".to_string());
        }
        problems
    }
}

#[derive(Debug, Deserialize)]
struct CoursePage {
    #[serde(default)]
    data: Vec<AccelerateCourse>,
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    current_page: u32,
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct AccelerateCourse {
    id: serde_json::Value,
    code: String,
    title: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl From<AccelerateCourse> for ExternalCourse {
    fn from(course: AccelerateCourse) -> Self {
        let external_id = match course.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        ExternalCourse {
            external_id,
            code: course.code.trim().to_string(),
            title: course.title,
            kind: course
                .kind
                .unwrap_or_else(|| "qualification".to_string())
                .to_ascii_lowercase(),
            is_current: !course
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("superseded")),
        }
    }
}

pub struct AccelerateClient {
    http: HttpClient,
}

impl AccelerateClient {
    pub fn new(config: AccelerateConfig) -> IntegrationResult<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(IntegrationError::NotConfigured(problems.join("; ")));
        }

        let http_config = HttpClientConfig::new("accelerate", config.base_url)
            .with_auth(HttpAuth::Bearer(config.api_token))
            .with_header("accept", "application/json");
        Ok(Self {
            http: HttpClient::new(http_config)?,
        })
    }
}

#[async_trait]
impl CourseSource for AccelerateClient {
    fn name(&self) -> &str {
        "accelerate"
    }

    #[instrument(skip(self))]
    async fn list_courses(&self) -> IntegrationResult<Vec<ExternalCourse>> {
        let mut courses = Vec::new();
        let mut page = 1;

        loop {
            let body: CoursePage = self
                .http
                .get_json(&format!("/api/v1/courses?page={}", page))
                .await?;
            debug!(page, count = body.data.len(), "Fetched Accelerate course page");

            courses.extend(body.data.into_iter().map(ExternalCourse::from));
            if body.meta.current_page >= body.meta.last_page {
                break;
            }
            page = body.meta.current_page + 1;
        }

        Ok(courses)
    }
}

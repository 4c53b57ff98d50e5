//! Jira Cloud REST client

use crate::auth::JiraAuth;
use crate::bulk::{BulkEditRequest, BulkMoveRequest};
use crate::error::{GatewayError, Result};
use crate::gateway::{IssuePage, JiraGateway, ParsedQuery};
use crate::types::{
    BulkEditableFieldsResponse, BulkTaskProgress, CreateMetaFieldsPage, ErrorResponse, JiraIssue,
    JiraIssueType, JiraProject, ParseRequest, ParseResponse, ProjectSearchPage, SearchRequest,
    SearchResults, SubmitResponse, ISSUE_FIELDS,
};
use async_trait::async_trait;
use bulkops_core::models::{EditableField, FieldMetadata, IssueType, Project, TaskOutcome, WorkItem};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_PAGE_SIZE: u32 = 100;
const CREATE_META_PAGE_SIZE: usize = 200;

pub struct JiraClient {
    http: Client,
    base_url: String,
    auth: JiraAuth,
}

impl JiraClient {
    pub fn new(base_url: &str, auth: JiraAuth) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/3{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", self.auth.to_basic_auth())
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("{} failed with {}: {}", what, status, body.chars().take(200).collect::<String>());
        Err(classify_failure(status, &body, what))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.http.get(self.url(path)), path).await
    }
}

fn classify_failure(status: StatusCode, body: &str, what: &str) -> GatewayError {
    let messages = serde_json::from_str::<ErrorResponse>(body)
        .map(ErrorResponse::into_messages)
        .unwrap_or_default();
    let message = if messages.is_empty() {
        body.chars().take(200).collect()
    } else {
        messages.join("; ")
    };

    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::Server {
            status: status.as_u16(),
            message,
        },
        s if s.is_server_error() => GatewayError::Server {
            status: s.as_u16(),
            message,
        },
        s => GatewayError::Rejected {
            status: s.as_u16(),
            messages: if messages.is_empty() { vec![message] } else { messages },
        },
    }
}

#[async_trait]
impl JiraGateway for JiraClient {
    async fn get_issue(&self, id_or_key: &str) -> Result<WorkItem> {
        let builder = self
            .http
            .get(self.url(&format!("/issue/{}", id_or_key)))
            .query(&[("fields", ISSUE_FIELDS.join(","))]);
        let issue: JiraIssue = self.send(builder, id_or_key).await?;
        Ok(issue.into())
    }

    async fn search_issues(&self, jql: &str, page_token: Option<&str>) -> Result<IssuePage> {
        let body = SearchRequest {
            jql,
            next_page_token: page_token,
            max_results: SEARCH_PAGE_SIZE,
            fields: &ISSUE_FIELDS,
        };
        let builder = self.http.post(self.url("/search/jql")).json(&body);
        let results: SearchResults = self.send(builder, "issue search").await?;
        Ok(IssuePage {
            items: results.issues.into_iter().map(WorkItem::from).collect(),
            next_page_token: results.next_page_token,
        })
    }

    async fn get_project(&self, id_or_key: &str) -> Result<Project> {
        let builder = self
            .http
            .get(self.url(&format!("/project/{}", id_or_key)))
            .query(&[("expand", "issueTypes")]);
        let project: JiraProject = self.send(builder, id_or_key).await?;
        Ok(project.into())
    }

    async fn search_projects(&self, query: &str) -> Result<Vec<Project>> {
        let builder = self
            .http
            .get(self.url("/project/search"))
            .query(&[("query", query), ("expand", "issueTypes")]);
        let page: ProjectSearchPage = self.send(builder, "project search").await?;
        if !page.is_last {
            debug!("Project search for {:?} returned only the first page", query);
        }
        Ok(page.values.into_iter().map(Project::from).collect())
    }

    async fn get_issue_types(&self) -> Result<Vec<IssueType>> {
        let types: Vec<JiraIssueType> = self.get("/issuetype").await?;
        Ok(types.into_iter().map(IssueType::from).collect())
    }

    async fn get_create_field_metadata(
        &self,
        project_id: &str,
        issue_type_id: &str,
    ) -> Result<Vec<FieldMetadata>> {
        let path = format!("/issue/createmeta/{}/issuetypes/{}", project_id, issue_type_id);
        let mut fields = Vec::new();
        let mut start_at = 0usize;

        loop {
            let builder = self.http.get(self.url(&path)).query(&[
                ("startAt", start_at.to_string()),
                ("maxResults", CREATE_META_PAGE_SIZE.to_string()),
            ]);
            let page: CreateMetaFieldsPage = self.send(builder, &path).await?;
            let fetched = page.fields.len();
            fields.extend(page.fields);
            start_at += fetched;

            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        Ok(fields)
    }

    async fn get_bulk_editable_fields(&self, issue_ids: &[String]) -> Result<Vec<EditableField>> {
        let builder = self
            .http
            .get(self.url("/bulk/issues/fields"))
            .query(&[("issueIdsOrKeys", issue_ids.join(","))]);
        let response: BulkEditableFieldsResponse = self.send(builder, "bulk editable fields").await?;
        Ok(response.fields.into_iter().map(EditableField::from).collect())
    }

    async fn submit_bulk_move(&self, request: &BulkMoveRequest) -> Result<String> {
        let builder = self.http.post(self.url("/bulk/issues/move")).json(request);
        let response: SubmitResponse = self.send(builder, "bulk move").await?;
        Ok(response.task_id)
    }

    async fn submit_bulk_edit(&self, request: &BulkEditRequest) -> Result<String> {
        let builder = self.http.post(self.url("/bulk/issues/fields")).json(request);
        let response: SubmitResponse = self.send(builder, "bulk edit").await?;
        Ok(response.task_id)
    }

    async fn get_task_outcome(&self, task_id: &str) -> Result<Option<TaskOutcome>> {
        match self.get::<BulkTaskProgress>(&format!("/bulk/queue/{}", task_id)).await {
            Ok(progress) => Ok(Some(progress.into())),
            Err(GatewayError::NotFound(_)) => {
                warn!("Outcome of task {} is not available yet", task_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn parse_query(&self, jql: &str) -> Result<ParsedQuery> {
        let builder = self
            .http
            .post(self.url("/jql/parse"))
            .query(&[("validation", "strict")])
            .json(&ParseRequest { queries: [jql] });
        let response: ParseResponse = self.send(builder, "query parse").await?;
        let parsed = response
            .queries
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound("parsed query".to_string()))?;
        Ok(ParsedQuery {
            query: parsed.query,
            errors: parsed.errors,
        })
    }
}

use std::collections::BTreeMap;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::entity::{Entity, EntityHeader, FILE_ENTITY_TYPE};

const DEFAULT_BASE_URL: &str = "https://repo-prod.prod.sagebase.org";
const MULTIPART_REQUEST_TYPE: &str = "org.sagebionetworks.repo.model.file.MultipartUploadRequest";

#[derive(Debug, Error)]
pub enum SynapseError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct SynapseClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl SynapseClient {
    pub fn new(token: impl Into<String>) -> Result<Self, SynapseError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, SynapseError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_user_profile(&self) -> Result<UserProfile, SynapseError> {
        let url = self.endpoint("/repo/v1/userProfile")?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn get_entity(&self, id: &str) -> Result<Entity, SynapseError> {
        let url = self.endpoint(&format!("/repo/v1/entity/{id}"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn get_children_page(
        &self,
        parent_id: &str,
        next_page_token: Option<&str>,
    ) -> Result<ChildrenPage, SynapseError> {
        let url = self.endpoint("/repo/v1/entity/children")?;
        let request = ChildrenRequest {
            parent_id,
            include_types: &["file", "folder"],
            next_page_token,
        };
        let response = self
            .authorized(self.http.post(url))
            .json(&request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_children_all(&self, parent_id: &str) -> Result<Vec<EntityHeader>, SynapseError> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.get_children_page(parent_id, token.as_deref()).await?;
            items.extend(page.page);
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Looks up a child of `parent_id` by exact name. A 404 means no such child.
    pub async fn find_entity_id(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, SynapseError> {
        let url = self.endpoint("/repo/v1/entity/child")?;
        let request = EntityLookupRequest {
            parent_id,
            entity_name: name,
        };
        let response = self
            .authorized(self.http.post(url))
            .json(&request)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: EntityId = Self::handle_response(response).await?;
        Ok(Some(found.id))
    }

    pub async fn get_file_handles(&self, entity_id: &str) -> Result<Vec<FileHandle>, SynapseError> {
        let url = self.endpoint(&format!("/repo/v1/entity/{entity_id}/filehandles"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let results: FileHandleResults = Self::handle_response(response).await?;
        Ok(results.list)
    }

    pub async fn get_file_download_url(&self, entity_id: &str) -> Result<Url, SynapseError> {
        let mut url = self.endpoint(&format!("/repo/v1/entity/{entity_id}/file"))?;
        url.query_pairs_mut().append_pair("redirect", "false");
        let response = self.authorized(self.http.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let body = response.text().await?;
        Ok(Url::parse(body.trim())?)
    }

    pub async fn start_multipart_upload(
        &self,
        request: &MultipartUploadRequest,
    ) -> Result<MultipartUploadStatus, SynapseError> {
        let url = self.endpoint("/file/v1/file/multipart")?;
        let response = self
            .authorized(self.http.post(url))
            .json(request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_part_upload_urls(
        &self,
        upload_id: &str,
        part_numbers: &[u64],
    ) -> Result<Vec<PartPresignedUrl>, SynapseError> {
        let url = self.endpoint(&format!(
            "/file/v1/file/multipart/{upload_id}/presigned/url/batch"
        ))?;
        let request = PresignedUrlBatchRequest {
            upload_id,
            part_numbers,
        };
        let response = self
            .authorized(self.http.post(url))
            .json(&request)
            .send()
            .await?;
        let batch: PresignedUrlBatchResponse = Self::handle_response(response).await?;
        Ok(batch.part_presigned_urls)
    }

    pub async fn add_part(
        &self,
        upload_id: &str,
        part_number: u64,
        part_md5_hex: &str,
    ) -> Result<AddPartResponse, SynapseError> {
        let mut url = self.endpoint(&format!(
            "/file/v1/file/multipart/{upload_id}/add/{part_number}"
        ))?;
        url.query_pairs_mut().append_pair("partMD5Hex", part_md5_hex);
        let response = self.authorized(self.http.put(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn complete_multipart_upload(
        &self,
        upload_id: &str,
    ) -> Result<MultipartUploadStatus, SynapseError> {
        let url = self.endpoint(&format!("/file/v1/file/multipart/{upload_id}/complete"))?;
        let response = self.authorized(self.http.put(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn create_entity(&self, entity: &NewFileEntity) -> Result<Entity, SynapseError> {
        let url = self.endpoint("/repo/v1/entity")?;
        let response = self
            .authorized(self.http.post(url))
            .json(entity)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_annotations(&self, entity_id: &str) -> Result<Annotations, SynapseError> {
        let url = self.endpoint(&format!("/repo/v1/entity/{entity_id}/annotations2"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn update_annotations(
        &self,
        annotations: &Annotations,
    ) -> Result<Annotations, SynapseError> {
        let url = self.endpoint(&format!("/repo/v1/entity/{}/annotations2", annotations.id))?;
        let response = self
            .authorized(self.http.put(url))
            .json(annotations)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }

    fn endpoint(&self, path: &str) -> Result<Url, SynapseError> {
        Ok(self.base_url.join(path)?)
    }

    async fn api_error(response: reqwest::Response) -> SynapseError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        SynapseError::Api { status, body }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SynapseError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }
}

impl SynapseError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            SynapseError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.classification(), Some(ApiErrorClass::NotFound))
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub owner_id: String,
    pub user_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenPage {
    #[serde(default)]
    pub page: Vec<EntityHeader>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChildrenRequest<'a> {
    parent_id: &'a str,
    include_types: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityLookupRequest<'a> {
    parent_id: &'a str,
    entity_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct EntityId {
    id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_md5: Option<String>,
    #[serde(default)]
    pub content_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileHandleResults {
    #[serde(default)]
    list: Vec<FileHandle>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUploadRequest {
    concrete_type: &'static str,
    pub file_name: String,
    #[serde(rename = "contentMD5Hex")]
    pub content_md5_hex: String,
    pub file_size_bytes: u64,
    pub part_size_bytes: u64,
    pub content_type: String,
}

impl MultipartUploadRequest {
    pub fn new(
        file_name: impl Into<String>,
        content_md5_hex: impl Into<String>,
        file_size_bytes: u64,
        part_size_bytes: u64,
    ) -> Self {
        Self {
            concrete_type: MULTIPART_REQUEST_TYPE,
            file_name: file_name.into(),
            content_md5_hex: content_md5_hex.into(),
            file_size_bytes,
            part_size_bytes,
            content_type: "application/octet-stream".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUploadStatus {
    pub upload_id: String,
    pub state: String,
    #[serde(default)]
    pub parts_state: Option<String>,
    #[serde(default)]
    pub result_file_handle_id: Option<String>,
}

impl MultipartUploadStatus {
    pub fn is_completed(&self) -> bool {
        self.state == "COMPLETED"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignedUrlBatchRequest<'a> {
    upload_id: &'a str,
    part_numbers: &'a [u64],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedUrlBatchResponse {
    #[serde(default)]
    part_presigned_urls: Vec<PartPresignedUrl>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartPresignedUrl {
    pub part_number: u64,
    pub upload_presigned_url: Url,
    #[serde(default)]
    pub signed_headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPartResponse {
    pub part_number: u64,
    pub add_part_state: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl AddPartResponse {
    pub fn succeeded(&self) -> bool {
        self.add_part_state == "ADD_SUCCESS"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileEntity {
    concrete_type: &'static str,
    pub name: String,
    pub parent_id: String,
    pub data_file_handle_id: String,
}

impl NewFileEntity {
    pub fn new(
        name: impl Into<String>,
        parent_id: impl Into<String>,
        data_file_handle_id: impl Into<String>,
    ) -> Self {
        Self {
            concrete_type: FILE_ENTITY_TYPE,
            name: name.into(),
            parent_id: parent_id.into(),
            data_file_handle_id: data_file_handle_id.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotations {
    pub id: String,
    pub etag: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, AnnotationValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AnnotationValue {
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: Vec<String>,
}

impl AnnotationValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value_type: "STRING".to_string(),
            value: vec![value.into()],
        }
    }
}

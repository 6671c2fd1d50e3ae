//! Post API endpoints
//!
//! - POST /posts - Create a post (auth, multipart)
//! - GET /posts - List published posts, or all of the caller's posts with `?all=true`
//! - GET /posts/{slug} - Get a post by slug
//! - PUT /posts/{id} - Update a post (author or admin, multipart)
//! - DELETE /posts/{id} - Delete a post and its cover image (author or admin)
//!
//! Create and update take `multipart/form-data` with the text fields
//! `title`, `excerpt`, `contentHtml`, `contentDelta`, `published`, `category`
//! and an optional `image` file.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::auth::{AuthError, AuthService, AuthUser, optional_user, require_user};
use crate::core::db::models::{CreatePost, Post, PostFilter, PostResponse, UpdatePost};
use crate::core::db::repositories::{PostRepository, PostRepositoryError};
use crate::core::http::{ApiError, ApiSuccess};
use crate::core::uploads::{CloudinaryClient, ImageUpload, MAX_IMAGE_BYTES, UploadError, UploadedImage};

const MAX_TITLE_CHARS: usize = 200;
const MAX_CATEGORY_CHARS: usize = 100;
/// Inserts retried when a concurrent write takes the chosen slug
const SLUG_ATTEMPTS: usize = 3;
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Room for the text fields on top of the largest image
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

/// Post API state
#[derive(Clone)]
pub struct PostApiState {
    pub post_repo: PostRepository,
    pub auth_service: AuthService,
    /// `None` when Cloudinary credentials are absent
    pub uploader: Option<CloudinaryClient>,
}

/// Post API error types
#[derive(Debug, thiserror::Error)]
pub enum PostApiError {
    #[error("Post not found")]
    NotFound,

    #[error("Only the author or an admin can change this post")]
    Forbidden,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("Another post already uses the slug '{0}'")]
    SlugConflict(String),

    #[error("Multipart form error: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<PostRepositoryError> for PostApiError {
    fn from(err: PostRepositoryError) -> Self {
        match err {
            PostRepositoryError::NotFound => PostApiError::NotFound,
            PostRepositoryError::SlugTaken(slug) => PostApiError::SlugConflict(slug),
            PostRepositoryError::DatabaseError(e) => PostApiError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for PostApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            PostApiError::Auth(err) => err.status_and_code(),
            PostApiError::NotFound => (StatusCode::NOT_FOUND, "POST_NOT_FOUND"),
            PostApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            PostApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            PostApiError::SlugConflict(_) => (StatusCode::CONFLICT, "SLUG_CONFLICT"),
            PostApiError::Multipart(_) => (StatusCode::BAD_REQUEST, "INVALID_FORM"),
            PostApiError::Upload(err) => match err {
                UploadError::NotConfigured => {
                    (StatusCode::SERVICE_UNAVAILABLE, "UPLOADS_NOT_CONFIGURED")
                }
                UploadError::UnsupportedType(_) => {
                    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FILE_TYPE")
                }
                UploadError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
                UploadError::Empty => (StatusCode::BAD_REQUEST, "EMPTY_FILE"),
                UploadError::Request(_) | UploadError::Rejected { .. } => {
                    tracing::error!("Image upload failed: {}", err);
                    (StatusCode::BAD_GATEWAY, "UPLOAD_FAILED")
                }
            },
            PostApiError::InternalError(msg) => {
                tracing::error!("Post API internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        ApiError::new(self.to_string(), code).into_response_with(status)
    }
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Fields read from a post form; absent or blank fields are `None`
#[derive(Debug, Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content_html: Option<String>,
    pub content_delta: Option<serde_json::Value>,
    pub published: Option<bool>,
    pub category: Option<String>,
    pub image: Option<ImageUpload>,
}

impl PostForm {
    fn validate_length(field: &str, value: &str, max: usize) -> Result<(), PostApiError> {
        if value.chars().count() > max {
            return Err(PostApiError::Validation(format!(
                "{} must be at most {} characters",
                field, max
            )));
        }
        Ok(())
    }

    fn validate_title(title: &str) -> Result<(), PostApiError> {
        Self::validate_length("title", title, MAX_TITLE_CHARS)
    }

    fn validate_category(&self) -> Result<(), PostApiError> {
        match &self.category {
            Some(category) => Self::validate_length("category", category, MAX_CATEGORY_CHARS),
            None => Ok(()),
        }
    }

    /// Check the fields a new post needs
    pub fn validate_for_create(&self) -> Result<(), PostApiError> {
        let title = self
            .title
            .as_deref()
            .ok_or_else(|| PostApiError::Validation("title is required".to_string()))?;
        Self::validate_title(title)?;

        if self.content_html.is_none() {
            return Err(PostApiError::Validation("contentHtml is required".to_string()));
        }
        self.validate_category()
    }

    pub fn validate_for_update(&self) -> Result<(), PostApiError> {
        if let Some(title) = &self.title {
            Self::validate_title(title)?;
        }
        self.validate_category()
    }
}

/// Query parameters for listing posts
#[derive(Debug, Default, Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    #[serde(default)]
    pub all: bool,
}

impl ListPostsQuery {
    /// 1-based page and clamped page size
    fn page_and_limit(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: i64) -> Self {
        let limit_i64 = i64::from(limit);
        Self {
            page,
            limit,
            total,
            total_pages: (total + limit_i64 - 1) / limit_i64,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<PostResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DeletePostResponse {
    pub message: String,
}

// ============================================================================
// Form parsing
// ============================================================================

/// Interpret a form checkbox / flag value
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read a post form from a multipart body
pub async fn read_post_form(multipart: &mut Multipart) -> Result<PostForm, PostApiError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;

                // An unselected file input still sends an empty part
                if !bytes.is_empty() {
                    form.image = Some(ImageUpload {
                        bytes: bytes.to_vec(),
                        file_name,
                        content_type,
                    });
                }
            }
            "title" => form.title = non_blank(field.text().await?),
            "excerpt" => form.excerpt = non_blank(field.text().await?),
            "contentHtml" => form.content_html = non_blank(field.text().await?),
            "category" => form.category = non_blank(field.text().await?),
            "contentDelta" => {
                if let Some(raw) = non_blank(field.text().await?) {
                    let delta = serde_json::from_str(&raw).map_err(|e| {
                        PostApiError::Validation(format!("contentDelta must be valid JSON: {}", e))
                    })?;
                    form.content_delta = Some(delta);
                }
            }
            "published" => {
                if let Some(raw) = non_blank(field.text().await?) {
                    let flag = parse_bool(&raw).ok_or_else(|| {
                        PostApiError::Validation(format!("published must be a boolean, got '{}'", raw))
                    })?;
                    form.published = Some(flag);
                }
            }
            other => tracing::debug!("Ignoring unknown post form field '{}'", other),
        }
    }

    Ok(form)
}

// ============================================================================
// Router
// ============================================================================

/// Create the post API router
pub fn post_api_router(state: PostApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/posts", get(list_posts_handler).post(create_post_handler))
        .route(
            "/posts/{key}",
            get(get_post_handler)
                .put(update_post_handler)
                .delete(delete_post_handler),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

impl PostApiState {
    async fn upload_image(&self, image: ImageUpload) -> Result<UploadedImage, PostApiError> {
        let uploader = self.uploader.as_ref().ok_or(UploadError::NotConfigured)?;
        Ok(uploader.upload(image).await?)
    }

    /// Run a write that references a freshly uploaded image. When the write
    /// fails the image is removed again so nothing is left orphaned.
    async fn keep_image_if<T, F>(
        &self,
        uploaded: Option<&UploadedImage>,
        write: F,
    ) -> Result<T, PostApiError>
    where
        F: Future<Output = Result<T, PostApiError>>,
    {
        let result = write.await;
        if result.is_err() {
            if let Some(img) = uploaded {
                self.discard_image(&img.public_id).await;
            }
        }
        result
    }

    /// Insert a post under a fresh unique slug, choosing again if a
    /// concurrent insert claims the slug first
    async fn insert_post(&self, mut dto: CreatePost) -> Result<Post, PostApiError> {
        let mut last_slug = String::new();
        for _ in 0..SLUG_ATTEMPTS {
            dto.slug = self.post_repo.unique_slug(&dto.title, None).await?;
            match self.post_repo.create(&dto).await {
                Err(PostRepositoryError::SlugTaken(slug)) => {
                    tracing::debug!("Slug {} was taken concurrently, retrying", slug);
                    last_slug = slug;
                }
                other => return Ok(other?),
            }
        }
        Err(PostApiError::SlugConflict(last_slug))
    }

    /// Best-effort removal; failures are only logged
    async fn discard_image(&self, public_id: &str) {
        let Some(uploader) = &self.uploader else {
            return;
        };
        match uploader.destroy(public_id).await {
            Ok(true) => tracing::info!("Removed image {}", public_id),
            Ok(false) => tracing::warn!("Image {} was already gone", public_id),
            Err(e) => tracing::warn!("Failed to remove image {}: {}", public_id, e),
        }
    }

    async fn load_owned_post(&self, id: Uuid, caller: &AuthUser) -> Result<Post, PostApiError> {
        let post = self
            .post_repo
            .find_by_id(id)
            .await?
            .ok_or(PostApiError::NotFound)?;

        if post.author_id != caller.id && !caller.is_admin() {
            return Err(PostApiError::Forbidden);
        }
        Ok(post)
    }
}

/// POST /posts
async fn create_post_handler(
    State(state): State<Arc<PostApiState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, PostApiError> {
    let caller = require_user(&state.auth_service, &headers)?;

    let mut form = read_post_form(&mut multipart).await?;
    form.validate_for_create()?;

    let uploaded = match form.image.take() {
        Some(image) => Some(state.upload_image(image).await?),
        None => None,
    };

    let dto = CreatePost {
        author_id: caller.id,
        slug: String::new(),
        title: form.title.unwrap_or_default(),
        excerpt: form.excerpt,
        content_html: form.content_html.unwrap_or_default(),
        content_delta: form.content_delta,
        published: form.published.unwrap_or(false),
        category: form.category,
        image_url: uploaded.as_ref().map(|img| img.url.clone()),
        image_public_id: uploaded.as_ref().map(|img| img.public_id.clone()),
    };

    let post = state
        .keep_image_if(uploaded.as_ref(), state.insert_post(dto))
        .await?;

    tracing::info!("Post {} created by {}", post.slug, caller.id);

    Ok((StatusCode::CREATED, ApiSuccess::new(PostResponse::from(post))))
}

/// GET /posts
async fn list_posts_handler(
    State(state): State<Arc<PostApiState>>,
    headers: HeaderMap,
    Query(query): Query<ListPostsQuery>,
) -> Result<impl IntoResponse, PostApiError> {
    let filter = if query.all {
        let caller = require_user(&state.auth_service, &headers)?;
        PostFilter {
            author_id: Some(caller.id),
            published_only: false,
            category: query.category.clone(),
        }
    } else {
        PostFilter {
            author_id: None,
            published_only: true,
            category: query.category.clone(),
        }
    };

    let (page, limit) = query.page_and_limit();
    let offset = i64::from(page - 1) * i64::from(limit);

    let total = state.post_repo.count(&filter).await?;
    let posts = state
        .post_repo
        .list(&filter, i64::from(limit), offset)
        .await?;

    Ok(ApiSuccess::new(PostListResponse {
        posts: posts.into_iter().map(PostResponse::from).collect(),
        pagination: Pagination::new(page, limit, total),
    }))
}

/// GET /posts/{slug}
///
/// Drafts are only visible to their author and admins.
async fn get_post_handler(
    State(state): State<Arc<PostApiState>>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, PostApiError> {
    let post = state
        .post_repo
        .find_by_slug(&slug)
        .await?
        .ok_or(PostApiError::NotFound)?;

    if !post.published {
        let visible = optional_user(&state.auth_service, &headers)
            .is_some_and(|caller| caller.id == post.author_id || caller.is_admin());
        if !visible {
            return Err(PostApiError::NotFound);
        }
    }

    Ok(ApiSuccess::new(PostResponse::from(post)))
}

/// PUT /posts/{id}
async fn update_post_handler(
    State(state): State<Arc<PostApiState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, PostApiError> {
    let caller = require_user(&state.auth_service, &headers)?;
    let existing = state.load_owned_post(id, &caller).await?;

    let mut form = read_post_form(&mut multipart).await?;
    form.validate_for_update()?;

    let uploaded = match form.image.take() {
        Some(image) => Some(state.upload_image(image).await?),
        None => None,
    };

    let write = async {
        let slug = match &form.title {
            Some(title) if *title != existing.title => {
                Some(state.post_repo.unique_slug(title, Some(id)).await?)
            }
            _ => None,
        };

        let updates = UpdatePost {
            title: form.title,
            slug,
            excerpt: form.excerpt,
            content_html: form.content_html,
            content_delta: form.content_delta,
            published: form.published,
            category: form.category,
            image_url: uploaded.as_ref().map(|img| img.url.clone()),
            image_public_id: uploaded.as_ref().map(|img| img.public_id.clone()),
        };

        if updates.is_empty() {
            return Err(PostApiError::Validation("No fields to update".to_string()));
        }

        Ok(state.post_repo.update(id, &updates).await?)
    };
    let post = state.keep_image_if(uploaded.as_ref(), write).await?;

    // The new image replaced the old one
    if uploaded.is_some() {
        if let Some(old) = &existing.image_public_id {
            state.discard_image(old).await;
        }
    }

    Ok(ApiSuccess::new(PostResponse::from(post)))
}

/// DELETE /posts/{id}
async fn delete_post_handler(
    State(state): State<Arc<PostApiState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, PostApiError> {
    let caller = require_user(&state.auth_service, &headers)?;
    let post = state.load_owned_post(id, &caller).await?;

    if !state.post_repo.delete(id).await? {
        return Err(PostApiError::NotFound);
    }

    if let Some(public_id) = &post.image_public_id {
        state.discard_image(public_id).await;
    }

    tracing::info!("Post {} deleted by {}", post.slug, caller.id);

    Ok(ApiSuccess::new(DeletePostResponse {
        message: "Post deleted".to_string(),
    }))
}

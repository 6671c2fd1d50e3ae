//! Database models for Inkpost
//!
//! Entity structs that map to PostgreSQL tables, plus the DTOs used to create
//! and update them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// User Model
// ============================================================================

/// Role of a registered user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Author,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Author => "author",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "author" => Ok(UserRole::Author),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// User entity representing a registered user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Parsed role; unknown values stored in the database fall back to author
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or_default()
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }
}

/// User without sensitive data (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.role(),
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// Session Model
// ============================================================================

/// Session entity for refresh tokens
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Post Model
// ============================================================================

/// Blog post entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content_html: String,
    /// Rich-text editor document the HTML was rendered from
    pub content_delta: Option<sqlx::types::Json<serde_json::Value>>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post data for creation
#[derive(Debug, Clone)]
pub struct CreatePost {
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content_html: String,
    pub content_delta: Option<serde_json::Value>,
    pub published: bool,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
}

/// Post data for updates; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content_html: Option<String>,
    pub content_delta: Option<serde_json::Value>,
    pub published: Option<bool>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
}

impl UpdatePost {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.slug.is_none()
            && self.excerpt.is_none()
            && self.content_html.is_none()
            && self.content_delta.is_none()
            && self.published.is_none()
            && self.category.is_none()
            && self.image_url.is_none()
            && self.image_public_id.is_none()
    }
}

/// Filters for listing posts
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Restrict to one author's posts
    pub author_id: Option<Uuid>,
    /// Only published posts
    pub published_only: bool,
    pub category: Option<String>,
}

/// Post as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content_html: String,
    pub content_delta: Option<serde_json::Value>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            author_id: post.author_id,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            content_html: post.content_html,
            content_delta: post.content_delta.map(|json| json.0),
            published: post.published,
            published_at: post.published_at,
            category: post.category,
            image_url: post.image_url,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Build a URL slug from a post title: lowercase ASCII alphanumerics joined
/// by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("post");
    }
    slug
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "writer@example.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            name: "Writer".to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_role_parsing() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("author".parse::<UserRole>().unwrap(), UserRole::Author);
        assert!("editor".parse::<UserRole>().is_err());
        assert_eq!(UserRole::Admin.to_string(), "admin");
    }

    #[test]
    fn test_unknown_stored_role_falls_back_to_author() {
        assert!(sample_user("admin").is_admin());
        assert_eq!(sample_user("superuser").role(), UserRole::Author);
    }

    #[test]
    fn test_user_serialization_skips_password_hash() {
        let json = serde_json::to_string(&sample_user("author")).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$2b$"));
    }

    #[test]
    fn test_user_response_uses_camel_case() {
        let response: UserResponse = sample_user("admin").into();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["role"], "admin");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_post_response_from_post() {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            title: "Hello".to_string(),
            slug: "hello".to_string(),
            excerpt: None,
            content_html: "<p>Hi</p>".to_string(),
            content_delta: Some(sqlx::types::Json(serde_json::json!({"ops": []}))),
            published: true,
            published_at: Some(Utc::now()),
            category: Some("news".to_string()),
            image_url: None,
            image_public_id: Some("inkpost/abc".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let response: PostResponse = post.into();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["contentHtml"], "<p>Hi</p>");
        assert_eq!(json["contentDelta"], serde_json::json!({"ops": []}));
        assert!(json.get("imagePublicId").is_none());
    }

    #[test]
    fn test_update_post_is_empty() {
        assert!(UpdatePost::default().is_empty());
        let update = UpdatePost {
            published: Some(false),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   in 2026 "), "rust-in-2026");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("Ünïcode only ✨"), "n-code-only");
        assert_eq!(slugify("!!!"), "post");
    }
}

//! Post repository for database operations

use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::core::db::models::{CreatePost, Post, PostFilter, UpdatePost, slugify};

const POST_COLUMNS: &str = "id, author_id, title, slug, excerpt, content_html, content_delta, \
     published, published_at, category, image_url, image_public_id, created_at, updated_at";

/// Post repository error types
#[derive(Debug, thiserror::Error)]
pub enum PostRepositoryError {
    #[error("Post not found")]
    NotFound,

    #[error("Slug already in use: {0}")]
    SlugTaken(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// A unique violation on write can only come from `posts.slug`
fn write_error(err: sqlx::Error, slug: Option<&str>) -> PostRepositoryError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            PostRepositoryError::SlugTaken(slug.unwrap_or_default().to_string())
        }
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
}

impl PostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a post. `published_at` is stamped when the post starts published.
    pub async fn create(&self, dto: &CreatePost) -> Result<Post, PostRepositoryError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (author_id, title, slug, excerpt, content_html, content_delta,
                               published, published_at, category, image_url, image_public_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $7 THEN NOW() ELSE NULL END, $8, $9, $10)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(dto.author_id)
        .bind(&dto.title)
        .bind(&dto.slug)
        .bind(&dto.excerpt)
        .bind(&dto.content_html)
        .bind(dto.content_delta.clone().map(sqlx::types::Json))
        .bind(dto.published)
        .bind(&dto.category)
        .bind(&dto.image_url)
        .bind(&dto.image_public_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, Some(&dto.slug)))?;

        Ok(post)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>, PostRepositoryError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, PostRepositoryError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> Result<bool, PostRepositoryError> {
        let taken: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        Ok(taken.0)
    }

    /// Slug for `title` that no other post uses, suffixing `-2`, `-3`, ...
    pub async fn unique_slug(
        &self,
        title: &str,
        except: Option<Uuid>,
    ) -> Result<String, PostRepositoryError> {
        let base = slugify(title);
        let mut candidate = base.clone();
        let mut n = 2;

        while self.slug_taken(&candidate, except).await? {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }

        Ok(candidate)
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
        builder.push(" WHERE TRUE");
        if let Some(author_id) = filter.author_id {
            builder.push(" AND author_id = ").push_bind(author_id);
        }
        if filter.published_only {
            builder.push(" AND published");
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
    }

    /// List posts newest first
    pub async fn list(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, PostRepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        Self::push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY COALESCE(published_at, created_at) DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    pub async fn count(&self, filter: &PostFilter) -> Result<i64, PostRepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts");
        Self::push_filter(&mut builder, filter);

        let count: (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;

        Ok(count.0)
    }

    /// Apply a partial update. Publishing stamps `published_at` once;
    /// unpublishing clears it.
    pub async fn update(&self, id: Uuid, updates: &UpdatePost) -> Result<Post, PostRepositoryError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET
                title = COALESCE($2, title),
                slug = COALESCE($3, slug),
                excerpt = COALESCE($4, excerpt),
                content_html = COALESCE($5, content_html),
                content_delta = COALESCE($6, content_delta),
                published = COALESCE($7, published),
                published_at = CASE
                    WHEN $7 IS NULL THEN published_at
                    WHEN $7 AND published_at IS NULL THEN NOW()
                    WHEN $7 THEN published_at
                    ELSE NULL
                END,
                category = COALESCE($8, category),
                image_url = COALESCE($9, image_url),
                image_public_id = COALESCE($10, image_public_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&updates.title)
        .bind(&updates.slug)
        .bind(&updates.excerpt)
        .bind(&updates.content_html)
        .bind(updates.content_delta.clone().map(sqlx::types::Json))
        .bind(updates.published)
        .bind(&updates.category)
        .bind(&updates.image_url)
        .bind(&updates.image_public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, updates.slug.as_deref()))?;

        post.ok_or(PostRepositoryError::NotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, PostRepositoryError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

use std::collections::HashSet;

use crate::{
    error::{ApiError, QueryError},
    schema::{Id, RecipeTagRow, Tag},
    validation::NewTag,
};

use sqlx::{PgConnection, Pool, Postgres};

pub async fn create_tag(tag: NewTag, pool: &Pool<Postgres>) -> Result<Tag, ApiError> {
    let tag: Option<Tag> = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING RETURNING *",
    )
    .bind(tag.name)
    .bind(tag.color)
    .bind(tag.slug)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    tag.ok_or_else(|| ApiError::Conflict(String::from("Tag with this name or slug already exists")))
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn list_recipe_tags(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeTagRow>, ApiError> {
    let list: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

/// Ids from `tag_ids` with no matching row.
pub async fn missing_tags(tag_ids: &[Id], conn: &mut PgConnection) -> Result<Vec<Id>, ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(tag_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;
    let found: HashSet<Id> = found.into_iter().map(|row| row.0).collect();

    Ok(tag_ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect())
}

/// Slugs from `slugs` with no matching tag.
pub async fn missing_tag_slugs(
    slugs: &[String],
    pool: &Pool<Postgres>,
) -> Result<Vec<String>, ApiError> {
    let found: Vec<(String,)> = sqlx::query_as("SELECT slug FROM tags WHERE slug = ANY($1)")
        .bind(slugs)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;
    let found: HashSet<String> = found.into_iter().map(|row| row.0).collect();

    Ok(slugs
        .iter()
        .filter(|slug| !found.contains(*slug))
        .cloned()
        .collect())
}

/// Replaces the whole tag set of a recipe.
pub async fn set_recipe_tags(
    recipe_id: Id,
    tag_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    sqlx::query(
        "INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, UNNEST($2::INTEGER[]) ON CONFLICT DO NOTHING",
    )
    .bind(recipe_id)
    .bind(tag_ids)
    .execute(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(())
}

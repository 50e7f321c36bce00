use std::collections::HashSet;

use crate::{
    error::{ApiError, QueryError},
    schema::{Id, Ingredient, RecipeIngredientRow},
    validation::{IngredientAmount, NewIngredient},
};

use sqlx::{PgConnection, Pool, Postgres};

/// Escapes `LIKE` wildcards so user input only ever matches literally.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Case-insensitive prefix search, ordered by name.
pub async fn search_ingredients(
    name: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows: Vec<Ingredient> = match name {
        Some(name) => sqlx::query_as(
            "SELECT * FROM ingredients WHERE LOWER(name) LIKE LOWER($1) ORDER BY name, id",
        )
        .bind(like_prefix(name))
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?,
        None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name, id")
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?,
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn create_ingredient(
    ingredient: NewIngredient,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING RETURNING *
    ",
    )
    .bind(ingredient.name)
    .bind(ingredient.measurement_unit)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| ApiError::Conflict(String::from("Ingredient already exists")))
}

pub async fn list_recipe_ingredients(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeIngredientRow>, ApiError> {
    let rows: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS id, i.name AS name,
            i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn missing_ingredients(
    ingredient_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<Vec<Id>, ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ingredient_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;
    let found: HashSet<Id> = found.into_iter().map(|row| row.0).collect();

    Ok(ingredient_ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect())
}

/// Delete-all-then-bulk-insert; run inside the caller's transaction.
pub async fn set_recipe_ingredients(
    recipe_id: Id,
    ingredients: &[IngredientAmount],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    let ids: Vec<Id> = ingredients.iter().map(|part| part.id).collect();
    let amounts: Vec<i32> = ingredients.iter().map(|part| part.amount).collect();

    sqlx::query(
        "
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount)
        SELECT $1, parts.ingredient_id, parts.amount
        FROM UNNEST($2::INTEGER[], $3::INTEGER[]) AS parts (ingredient_id, amount)
    ",
    )
    .bind(recipe_id)
    .bind(ids)
    .bind(amounts)
    .execute(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(())
}

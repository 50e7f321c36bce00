use std::collections::HashMap;

use crate::{
    authentication::permissions::ActionType,
    error::{ApiError, FieldErrors, QueryError},
    form::Form,
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    schema::{Id, Recipe, RecipeRow},
    validation::{IngredientAmount, NewRecipe, RecipeChanges},
};

use super::{
    ingredients::missing_ingredients,
    set_recipe_ingredients, set_recipe_tags,
    tags::{missing_tag_slugs, missing_tags},
};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

/// Query-string filters of the recipe list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<Id>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_form(form: &Form) -> Result<Self, ApiError> {
        Ok(Self {
            tags: form.get_all("tags"),
            author: form.get_number("author")?,
            is_favorited: form.get_flag("is_favorited")?,
            is_in_shopping_cart: form.get_flag("is_in_shopping_cart")?,
        })
    }
}

/// Newest first. The favorite/cart flags only apply when `viewer` is known.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Id>,
    page: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Recipe>, ApiError> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        if let Some(slug) = missing_tag_slugs(&filter.tags, pool).await?.first() {
            return Err(FieldErrors::single(
                "tags",
                format!("Select a valid choice. {slug} is not one of the available choices."),
            )
            .into());
        }

        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(user_id) = viewer {
        if filter.is_favorited {
            query
                .push(" AND EXISTS (SELECT 1 FROM favorite_recipes f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }

    query
        .push(" ORDER BY r.id DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let rows = rows.into_iter().map(|row| row.recipe).collect();

    PageContext::from_rows(rows, total_count, page)
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe the session may modify: its own, or any for admins.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let recipe = get_recipe(id, pool).await?;
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match recipe {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(e) => {
                if recipe.author_id != session.user_id {
                    Err(e)
                } else {
                    Ok(recipe)
                }
            }
        },
        None => Err(ApiError::not_found()),
    }
}

async fn check_references(
    tags: Option<&[Id]>,
    ingredients: Option<&[IngredientAmount]>,
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    if let Some(tags) = tags {
        for id in missing_tags(tags, conn).await? {
            errors.add("tags", format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }

    if let Some(ingredients) = ingredients {
        let ids: Vec<Id> = ingredients.iter().map(|part| part.id).collect();
        for id in missing_ingredients(&ids, conn).await? {
            errors.add(
                "ingredients",
                format!("Invalid pk \"{id}\" - object does not exist."),
            );
        }
    }

    Ok(errors.check(())?)
}

/// Inserts the recipe with its tags and ingredients in one transaction.
pub async fn create_recipe(
    author_id: Id,
    recipe: &NewRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Id, ApiError> {
    let mut tx = pool.begin().await.map_err(QueryError::from)?;

    check_references(Some(&recipe.tags), Some(&recipe.ingredients), &mut tx).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, cooking_time, image)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(image)
    .fetch_one(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    set_recipe_tags(id.0, &recipe.tags, &mut tx).await?;
    set_recipe_ingredients(id.0, &recipe.ingredients, &mut tx).await?;

    tx.commit().await.map_err(QueryError::from)?;

    log::info!("User {author_id} created recipe {}", id.0);
    Ok(id.0)
}

/// Applies a partial update; present tag/ingredient lists replace the old sets.
pub async fn update_recipe(
    id: Id,
    changes: &RecipeChanges,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let mut tx = pool.begin().await.map_err(QueryError::from)?;

    check_references(changes.tags.as_deref(), changes.ingredients.as_deref(), &mut tx).await?;

    let recipe: Option<Recipe> = sqlx::query_as(
        "
        UPDATE recipes SET
        name = COALESCE($2, name),
        text = COALESCE($3, text),
        cooking_time = COALESCE($4, cooking_time),
        image = COALESCE($5, image)
        WHERE id = $1
        RETURNING *
    ",
    )
    .bind(id)
    .bind(changes.name.as_deref())
    .bind(changes.text.as_deref())
    .bind(changes.cooking_time)
    .bind(image)
    .fetch_optional(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    let recipe = recipe.ok_or_else(ApiError::not_found)?;

    if let Some(tags) = &changes.tags {
        set_recipe_tags(id, tags, &mut tx).await?;
    }
    if let Some(ingredients) = &changes.ingredients {
        set_recipe_ingredients(id, ingredients, &mut tx).await?;
    }

    tx.commit().await.map_err(QueryError::from)?;

    Ok(recipe)
}

pub async fn delete_recipe(id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found());
    }

    Ok(())
}

/// Newest recipes of each author, at most `limit` per author when given.
pub async fn list_author_recipes(
    author_ids: &[Id],
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<Recipe>>, ApiError> {
    let rows: Vec<Recipe> = sqlx::query_as(
        "
        SELECT id, author_id, name, text, cooking_time, image FROM (
            SELECT r.*, ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, id DESC
    ",
    )
    .bind(author_ids)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut recipes: HashMap<Id, Vec<Recipe>> = HashMap::new();
    for recipe in rows {
        recipes.entry(recipe.author_id).or_default().push(recipe);
    }

    Ok(recipes)
}

pub async fn count_author_recipes(
    author_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, i64>, ApiError> {
    let rows: Vec<(Id, i64)> = sqlx::query_as(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().collect())
}

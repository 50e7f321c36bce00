use std::collections::HashSet;

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionKey},
    },
    error::{ApiError, FieldErrors, QueryError},
    pagination::{PageContext, PageRequest},
    schema::{Id, User, UserRow},
    validation::NewUser,
};

use sqlx::{Pool, Postgres};

pub async fn get_user_by_email(
    email: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(user_id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn list_users_by_id(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<User>, ApiError> {
    let rows: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn fetch_users(
    page: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<PageContext<User>, ApiError> {
    let rows: Vec<UserRow> =
        sqlx::query_as("SELECT u.*, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $1 OFFSET $2")
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let rows = rows.into_iter().map(|row| row.user).collect();

    PageContext::from_rows(rows, total_count, page)
}

/// Creates a user; `password` on `NewUser` is still plain text at this point.
pub async fn register_user(new_user: NewUser, pool: &Pool<Postgres>) -> Result<User, ApiError> {
    // aggregates always yield one row; NULL when nobody matches
    let (email_taken, username_taken): (Option<bool>, Option<bool>) = sqlx::query_as(
        "
        SELECT bool_or(LOWER(email) = LOWER($1)), bool_or(username = $2)
        FROM users WHERE LOWER(email) = LOWER($1) OR username = $2
    ",
    )
    .bind(&new_user.email)
    .bind(&new_user.username)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    let mut errors = FieldErrors::new();
    if email_taken.unwrap_or(false) {
        errors.add("email", "A user with that email already exists.");
    }
    if username_taken.unwrap_or(false) {
        errors.add("username", "A user with that username already exists.");
    }
    errors.check(())?;

    let password = hash_password(&new_user.password)?;

    let user: Option<User> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING *;
    ",
    )
    .bind(&new_user.email)
    .bind(&new_user.username)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    match user {
        Some(user) => {
            log::info!("Registered user {} ({})", user.username, user.id);
            Ok(user)
        }
        // lost a race against a concurrent registration
        None => Err(FieldErrors::single(
            "non_field_errors",
            "A user with that email or username already exists.",
        )
        .into()),
    }
}

pub async fn login_user(
    email: &str,
    password: &str,
    key: &SessionKey,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    let invalid = || {
        ApiError::from(FieldErrors::single(
            "non_field_errors",
            "Unable to log in with provided credentials.",
        ))
    };

    let user = get_user_by_email(email, pool).await?.ok_or_else(invalid)?;

    if !verify_password(password, &user.password)? {
        return Err(invalid());
    }

    generate_jwt_session(&user, key)
}

pub async fn set_password(
    user_id: Id,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let user = get_user_by_id(user_id, pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    if !verify_password(current_password, &user.password)? {
        return Err(FieldErrors::single("current_password", "Invalid password.").into());
    }

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hash_password(new_password)?)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

/// Which of `author_ids` the user follows.
pub async fn list_subscribed_authors(
    user_id: Id,
    author_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Id>, ApiError> {
    let rows: Vec<(Id,)> =
        sqlx::query_as("SELECT author_id FROM follows WHERE user_id = $1 AND author_id = ANY($2)")
            .bind(user_id)
            .bind(author_ids)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

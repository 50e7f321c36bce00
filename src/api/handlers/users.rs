use std::collections::HashSet;

use serde_json::json;
use warp::{http::StatusCode, reply::Response, Rejection};

use crate::{
    actions::{
        count_author_recipes, fetch_subscriptions, fetch_users,
        get_user_by_id, list_author_recipes, list_subscribed_authors, login_user, register_user,
        set_password, subscribe, unsubscribe,
    },
    error::{ApiError, TypeError},
    form::Form,
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    representation::{SubscriptionView, UserView},
    schema::{Id, User},
    state::AppState,
    validation::{LoginPayload, PasswordPayload, UserPayload},
};

use super::{json_reply, no_content};

fn recipes_limit(form: &Form) -> Result<Option<i64>, TypeError> {
    match form.get_number::<i64>("recipes_limit")? {
        Some(limit) if limit < 0 => Err(TypeError::new(
            "recipes_limit",
            "Ensure this value is greater than or equal to 0.",
        )),
        limit => Ok(limit),
    }
}

/// Subscription form of each author, in the order given.
async fn subscription_views(
    authors: Vec<User>,
    recipes_limit: Option<i64>,
    state: &AppState,
) -> Result<Vec<SubscriptionView>, ApiError> {
    let ids: Vec<Id> = authors.iter().map(|user| user.id).collect();
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let recipes = list_author_recipes(&ids, recipes_limit, &state.pool).await?;
    let counts = count_author_recipes(&ids, &state.pool).await?;

    Ok(authors
        .iter()
        .map(|author| {
            SubscriptionView::new(
                author,
                true,
                recipes.get(&author.id).map(Vec::as_slice).unwrap_or(&[]),
                counts.get(&author.id).copied().unwrap_or(0),
                &state.config.media_url,
            )
        })
        .collect())
}

pub async fn login(payload: LoginPayload, state: AppState) -> Result<Response, Rejection> {
    let (email, password) = payload.validate()?;
    let token = login_user(&email, &password, &state.session_key, &state.pool).await?;

    Ok(json_reply(&json!({ "auth_token": token }), StatusCode::OK))
}

/// Tokens are stateless; there is nothing to revoke.
pub async fn logout(session: SessionData) -> Result<Response, Rejection> {
    log::debug!("User {} logged out", session.user_id);
    Ok(no_content())
}

pub async fn list_users(
    form: Form,
    session: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let page = PageRequest::from_form(&form, state.config.page_size)?;
    let users = fetch_users(&page, &state.pool).await?;

    let subscribed = match &session {
        Some(session) => {
            let ids: Vec<Id> = users.results.iter().map(|user| user.id).collect();
            list_subscribed_authors(session.user_id, &ids, &state.pool).await?
        }
        None => HashSet::new(),
    };

    let users = users.try_map(|user| {
        Ok::<_, ApiError>(UserView::new(&user, subscribed.contains(&user.id)))
    })?;

    Ok(json_reply(&users, StatusCode::OK))
}

pub async fn register(payload: UserPayload, state: AppState) -> Result<Response, Rejection> {
    let new_user = payload.validate()?;
    let user = register_user(new_user, &state.pool).await?;

    let body = json!({
        "id": user.id,
        "email": user.email,
        "username": user.username,
        "first_name": user.first_name,
        "last_name": user.last_name,
    });
    Ok(json_reply(&body, StatusCode::CREATED))
}

pub async fn get_user(
    id: Id,
    session: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let user = get_user_by_id(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    let is_subscribed = match &session {
        Some(session) => list_subscribed_authors(session.user_id, &[id], &state.pool)
            .await?
            .contains(&id),
        None => false,
    };

    Ok(json_reply(&UserView::new(&user, is_subscribed), StatusCode::OK))
}

pub async fn me(session: SessionData, state: AppState) -> Result<Response, Rejection> {
    let user = get_user_by_id(session.user_id, &state.pool)
        .await?
        .ok_or_else(ApiError::unauthenticated)?;

    Ok(json_reply(&UserView::new(&user, false), StatusCode::OK))
}

pub async fn change_password(
    session: SessionData,
    payload: PasswordPayload,
    state: AppState,
) -> Result<Response, Rejection> {
    let (current, new) = payload.validate()?;
    set_password(session.user_id, &current, &new, &state.pool).await?;

    log::info!("User {} changed their password", session.user_id);
    Ok(no_content())
}

pub async fn list_subscriptions(
    form: Form,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let page = PageRequest::from_form(&form, state.config.page_size)?;
    let limit = recipes_limit(&form)?;

    let authors = fetch_subscriptions(session.user_id, &page, &state.pool).await?;
    let views = PageContext {
        count: authors.count,
        next: authors.next,
        previous: authors.previous,
        results: subscription_views(authors.results, limit, &state).await?,
    };

    Ok(json_reply(&views, StatusCode::OK))
}

pub async fn subscribe_to(
    id: Id,
    form: Form,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let limit = recipes_limit(&form)?;
    let author = get_user_by_id(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    subscribe(session.user_id, author.id, &state.pool).await?;

    let view = subscription_views(vec![author], limit, &state)
        .await?
        .pop()
        .ok_or_else(ApiError::not_found)?;

    Ok(json_reply(&view, StatusCode::CREATED))
}

pub async fn unsubscribe_from(
    id: Id,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    get_user_by_id(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    unsubscribe(session.user_id, id, &state.pool).await?;
    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::from_data(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn recipes_limit_is_optional_and_non_negative() {
        assert_eq!(recipes_limit(&form(&[])).unwrap(), None);
        assert_eq!(recipes_limit(&form(&[("recipes_limit", "3")])).unwrap(), Some(3));
        assert!(recipes_limit(&form(&[("recipes_limit", "-1")])).is_err());
        assert!(recipes_limit(&form(&[("recipes_limit", "many")])).is_err());
    }
}

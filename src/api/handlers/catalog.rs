use warp::{http::StatusCode, reply::Response, Rejection};

use crate::{
    actions::{
        create_ingredient, create_tag, get_ingredient, get_tag, list_tags, search_ingredients,
    },
    error::ApiError,
    form::Form,
    jwt::SessionData,
    permissions::ActionType,
    schema::Id,
    state::AppState,
    validation::{IngredientPayload, TagPayload},
};

use super::json_reply;

pub async fn all_tags(state: AppState) -> Result<Response, Rejection> {
    let tags = list_tags(&state.pool).await?;
    Ok(json_reply(&tags, StatusCode::OK))
}

pub async fn tag_detail(id: Id, state: AppState) -> Result<Response, Rejection> {
    let tag = get_tag(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(json_reply(&tag, StatusCode::OK))
}

pub async fn new_tag(
    session: SessionData,
    payload: TagPayload,
    state: AppState,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;
    let tag = create_tag(payload.validate()?, &state.pool).await?;

    log::info!("{} created tag {}", session.username, tag.slug);
    Ok(json_reply(&tag, StatusCode::CREATED))
}

/// `?name=` filters by case-insensitive prefix.
pub async fn all_ingredients(form: Form, state: AppState) -> Result<Response, Rejection> {
    let ingredients = search_ingredients(form.get_str("name"), &state.pool).await?;
    Ok(json_reply(&ingredients, StatusCode::OK))
}

pub async fn ingredient_detail(id: Id, state: AppState) -> Result<Response, Rejection> {
    let ingredient = get_ingredient(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(json_reply(&ingredient, StatusCode::OK))
}

pub async fn new_ingredient(
    session: SessionData,
    payload: IngredientPayload,
    state: AppState,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;
    let ingredient = create_ingredient(payload.validate()?, &state.pool).await?;

    log::info!(
        "{} created ingredient {} ({})",
        session.username,
        ingredient.name,
        ingredient.measurement_unit
    );
    Ok(json_reply(&ingredient, StatusCode::CREATED))
}

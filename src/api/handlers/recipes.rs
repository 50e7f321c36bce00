use warp::{http::StatusCode, reply::Response, Rejection, Reply};

use crate::{
    actions::{
        self, add_to_list, aggregate_shopping_cart, fetch_recipes, get_recipe, get_recipe_mut,
        list_marked_recipes, list_recipe_ingredients, list_recipe_tags, list_subscribed_authors,
        list_users_by_id, remove_from_list, RecipeFilter, RecipeList,
    },
    error::ApiError,
    form::Form,
    jwt::SessionData,
    media::{remove_image, store_image},
    pagination::PageRequest,
    permissions::ActionType,
    representation::{shopping_list_text, RecipeAction, RecipeContext, RecipeShortView},
    schema::{Id, Recipe},
    state::AppState,
    validation::RecipePayload,
};

use super::{json_reply, no_content};

/// Batches every lookup the recipes need. Anonymous viewers skip the
/// favorite, cart and subscription queries.
async fn load_recipe_context(
    recipes: &[Recipe],
    viewer: Option<&SessionData>,
    state: &AppState,
) -> Result<RecipeContext, ApiError> {
    let mut context = RecipeContext::new(&state.config.media_url);
    if recipes.is_empty() {
        return Ok(context);
    }

    let ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let mut author_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    context.add_tags(list_recipe_tags(&ids, &state.pool).await?);
    context.add_ingredients(list_recipe_ingredients(&ids, &state.pool).await?);
    context.add_authors(list_users_by_id(&author_ids, &state.pool).await?);

    if let Some(viewer) = viewer {
        let pool = &state.pool;
        context.favorited =
            list_marked_recipes(RecipeList::Favorites, viewer.user_id, &ids, pool).await?;
        context.in_cart =
            list_marked_recipes(RecipeList::ShoppingCart, viewer.user_id, &ids, pool).await?;
        context.subscribed = list_subscribed_authors(viewer.user_id, &author_ids, pool).await?;
    }

    Ok(context)
}

async fn render_one(
    action: RecipeAction,
    recipe: Recipe,
    viewer: Option<&SessionData>,
    state: &AppState,
) -> Result<Response, Rejection> {
    let context = load_recipe_context(std::slice::from_ref(&recipe), viewer, state).await?;
    let view = context.render(recipe)?;
    Ok(json_reply(&view, action.status()))
}

pub async fn list_recipes(
    form: Form,
    session: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let page = PageRequest::from_form(&form, state.config.page_size)?;
    let filter = RecipeFilter::from_form(&form)?;
    let viewer = session.as_ref().map(|session| session.user_id);

    let recipes = fetch_recipes(&filter, viewer, &page, &state.pool).await?;
    let context = load_recipe_context(&recipes.results, session.as_ref(), &state).await?;
    let views = recipes.try_map(|recipe| context.render(recipe))?;

    Ok(json_reply(&views, RecipeAction::List.status()))
}

pub async fn recipe_detail(
    id: Id,
    session: Option<SessionData>,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    render_one(RecipeAction::Retrieve, recipe, session.as_ref(), &state).await
}

pub async fn create_recipe(
    session: SessionData,
    payload: RecipePayload,
    state: AppState,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = payload.validate_create()?;

    let media_root = &state.config.media_root;
    let image = store_image(media_root, &recipe.image).await?;

    let id = match actions::create_recipe(session.user_id, &recipe, &image, &state.pool).await {
        Ok(id) => id,
        Err(e) => {
            remove_image(media_root, &image).await;
            return Err(e.into());
        }
    };

    let created = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    render_one(RecipeAction::Create, created, Some(&session), &state).await
}

pub async fn update_recipe(
    id: Id,
    session: SessionData,
    payload: RecipePayload,
    state: AppState,
) -> Result<Response, Rejection> {
    let current = get_recipe_mut(id, &session, &state.pool).await?;
    let changes = payload.validate_update()?;

    let media_root = &state.config.media_root;
    let image = match &changes.image {
        Some(image) => Some(store_image(media_root, image).await?),
        None => None,
    };

    let updated =
        match actions::update_recipe(id, &changes, image.as_deref(), &state.pool).await {
            Ok(recipe) => recipe,
            Err(e) => {
                if let Some(image) = &image {
                    remove_image(media_root, image).await;
                }
                return Err(e.into());
            }
        };

    if let (Some(_), Some(old)) = (&image, &current.image) {
        remove_image(media_root, old).await;
    }

    render_one(RecipeAction::Update, updated, Some(&session), &state).await
}

pub async fn delete_recipe(
    id: Id,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;
    actions::delete_recipe(recipe.id, &state.pool).await?;

    if let Some(image) = &recipe.image {
        remove_image(&state.config.media_root, image).await;
    }

    log::info!("{} deleted recipe {}", session.username, recipe.id);
    Ok(no_content())
}

pub async fn add_recipe_to(
    list: RecipeList,
    id: Id,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    add_to_list(list, recipe.id, session.user_id, &state.pool).await?;

    let view = RecipeShortView::new(&recipe, &state.config.media_url);
    Ok(json_reply(&view, StatusCode::CREATED))
}

pub async fn remove_recipe_from(
    list: RecipeList,
    id: Id,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipe = get_recipe(id, &state.pool)
        .await?
        .ok_or_else(ApiError::not_found)?;

    remove_from_list(list, recipe.id, session.user_id, &state.pool).await?;
    Ok(no_content())
}

pub async fn download_shopping_cart(
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let items = aggregate_shopping_cart(session.user_id, &state.pool).await?;
    let text = shopping_list_text(&items);

    let disposition = format!("attachment; filename=\"{}\"", state.config.shopping_cart_file);
    // a `String` reply is already `text/plain; charset=utf-8`
    Ok(warp::reply::with_header(text, "content-disposition", disposition).into_response())
}

use serde::de::DeserializeOwned;
use warp::{
    filters::BoxedFilter,
    reply::{Reply, Response},
    Filter, Rejection,
};

use crate::{
    actions::RecipeList,
    constants::MAX_BODY_BYTES,
    error::handle_rejection,
    form::{Form, FormData},
    handlers,
    jwt::SessionData,
    middleware::{with_possible_session, with_session},
    schema::Id,
    state::{with_state, AppState},
};

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn query() -> impl Filter<Extract = (Form,), Error = Rejection> + Clone {
    warp::query::<FormData>().map(Form::from_data)
}

fn auth_routes(state: &AppState) -> BoxedFilter<(Response,)> {
    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(state.session_key.clone()))
        .and_then(handlers::logout);

    login.or(logout).unify().boxed()
}

fn user_routes(state: &AppState) -> BoxedFilter<(Response,)> {
    let key = &state.session_key;

    let list = warp::path!("users")
        .and(warp::get())
        .and(query())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_users);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::register);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::change_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(query())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_subscriptions);

    let detail = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_user);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(query())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::subscribe_to);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::unsubscribe_from);

    list.or(register)
        .unify()
        .or(me)
        .unify()
        .or(set_password)
        .unify()
        .or(subscriptions)
        .unify()
        .or(detail)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .boxed()
}

fn catalog_routes(state: &AppState) -> BoxedFilter<(Response,)> {
    let key = &state.session_key;

    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::all_tags);

    let new_tag = warp::path!("tags")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::new_tag);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::tag_detail);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(query())
        .and(with_state(state.clone()))
        .and_then(handlers::all_ingredients);

    let new_ingredient = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::new_ingredient);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::ingredient_detail);

    tags.or(new_tag)
        .unify()
        .or(tag)
        .unify()
        .or(ingredients)
        .unify()
        .or(new_ingredient)
        .unify()
        .or(ingredient)
        .unify()
        .boxed()
}

/// POST adds to the list, DELETE removes from it.
fn recipe_list_routes(
    segment: &'static str,
    list: RecipeList,
    state: &AppState,
) -> BoxedFilter<(Response,)> {
    let key = &state.session_key;

    let add = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(move |id: Id, session: SessionData, state: AppState| {
            handlers::add_recipe_to(list, id, session, state)
        });

    let remove = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(move |id: Id, session: SessionData, state: AppState| {
            handlers::remove_recipe_from(list, id, session, state)
        });

    add.or(remove).unify().boxed()
}

fn recipe_routes(state: &AppState) -> BoxedFilter<(Response,)> {
    let key = &state.session_key;

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(query())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::download_shopping_cart);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::recipe_detail);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(key.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_recipe);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(recipe_list_routes("favorite", RecipeList::Favorites, state))
        .unify()
        .or(recipe_list_routes("shopping_cart", RecipeList::ShoppingCart, state))
        .unify()
        .boxed()
}

fn media_routes(state: &AppState) -> BoxedFilter<(Response,)> {
    warp::path("media")
        .and(warp::get())
        .and(warp::fs::dir(state.config.media_root.clone()))
        .map(|file: warp::fs::File| file.into_response())
        .boxed()
}

/// Every endpoint under `/api`, stored media, and JSON error bodies.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let api = warp::path("api").and(
        auth_routes(&state)
            .or(user_routes(&state))
            .unify()
            .or(catalog_routes(&state))
            .unify()
            .or(recipe_routes(&state))
            .unify(),
    );

    api.or(media_routes(&state))
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::log("foodgram::api"))
}

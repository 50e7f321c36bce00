//! Needs a Postgres server: `DATABASE_URL=... cargo test -- --ignored`

use foodgram::{
    actions::{
        add_to_list, aggregate_shopping_cart, create_ingredient, create_recipe, create_tag,
        fetch_recipes, fetch_subscriptions, list_recipe_ingredients, list_recipe_tags,
        login_user, register_user, remove_from_list, subscribe, unsubscribe, update_recipe,
        RecipeFilter, RecipeList,
    },
    config::Config,
    error::ApiError,
    jwt::{verify_jwt_session, SessionKey},
    media::DecodedImage,
    pagination::PageRequest,
    representation::shopping_list_text,
    schema::Id,
    validation::{IngredientAmount, NewIngredient, NewRecipe, NewTag, NewUser, RecipeChanges},
    AppState,
};
use serde_json::Value;
use sqlx::PgPool;
use warp::http::StatusCode;

async fn user(name: &str, pool: &PgPool) -> Id {
    register_user(
        NewUser {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            first_name: String::from("Test"),
            last_name: String::from("User"),
            password: String::from("correct horse"),
        },
        pool,
    )
    .await
    .unwrap()
    .id
}

async fn tag(slug: &str, pool: &PgPool) -> Id {
    create_tag(
        NewTag {
            name: slug.to_uppercase(),
            color: String::from("#00AA00"),
            slug: slug.to_string(),
        },
        pool,
    )
    .await
    .unwrap()
    .id
}

async fn ingredient(name: &str, unit: &str, pool: &PgPool) -> Id {
    create_ingredient(
        NewIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        },
        pool,
    )
    .await
    .unwrap()
    .id
}

fn new_recipe(name: &str, tags: Vec<Id>, ingredients: Vec<(Id, i32)>) -> NewRecipe {
    NewRecipe {
        name: name.to_string(),
        text: String::from("Mix everything."),
        cooking_time: 10,
        tags,
        ingredients: ingredients
            .into_iter()
            .map(|(id, amount)| IngredientAmount { id, amount })
            .collect(),
        image: DecodedImage {
            extension: String::from("png"),
            bytes: vec![1, 2, 3],
        },
    }
}

async fn recipe(author: Id, recipe: NewRecipe, pool: &PgPool) -> Id {
    create_recipe(author, &recipe, "recipes/images/test.png", pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn favorite_toggle_uses_the_unique_constraint(pool: PgPool) {
    let cook = user("cook", &pool).await;
    let breakfast = tag("breakfast", &pool).await;
    let eggs = ingredient("eggs", "pcs", &pool).await;
    let omelette = recipe(cook, new_recipe("Omelette", vec![breakfast], vec![(eggs, 3)]), &pool).await;

    add_to_list(RecipeList::Favorites, omelette, cook, &pool)
        .await
        .unwrap();
    let second = add_to_list(RecipeList::Favorites, omelette, cook, &pool).await;
    assert!(matches!(second, Err(ApiError::Conflict(_))));

    remove_from_list(RecipeList::Favorites, omelette, cook, &pool)
        .await
        .unwrap();
    let again = remove_from_list(RecipeList::Favorites, omelette, cook, &pool).await;
    assert!(matches!(again, Err(ApiError::NotFound(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn shopping_cart_sums_shared_ingredients(pool: PgPool) {
    let cook = user("cook", &pool).await;
    let baking = tag("baking", &pool).await;
    let flour = ingredient("flour", "g", &pool).await;
    let milk = ingredient("milk", "ml", &pool).await;

    let bread = recipe(cook, new_recipe("Bread", vec![baking], vec![(flour, 200)]), &pool).await;
    let pancakes = recipe(
        cook,
        new_recipe("Pancakes", vec![baking], vec![(flour, 300), (milk, 250)]),
        &pool,
    )
    .await;

    for id in [bread, pancakes] {
        add_to_list(RecipeList::ShoppingCart, id, cook, &pool)
            .await
            .unwrap();
    }

    let items = aggregate_shopping_cart(cook, &pool).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "flour");
    assert_eq!(items[0].total_amount, 500);

    let text = shopping_list_text(&items);
    assert_eq!(text.matches("flour (g) - 500").count(), 1);
    assert!(text.ends_with("\n\nFoodGram Service"));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn subscriptions(pool: PgPool) {
    let reader = user("reader", &pool).await;
    let author = user("author", &pool).await;

    let own = subscribe(reader, reader, &pool).await;
    assert!(matches!(own, Err(ApiError::Validation(_))));

    subscribe(reader, author, &pool).await.unwrap();
    let twice = subscribe(reader, author, &pool).await;
    assert!(matches!(twice, Err(ApiError::Conflict(_))));

    let page = fetch_subscriptions(reader, &PageRequest::new(1, 6), &pool)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].id, author);

    unsubscribe(reader, author, &pool).await.unwrap();
    let absent = unsubscribe(reader, author, &pool).await;
    assert!(matches!(absent, Err(ApiError::NotFound(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn update_replaces_ingredient_set(pool: PgPool) {
    let cook = user("cook", &pool).await;
    let lunch = tag("lunch", &pool).await;
    let dinner = tag("dinner", &pool).await;
    let rice = ingredient("rice", "g", &pool).await;
    let beans = ingredient("beans", "g", &pool).await;
    let id = recipe(cook, new_recipe("Rice", vec![lunch], vec![(rice, 100)]), &pool).await;

    let changes = RecipeChanges {
        name: Some(String::from("Rice and beans")),
        tags: Some(vec![dinner]),
        ingredients: Some(vec![IngredientAmount { id: beans, amount: 50 }]),
        ..RecipeChanges::default()
    };
    let updated = update_recipe(id, &changes, None, &pool).await.unwrap();
    assert_eq!(updated.name, "Rice and beans");
    assert_eq!(updated.cooking_time, 10);
    assert_eq!(updated.image.as_deref(), Some("recipes/images/test.png"));

    let ingredients = list_recipe_ingredients(&[id], &pool).await.unwrap();
    assert_eq!(ingredients.len(), 1);
    assert_eq!((ingredients[0].id, ingredients[0].amount), (beans, 50));

    let tags = list_recipe_tags(&[id], &pool).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag.id, dinner);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn unknown_references_roll_back(pool: PgPool) {
    let cook = user("cook", &pool).await;
    let lunch = tag("lunch", &pool).await;
    let rice = ingredient("rice", "g", &pool).await;
    let id = recipe(cook, new_recipe("Rice", vec![lunch], vec![(rice, 100)]), &pool).await;

    let changes = RecipeChanges {
        name: Some(String::from("Broken")),
        ingredients: Some(vec![IngredientAmount { id: 9999, amount: 1 }]),
        ..RecipeChanges::default()
    };
    let err = update_recipe(id, &changes, None, &pool).await.unwrap_err();
    match err {
        ApiError::Validation(errors) => assert!(errors.contains("ingredients")),
        other => panic!("unexpected error {other:?}"),
    }

    let ingredients = list_recipe_ingredients(&[id], &pool).await.unwrap();
    assert_eq!(ingredients.len(), 1);
    assert_eq!(ingredients[0].id, rice);

    let missing_tag = create_recipe(
        cook,
        &new_recipe("Ghost", vec![4242], vec![(rice, 1)]),
        "recipes/images/ghost.png",
        &pool,
    )
    .await;
    assert!(matches!(missing_tag, Err(ApiError::Validation(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn recipe_filters(pool: PgPool) {
    let cook = user("cook", &pool).await;
    let other = user("other", &pool).await;
    let breakfast = tag("breakfast", &pool).await;
    let dinner = tag("dinner", &pool).await;
    let eggs = ingredient("eggs", "pcs", &pool).await;

    let omelette = recipe(cook, new_recipe("Omelette", vec![breakfast], vec![(eggs, 2)]), &pool).await;
    let stew = recipe(other, new_recipe("Stew", vec![dinner], vec![(eggs, 1)]), &pool).await;
    add_to_list(RecipeList::Favorites, stew, cook, &pool)
        .await
        .unwrap();

    let page = PageRequest::new(1, 6);
    let ids = |recipes: Vec<foodgram::schema::Recipe>| -> Vec<Id> {
        recipes.into_iter().map(|recipe| recipe.id).collect()
    };

    let all = fetch_recipes(&RecipeFilter::default(), None, &page, &pool)
        .await
        .unwrap();
    assert_eq!(all.count, 2);
    assert_eq!(ids(all.results), vec![stew, omelette]);

    let by_tag = RecipeFilter {
        tags: vec![String::from("breakfast")],
        ..RecipeFilter::default()
    };
    let tagged = fetch_recipes(&by_tag, None, &page, &pool).await.unwrap();
    assert_eq!(ids(tagged.results), vec![omelette]);

    let by_author = RecipeFilter {
        author: Some(other),
        ..RecipeFilter::default()
    };
    let authored = fetch_recipes(&by_author, None, &page, &pool).await.unwrap();
    assert_eq!(ids(authored.results), vec![stew]);

    let favorites = RecipeFilter {
        is_favorited: true,
        ..RecipeFilter::default()
    };
    let mine = fetch_recipes(&favorites, Some(cook), &page, &pool)
        .await
        .unwrap();
    assert_eq!(ids(mine.results), vec![stew]);

    // ignored without a viewer
    let anonymous = fetch_recipes(&favorites, None, &page, &pool).await.unwrap();
    assert_eq!(anonymous.count, 2);

    let unknown = RecipeFilter {
        tags: vec![String::from("breakfast"), String::from("brunch")],
        ..RecipeFilter::default()
    };
    match fetch_recipes(&unknown, None, &page, &pool).await {
        Err(ApiError::Validation(errors)) => assert_eq!(
            errors.messages("tags"),
            ["Select a valid choice. brunch is not one of the available choices."]
        ),
        other => panic!("unexpected result {other:?}"),
    }

    let past_end = fetch_recipes(&RecipeFilter::default(), None, &PageRequest::new(2, 6), &pool)
        .await;
    assert!(matches!(past_end, Err(ApiError::NotFound(message)) if message == "Invalid page."));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn registration_and_login(pool: PgPool) {
    let id = user("cook", &pool).await;
    let key = SessionKey::new("integration-secret", 1).unwrap();

    let token = login_user("COOK@example.com", "correct horse", &key, &pool)
        .await
        .unwrap();
    assert_eq!(verify_jwt_session(&token, &key).unwrap().user_id, id);

    let wrong = login_user("cook@example.com", "wrong", &key, &pool).await;
    assert!(matches!(wrong, Err(ApiError::Validation(_))));

    let duplicate = register_user(
        NewUser {
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("A"),
            last_name: String::from("B"),
            password: String::from("pw"),
        },
        &pool,
    )
    .await;
    match duplicate {
        Err(ApiError::Validation(errors)) => {
            assert!(errors.contains("email"));
            assert!(errors.contains("username"));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn email_is_unique_ignoring_case(pool: PgPool) {
    user("cook", &pool).await;

    let insert = sqlx::query(
        "INSERT INTO users (email, username, first_name, last_name, password) \
         VALUES ('COOK@example.com', 'cook2', 'A', 'B', 'x')",
    )
    .execute(&pool)
    .await;
    assert!(insert.is_err());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn anonymous_list_skips_viewer_lookups(pool: PgPool) {
    let cook = user("cook", &pool).await;
    let lunch = tag("lunch", &pool).await;
    let rice = ingredient("rice", "g", &pool).await;
    recipe(cook, new_recipe("Rice", vec![lunch], vec![(rice, 100)]), &pool).await;

    let config = Config::from_lookup(|key: &str| match key {
        "DATABASE_URL" => Some(String::from("postgres://localhost/foodgram_unused")),
        "SECRET_KEY" => Some(String::from("integration-secret")),
        _ => None,
    })
    .unwrap();
    let state = AppState::new(pool.clone(), config).unwrap();
    let token = login_user("cook@example.com", "correct horse", &state.session_key, &pool)
        .await
        .unwrap();

    // only viewer-specific lookups read these
    sqlx::query("DROP TABLE favorite_recipes, shopping_cart, follows")
        .execute(&pool)
        .await
        .unwrap();

    let filter = foodgram::routes(state);
    let response = warp::test::request()
        .path("/api/recipes/")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    let listed = &body["results"][0];
    assert_eq!(listed["is_favorited"], false);
    assert_eq!(listed["is_in_shopping_cart"], false);
    assert_eq!(listed["author"]["is_subscribed"], false);

    let response = warp::test::request()
        .path("/api/recipes/")
        .header("authorization", format!("Token {token}"))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

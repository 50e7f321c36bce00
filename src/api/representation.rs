use std::collections::{HashMap, HashSet};

use serde::Serialize;
use warp::http::StatusCode;

use crate::{
    constants::SHOPPING_LIST_FOOTER,
    error::ApiError,
    media::image_url,
    schema::{Id, Recipe, RecipeIngredientRow, RecipeTagRow, ShoppingListItem, Tag, User},
};

/// What a recipe endpoint does with its input and how it answers.
/// Writes are validated into `NewRecipe`/`RecipeChanges`; every action
/// answers with the read form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeAction {
    List,
    Retrieve,
    Create,
    Update,
}

impl RecipeAction {
    pub fn status(self) -> StatusCode {
        match self {
            RecipeAction::Create => StatusCode::CREATED,
            _ => StatusCode::OK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: &User, is_subscribed: bool) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeIngredientView {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipeIngredientRow> for RecipeIngredientView {
    fn from(row: RecipeIngredientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            measurement_unit: row.measurement_unit,
            amount: row.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeView {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredientView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub image: Option<String>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeShortView {
    pub id: Id,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl RecipeShortView {
    pub fn new(recipe: &Recipe, media_url: &str) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: image_url(media_url, recipe.image.as_deref()),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeShortView>,
    pub recipes_count: i64,
}

impl SubscriptionView {
    pub fn new(
        author: &User,
        is_subscribed: bool,
        recipes: &[Recipe],
        recipes_count: i64,
        media_url: &str,
    ) -> Self {
        Self {
            user: UserView::new(author, is_subscribed),
            recipes: recipes
                .iter()
                .map(|recipe| RecipeShortView::new(recipe, media_url))
                .collect(),
            recipes_count,
        }
    }
}

/// Everything needed to render a batch of recipes without further queries.
/// The viewer-dependent sets stay empty for anonymous requests.
#[derive(Debug, Default)]
pub struct RecipeContext {
    media_url: String,
    tags: HashMap<Id, Vec<Tag>>,
    ingredients: HashMap<Id, Vec<RecipeIngredientView>>,
    authors: HashMap<Id, User>,
    pub favorited: HashSet<Id>,
    pub in_cart: HashSet<Id>,
    pub subscribed: HashSet<Id>,
}

impl RecipeContext {
    pub fn new(media_url: &str) -> Self {
        Self {
            media_url: media_url.to_string(),
            ..Default::default()
        }
    }

    pub fn add_tags(&mut self, rows: Vec<RecipeTagRow>) {
        for row in rows {
            self.tags.entry(row.recipe_id).or_default().push(row.tag);
        }
    }

    pub fn add_ingredients(&mut self, rows: Vec<RecipeIngredientRow>) {
        for row in rows {
            self.ingredients
                .entry(row.recipe_id)
                .or_default()
                .push(row.into());
        }
    }

    pub fn add_authors(&mut self, users: Vec<User>) {
        self.authors
            .extend(users.into_iter().map(|user| (user.id, user)));
    }

    pub fn render(&self, recipe: Recipe) -> Result<RecipeView, ApiError> {
        let author = self.authors.get(&recipe.author_id).ok_or_else(|| {
            ApiError::Internal(format!(
                "author {} of recipe {} was not loaded",
                recipe.author_id, recipe.id
            ))
        })?;

        Ok(RecipeView {
            id: recipe.id,
            tags: self.tags.get(&recipe.id).cloned().unwrap_or_default(),
            author: UserView::new(author, self.subscribed.contains(&author.id)),
            ingredients: self
                .ingredients
                .get(&recipe.id)
                .cloned()
                .unwrap_or_default(),
            is_favorited: self.favorited.contains(&recipe.id),
            is_in_shopping_cart: self.in_cart.contains(&recipe.id),
            image: image_url(&self.media_url, recipe.image.as_deref()),
            name: recipe.name,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        })
    }
}

/// One `name (unit) - amount` line per item, a blank line, then the footer.
pub fn shopping_list_text(items: &[ShoppingListItem]) -> String {
    let mut lines: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "{} ({}) - {}",
                item.name, item.measurement_unit, item.total_amount
            )
        })
        .collect();
    lines.push(format!("\n{SHOPPING_LIST_FOOTER}"));
    lines.join("\n")
}

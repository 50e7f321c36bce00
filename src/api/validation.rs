use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    constants::{
        DEFAULT_TAG_COLOR, LEN_COLOR, LEN_EMAIL, LEN_NAME, LEN_USER_FIELD, RESERVED_USERNAMES,
    },
    error::FieldErrors,
    media::{decode_image, DecodedImage},
    schema::Id,
};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const INVALID_INTEGER: &str = "A valid integer is required.";

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern compiles"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern compiles"))
}

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color pattern compiles"))
}

/// Trimmed, non-blank and at most `max_len` characters.
fn text_field(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max_len: Option<usize>,
    required: bool,
) -> Option<String> {
    let value = match value {
        Some(value) => value.trim().to_string(),
        None => {
            if required {
                errors.add(field, REQUIRED);
            }
            return None;
        }
    };

    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }

    if let Some(max_len) = max_len {
        if value.chars().count() > max_len {
            errors.add(
                field,
                format!("Ensure this field has no more than {max_len} characters."),
            );
            return None;
        }
    }

    Some(value)
}

/// JSON numbers and numeric strings both count.
fn as_integer<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    let value = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    T::try_from(value).ok()
}

fn positive(errors: &mut FieldErrors, field: &str, value: i32) -> Option<i32> {
    if value <= 0 {
        errors.add(field, "Ensure this value is greater than or equal to 1.");
        return None;
    }
    Some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// Numeric fields stay raw JSON so a bad value is a field error.
#[derive(Debug, Default, Deserialize)]
pub struct RecipePayload {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<Value>,
    pub tags: Option<Value>,
    pub ingredients: Option<Value>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
    pub image: DecodedImage,
}

/// Fields of a partial update; `None` keeps the stored value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub image: Option<DecodedImage>,
}

impl RecipePayload {
    pub fn validate_create(self) -> Result<NewRecipe, FieldErrors> {
        let mut errors = FieldErrors::new();
        let changes = self.check(&mut errors, true);

        match changes {
            RecipeChanges {
                name: Some(name),
                text: Some(text),
                cooking_time: Some(cooking_time),
                tags: Some(tags),
                ingredients: Some(ingredients),
                image: Some(image),
            } if errors.is_empty() => Ok(NewRecipe {
                name,
                text,
                cooking_time,
                tags,
                ingredients,
                image,
            }),
            _ => Err(errors),
        }
    }

    pub fn validate_update(self) -> Result<RecipeChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        let changes = self.check(&mut errors, false);
        errors.check(changes)
    }

    fn check(self, errors: &mut FieldErrors, required: bool) -> RecipeChanges {
        let name = text_field(errors, "name", self.name, Some(LEN_NAME), required);
        let text = text_field(errors, "text", self.text, None, required);

        let cooking_time = match self.cooking_time {
            Some(value) => match as_integer(&value) {
                Some(value) => positive(errors, "cooking_time", value),
                None => {
                    errors.add("cooking_time", INVALID_INTEGER);
                    None
                }
            },
            None => {
                if required {
                    errors.add("cooking_time", REQUIRED);
                }
                None
            }
        };

        let tags = match self.tags {
            Some(tags) => check_tags(errors, tags),
            None => {
                if required {
                    errors.add("tags", REQUIRED);
                }
                None
            }
        };

        let ingredients = match self.ingredients {
            Some(ingredients) => read_ingredients(errors, ingredients)
                .and_then(|ingredients| check_ingredients(errors, ingredients)),
            None => {
                if required {
                    errors.add("ingredients", REQUIRED);
                }
                None
            }
        };

        let image = match self.image {
            Some(image) => match decode_image(&image) {
                Ok(image) => Some(image),
                Err(message) => {
                    errors.add("image", message);
                    None
                }
            },
            None => {
                if required {
                    errors.add("image", REQUIRED);
                }
                None
            }
        };

        RecipeChanges {
            name,
            text,
            cooking_time,
            tags,
            ingredients,
            image,
        }
    }
}

fn check_tags(errors: &mut FieldErrors, tags: Value) -> Option<Vec<Id>> {
    let Value::Array(items) = tags else {
        errors.add("tags", "Expected a list of items.");
        return None;
    };
    if items.is_empty() {
        errors.add("tags", "Select at least one tag.");
        return None;
    }

    let mut ids = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    for item in &items {
        match as_integer::<Id>(item) {
            Some(id) => {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            None => {
                errors.add("tags", format!("Incorrect type. Expected pk value, received {item}."));
                return None;
            }
        }
    }

    Some(ids)
}

/// Each item is an object with integer `id` and `amount`.
fn read_ingredients(
    errors: &mut FieldErrors,
    ingredients: Value,
) -> Option<Vec<IngredientAmount>> {
    let Value::Array(items) = ingredients else {
        errors.add("ingredients", "Expected a list of items.");
        return None;
    };

    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        let id = item.get("id").and_then(as_integer::<Id>);
        let amount = item.get("amount").and_then(as_integer::<i32>);
        match (id, amount) {
            (Some(id), Some(amount)) => parts.push(IngredientAmount { id, amount }),
            _ => {
                errors.add("ingredients", "Each ingredient needs an integer id and amount.");
                return None;
            }
        }
    }

    Some(parts)
}

fn check_ingredients(
    errors: &mut FieldErrors,
    ingredients: Vec<IngredientAmount>,
) -> Option<Vec<IngredientAmount>> {
    if ingredients.is_empty() {
        errors.add("ingredients", "Add at least one ingredient.");
        return None;
    }

    let mut valid = true;
    let mut seen = HashSet::new();
    for part in &ingredients {
        if !seen.insert(part.id) {
            errors.add(
                "ingredients",
                format!("Ingredient {} is listed more than once.", part.id),
            );
            valid = false;
        }
        if part.amount <= 0 {
            errors.add(
                "ingredients",
                format!("Amount of ingredient {} must be at least 1.", part.id),
            );
            valid = false;
        }
    }

    valid.then_some(ingredients)
}

#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl UserPayload {
    pub fn validate(self) -> Result<NewUser, FieldErrors> {
        let mut errors = FieldErrors::new();

        let email = text_field(&mut errors, "email", self.email, Some(LEN_EMAIL), true)
            .filter(|email| {
                let valid = email_pattern().is_match(email);
                if !valid {
                    errors.add("email", "Enter a valid email address.");
                }
                valid
            });

        let username = text_field(
            &mut errors,
            "username",
            self.username,
            Some(LEN_USER_FIELD),
            true,
        )
        .filter(|username| {
            if !username_pattern().is_match(username) {
                errors.add(
                    "username",
                    "Username may contain only letters, digits and @/./+/-/_ characters.",
                );
                return false;
            }
            if RESERVED_USERNAMES.contains(&username.as_str()) {
                errors.add("username", "This username is reserved.");
                return false;
            }
            true
        });

        let first_name = text_field(
            &mut errors,
            "first_name",
            self.first_name,
            Some(LEN_USER_FIELD),
            true,
        );
        let last_name = text_field(
            &mut errors,
            "last_name",
            self.last_name,
            Some(LEN_USER_FIELD),
            true,
        );
        let password = password_field(&mut errors, "password", self.password);

        match (email, username, first_name, last_name, password) {
            (Some(email), Some(username), Some(first_name), Some(last_name), Some(password))
                if errors.is_empty() =>
            {
                Ok(NewUser {
                    email,
                    username,
                    first_name,
                    last_name,
                    password,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Passwords are not trimmed.
fn password_field(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        Some(value) if value.is_empty() => {
            errors.add(field, BLANK);
            None
        }
        Some(value) => Some(value),
        None => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordPayload {
    pub new_password: Option<String>,
    pub current_password: Option<String>,
}

impl PasswordPayload {
    /// `(current_password, new_password)`
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let current = password_field(&mut errors, "current_password", self.current_password);
        let new = password_field(&mut errors, "new_password", self.new_password);

        match (current, new) {
            (Some(current), Some(new)) if errors.is_empty() => Ok((current, new)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginPayload {
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = text_field(&mut errors, "email", self.email, Some(LEN_EMAIL), true);
        let password = password_field(&mut errors, "password", self.password);

        match (email, password) {
            (Some(email), Some(password)) if errors.is_empty() => Ok((email, password)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TagPayload {
    pub name: Option<String>,
    pub color: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagPayload {
    pub fn validate(self) -> Result<NewTag, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = text_field(&mut errors, "name", self.name, Some(LEN_NAME), true);
        let color = text_field(&mut errors, "color", self.color, Some(LEN_COLOR), false)
            .or_else(|| (!errors.contains("color")).then(|| DEFAULT_TAG_COLOR.to_string()))
            .filter(|color| {
                let valid = color_pattern().is_match(color);
                if !valid {
                    errors.add("color", "Enter a color in #RRGGBB form.");
                }
                valid
            })
            .map(|color| color.to_uppercase());
        let slug = text_field(&mut errors, "slug", self.slug, Some(LEN_NAME), true).filter(|slug| {
            let valid = slug_pattern().is_match(slug);
            if !valid {
                errors.add(
                    "slug",
                    "Enter a valid slug of letters, numbers, underscores or hyphens.",
                );
            }
            valid
        });

        match (name, color, slug) {
            (Some(name), Some(color), Some(slug)) if errors.is_empty() => {
                Ok(NewTag { name, color, slug })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IngredientPayload {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

impl IngredientPayload {
    pub fn validate(self) -> Result<NewIngredient, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = text_field(&mut errors, "name", self.name, Some(LEN_NAME), true);
        let measurement_unit = text_field(
            &mut errors,
            "measurement_unit",
            self.measurement_unit,
            Some(LEN_NAME),
            true,
        );

        match (name, measurement_unit) {
            (Some(name), Some(measurement_unit)) if errors.is_empty() => Ok(NewIngredient {
                name,
                measurement_unit,
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn recipe() -> RecipePayload {
        serde_json::from_value(json!({
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": 20,
            "tags": [1, 2],
            "ingredients": [{"id": 10, "amount": 200}, {"id": 11, "amount": 2}],
            "image": IMAGE,
        }))
        .unwrap()
    }

    #[test]
    fn complete_recipe_passes() {
        let recipe = recipe().validate_create().unwrap();
        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.image.extension, "png");
    }

    #[test]
    fn cooking_time_must_be_positive() {
        for value in [0, -5] {
            let errors = RecipePayload {
                cooking_time: Some(json!(value)),
                ..recipe()
            }
            .validate_create()
            .unwrap_err();
            assert!(errors.contains("cooking_time"));
        }
    }

    #[test]
    fn amounts_must_be_positive() {
        let errors = RecipePayload {
            ingredients: Some(json!([{"id": 10, "amount": 0}])),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert!(errors.contains("ingredients"));
    }

    #[test]
    fn duplicate_ingredients_are_rejected() {
        let errors = RecipePayload {
            ingredients: Some(json!([{"id": 10, "amount": 1}, {"id": 10, "amount": 3}])),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert_eq!(errors.messages("ingredients").len(), 1);
    }

    #[test]
    fn empty_lists_are_rejected() {
        let errors = RecipePayload {
            tags: Some(json!([])),
            ingredients: Some(json!([])),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert!(errors.contains("tags"));
        assert!(errors.contains("ingredients"));
    }

    #[test]
    fn duplicate_tags_collapse() {
        let recipe = RecipePayload {
            tags: Some(json!([3, 1, 3])),
            ..recipe()
        }
        .validate_create()
        .unwrap();
        assert_eq!(recipe.tags, vec![3, 1]);
    }

    #[test]
    fn create_lists_every_missing_field() {
        let errors = RecipePayload::default().validate_create().unwrap_err();
        for field in ["name", "text", "cooking_time", "tags", "ingredients", "image"] {
            assert_eq!(errors.messages(field), [REQUIRED]);
        }
    }

    #[test]
    fn blank_text_is_rejected() {
        let errors = RecipePayload {
            name: Some(String::from("   ")),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert_eq!(errors.messages("name"), [BLANK]);
    }

    #[test]
    fn long_name_is_rejected() {
        let errors = RecipePayload {
            name: Some("x".repeat(LEN_NAME + 1)),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert!(errors.contains("name"));
    }

    #[test]
    fn update_is_partial() {
        let changes = RecipePayload {
            cooking_time: Some(json!(5)),
            ..RecipePayload::default()
        }
        .validate_update()
        .unwrap();
        assert_eq!(changes.cooking_time, Some(5));
        assert_eq!(changes.name, None);
        assert_eq!(changes.ingredients, None);

        let errors = RecipePayload {
            cooking_time: Some(json!(0)),
            ..RecipePayload::default()
        }
        .validate_update()
        .unwrap_err();
        assert!(errors.contains("cooking_time"));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let payload: RecipePayload = serde_json::from_value(json!({
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": "20",
            "tags": ["1", 2],
            "ingredients": [{"id": "10", "amount": "200"}],
            "image": IMAGE,
        }))
        .unwrap();
        let recipe = payload.validate_create().unwrap();
        assert_eq!(recipe.cooking_time, 20);
        assert_eq!(recipe.tags, vec![1, 2]);
        assert_eq!(recipe.ingredients, vec![IngredientAmount { id: 10, amount: 200 }]);
    }

    #[test]
    fn non_numeric_values_are_field_errors() {
        let payload: RecipePayload = serde_json::from_value(json!({
            "name": "Pancakes",
            "cooking_time": "abc",
            "tags": ["lunch"],
            "ingredients": [{"id": 10, "amount": "a lot"}],
        }))
        .unwrap();
        let errors = payload.validate_create().unwrap_err();
        assert_eq!(errors.messages("cooking_time"), [INVALID_INTEGER]);
        assert!(errors.contains("tags"));
        assert!(errors.contains("ingredients"));
        assert_eq!(errors.messages("image"), [REQUIRED]);

        let errors = RecipePayload {
            tags: Some(json!(1)),
            ingredients: Some(json!({"id": 10, "amount": 1})),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert_eq!(errors.messages("tags"), ["Expected a list of items."]);
        assert_eq!(errors.messages("ingredients"), ["Expected a list of items."]);
    }

    #[test]
    fn bad_image_is_a_field_error() {
        let errors = RecipePayload {
            image: Some(String::from("not an image")),
            ..recipe()
        }
        .validate_create()
        .unwrap_err();
        assert!(errors.contains("image"));
    }

    fn user() -> UserPayload {
        UserPayload {
            email: Some(String::from("cook@example.com")),
            username: Some(String::from("cook.42")),
            first_name: Some(String::from("Julia")),
            last_name: Some(String::from("Child")),
            password: Some(String::from("s3cret!")),
        }
    }

    #[test]
    fn valid_user_passes() {
        let user = user().validate().unwrap();
        assert_eq!(user.username, "cook.42");
    }

    #[test]
    fn username_pattern_and_reserved_names() {
        for username in ["me", "subscriptions", "with space", "semi;colon"] {
            let errors = UserPayload {
                username: Some(username.to_string()),
                ..user()
            }
            .validate()
            .unwrap_err();
            assert!(errors.contains("username"), "{username}");
        }
    }

    #[test]
    fn email_must_look_like_an_email() {
        let errors = UserPayload {
            email: Some(String::from("nobody")),
            ..user()
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.messages("email"), ["Enter a valid email address."]);
    }

    #[test]
    fn user_requires_all_fields() {
        let errors = UserPayload::default().validate().unwrap_err();
        for field in ["email", "username", "first_name", "last_name", "password"] {
            assert!(errors.contains(field), "{field}");
        }
    }

    #[test]
    fn tag_defaults_color_and_checks_slug() {
        let tag = TagPayload {
            name: Some(String::from("Breakfast")),
            color: None,
            slug: Some(String::from("breakfast")),
        }
        .validate()
        .unwrap();
        assert_eq!(tag.color, DEFAULT_TAG_COLOR);

        let errors = TagPayload {
            name: Some(String::from("Lunch")),
            color: Some(String::from("red")),
            slug: Some(String::from("lunch time")),
        }
        .validate()
        .unwrap_err();
        assert!(errors.contains("color"));
        assert!(errors.contains("slug"));
    }

    #[test]
    fn ingredient_requires_unit() {
        let errors = IngredientPayload {
            name: Some(String::from("flour")),
            measurement_unit: None,
        }
        .validate()
        .unwrap_err();
        assert!(errors.contains("measurement_unit"));
    }

    #[test]
    fn password_change_requires_both() {
        let errors = PasswordPayload {
            new_password: Some(String::from("new")),
            current_password: None,
        }
        .validate()
        .unwrap_err();
        assert!(errors.contains("current_password"));
    }
}

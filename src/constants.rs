pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const LEN_EMAIL: usize = 254;
pub const LEN_USER_FIELD: usize = 150;
pub const LEN_NAME: usize = 200;
pub const LEN_COLOR: usize = 7;

pub const DEFAULT_TAG_COLOR: &str = "#FF0000";

/// Usernames that would shadow `/users/<name>/` routes.
pub const RESERVED_USERNAMES: &[&str] = &["me", "set_password", "subscriptions", "subscribe"];

pub const RECIPE_IMAGE_DIR: &str = "recipes/images";
pub const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

pub const SHOPPING_LIST_FOOTER: &str = "FoodGram Service";

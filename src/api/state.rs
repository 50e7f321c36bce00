use std::{convert::Infallible, sync::Arc};

use sqlx::{Pool, Postgres};
use warp::Filter;

use crate::{
    config::{Config, ConfigError},
    jwt::SessionKey,
};

/// Shared by every request; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub config: Arc<Config>,
    pub session_key: SessionKey,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, config: Config) -> Result<Self, ConfigError> {
        let session_key = SessionKey::new(&config.secret_key, config.token_ttl_hours)?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            session_key,
        })
    }
}

pub fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PAGE_SIZE;

use super::{
    error::{ApiError, TypeError},
    form::Form,
};

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

/// `page` is 1-based; `limit` is clamped to `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn from_form(form: &Form, default_limit: i64) -> Result<Self, TypeError> {
        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        let limit = form.get_number::<i64>("limit")?.unwrap_or(default_limit);

        let request = Self::new(page, limit);

        // the row offset has to fit a Postgres BIGINT
        let offset = (request.page - 1).checked_mul(request.limit);
        if page < 1 || offset.is_none() {
            return Err(TypeError::new("page", "Invalid page."));
        }

        Ok(request)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl<T> PageContext<T> {
    /// Only the first page may be empty; later empty pages are invalid.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        request: &PageRequest,
    ) -> Result<Self, ApiError> {
        if rows.is_empty() {
            if request.page > 1 {
                return Err(ApiError::NotFound(String::from("Invalid page.")));
            }
            return Ok(Self::no_rows());
        }

        let page_count = (total_rows + request.limit - 1) / request.limit;
        let next = (request.page < page_count).then_some(request.page + 1);
        let previous = (request.page > 1).then_some((request.page - 1).min(page_count));

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }

    pub fn try_map<U, E, F>(self, f: F) -> Result<PageContext<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        Ok(PageContext {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}

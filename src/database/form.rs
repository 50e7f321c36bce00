use std::str::FromStr;

use super::error::TypeError;

/// Raw query-string pairs; keys may repeat (`?tags=a&tags=b`).
pub type FormData = Vec<(String, String)>;

pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(key, "A valid integer is required.")),
            None => Ok(None),
        }
    }

    pub fn get_flag(&self, key: &str) -> Result<bool, TypeError> {
        match self.get_str(key) {
            Some(value) => match value.to_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                _ => Err(TypeError::new(key, "Must be 1, 0, true or false.")),
            },
            None => Ok(false),
        }
    }
}

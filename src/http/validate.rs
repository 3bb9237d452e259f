//! Request-body validation. Every rule is checked and all failures are
//! reported together, joined with ", ".

use crate::error::AppError;

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Required string, trimmed, with a character-count range.
    pub fn required_len<'a>(
        &mut self,
        value: Option<&'a str>,
        field: &str,
        min: usize,
        max: usize,
    ) -> Option<&'a str> {
        let Some(value) = value.map(str::trim) else {
            self.errors.push(format!("{field} is required"));
            return None;
        };
        if self.len_in_range(value, field, min, max) { Some(value) } else { None }
    }

    /// Optional string: checked only when present.
    pub fn optional_len<'a>(&mut self, value: Option<&'a str>, field: &str, min: usize, max: usize) -> Option<&'a str> {
        let value = value.map(str::trim)?;
        if self.len_in_range(value, field, min, max) { Some(value) } else { None }
    }

    fn len_in_range(&mut self, value: &str, field: &str, min: usize, max: usize) -> bool {
        let n = value.chars().count();
        if n == 0 && min > 0 {
            self.errors.push(format!("{field} is required"));
            false
        } else if n < min {
            self.errors.push(format!("{field} must be at least {min} characters"));
            false
        } else if n > max {
            self.errors.push(format!("{field} must not exceed {max} characters"));
            false
        } else {
            true
        }
    }

    pub fn email<'a>(&mut self, value: Option<&'a str>) -> Option<&'a str> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            self.errors.push("Email is required".into());
            return None;
        };
        if is_email(value) {
            Some(value)
        } else {
            self.errors.push("Please enter a valid email".into());
            None
        }
    }

    /// Parse with `FromStr`, recording the parser's message on failure.
    pub fn parse<T>(&mut self, value: Option<&str>) -> Option<T>
    where
        T: std::str::FromStr<Err = AppError>,
    {
        match value?.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e.to_string());
                None
            }
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors.join(", ")))
        }
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2 && !tld.ends_with('.'))
}

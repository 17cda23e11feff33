use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldError};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// `page`, `limit`, `sortBy` and `sortOrder` query parameters shared by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// A validated page request with a sort column taken from an allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub sort_column: &'static str,
    pub descending: bool,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// `ORDER BY ... LIMIT ... OFFSET ...` built only from allow-listed parts.
    pub fn order_clause(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!(
            " ORDER BY {} {} LIMIT {} OFFSET {}",
            self.sort_column,
            direction,
            self.limit,
            self.offset()
        )
    }
}

impl PageQuery {
    /// `sortable` maps public field names to SQL columns; the first entry is the default.
    pub fn validate(&self, sortable: &[(&str, &'static str)]) -> Result<PageRequest, AppError> {
        let mut errors = Vec::new();

        let page = self.page.unwrap_or(1);
        if page < 1 {
            errors.push(FieldError::new("page", "page must be a positive integer"));
        }

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            errors.push(FieldError::new(
                "limit",
                format!("limit must be between 1 and {MAX_LIMIT}"),
            ));
        } else if page >= 1 && (page - 1).checked_mul(limit).is_none() {
            errors.push(FieldError::new("page", "page is out of range"));
        }

        let sort_column = match self.sort_by.as_deref() {
            None => sortable.first().map(|(_, column)| *column).unwrap_or("id"),
            Some(name) => match sortable.iter().find(|(field, _)| *field == name) {
                Some((_, column)) => *column,
                None => {
                    let allowed: Vec<&str> = sortable.iter().map(|(field, _)| *field).collect();
                    errors.push(FieldError::new(
                        "sortBy",
                        format!("sortBy must be one of: {}", allowed.join(", ")),
                    ));
                    "id"
                }
            },
        };

        let descending = match self.sort_order.as_deref().map(str::to_ascii_uppercase) {
            None => false,
            Some(order) if order == "ASC" => false,
            Some(order) if order == "DESC" => true,
            Some(_) => {
                errors.push(FieldError::new("sortOrder", "sortOrder must be ASC or DESC"));
                false
            }
        };

        AppError::check(errors)?;
        Ok(PageRequest {
            page,
            limit,
            sort_column,
            descending,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageMeta {
    pub fn new(request: &PageRequest, total: i64) -> Self {
        let total_pages = (total + request.limit - 1) / request.limit;
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages,
            has_next_page: request.page < total_pages,
            has_prev_page: request.page > 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

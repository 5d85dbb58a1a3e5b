//! Typed wrappers for individual resource families.
//!
//! Managers validate identifying arguments before any request is built and
//! shape payloads; everything else is delegated to [`crate::RetryResource`].

mod connections;
mod roles;
mod users;

pub use connections::{ConnectionQuery, ConnectionsManager};
pub use roles::{Permission, RolesManager};
pub use users::{UserQuery, UsersManager};

use crate::{IdmError, Params, Result, Value};

/// Paging, totals and field selection shared by list endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub include_totals: Option<bool>,
    /// Checkpoint cursor (use with `take`).
    pub from: Option<String>,
    pub take: Option<u32>,
    pub fields: Vec<String>,
    pub include_fields: Option<bool>,
}

impl PageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    pub fn include_totals(mut self, include_totals: bool) -> Self {
        self.include_totals = Some(include_totals);
        self
    }

    pub fn from_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.from = Some(cursor.into());
        self
    }

    pub fn take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    pub fn fields<I, S>(mut self, fields: I, include: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self.include_fields = Some(include);
        self
    }

    pub fn to_params(&self) -> Params {
        let fields = (!self.fields.is_empty()).then(|| Value::List(self.fields.clone()));
        Params::new()
            .with_opt("page", self.page)
            .with_opt("per_page", self.per_page)
            .with_opt("include_totals", self.include_totals)
            .with_opt("from", self.from.as_deref())
            .with_opt("take", self.take)
            .with_opt("fields", fields)
            .with_opt("include_fields", self.include_fields)
    }
}

/// Rejects empty or whitespace-only identifiers.
pub(crate) fn require_id<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(IdmError::Argument(format!("{what} cannot be empty")));
    }
    Ok(value)
}

/// Rejects empty lists and lists containing empty identifiers.
pub(crate) fn require_ids<S: AsRef<str>>(values: &[S], what: &str) -> Result<Vec<String>> {
    if values.is_empty() {
        return Err(IdmError::Argument(format!("{what} cannot be empty")));
    }
    values
        .iter()
        .map(|value| require_id(value.as_ref(), what).map(str::to_owned))
        .collect()
}

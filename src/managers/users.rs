use serde::Serialize;
use serde_json::json;

use super::{require_id, require_ids, PageQuery};
use crate::{resource::to_body, Entity, ManagementClient, Page, Params, Result, RetryResource};

/// Search and paging options for listing users.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserQuery {
    pub page: PageQuery,
    /// Lucene-style search query.
    pub q: Option<String>,
    /// `field:1` (ascending) or `field:-1` (descending).
    pub sort: Option<String>,
    pub search_engine: Option<String>,
}

impl UserQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn paged(mut self, page: PageQuery) -> Self {
        self.page = page;
        self
    }

    pub fn to_params(&self) -> Params {
        let mut params = self.page.to_params();
        for (name, value) in [
            ("q", &self.q),
            ("sort", &self.sort),
            ("search_engine", &self.search_engine),
        ] {
            if let Some(value) = value {
                params.insert(name, value);
            }
        }
        params
    }
}

/// Users and their role assignments.
#[derive(Clone, Debug)]
pub struct UsersManager {
    users: RetryResource,
    by_email: RetryResource,
    roles: RetryResource,
}

impl UsersManager {
    pub(crate) fn new(client: &ManagementClient) -> Self {
        Self {
            users: client.retrying(client.resource("/users/:id").with_items_key("users")),
            by_email: client.retrying(client.resource("/users-by-email")),
            roles: client.retrying(
                client
                    .resource("/users/:id/roles")
                    .require("id")
                    .with_items_key("roles"),
            ),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Entity> {
        let id = require_id(id, "user id")?;
        self.users.get(Params::new().with("id", id)).await
    }

    pub async fn get_all(&self, query: &UserQuery) -> Result<Page> {
        self.users.get_all(query.to_params()).await
    }

    /// Returns every user whose email matches exactly.
    pub async fn get_by_email(&self, email: &str) -> Result<Vec<Entity>> {
        let email = require_id(email, "email")?;
        let page = self.by_email.get_all(Params::new().with("email", email)).await?;
        Ok(page.items)
    }

    pub async fn create<B>(&self, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        self.users.create(Params::new(), data).await
    }

    pub async fn update<B>(&self, id: &str, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let id = require_id(id, "user id")?;
        self.users.update(Params::new().with("id", id), data).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = require_id(id, "user id")?;
        self.users.delete(Params::new().with("id", id)).await
    }

    /// Patches `user_metadata`; keys not present in `metadata` are kept.
    pub async fn update_user_metadata<B>(&self, id: &str, metadata: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let body = json!({ "user_metadata": to_body(metadata)? });
        self.update(id, &body).await
    }

    /// Patches `app_metadata`; keys not present in `metadata` are kept.
    pub async fn update_app_metadata<B>(&self, id: &str, metadata: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let body = json!({ "app_metadata": to_body(metadata)? });
        self.update(id, &body).await
    }

    pub async fn get_roles(&self, id: &str, query: &PageQuery) -> Result<Page> {
        let id = require_id(id, "user id")?;
        let mut params = query.to_params();
        params.insert("id", id);
        self.roles.get_all(params).await
    }

    pub async fn assign_roles<S: AsRef<str>>(&self, id: &str, role_ids: &[S]) -> Result<()> {
        let id = require_id(id, "user id")?;
        let roles = require_ids(role_ids, "role ids")?;
        self.roles
            .create(Params::new().with("id", id), &json!({ "roles": roles }))
            .await?;
        Ok(())
    }

    pub async fn remove_roles<S: AsRef<str>>(&self, id: &str, role_ids: &[S]) -> Result<()> {
        let id = require_id(id, "user id")?;
        let roles = require_ids(role_ids, "role ids")?;
        self.roles
            .delete_with_body(Params::new().with("id", id), &json!({ "roles": roles }))
            .await
    }
}

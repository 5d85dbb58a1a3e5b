use serde::Serialize;

use super::{require_id, PageQuery};
use crate::{Entity, ManagementClient, Page, Params, Result, RetryResource, Value};

/// Filters for listing connections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionQuery {
    pub page: PageQuery,
    /// Only connections using one of these strategies.
    pub strategy: Vec<String>,
    pub name: Option<String>,
}

impl ConnectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategies<I, S>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategy = strategies.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn to_params(&self) -> Params {
        let strategy = (!self.strategy.is_empty()).then(|| Value::List(self.strategy.clone()));
        self.page
            .to_params()
            .with_opt("strategy", strategy)
            .with_opt("name", self.name.as_deref())
    }
}

/// Identity provider connections.
///
/// List filters are sent as repeated query keys (`strategy=a&strategy=b`).
#[derive(Clone, Debug)]
pub struct ConnectionsManager {
    connections: RetryResource,
    users: RetryResource,
}

impl ConnectionsManager {
    pub(crate) fn new(client: &ManagementClient) -> Self {
        Self {
            connections: client.retrying(
                client
                    .resource("/connections/:id")
                    .with_items_key("connections")
                    .with_repeat_params(true),
            ),
            users: client.retrying(client.resource("/connections/:id/users").require("id")),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Entity> {
        let id = require_id(id, "connection id")?;
        self.connections.get(Params::new().with("id", id)).await
    }

    pub async fn get_all(&self, query: &ConnectionQuery) -> Result<Page> {
        self.connections.get_all(query.to_params()).await
    }

    pub async fn create<B>(&self, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        self.connections.create(Params::new(), data).await
    }

    pub async fn update<B>(&self, id: &str, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let id = require_id(id, "connection id")?;
        self.connections
            .update(Params::new().with("id", id), data)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = require_id(id, "connection id")?;
        self.connections.delete(Params::new().with("id", id)).await
    }

    /// Removes a database-connection user identified by email.
    pub async fn delete_user_by_email(&self, id: &str, email: &str) -> Result<()> {
        let id = require_id(id, "connection id")?;
        let email = require_id(email, "email")?;
        self.users
            .delete(Params::new().with("id", id).with("email", email))
            .await
    }
}

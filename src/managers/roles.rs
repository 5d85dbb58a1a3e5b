use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{require_id, PageQuery};
use crate::{Entity, IdmError, ManagementClient, Page, Params, Result, RetryResource};

/// A permission granted by an API (resource server).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource_server_identifier: String,
    pub permission_name: String,
}

impl Permission {
    pub fn new(
        resource_server_identifier: impl Into<String>,
        permission_name: impl Into<String>,
    ) -> Self {
        Self {
            resource_server_identifier: resource_server_identifier.into(),
            permission_name: permission_name.into(),
        }
    }
}

/// Roles, their permissions and their members.
#[derive(Clone, Debug)]
pub struct RolesManager {
    roles: RetryResource,
    permissions: RetryResource,
    users: RetryResource,
}

impl RolesManager {
    pub(crate) fn new(client: &ManagementClient) -> Self {
        Self {
            roles: client.retrying(client.resource("/roles/:id").with_items_key("roles")),
            permissions: client.retrying(
                client
                    .resource("/roles/:id/permissions")
                    .require("id")
                    .with_items_key("permissions"),
            ),
            users: client.retrying(
                client
                    .resource("/roles/:id/users")
                    .require("id")
                    .with_items_key("users"),
            ),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Entity> {
        let id = require_id(id, "role id")?;
        self.roles.get(Params::new().with("id", id)).await
    }

    pub async fn get_all(&self, query: &PageQuery) -> Result<Page> {
        self.roles.get_all(query.to_params()).await
    }

    pub async fn create<B>(&self, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        self.roles.create(Params::new(), data).await
    }

    pub async fn update<B>(&self, id: &str, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let id = require_id(id, "role id")?;
        self.roles.update(Params::new().with("id", id), data).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = require_id(id, "role id")?;
        self.roles.delete(Params::new().with("id", id)).await
    }

    pub async fn get_permissions(&self, id: &str, query: &PageQuery) -> Result<Page> {
        let id = require_id(id, "role id")?;
        let mut params = query.to_params();
        params.insert("id", id);
        self.permissions.get_all(params).await
    }

    pub async fn add_permissions(&self, id: &str, permissions: &[Permission]) -> Result<()> {
        let id = require_id(id, "role id")?;
        validate_permissions(permissions)?;
        self.permissions
            .create(
                Params::new().with("id", id),
                &json!({ "permissions": permissions }),
            )
            .await?;
        Ok(())
    }

    pub async fn remove_permissions(&self, id: &str, permissions: &[Permission]) -> Result<()> {
        let id = require_id(id, "role id")?;
        validate_permissions(permissions)?;
        self.permissions
            .delete_with_body(
                Params::new().with("id", id),
                &json!({ "permissions": permissions }),
            )
            .await
    }

    pub async fn get_users(&self, id: &str, query: &PageQuery) -> Result<Page> {
        let id = require_id(id, "role id")?;
        let mut params = query.to_params();
        params.insert("id", id);
        self.users.get_all(params).await
    }
}

fn validate_permissions(permissions: &[Permission]) -> Result<()> {
    if permissions.is_empty() {
        return Err(IdmError::Argument("permissions cannot be empty".to_owned()));
    }
    for permission in permissions {
        require_id(&permission.resource_server_identifier, "resource server identifier")?;
        require_id(&permission.permission_name, "permission name")?;
    }
    Ok(())
}

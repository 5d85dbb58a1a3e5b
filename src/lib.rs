//! `idm-rest` is an async client for identity-management REST APIs.
//!
//! The core is a generic resource layer:
//! - [`PathTemplate`] fills `:name` placeholders from [`Params`]
//! - [`Resource`] issues `create` / `get` / `get_all` / `update` / `delete`
//!   as single HTTP requests
//! - [`RetryResource`] re-attempts transient failures under a [`RetryPolicy`]
//!
//! [`ManagementClient`] ties them to one base URL and credential, and exposes
//! typed managers for users, roles and connections.

mod auth;
mod client;
mod error;
pub mod managers;
mod options;
mod params;
mod resource;
mod retry;
mod template;
mod types;
mod value;
mod wire;

pub use auth::{Credentials, TokenFuture, TokenProvider};
pub use client::{domain_to_base_url, ManagementClient};
pub use error::IdmError;
pub use options::ClientOptions;
pub use params::Params;
pub use resource::{RequestDescriptor, Resource};
pub use retry::{RetryCondition, RetryPolicy, RetryResource};
pub use template::PathTemplate;
pub use types::{Entity, Page};
pub use value::Value;

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, IdmError>;

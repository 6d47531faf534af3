//! Role and permission management for the delivery service.
//!
//! The [`RoleClient`] trait abstracts the identity service; [`IamRoleClient`]
//! is the AWS IAM binding. Policy documents are built in [`policy`].

mod iam;
pub mod policy;
mod types;

pub use iam::IamRoleClient;
pub use types::*;

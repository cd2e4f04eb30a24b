use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Permission entity: represents a granular permission that can be assigned to roles.
///
/// Permissions are identified by their unique `name` (e.g., `"publish"`).
/// They are granted to roles via the `role_permissions` junction table and
/// required by endpoints via `endpoint_permissions`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::role_permission::Entity")]
    RolePermissions,
    #[sea_orm(has_many = "super::endpoint_permission::Entity")]
    EndpointPermissions,
}

impl Related<super::role_permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RolePermissions.def()
    }
}

impl Related<super::endpoint_permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EndpointPermissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

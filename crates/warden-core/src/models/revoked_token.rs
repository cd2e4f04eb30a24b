use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Revocation record for a signed token, keyed by its `jti`.
///
/// Rows only matter until `expires_at`; after that, validation rejects the
/// token on expiry alone and the row can be purged. `user_id` records who
/// held the token and may name a user that has since been deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "revoked_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub jti: String,

    /// "access", "refresh" or "reset"
    pub token_type: String,

    pub user_id: i32,

    pub revoked_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

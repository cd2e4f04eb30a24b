pub mod endpoint_permission;
pub mod permission;
pub mod revoked_token;
pub mod role;
pub mod role_permission;
pub mod user;
pub mod user_role;

pub use user::UserResponse;

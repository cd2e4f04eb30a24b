pub mod credentials;
pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod rbac;
pub mod reset;
pub mod tokens;

pub use credentials::{CredentialService, NewAccount, UserUpdate};
pub use guard::{Authorizer, Principal, bearer_token};
pub use jwt::{Claims, TokenKind};
pub use password::{hash_password, verify_password};
pub use rbac::{AuthorizationDecision, DecisionReason, NewGrantable, RbacService};
pub use reset::PasswordResetFlow;
pub use tokens::{TokenError, TokenPair, TokenService};

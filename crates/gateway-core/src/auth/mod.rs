//! Authentication, authorization, RBAC expansion and downstream token minting
//! (§2 component 6, §4.3).

pub mod apikey;
pub mod credential;
pub mod evaluator;
pub mod jwt;
pub mod mint;
pub mod rbac;
pub mod session;

pub use apikey::ApiKeyTokenValidator;
pub use credential::{extract_credential, Credential};
pub use evaluator::{AuthEvaluator, AuthResult};
pub use jwt::JwtTokenValidator;
pub use mint::DownstreamTokenMinter;
pub use rbac::PermissionExpander;
pub use session::SessionTokenValidator;

//! Authentication
//!
//! - **Principal**: the person or kit a credential resolves to
//! - **Token**: JWT verification and issuing

mod principal;
mod token;

pub use principal::{KitId, Principal};
pub use token::{AuthError, Claims, JwtAuth, TokenVerifier};

//! Identity primitives: bearer tokens and password hashing.
//!
//! - [`token`]: HS256 bearer tokens behind the [`TokenIssuer`] seam.
//! - [`password`]: Argon2id hashing for voice-phrase passwords.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, JwtTokenService, TokenIssuer};

//! Authentication for Calma
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;

pub use jwt::{
    extract_token_from_header, extract_token_from_url, Claims, JwtValidator, TokenInput,
    TokenValidationResult,
};
pub use password::{check_password_rules, hash_password, verify_password};

pub mod hashing;
pub mod password;
pub mod validation;

pub use hashing::{digests_match, generate_numeric_code, generate_refresh_token, hash_token};
pub use password::{
    hash_password, verify_password, Password, PasswordHashString, MIN_PASSWORD_LENGTH,
};
pub use validation::{validate_otp_code, validate_target, ValidatedJson};

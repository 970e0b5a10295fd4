pub mod token;
pub mod validation;

pub use token::{extract_token, hash_token, TokenError};
pub use validation::ValidatedJson;

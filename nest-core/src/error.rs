use nest_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the app services.
#[derive(Debug, Error)]
pub enum NestError {
    /// Unknown account or wrong password
    #[error("Invalid user name or password")]
    InvalidCredentials,

    /// Code is not one of the two members
    #[error("Unknown member code: {0}")]
    UnknownUser(String),

    /// Shared secret does not match
    #[error("Secret code is incorrect")]
    WrongSecret,

    /// Operation needs a signed-in member
    #[error("Not signed in")]
    NotSignedIn,

    /// Required text was empty or whitespace
    #[error("Text must not be empty")]
    EmptyText,

    /// Date is not `YYYY-MM-DD`
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// No list item with this id
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

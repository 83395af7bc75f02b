use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Display name must not be empty")]
    EmptyDisplayName,

    #[error("Display name too long: {len} characters (max {max})")]
    DisplayNameTooLong { len: usize, max: usize },
}

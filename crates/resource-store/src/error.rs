//! Object store errors

use thiserror::Error;

/// Errors returned by a [`ResourceStore`](crate::ResourceStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object with the same name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object is unusable for the requested operation (e.g. missing name)
    #[error("Invalid object: {0}")]
    Invalid(String),

    /// Object could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes API failure
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),
}

impl StoreError {
    /// True for [`StoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 409 => Self::AlreadyExists(ae.message.clone()),
            other => Self::Kube(other),
        }
    }
}

/// Turns `NotFound` into `Ok(None)`, leaving other errors untouched.
pub trait IgnoreNotFound<T> {
    /// Maps a `NotFound` error to `Ok(None)` and a value to `Ok(Some(value))`.
    ///
    /// # Errors
    ///
    /// Any error other than `NotFound` is returned unchanged.
    fn ignore_not_found(self) -> Result<Option<T>, StoreError>;
}

impl<T> IgnoreNotFound<T> for Result<T, StoreError> {
    fn ignore_not_found(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_not_found() {
        let found: Result<u8, StoreError> = Ok(1);
        let missing: Result<u8, StoreError> = Err(StoreError::NotFound("machines/a".to_string()));
        let invalid: Result<u8, StoreError> = Err(StoreError::Invalid("no name".to_string()));

        assert_eq!(found.ignore_not_found().unwrap(), Some(1));
        assert_eq!(missing.ignore_not_found().unwrap(), None);
        assert!(matches!(invalid.ignore_not_found(), Err(StoreError::Invalid(_))));
    }
}

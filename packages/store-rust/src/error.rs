use dsorm_core::{KeyId, MapperError};

/// Errors surfaced by [`EntityStore`](crate::EntityStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} with id {id} does not exist")]
    ObjectDoesNotExist { kind: String, id: KeyId },

    #[error(transparent)]
    Mapping(#[from] MapperError),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

//! Error type for the in-memory backend.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("profile not found: {0}")]
  ProfileNotFound(Uuid),

  #[error("a profile already exists for {0}")]
  DuplicateProfile(String),

  #[error("batch of {requested} documents exceeds the store limit of {limit}")]
  BatchTooLarge { requested: usize, limit: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

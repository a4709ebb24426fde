use thiserror::Error;

use crate::model::{KitError, ParseIdError, ProgressDecodeError, UnknownModality};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Kit(#[from] KitError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
    #[error(transparent)]
    Modality(#[from] UnknownModality),
    #[error(transparent)]
    Progress(#[from] ProgressDecodeError),
}

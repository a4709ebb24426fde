mod ids;
mod kit;
mod modality;
pub mod progress;
mod reactivo;

pub use ids::{ExerciseId, KitId, ParseIdError, ReactivoId, SubtypeId};

pub use kit::{Exercise, Kit, KitError};
pub use modality::{Modality, UnknownModality};
pub use progress::{ProgressDecodeError, ProgressKey, ProgressMap, clamp_done};
pub use reactivo::{MetaMap, Reactivo, ReactivoDetail, ReactivoListing, ResolvedMeta};

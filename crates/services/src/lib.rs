#![forbid(unsafe_code)]

pub mod error;
pub mod kit_board;
pub mod progress_store;

pub use error::BoardError;
pub use kit_board::{BoardHandle, KitBoard, KitBoardService};
pub use progress_store::{DEFAULT_PROGRESS_KEY, ProgressStore};

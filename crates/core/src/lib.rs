#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod progression;

pub use error::Error;

pub mod config;
pub mod credentials;
pub mod error;
pub mod keyfile;

pub use error::{SnapvaultError, SnapvaultResult};

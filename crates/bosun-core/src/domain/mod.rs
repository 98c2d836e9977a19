//! Domain model: requests, results, and the error taxonomy.

pub mod error;
pub mod request;
pub mod result;

pub use error::{BuildError, Result};
pub use request::{BuildArgs, BuildRequest, EnvVar};
pub use result::{BuildResult, ResultCode};

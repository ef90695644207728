//! Convenience re-exports of the types most callers need.
//!
//! ```
//! use quipu::prelude::*;
//! ```

pub use crate::config::Config;
pub use crate::document::{Header, Meta};
pub use crate::error::{Error, Result};
pub use crate::params::{ParamValue, Params};
pub use crate::registry::{PublishOptions, Registry};
pub use crate::repository::Repository;
pub use crate::uid::UidKind;

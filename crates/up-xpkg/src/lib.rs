pub mod backend;
pub mod build;
pub mod dep;
pub mod error;
pub mod layer;
pub mod lint;
pub mod metafile;
pub mod object;
pub mod parser;

pub use error::{XpkgError, XpkgResult};

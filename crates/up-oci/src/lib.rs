pub mod error;
pub mod http_client;
pub mod image;
pub mod layer;
pub mod reference;
pub mod registry;
pub mod tarball;
pub mod types;

pub use error::{OciError, Result};
pub use image::Image;
pub use layer::Layer;
pub use reference::ImageReference;

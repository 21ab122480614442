pub mod image;
pub mod weigh_in;

pub use image::{CapturedImage, ImageOrigin, ImageSummary};
pub use weigh_in::{WeighInResult, WeighInSource};

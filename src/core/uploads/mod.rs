//! Image uploads
//!
//! Cover images for posts are stored on Cloudinary.

pub mod cloudinary;

pub use cloudinary::{CloudinaryClient, ImageUpload, MAX_IMAGE_BYTES, UploadError, UploadedImage};

//! Outbound integrations: media hosting, AI captioning and web push delivery.

pub mod caption;
pub mod cloudinary;
pub mod host;
pub mod inference;
pub mod local;
pub mod push;

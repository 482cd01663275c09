//! Protocol value objects carried by every request and response envelope

pub mod extension;
pub mod format;
pub mod result;
pub mod routing;
pub mod signature;

mod types;

pub mod sse;
pub mod stub;

#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "huggingface")]
pub mod huggingface;

#[cfg(test)]
pub mod fixture;
#[cfg(test)]
pub mod scripted;

pub use types::*;

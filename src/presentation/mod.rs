//! The presentation entity and its persistence lifecycle.

pub mod codec;
pub mod entity;
pub mod key;
pub mod repository;

pub use codec::PRESENTATION_TYPE;
pub use entity::{Lifecycle, Presentation};
pub use key::{KEY_PREFIX, WriteTarget, derive_key, resolve_write_target};
pub use repository::{PresentationRepository, PresentationStream};

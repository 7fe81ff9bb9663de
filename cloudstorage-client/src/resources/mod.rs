//! Typed accessors for the sub-resources of the storage API.
//!
//! Obtain them from a [`Client`](crate::Client), e.g. [`Client::objects`](crate::Client::objects).

mod access_controls;
mod buckets;
mod channels;
mod objects;

pub use access_controls::{BucketAccessControls, DefaultObjectAccessControls};
pub use buckets::Buckets;
pub use channels::Channels;
pub use objects::{ListObjects, Objects};

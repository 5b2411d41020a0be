//! External service integrations.

pub mod lookup_client {
    pub use crate::lookup_client::*;
}

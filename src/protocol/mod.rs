//! Postgres wire protocol (v3) subset
//!
//! Only what a text-format simple query session needs: startup, authentication,
//! simple query, and the backend messages those produce.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription, FrontendMessage};

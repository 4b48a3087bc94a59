//! Conversation adapter
//!
//! Translates stored turns into the shape expected by the generator and
//! resolves role labels coming from untrusted callers.

mod adapter;

pub use adapter::{role_from_untrusted, to_provider_format, ProviderMessage, Speaker};

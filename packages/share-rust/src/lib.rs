//! RPC share: hierarchical request context with lockable tags and metadata.

pub mod base;
pub mod context;
pub mod error;
pub mod key;
pub mod types;

pub use base::{background, BaseContext, Background, CancelContext, DeadlineContext, ValueContext};
pub use context::{
    is_share_context, new_context, with_local_value, with_value, Context, ContextGuard,
};
pub use error::ContextError;
pub use key::{IntoTagKey, ReservedKey, TagKey, TypedKey};
pub use types::{MetaData, TagValue, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}

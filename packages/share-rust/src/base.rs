//! Immutable parent contexts.
//!
//! A [`BaseContext`] provides key lookup, an optional deadline, and an
//! optional cancellation signal. Implementations here are immutable once
//! built, so lookups through them need no locking.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;
use crate::key::{IntoTagKey, TagKey};
use crate::types::TagValue;

/// Capability shared by every context in a chain.
pub trait BaseContext: Send + Sync + fmt::Debug {
    /// Looks up `key`, walking toward the root of the chain.
    fn value(&self, key: &TagKey) -> Option<TagValue>;

    /// Absolute deadline for work done under this context, if any.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Cancellation signal for work done under this context, if any.
    fn cancellation(&self) -> Option<CancellationToken> {
        None
    }

    /// Returns `true` once the cancellation signal has fired.
    fn is_cancelled(&self) -> bool {
        self.cancellation().is_some_and(|token| token.is_cancelled())
    }
}

/// Returns an empty root context.
#[must_use]
pub fn background() -> Arc<dyn BaseContext> {
    Arc::new(Background)
}

/// Root context: no values, no deadline, never cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Background;

impl BaseContext for Background {
    fn value(&self, _key: &TagKey) -> Option<TagValue> {
        None
    }
}

/// Immutable single key/value link on top of a parent.
#[derive(Debug)]
pub struct ValueContext {
    parent: Arc<dyn BaseContext>,
    key: TagKey,
    val: TagValue,
}

impl ValueContext {
    /// # Errors
    ///
    /// Returns an invalid-argument [`ContextError`] if `key` is absent or not
    /// comparable.
    pub fn new(
        parent: Arc<dyn BaseContext>,
        key: impl IntoTagKey,
        val: impl Into<TagValue>,
    ) -> Result<Self, ContextError> {
        Ok(Self {
            parent,
            key: key.into_tag_key()?,
            val: val.into(),
        })
    }
}

impl BaseContext for ValueContext {
    fn value(&self, key: &TagKey) -> Option<TagValue> {
        if *key == self.key {
            return Some(self.val.clone());
        }
        self.parent.value(key)
    }

    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }

    fn cancellation(&self) -> Option<CancellationToken> {
        self.parent.cancellation()
    }
}

/// Context with its own cancellation signal, linked to the parent's.
///
/// Cancelling the parent cancels this context; cancelling this context
/// leaves the parent untouched.
#[derive(Debug)]
pub struct CancelContext {
    parent: Arc<dyn BaseContext>,
    token: CancellationToken,
}

impl CancelContext {
    #[must_use]
    pub fn new(parent: Arc<dyn BaseContext>) -> Self {
        let token = parent
            .cancellation()
            .map_or_else(CancellationToken::new, |t| t.child_token());
        Self { parent, token }
    }

    /// Fires the cancellation signal for this context and its descendants.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl BaseContext for CancelContext {
    fn value(&self, key: &TagKey) -> Option<TagValue> {
        self.parent.value(key)
    }

    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }

    fn cancellation(&self) -> Option<CancellationToken> {
        Some(self.token.clone())
    }
}

/// Context carrying an absolute deadline.
///
/// The effective deadline is the earlier of this one and the parent's. The
/// deadline is reported, not enforced; callers bound their work with
/// `tokio::time::timeout_at`.
#[derive(Debug)]
pub struct DeadlineContext {
    parent: Arc<dyn BaseContext>,
    deadline: Instant,
}

impl DeadlineContext {
    #[must_use]
    pub fn new(parent: Arc<dyn BaseContext>, deadline: Instant) -> Self {
        Self { parent, deadline }
    }
}

impl BaseContext for DeadlineContext {
    fn value(&self, key: &TagKey) -> Option<TagValue> {
        self.parent.value(key)
    }

    fn deadline(&self) -> Option<Instant> {
        Some(match self.parent.deadline() {
            Some(parent) => parent.min(self.deadline),
            None => self.deadline,
        })
    }

    fn cancellation(&self) -> Option<CancellationToken> {
        self.parent.cancellation()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::Value;

    #[test]
    fn background_is_empty() {
        let ctx = background();
        assert!(ctx.value(&TagKey::from("k")).is_none());
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn value_context_shadows_and_falls_through() {
        let outer: Arc<dyn BaseContext> =
            Arc::new(ValueContext::new(background(), "a", "outer").unwrap());
        let inner = ValueContext::new(Arc::clone(&outer), "b", 2i64).unwrap();

        assert_eq!(inner.value(&"a".into()), Some(TagValue::from("outer")));
        assert_eq!(inner.value(&"b".into()), Some(TagValue::Value(Value::Int(2))));
        assert!(inner.value(&"c".into()).is_none());

        let shadow = ValueContext::new(outer, "a", "inner").unwrap();
        assert_eq!(shadow.value(&"a".into()), Some(TagValue::from("inner")));
    }

    #[test]
    fn value_context_rejects_invalid_keys() {
        assert_eq!(
            ValueContext::new(background(), None::<&str>, "v").unwrap_err(),
            ContextError::NilKey
        );
        assert!(ValueContext::new(background(), Value::Array(vec![]), "v")
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn cancel_propagates_to_children_only() {
        let parent = Arc::new(CancelContext::new(background()));
        let child = CancelContext::new(Arc::clone(&parent) as Arc<dyn BaseContext>);
        let wrapped = ValueContext::new(
            Arc::clone(&parent) as Arc<dyn BaseContext>,
            "k",
            "v",
        )
        .unwrap();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        parent.cancel();
        assert!(parent.is_cancelled());
        assert!(wrapped.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_takes_the_earlier_of_parent_and_own() {
        let now = Instant::now();
        let near = now + Duration::from_secs(1);
        let far = now + Duration::from_secs(10);

        let parent: Arc<dyn BaseContext> = Arc::new(DeadlineContext::new(background(), near));
        let child = DeadlineContext::new(Arc::clone(&parent), far);
        assert_eq!(child.deadline(), Some(near));

        let loose: Arc<dyn BaseContext> = Arc::new(DeadlineContext::new(background(), far));
        let tight = DeadlineContext::new(loose, near);
        assert_eq!(tight.deadline(), Some(near));
    }
}

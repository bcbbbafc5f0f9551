//! Hierarchical, lockable request context.
//!
//! A [`Context`] layers a mutable tag store over an immutable
//! [`BaseContext`]. The tag store and its mutex live behind one shared
//! handle: [`with_local_value`] hands back another reference to the same
//! handle, while [`with_value`] allocates a fresh store and lock and chains
//! the parent as fallback.
//!
//! The lock is not reentrant. While a caller holds a [`ContextGuard`] from
//! [`Context::lock`], calling any locking accessor on a context that shares
//! the same store deadlocks; use the guard's own accessors instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::base::BaseContext;
use crate::error::ContextError;
use crate::key::{IntoTagKey, ReservedKey, TagKey};
use crate::types::{MetaData, TagValue, Value};

type Tags = HashMap<TagKey, TagValue>;

fn seeded_tags() -> Tags {
    let mut tags = Tags::new();
    tags.insert(
        TagKey::Reserved(ReservedKey::ShareContext),
        TagValue::Value(Value::Bool(true)),
    );
    tags
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Request context with a lock-protected tag store.
///
/// Cloning produces another handle to the same store and lock, so clones
/// are indistinguishable from one another (see [`Context::ptr_eq`]).
#[derive(Clone)]
pub struct Context {
    base: Arc<dyn BaseContext>,
    tags: Arc<Mutex<Tags>>,
}

impl Context {
    /// Wraps `base` with a fresh lock and a tag store holding only the
    /// share-context marker.
    #[must_use]
    pub fn new(base: Arc<dyn BaseContext>) -> Self {
        Self::with_tags(base, seeded_tags())
    }

    fn with_tags(base: Arc<dyn BaseContext>, tags: Tags) -> Self {
        Self {
            base,
            tags: Arc::new(Mutex::new(tags)),
        }
    }

    /// The immutable parent this context falls back to.
    #[must_use]
    pub fn base(&self) -> &Arc<dyn BaseContext> {
        &self.base
    }

    /// Returns this context as a parent for further derivation.
    #[must_use]
    pub fn to_base(&self) -> Arc<dyn BaseContext> {
        Arc::new(self.clone())
    }

    /// Returns `true` if both handles share one tag store and lock.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.tags, &b.tags)
    }

    /// Acquires the tag lock until the returned guard is dropped.
    ///
    /// Use the guard to group several reads and writes into one atomic unit.
    pub fn lock(&self) -> ContextGuard<'_> {
        ContextGuard {
            tags: self.tags.lock(),
            base: self.base.as_ref(),
        }
    }

    /// Looks up `key` locally, then in the base chain.
    #[must_use]
    pub fn value(&self, key: &TagKey) -> Option<TagValue> {
        self.lock().value(key)
    }

    /// Inserts or overwrites a local tag.
    pub fn set_value(&self, key: impl Into<TagKey>, val: impl Into<TagValue>) {
        self.lock().set_value(key, val);
    }

    /// Removes a local tag. Absent or unknown keys are ignored.
    pub fn delete_key(&self, key: impl IntoTagKey) {
        self.lock().delete_key(key);
    }

    /// Returns the request metadata value for `key`, or `""` if unset.
    #[must_use]
    pub fn get_req_meta_data_by_key(&self, key: &str) -> String {
        self.lock().get_req_meta_data_by_key(key)
    }

    /// Sets one request metadata entry.
    pub fn set_req_meta_data(&self, key: impl Into<String>, val: impl Into<String>) {
        self.lock().set_req_meta_data(key, val);
    }

    /// Returns the response metadata value for `key`, or `""` if unset.
    #[must_use]
    pub fn get_res_meta_data_by_key(&self, key: &str) -> String {
        self.lock().get_res_meta_data_by_key(key)
    }

    /// Sets one response metadata entry.
    pub fn set_res_meta_data(&self, key: impl Into<String>, val: impl Into<String>) {
        self.lock().set_res_meta_data(key, val);
    }
}

impl BaseContext for Context {
    fn value(&self, key: &TagKey) -> Option<TagValue> {
        Context::value(self, key)
    }

    fn deadline(&self) -> Option<Instant> {
        self.base.deadline()
    }

    fn cancellation(&self) -> Option<CancellationToken> {
        self.base.cancellation()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Context");
        d.field("base", &self.base);
        match self.tags.try_lock() {
            Some(tags) => d.field("tags", &*tags),
            None => d.field("tags", &format_args!("<locked>")),
        };
        d.finish()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.WithValue(", self.base)?;
        match self.tags.try_lock() {
            Some(tags) => {
                f.write_str("{")?;
                for (i, (k, v)) in tags.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v:?}")?;
                }
                f.write_str("}")?;
            }
            None => f.write_str("<locked>")?,
        }
        f.write_str(")")
    }
}

// ---------------------------------------------------------------------------
// ContextGuard
// ---------------------------------------------------------------------------

/// Holds a context's tag lock. Accessors here never re-acquire it.
pub struct ContextGuard<'a> {
    tags: MutexGuard<'a, Tags>,
    base: &'a dyn BaseContext,
}

impl ContextGuard<'_> {
    /// Looks up `key` locally, then in the base chain.
    ///
    /// The base lookup runs while the lock is held. Bases are immutable or
    /// guard themselves with a different lock.
    #[must_use]
    pub fn value(&self, key: &TagKey) -> Option<TagValue> {
        match self.tags.get(key) {
            Some(v) => Some(v.clone()),
            None => self.base.value(key),
        }
    }

    pub fn set_value(&mut self, key: impl Into<TagKey>, val: impl Into<TagValue>) {
        self.tags.insert(key.into(), val.into());
    }

    pub fn delete_key(&mut self, key: impl IntoTagKey) {
        if let Ok(key) = key.into_tag_key() {
            self.tags.remove(&key);
        }
    }

    #[must_use]
    pub fn get_req_meta_data_by_key(&self, key: &str) -> String {
        self.meta_value(ReservedKey::ReqMetaData, key)
    }

    pub fn set_req_meta_data(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.insert_meta(ReservedKey::ReqMetaData, key.into(), val.into());
    }

    #[must_use]
    pub fn get_res_meta_data_by_key(&self, key: &str) -> String {
        self.meta_value(ReservedKey::ResMetaData, key)
    }

    pub fn set_res_meta_data(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.insert_meta(ReservedKey::ResMetaData, key.into(), val.into());
    }

    /// Releases the lock. Equivalent to dropping the guard.
    pub fn unlock(self) {}

    fn meta_value(&self, slot: ReservedKey, key: &str) -> String {
        let slot = TagKey::Reserved(slot);
        let found = match self.tags.get(&slot) {
            Some(TagValue::Metadata(meta)) => meta.get(key).cloned(),
            Some(_) => None,
            None => match self.base.value(&slot) {
                Some(TagValue::Metadata(meta)) => meta.get(key).cloned(),
                _ => None,
            },
        };
        found.unwrap_or_default()
    }

    /// Writes into the local map for `slot`, materializing it first.
    ///
    /// A map visible only through the base is copied, never written through.
    fn insert_meta(&mut self, slot: ReservedKey, key: String, val: String) {
        let slot = TagKey::Reserved(slot);
        let mut meta = match self.tags.remove(&slot) {
            Some(TagValue::Metadata(meta)) => meta,
            _ => match self.base.value(&slot) {
                Some(TagValue::Metadata(inherited)) => inherited,
                _ => MetaData::new(),
            },
        };
        meta.insert(key, val);
        self.tags.insert(slot, TagValue::Metadata(meta));
    }
}

impl fmt::Debug for ContextGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("tags", &*self.tags)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Wraps `base` in a new [`Context`].
#[must_use]
pub fn new_context(base: Arc<dyn BaseContext>) -> Context {
    Context::new(base)
}

/// Derives a new context with its own lock and a tag store holding only
/// `key: val` (plus the share-context marker). The parent's local tags are
/// reachable only through fallback lookup.
///
/// # Errors
///
/// Returns an invalid-argument [`ContextError`] if `key` is absent or not
/// comparable.
pub fn with_value(
    parent: Arc<dyn BaseContext>,
    key: impl IntoTagKey,
    val: impl Into<TagValue>,
) -> Result<Context, ContextError> {
    let key = validated(key)?;
    let mut tags = seeded_tags();
    tags.insert(key, val.into());
    Ok(Context::with_tags(parent, tags))
}

/// Adds `key: val` to `ctx`'s own tag store and returns the same context.
///
/// Every handle sharing `ctx`'s store observes the new tag.
///
/// # Errors
///
/// Returns an invalid-argument [`ContextError`] if `key` is absent or not
/// comparable.
pub fn with_local_value(
    ctx: &Context,
    key: impl IntoTagKey,
    val: impl Into<TagValue>,
) -> Result<Context, ContextError> {
    let key = validated(key)?;
    ctx.set_value(key, val);
    Ok(ctx.clone())
}

/// Returns `true` if the share-context marker is visible anywhere in the
/// chain rooted at `ctx`.
#[must_use]
pub fn is_share_context(ctx: &dyn BaseContext) -> bool {
    ctx.value(&TagKey::Reserved(ReservedKey::ShareContext))
        .is_some()
}

fn validated(key: impl IntoTagKey) -> Result<TagKey, ContextError> {
    key.into_tag_key().inspect_err(|err| {
        debug!(error = %err, "rejected context key");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

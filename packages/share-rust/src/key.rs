//! Lookup keys for the context tag store.
//!
//! Keys are a closed sum type plus a type-erased `Typed` variant for
//! caller-defined key types. Every variant has a total, stable equality, so
//! the comparability check a dynamic language performs at insertion time is
//! either proven by the type system or done once in [`IntoTagKey`].
//! Float keys compare through `OrderedFloat`, so every NaN equals every
//! other NaN and hashing stays consistent with equality.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::error::ContextError;
use crate::types::Value;

/// Keys owned by this crate. Callers cannot collide with them because no
/// public conversion produces a `Reserved` key except from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    /// Marker present in every tag store created by this crate.
    ShareContext,
    /// Request metadata sub-map.
    ReqMetaData,
    /// Response metadata sub-map.
    ResMetaData,
}

trait DynKey: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynKey) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T> DynKey for T
where
    T: Any + Eq + Hash + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynKey) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Type-erased caller-defined key. Two typed keys are equal only if they
/// have the same concrete type and compare equal as that type.
#[derive(Clone)]
pub struct TypedKey(Arc<dyn DynKey>);

impl TypedKey {
    #[must_use]
    pub fn new<T>(key: T) -> Self
    where
        T: Any + Eq + Hash + Send + Sync + fmt::Debug,
    {
        Self(Arc::new(key))
    }

    /// Downcasts back to the concrete key type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }
}

impl PartialEq for TypedKey {
    fn eq(&self, other: &Self) -> bool {
        (*self.0).dyn_eq(&*other.0)
    }
}

impl Eq for TypedKey {}

impl Hash for TypedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.0).dyn_hash(state);
    }
}

impl fmt::Debug for TypedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// A key in a context's tag store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagKey {
    Str(String),
    Int(i64),
    Float(OrderedFloat<f64>),
    Bool(bool),
    Bytes(Vec<u8>),
    Typed(TypedKey),
    Reserved(ReservedKey),
}

impl TagKey {
    /// Builds a key from any hashable caller type.
    #[must_use]
    pub fn typed<T>(key: T) -> Self
    where
        T: Any + Eq + Hash + Send + Sync + fmt::Debug,
    {
        Self::Typed(TypedKey::new(key))
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "{b:?}"),
            Self::Typed(t) => write!(f, "{t:?}"),
            Self::Reserved(r) => write!(f, "{r:?}"),
        }
    }
}

impl From<&str> for TagKey {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for TagKey {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for TagKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for TagKey {
    fn from(v: f64) -> Self {
        Self::Float(OrderedFloat(v))
    }
}

impl From<bool> for TagKey {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for TagKey {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<ReservedKey> for TagKey {
    fn from(v: ReservedKey) -> Self {
        Self::Reserved(v)
    }
}

/// Fallible conversion used where a key must be validated before insertion.
///
/// Statically typed keys always succeed. Dynamic inputs fail with
/// [`ContextError::NilKey`] when absent and [`ContextError::KeyNotComparable`]
/// when they have no stable equality.
pub trait IntoTagKey {
    /// # Errors
    ///
    /// Returns an invalid-argument [`ContextError`] if the key is absent or
    /// not comparable.
    fn into_tag_key(self) -> Result<TagKey, ContextError>;
}

macro_rules! infallible_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoTagKey for $ty {
                fn into_tag_key(self) -> Result<TagKey, ContextError> {
                    Ok(self.into())
                }
            }
        )*
    };
}

infallible_key!(TagKey, ReservedKey, &str, String, i64, f64, bool, Vec<u8>);

impl IntoTagKey for TypedKey {
    fn into_tag_key(self) -> Result<TagKey, ContextError> {
        Ok(TagKey::Typed(self))
    }
}

impl<K: IntoTagKey> IntoTagKey for Option<K> {
    fn into_tag_key(self) -> Result<TagKey, ContextError> {
        self.ok_or(ContextError::NilKey)?.into_tag_key()
    }
}

impl IntoTagKey for Value {
    fn into_tag_key(self) -> Result<TagKey, ContextError> {
        match self {
            Value::Null => Err(ContextError::NilKey),
            Value::Bool(b) => Ok(TagKey::Bool(b)),
            Value::Int(i) => Ok(TagKey::Int(i)),
            Value::Float(x) => Ok(TagKey::Float(OrderedFloat(x))),
            Value::String(s) => Ok(TagKey::Str(s)),
            Value::Bytes(b) => Ok(TagKey::Bytes(b)),
            v @ (Value::Array(_) | Value::Map(_)) => {
                Err(ContextError::KeyNotComparable { kind: v.kind() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct RouteKey(&'static str);

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct OtherKey(&'static str);

    #[test]
    fn typed_keys_compare_by_type_and_value() {
        assert_eq!(TagKey::typed(RouteKey("a")), TagKey::typed(RouteKey("a")));
        assert_ne!(TagKey::typed(RouteKey("a")), TagKey::typed(RouteKey("b")));
        assert_ne!(TagKey::typed(RouteKey("a")), TagKey::typed(OtherKey("a")));
    }

    #[test]
    fn typed_keys_work_as_map_keys() {
        let mut map = HashMap::new();
        map.insert(TagKey::typed(RouteKey("a")), 1);
        map.insert(TagKey::typed(OtherKey("a")), 2);
        assert_eq!(map.get(&TagKey::typed(RouteKey("a"))), Some(&1));
        assert_eq!(map.get(&TagKey::typed(OtherKey("a"))), Some(&2));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn typed_key_downcasts() {
        let key = TypedKey::new(RouteKey("x"));
        assert_eq!(key.downcast_ref::<RouteKey>(), Some(&RouteKey("x")));
        assert!(key.downcast_ref::<OtherKey>().is_none());
    }

    #[test]
    fn static_keys_always_convert() {
        assert_eq!("k".into_tag_key(), Ok(TagKey::Str("k".to_string())));
        assert_eq!(7i64.into_tag_key(), Ok(TagKey::Int(7)));
        assert_eq!(Some("k").into_tag_key(), Ok(TagKey::Str("k".to_string())));
    }

    #[test]
    fn absent_keys_are_rejected() {
        assert_eq!(None::<&str>.into_tag_key(), Err(ContextError::NilKey));
        assert_eq!(Value::Null.into_tag_key(), Err(ContextError::NilKey));
    }

    #[test]
    fn float_keys_are_accepted() {
        assert_eq!(
            Value::Float(0.5).into_tag_key(),
            Ok(TagKey::Float(OrderedFloat(0.5)))
        );
        assert_eq!(1.5f64.into_tag_key(), Ok(TagKey::from(1.5)));
        assert_ne!(TagKey::from(1.5), TagKey::from(2.5));
        assert_eq!(TagKey::from(f64::NAN), TagKey::from(f64::NAN));

        let mut map = std::collections::HashMap::new();
        map.insert(TagKey::from(0.25), "quarter");
        assert_eq!(map.get(&TagKey::from(0.25)), Some(&"quarter"));
    }

    #[test]
    fn dynamic_keys_without_stable_equality_are_rejected() {
        assert_eq!(
            Value::Array(vec![Value::Int(1)]).into_tag_key(),
            Err(ContextError::KeyNotComparable { kind: "array" })
        );
        assert_eq!(
            Value::Map(BTreeMap::new()).into_tag_key(),
            Err(ContextError::KeyNotComparable { kind: "map" })
        );
        assert_eq!(
            Value::String("ok".to_string()).into_tag_key(),
            Ok(TagKey::Str("ok".to_string()))
        );
    }
}

//! Type/version registry.
//!
//! Rust has no "construct a type from its name" facility, so every type that
//! is persisted with a type id must be registered before it can be decoded.
//! Overrides are layered on top: a persisted name can be redirected to
//! another registered name (a rename) or to a different Rust type
//! altogether (a replacement).
//!
//! Resolution order for a persisted name:
//!   1. an override keyed by the full name
//!   2. an override keyed by its last `::` or `.` segment
//!   3. the registered table, exact name
//!
//! A name that fails all three is undecodable.  It can still be listed, but
//! constructing a value of it is an error.

use std::any::{Any, TypeId as RustTypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::decoder::{Decode, Decoder};
use crate::error::ArchiveResult;

// ── GraphType ────────────────────────────────────────────────────────────────

/// A reference type that is persisted with a name and a schema version.
///
/// ```
/// use graphark::GraphType;
///
/// struct Circle { radius: f64 }
///
/// impl GraphType for Circle {
///     const TYPE_NAME: &'static str = "shapes::Circle";
///     const VERSION: u32 = 2;
/// }
/// ```
pub trait GraphType: 'static {
    const TYPE_NAME: &'static str;
    const VERSION: u32 = 0;
}

/// Static description of a persisted type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub name:      &'static str,
    pub version:   u32,
    pub rust_type: RustTypeId,
}

impl TypeInfo {
    pub fn of<T: GraphType>() -> Self {
        Self { name: T::TYPE_NAME, version: T::VERSION, rust_type: RustTypeId::of::<T>() }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

pub(crate) type Construct = fn(&mut Decoder<'_>) -> ArchiveResult<Rc<dyn Any>>;

fn construct<T: Decode + 'static>(decoder: &mut Decoder<'_>) -> ArchiveResult<Rc<dyn Any>> {
    let value = T::decode(decoder)?;
    Ok(match value.to_shared() {
        Some(shared) => shared,
        None => Rc::new(value) as Rc<dyn Any>,
    })
}

/// A registered, constructible type.
#[derive(Clone, Copy)]
pub struct Registered {
    pub info:           TypeInfo,
    pub(crate) construct: Construct,
}

impl fmt::Debug for Registered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registered").field("info", &self.info).finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Registry {
    by_name:   HashMap<&'static str, Registered>,
    overrides: HashMap<String, &'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `T` constructible under its own `TYPE_NAME`.
    pub fn register<T: GraphType + Decode>(&mut self) -> &mut Self {
        let entry = Registered { info: TypeInfo::of::<T>(), construct: construct::<T> };
        if let Some(previous) = self.by_name.insert(T::TYPE_NAME, entry) {
            if previous.info.rust_type != entry.info.rust_type {
                tracing::warn!(name = T::TYPE_NAME, "type name re-registered to a different type");
            }
        }
        self
    }

    /// Decode values persisted as `old_name` as the type registered under
    /// `new_name`.
    pub fn rename(&mut self, old_name: &str, new_name: &'static str) -> &mut Self {
        self.overrides.insert(old_name.to_owned(), new_name);
        self
    }

    /// Decode values persisted as `persisted_name` as `T`, registering `T`.
    pub fn replace<T: GraphType + Decode>(&mut self, persisted_name: &str) -> &mut Self {
        self.register::<T>();
        self.rename(persisted_name, T::TYPE_NAME)
    }

    pub fn resolve(&self, persisted_name: &str) -> Option<&Registered> {
        let target = self
            .overrides
            .get(persisted_name)
            .or_else(|| self.overrides.get(short_name(persisted_name)))
            .copied()
            .unwrap_or(persisted_name);
        self.by_name.get(target)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize { self.by_name.len() }
    pub fn is_empty(&self) -> bool { self.by_name.is_empty() }
}

/// The last `::` or `.` separated segment of a qualified name.
pub fn short_name(name: &str) -> &str {
    let after_colons = name.rsplit("::").next().unwrap_or(name);
    after_colons.rsplit('.').next().unwrap_or(after_colons)
}

// ── AnyRef ───────────────────────────────────────────────────────────────────

/// A polymorphic shared value, constructed through the registry entry of
/// whatever type was persisted.
#[derive(Clone)]
pub struct AnyRef(pub Rc<dyn Any>);

impl AnyRef {
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn ptr_eq(&self, other: &AnyRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyRef({:p})", Rc::as_ptr(&self.0))
    }
}

impl Decode for AnyRef {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        decoder.construct_registered().map(AnyRef)
    }

    fn to_shared(&self) -> Option<Rc<dyn Any>> {
        Some(Rc::clone(&self.0))
    }

    fn from_shared(shared: Rc<dyn Any>) -> Option<Self> {
        Some(AnyRef(shared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Old;
    struct New;

    impl GraphType for Old {
        const TYPE_NAME: &'static str = "app::model::Old";
    }
    impl GraphType for New {
        const TYPE_NAME: &'static str = "app::model::New";
        const VERSION: u32 = 2;
    }
    impl Decode for Old {
        fn decode(_: &mut Decoder<'_>) -> ArchiveResult<Self> { Ok(Old) }
    }
    impl Decode for New {
        fn decode(_: &mut Decoder<'_>) -> ArchiveResult<Self> { Ok(New) }
    }

    #[test]
    fn short_names() {
        assert_eq!(short_name("a::b::C"), "C");
        assert_eq!(short_name("Module.Class"), "Class");
        assert_eq!(short_name("Plain"), "Plain");
    }

    #[test]
    fn exact_registration_resolves() {
        let mut registry = Registry::new();
        registry.register::<Old>();
        let found = registry.resolve("app::model::Old").unwrap();
        assert_eq!(found.info, TypeInfo::of::<Old>());
        assert!(registry.resolve("app::model::Missing").is_none());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut registry = Registry::new();
        registry.register::<Old>().replace::<New>("app::model::Old");
        assert_eq!(registry.resolve("app::model::Old").unwrap().info.rust_type, RustTypeId::of::<New>());
    }

    #[test]
    fn override_by_short_name() {
        let mut registry = Registry::new();
        registry.register::<New>().rename("Old", "app::model::New");
        let found = registry.resolve("legacy.pkg.Old").unwrap();
        assert_eq!(found.info.version, 2);
    }
}

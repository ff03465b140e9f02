//! Type identity - WHAT plugin type (base name + generic arguments).
//!
//! TypeKey uniquely identifies a plugin type or concrete type in the
//! graph. It's interned for cheap comparison and cloning. Keys come in
//! two flavors: runtime-backed (carrying a `TypeId` for downcasting
//! sugar) and symbolic (open generics, closed generics synthesized at
//! resolve time, and parameter placeholders inside open recipes).

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{LazyLock, RwLock};

use crate::util::InternedString;

/// Global type key interner
static KEY_INTERNER: LazyLock<RwLock<HashMap<TypeKeyInner, &'static TypeKeyInner>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// `TypeId`s treated as value-kind (primitive) parameters.
///
/// Value-kind parameters are never resolved from the graph; they must be
/// supplied inline on the instance or as explicit arguments.
static VALUE_TYPE_IDS: LazyLock<HashSet<TypeId>> = LazyLock::new(|| {
    let mut set = HashSet::new();
    set.insert(TypeId::of::<bool>());
    set.insert(TypeId::of::<char>());
    set.insert(TypeId::of::<i8>());
    set.insert(TypeId::of::<i16>());
    set.insert(TypeId::of::<i32>());
    set.insert(TypeId::of::<i64>());
    set.insert(TypeId::of::<i128>());
    set.insert(TypeId::of::<isize>());
    set.insert(TypeId::of::<u8>());
    set.insert(TypeId::of::<u16>());
    set.insert(TypeId::of::<u32>());
    set.insert(TypeId::of::<u64>());
    set.insert(TypeId::of::<u128>());
    set.insert(TypeId::of::<usize>());
    set.insert(TypeId::of::<f32>());
    set.insert(TypeId::of::<f64>());
    set.insert(TypeId::of::<String>());
    set.insert(TypeId::of::<&'static str>());
    set.insert(TypeId::of::<std::path::PathBuf>());
    set.insert(TypeId::of::<std::time::Duration>());
    set
});

/// Base name reserved for sequence (all-of-element) request keys.
const SEQUENCE_BASE: &str = "Seq";

/// A unique identifier for a plugin or concrete type (interned).
///
/// TypeKeys are cheap to clone and compare (pointer comparison). A key
/// combines a base name, a generic arity, and closed argument keys, so
/// `Repository<Order>` and `Repository<Invoice>` have distinct
/// identities while sharing a base.
#[derive(Clone, Copy)]
pub struct TypeKey {
    inner: &'static TypeKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeKeyInner {
    name: InternedString,
    args: Vec<TypeKey>,
    arity: usize,
    param: Option<usize>,
    runtime: Option<TypeId>,
    value_kind: bool,
}

impl TypeKey {
    /// Key for a Rust type, backed by its `TypeId`.
    ///
    /// Standard scalar and string types come back flagged value-kind.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        let id = TypeId::of::<T>();
        Self::intern(TypeKeyInner {
            name: InternedString::new(short_type_name(std::any::type_name::<T>())),
            args: Vec::new(),
            arity: 0,
            param: None,
            runtime: Some(id),
            value_kind: VALUE_TYPE_IDS.contains(&id),
        })
    }

    /// Key for a Rust type that must be treated as a value-kind parameter.
    ///
    /// Use for settings structs and other config-ish types that should
    /// never be resolved from the graph.
    pub fn value_of<T: Send + Sync + 'static>() -> Self {
        Self::intern(TypeKeyInner {
            name: InternedString::new(short_type_name(std::any::type_name::<T>())),
            args: Vec::new(),
            arity: 0,
            param: None,
            runtime: Some(TypeId::of::<T>()),
            value_kind: true,
        })
    }

    /// Purely symbolic key with no runtime backing.
    pub fn named(name: impl Into<InternedString>) -> Self {
        Self::intern(TypeKeyInner {
            name: name.into(),
            args: Vec::new(),
            arity: 0,
            param: None,
            runtime: None,
            value_kind: false,
        })
    }

    /// Open generic key, e.g. `Repository<>` with arity 1.
    pub fn open(name: impl Into<InternedString>, arity: usize) -> Self {
        Self::intern(TypeKeyInner {
            name: name.into(),
            args: Vec::new(),
            arity,
            param: None,
            runtime: None,
            value_kind: false,
        })
    }

    /// Placeholder for the n-th generic argument inside an open recipe.
    pub fn parameter(index: usize) -> Self {
        Self::intern(TypeKeyInner {
            name: InternedString::new(format!("T{}", index)),
            args: Vec::new(),
            arity: 0,
            param: Some(index),
            runtime: None,
            value_kind: false,
        })
    }

    /// Sequence request key: "all instances of `element`".
    pub fn sequence_of(element: TypeKey) -> Self {
        Self::intern(TypeKeyInner {
            name: InternedString::new(SEQUENCE_BASE),
            args: vec![element],
            arity: 1,
            param: None,
            runtime: None,
            value_kind: false,
        })
    }

    /// Close an open generic key with concrete arguments.
    ///
    /// The argument count must match the declared arity.
    pub fn close(&self, args: &[TypeKey]) -> Option<TypeKey> {
        if self.inner.arity == 0 || args.len() != self.inner.arity {
            return None;
        }
        Some(Self::intern(TypeKeyInner {
            name: self.inner.name,
            args: args.to_vec(),
            arity: self.inner.arity,
            param: None,
            runtime: None,
            value_kind: false,
        }))
    }

    /// Substitute parameter placeholders with closed arguments.
    ///
    /// `parameter(i)` becomes `args[i]`; generic keys substitute
    /// recursively through their own arguments. Keys with nothing to
    /// substitute come back unchanged (same interned pointer).
    pub fn substitute(&self, args: &[TypeKey]) -> TypeKey {
        if let Some(i) = self.inner.param {
            return args.get(i).copied().unwrap_or(*self);
        }
        if self.inner.args.iter().any(|a| a.contains_parameters()) {
            let substituted: Vec<TypeKey> =
                self.inner.args.iter().map(|a| a.substitute(args)).collect();
            return Self::intern(TypeKeyInner {
                name: self.inner.name,
                args: substituted,
                arity: self.inner.arity,
                param: None,
                runtime: None,
                value_kind: self.inner.value_kind,
            });
        }
        if self.inner.arity > 0 && self.inner.args.is_empty() {
            // A bare open key stands for "the closed form of myself"
            return self.close(args).unwrap_or(*self);
        }
        *self
    }

    fn intern(inner: TypeKeyInner) -> Self {
        // Fast path: check if already interned
        {
            let interner = KEY_INTERNER.read().unwrap();
            if let Some(&interned) = interner.get(&inner) {
                return TypeKey { inner: interned };
            }
        }

        // Slow path: intern the new key
        let mut interner = KEY_INTERNER.write().unwrap();

        // Double-check after acquiring write lock
        if let Some(&interned) = interner.get(&inner) {
            return TypeKey { inner: interned };
        }

        let leaked: &'static TypeKeyInner = Box::leak(Box::new(inner.clone()));
        interner.insert(inner, leaked);

        TypeKey { inner: leaked }
    }

    /// Get the base name.
    pub fn name(&self) -> InternedString {
        self.inner.name
    }

    /// Get the closed generic arguments.
    pub fn args(&self) -> &[TypeKey] {
        &self.inner.args
    }

    /// Get the declared generic arity (0 for non-generic keys).
    pub fn arity(&self) -> usize {
        self.inner.arity
    }

    /// Get the backing `TypeId`, if this key was built from a Rust type.
    pub fn runtime_id(&self) -> Option<TypeId> {
        self.inner.runtime
    }

    /// Whether this key names a value-kind (primitive) type.
    pub fn is_value_kind(&self) -> bool {
        self.inner.value_kind
    }

    /// Whether this key is a parameter placeholder.
    pub fn is_parameter(&self) -> bool {
        self.inner.param.is_some()
    }

    /// Whether this key (or any argument) still has unbound generics.
    pub fn is_open(&self) -> bool {
        self.inner.param.is_some()
            || (self.inner.arity > 0 && self.inner.args.len() < self.inner.arity)
            || self.inner.args.iter().any(TypeKey::is_open)
    }

    /// Whether this key is a closed generic (all arguments bound).
    pub fn is_closed_generic(&self) -> bool {
        self.inner.arity > 0 && !self.is_open()
    }

    /// Whether this key is a sequence request.
    pub fn is_sequence(&self) -> bool {
        self.inner.name.as_str() == SEQUENCE_BASE && self.inner.arity == 1
    }

    /// The element key of a sequence request.
    pub fn sequence_element(&self) -> Option<TypeKey> {
        if self.is_sequence() {
            self.inner.args.first().copied()
        } else {
            None
        }
    }

    /// The open form of a closed generic key (`Repository<Order>` -> `Repository<>`).
    pub fn open_base(&self) -> Option<TypeKey> {
        if self.inner.arity == 0 {
            return None;
        }
        Some(Self::intern(TypeKeyInner {
            name: self.inner.name,
            args: Vec::new(),
            arity: self.inner.arity,
            param: None,
            runtime: None,
            value_kind: false,
        }))
    }

    fn contains_parameters(&self) -> bool {
        self.inner.param.is_some() || self.inner.args.iter().any(TypeKey::contains_parameters)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.inner, state)
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)?;
        if self.inner.arity > 0 || !self.inner.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.inner.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self)
    }
}

/// Strip module paths from a `std::any::type_name` rendering.
///
/// `alloc::vec::Vec<alloc::string::String>` becomes `Vec<String>`.
fn short_type_name(full: &str) -> String {
    let mut out = String::new();
    let mut segment_start = 0usize;
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
        } else if c.is_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push(c);
            segment_start = out.len();
        }
    }

    out
}

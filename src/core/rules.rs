//! Type rules - pure predicates over type keys.
//!
//! Everything here is a stateless function of key identity. The build
//! pipeline and registration validation consult these instead of
//! inspecting live values.

use crate::core::TypeKey;

/// Whether a key names a value-kind (primitive/config) type.
///
/// Value-kind constructor parameters are never resolved from the graph;
/// they must be satisfied inline on the instance or by explicit
/// arguments at resolve time.
pub fn is_value_kind(key: TypeKey) -> bool {
    key.is_value_kind()
}

/// Whether a key is a sequence request ("all instances of T").
pub fn is_sequence(key: TypeKey) -> bool {
    key.is_sequence()
}

/// Whether a key still carries unbound generic arguments.
pub fn is_open_generic(key: TypeKey) -> bool {
    key.is_open()
}

/// Whether a built object of type `from` can be handed to a consumer
/// declared to accept `to`.
///
/// With interned symbolic keys there is no subtype lattice, so
/// castability is identity. Interceptors that apply to any type declare
/// no accepted key at all rather than relying on a cast.
pub fn can_cast(from: TypeKey, to: TypeKey) -> bool {
    from == to
}

/// Whether `key` could be served by closing `open` with some argument
/// list: same base name and arity, `open` unbound, `key` fully bound.
pub fn closes_from(key: TypeKey, open: TypeKey) -> bool {
    key.is_closed_generic() && open.is_open() && key.open_base() == Some(open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_is_identity() {
        let a = TypeKey::named("Gauge");
        let b = TypeKey::named("Meter");

        assert!(can_cast(a, a));
        assert!(!can_cast(a, b));
    }

    #[test]
    fn test_closes_from() {
        let open = TypeKey::open("Repository", 1);
        let closed = open.close(&[TypeKey::named("Order")]).unwrap();
        let other = TypeKey::open("Validator", 1)
            .close(&[TypeKey::named("Order")])
            .unwrap();

        assert!(closes_from(closed, open));
        assert!(!closes_from(other, open));
        assert!(!closes_from(open, open));
    }

    #[test]
    fn test_sequence_predicate() {
        let seq = TypeKey::sequence_of(TypeKey::named("Handler"));
        assert!(is_sequence(seq));
        assert!(!is_open_generic(seq));
    }
}

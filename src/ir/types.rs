//! Interned type table.
//!
//! The core only needs enough of a type system to give every node a type and
//! to classify continuation signatures:
//!
//! - **Prim types** and the memory token type
//! - **Pi types**: the product of a continuation's parameter types
//! - **Generics**: placeholders resolved by a [`GenericMap`] during
//!   specialization
//!
//! Types are hash-consed: structurally equal types share one [`TypeId`], so
//! type equality is id equality.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::arena::{Arena, Id};

/// Id of an interned type.
pub type TypeId = Id<Type>;

/// Primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    Bool,
    I32,
    I64,
    /// Stored as raw bits so types stay `Eq`/`Hash`.
    F64,
}

/// An interned type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Prim(PrimType),
    /// The memory token threaded through effectful calls.
    Mem,
    /// A continuation signature: the product of its parameter types.
    Pi(SmallVec<[TypeId; 4]>),
    /// A generic placeholder, identified by index.
    Generic(u32),
}

/// Binding of generic indices to concrete types, filled by [`TypeTable::infer_with`]
/// and consumed by [`TypeTable::specialize`].
pub type GenericMap = FxHashMap<u32, TypeId>;

// =============================================================================
// Type Table
// =============================================================================

/// Owner of all interned types.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: Arena<Type>,
    intern: FxHashMap<Type, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.intern.get(&ty) {
            return id;
        }
        let id = self.types.alloc(ty.clone());
        self.intern.insert(ty, id);
        id
    }

    pub fn prim(&mut self, p: PrimType) -> TypeId {
        self.intern(Type::Prim(p))
    }

    pub fn bool_type(&mut self) -> TypeId {
        self.prim(PrimType::Bool)
    }

    pub fn i32_type(&mut self) -> TypeId {
        self.prim(PrimType::I32)
    }

    pub fn i64_type(&mut self) -> TypeId {
        self.prim(PrimType::I64)
    }

    pub fn f64_type(&mut self) -> TypeId {
        self.prim(PrimType::F64)
    }

    pub fn mem(&mut self) -> TypeId {
        self.intern(Type::Mem)
    }

    pub fn generic(&mut self, index: u32) -> TypeId {
        self.intern(Type::Generic(index))
    }

    /// The pi type over the given element types.
    pub fn pi(&mut self, elems: &[TypeId]) -> TypeId {
        self.intern(Type::Pi(elems.iter().copied().collect()))
    }

    /// Unary pi.
    pub fn pi1(&mut self, elem: TypeId) -> TypeId {
        self.pi(&[elem])
    }

    /// Binary pi.
    pub fn pi2(&mut self, e0: TypeId, e1: TypeId) -> TypeId {
        self.pi(&[e0, e1])
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn is_pi(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pi(_))
    }

    /// The element types of a pi, or `None` for non-pi types.
    pub fn pi_elems(&self, id: TypeId) -> Option<&[TypeId]> {
        match self.get(id) {
            Type::Pi(elems) => Some(elems),
            _ => None,
        }
    }

    /// Functional order: 0 for leaves, `1 + max(elem orders)` for pis.
    pub fn order(&self, id: TypeId) -> usize {
        match self.get(id) {
            Type::Pi(elems) => 1 + elems.iter().map(|&e| self.order(e)).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// A basic-block signature: a pi whose parameters are all first-order.
    pub fn is_basicblock(&self, id: TypeId) -> bool {
        self.order(id) == 1
    }

    /// A returning signature: a pi with exactly one order-1 element (the
    /// return continuation) and no element of higher order.
    pub fn is_returning(&self, id: TypeId) -> bool {
        let Type::Pi(elems) = self.get(id) else {
            return false;
        };
        let mut ret = false;
        for &elem in elems {
            match self.order(elem) {
                0 => continue,
                1 if !ret => ret = true,
                _ => return false,
            }
        }
        ret
    }

    /// Whether a generic occurs anywhere inside the type.
    pub fn mentions_generic(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Generic(_) => true,
            Type::Pi(elems) => elems.iter().any(|&e| self.mentions_generic(e)),
            _ => false,
        }
    }

    /// Substitute bound generics; unbound generics stay as they are.
    pub fn specialize(&mut self, id: TypeId, map: &GenericMap) -> TypeId {
        match self.get(id) {
            Type::Generic(index) => map.get(index).copied().unwrap_or(id),
            Type::Pi(elems) => {
                let elems: SmallVec<[TypeId; 4]> = elems.clone();
                let spec: SmallVec<[TypeId; 4]> =
                    elems.iter().map(|&e| self.specialize(e, map)).collect();
                if spec == elems {
                    id
                } else {
                    self.intern(Type::Pi(spec))
                }
            }
            _ => id,
        }
    }

    /// Unify `this` (which may mention generics) against the concrete `that`,
    /// recording bindings. Returns false on a structural mismatch or a
    /// conflicting binding.
    pub fn infer_with(&self, map: &mut GenericMap, this: TypeId, that: TypeId) -> bool {
        if this == that {
            return true;
        }
        match (self.get(this), self.get(that)) {
            (Type::Generic(index), _) => match map.get(index) {
                Some(&bound) => bound == that,
                None => {
                    map.insert(*index, that);
                    true
                }
            },
            (Type::Pi(a), Type::Pi(b)) if a.len() == b.len() => a
                .iter()
                .zip(b.iter())
                .all(|(&x, &y)| self.infer_with(map, x, y)),
            _ => false,
        }
    }

    /// Render a type for diagnostics.
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Prim(PrimType::Bool) => "bool".to_string(),
            Type::Prim(PrimType::I32) => "i32".to_string(),
            Type::Prim(PrimType::I64) => "i64".to_string(),
            Type::Prim(PrimType::F64) => "f64".to_string(),
            Type::Mem => "mem".to_string(),
            Type::Generic(index) => format!("?{index}"),
            Type::Pi(elems) => {
                let elems = elems
                    .iter()
                    .map(|&e| self.display(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("fn({elems})")
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_identity() {
        let mut t = TypeTable::new();
        let i32a = t.i32_type();
        let i32b = t.i32_type();
        assert_eq!(i32a, i32b);

        let p1 = t.pi2(i32a, i32a);
        let p2 = t.pi2(i32b, i32b);
        assert_eq!(p1, p2);

        let p3 = t.pi1(i32a);
        assert_ne!(p1, p3);
    }

    #[test]
    fn test_order() {
        let mut t = TypeTable::new();
        let i32t = t.i32_type();
        assert_eq!(t.order(i32t), 0);

        let bb = t.pi2(i32t, i32t);
        assert_eq!(t.order(bb), 1);
        assert!(t.is_basicblock(bb));

        let empty = t.pi(&[]);
        assert!(t.is_basicblock(empty));

        let ho = t.pi2(bb, i32t);
        assert_eq!(t.order(ho), 2);
        assert!(!t.is_basicblock(ho));
    }

    #[test]
    fn test_returning() {
        let mut t = TypeTable::new();
        let i32t = t.i32_type();
        let ret = t.pi1(i32t);

        let f = t.pi2(i32t, ret);
        assert!(t.is_returning(f));

        // two continuation params is not a plain returning signature
        let g = t.pi(&[ret, i32t, ret]);
        assert!(!t.is_returning(g));

        let bb = t.pi1(i32t);
        assert!(!t.is_returning(bb));
    }

    #[test]
    fn test_specialize_and_infer() {
        let mut t = TypeTable::new();
        let i32t = t.i32_type();
        let g0 = t.generic(0);
        let f = t.pi2(g0, i32t);

        let mut map = GenericMap::default();
        let concrete = t.pi2(i32t, i32t);
        assert!(t.infer_with(&mut map, f, concrete));
        assert_eq!(map.get(&0), Some(&i32t));
        assert_eq!(t.specialize(f, &map), concrete);

        // conflicting binding fails
        let i64t = t.i64_type();
        let other = t.pi2(i64t, i32t);
        assert!(!t.infer_with(&mut map, f, other));
    }
}

use rustc_hash::FxHashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A PDF name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// A PDF number, which is either an integer or a real.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Real(r) => *r,
        }
    }

    pub fn as_f32(&self) -> f32 {
        self.as_f64() as f32
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Int(i) => *i,
            Self::Real(r) => *r as i64,
        }
    }

    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(data).ok()?;

        if let Ok(i) = s.parse::<i64>() {
            return Some(Self::Int(i));
        }

        // PDF permits reals like `4.`, `.5` and `-.2` that `f64::parse`
        // also accepts, but not empty or lone-sign strings.
        if s.is_empty() || s == "-" || s == "+" || s == "." {
            return None;
        }

        s.parse::<f64>().ok().map(Self::Real)
    }
}

/// A reference to an indirect object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ObjRef {
    pub num: u32,
    pub r#gen: u16,
}

impl ObjRef {
    pub fn new(num: u32, r#gen: u16) -> Self {
        Self { num, r#gen }
    }
}

/// A PDF object.
#[derive(Clone, Debug)]
pub enum Object {
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<[u8]>),
    Name(Name),
    Array(Array),
    Dict(Dict),
    Stream(Stream),
    Ref(ObjRef),
}

impl Object {
    pub fn string(data: &[u8]) -> Self {
        Self::String(Arc::from(data))
    }

    pub fn name(s: &str) -> Self {
        Self::Name(Name::new(s))
    }

    pub fn int(i: i64) -> Self {
        Self::Number(Number::Int(i))
    }

    pub fn real(r: f64) -> Self {
        Self::Number(Number::Real(r))
    }

    pub fn cast<T: FromObject>(self) -> Option<T> {
        T::from_object(self)
    }

    pub fn is_dict_like(&self) -> bool {
        matches!(self, Self::Dict(_) | Self::Stream(_))
    }
}

/// A store of indirect objects, shared by every dictionary and array that
/// was read from the same document.
#[derive(Default, Debug)]
pub struct Store {
    objects: FxHashMap<ObjRef, Object>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ref_: ObjRef, obj: Object) {
        self.objects.insert(ref_, obj);
    }

    /// Follow reference chains until a direct object is reached.
    ///
    /// Dangling or cyclic references resolve to `Null`.
    pub fn resolve(&self, obj: &Object) -> Object {
        let mut cur = obj.clone();

        // Reference chains deeper than this are certainly cyclic.
        for _ in 0..32 {
            match cur {
                Object::Ref(r) => {
                    cur = self.objects.get(&r).cloned().unwrap_or(Object::Null);
                }
                other => return other,
            }
        }

        Object::Null
    }
}

/// A PDF dictionary with typed, reference-resolving access.
#[derive(Clone, Debug)]
pub struct Dict {
    map: Arc<FxHashMap<Name, Object>>,
    store: Arc<Store>,
}

impl Default for Dict {
    fn default() -> Self {
        Self {
            map: Arc::new(FxHashMap::default()),
            store: Arc::new(Store::new()),
        }
    }
}

impl Dict {
    pub fn from_pairs(
        store: Arc<Store>,
        pairs: impl IntoIterator<Item = (Name, Object)>,
    ) -> Self {
        Self {
            map: Arc::new(pairs.into_iter().collect()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Typed access with indirect references resolved.
    pub fn get<T: FromObject>(&self, key: &str) -> Option<T> {
        let raw = self.map.get(&Name::new(key))?;

        T::from_object(self.store.resolve(raw))
    }

    /// The stored object, without resolving references.
    pub fn get_raw(&self, key: &str) -> Option<&Object> {
        self.map.get(&Name::new(key))
    }

    pub fn get_ref(&self, key: &str) -> Option<ObjRef> {
        match self.map.get(&Name::new(key))? {
            Object::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(&Name::new(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A PDF array with typed, reference-resolving access.
#[derive(Clone, Debug, Default)]
pub struct Array {
    items: Arc<Vec<Object>>,
    store: Arc<Store>,
}

impl Array {
    pub fn from_objects(store: Arc<Store>, items: Vec<Object>) -> Self {
        Self {
            items: Arc::new(items),
            store,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get<T: FromObject>(&self, index: usize) -> Option<T> {
        let raw = self.items.get(index)?;

        T::from_object(self.store.resolve(raw))
    }

    pub fn raw(&self, index: usize) -> Option<&Object> {
        self.items.get(index)
    }

    /// Iterate over elements castable to `T`; elements of other types are
    /// skipped.
    pub fn iter<T: FromObject>(&self) -> impl Iterator<Item = T> + '_ {
        self.items
            .iter()
            .filter_map(|o| T::from_object(self.store.resolve(o)))
    }

    pub fn iter_raw(&self) -> impl Iterator<Item = Object> + '_ {
        self.items.iter().map(|o| self.store.resolve(o))
    }
}

/// A PDF stream: a dictionary plus its (already decoded) bytes.
///
/// Filter decoding is an external concern; constructors are expected to
/// hand over plain bytes.
#[derive(Clone, Debug)]
pub struct Stream {
    dict: Dict,
    data: Arc<[u8]>,
}

impl Stream {
    pub fn new(dict: Dict, data: Arc<[u8]>) -> Self {
        Self { dict, data }
    }

    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    pub fn decoded(&self) -> Arc<[u8]> {
        self.data.clone()
    }
}

/// Conversion from a (resolved) object into a concrete Rust type.
pub trait FromObject: Sized {
    fn from_object(obj: Object) -> Option<Self>;
}

impl FromObject for Object {
    fn from_object(obj: Object) -> Option<Self> {
        Some(obj)
    }
}

impl FromObject for bool {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromObject for Number {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::Number(n) => Some(n),
            _ => None,
        }
    }
}

macro_rules! from_number {
    ($t:ty, $conv:expr) => {
        impl FromObject for $t {
            fn from_object(obj: Object) -> Option<Self> {
                Number::from_object(obj).map($conv)
            }
        }
    };
}

from_number!(f32, |n: Number| n.as_f32());
from_number!(f64, |n: Number| n.as_f64());
from_number!(i64, |n: Number| n.as_i64());
from_number!(i32, |n: Number| n.as_i64() as i32);
from_number!(u32, |n: Number| n.as_i64().max(0) as u32);
from_number!(u16, |n: Number| n.as_i64().clamp(0, u16::MAX as i64) as u16);
from_number!(u8, |n: Number| n.as_i64().clamp(0, u8::MAX as i64) as u8);
from_number!(usize, |n: Number| n.as_i64().max(0) as usize);

impl FromObject for Name {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }
}

impl FromObject for Arc<[u8]> {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromObject for Array {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl FromObject for Dict {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::Dict(d) => Some(d),
            // Streams expose their dictionary; this mirrors how most PDF
            // consumers treat `dict-or-stream` positions.
            Object::Stream(s) => Some(s.dict().clone()),
            _ => None,
        }
    }
}

impl FromObject for Stream {
    fn from_object(obj: Object) -> Option<Self> {
        match obj {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_parse() {
        assert_eq!(Number::parse(b"42"), Some(Number::Int(42)));
        assert_eq!(Number::parse(b"-3"), Some(Number::Int(-3)));
        assert_eq!(Number::parse(b".5"), Some(Number::Real(0.5)));
        assert_eq!(Number::parse(b"4."), Some(Number::Real(4.0)));
        assert_eq!(Number::parse(b"-"), None);
    }

    #[test]
    fn dict_resolves_refs() {
        let mut store = Store::new();
        let r = ObjRef::new(7, 0);
        store.insert(r, Object::int(99));
        let store = Arc::new(store);

        let dict = Dict::from_pairs(store, [(Name::new("Size"), Object::Ref(r))]);

        assert_eq!(dict.get::<i64>("Size"), Some(99));
        assert!(matches!(dict.get_raw("Size"), Some(Object::Ref(_))));
        assert_eq!(dict.get_ref("Size"), Some(r));
    }

    #[test]
    fn dangling_ref_is_null() {
        let store = Arc::new(Store::new());
        let dict = Dict::from_pairs(
            store,
            [(Name::new("X"), Object::Ref(ObjRef::new(1, 0)))],
        );

        assert!(dict.get::<i64>("X").is_none());
    }
}

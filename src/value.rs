//! Runtime values: immediates plus generational references to heap objects.

slotmap::new_key_type! {
    /// Reference to an object in a [`Heap`](crate::heap::Heap).
    ///
    /// The reference does not keep its object alive. Once the collector
    /// sweeps the object, the slot's generation moves on and the reference
    /// stops resolving.
    pub struct ObjRef;
}

/// A runtime value as stored in table keys and values.
///
/// Immediates are never collected; only `Obj` can be nullified.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Char(char),
    Obj(ObjRef),
}

impl Value {
    #[inline]
    pub fn as_obj(self) -> Option<ObjRef> {
        match self {
            Value::Obj(obj) => Some(obj),
            _ => None,
        }
    }

    #[inline]
    pub fn is_immediate(self) -> bool {
        self.as_obj().is_none()
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::Obj(obj)
    }
}

/// Payload of a heap object.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Str(String),
    Real(f64),
    Pair(Value, Value),
    Vector(Vec<Value>),
}

impl Object {
    pub fn string(s: impl Into<String>) -> Self {
        Object::Str(s.into())
    }

    /// Visit every heap reference held by this object.
    pub(crate) fn for_each_child(&self, mut f: impl FnMut(ObjRef)) {
        match self {
            Object::Str(_) | Object::Real(_) => {}
            Object::Pair(car, cdr) => {
                car.as_obj().into_iter().chain(cdr.as_obj()).for_each(f);
            }
            Object::Vector(items) => {
                for v in items {
                    if let Some(obj) = v.as_obj() {
                        f(obj);
                    }
                }
            }
        }
    }
}

use crate::{*, error::*, types::*, session::*};
use std::{rc::Rc, ops::Range};

// Bytes of a value that doesn't live in the inspected process: results of remote calls, literals synthesized by us.
// Doesn't store the logical length; that's determined by the type, stored separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueBlob(Vec<u8>);

impl ValueBlob {
    pub fn new(v: u64) -> Self { Self(v.to_le_bytes().to_vec()) }
    pub fn from_vec(v: Vec<u8>) -> Self { Self(v) }
    pub fn from_slice(s: &[u8]) -> Self { Self(s.to_vec()) }

    pub fn as_slice(&self) -> &[u8] { &self.0 }

    pub fn byte_range(&self, r: Range<usize>) -> Result<Self> {
        if r.end > self.0.len() || r.start > r.end {
            return err!(Internal, "blob slice out of bounds: [{}, {}) > {}", r.start, r.end, self.0.len());
        }
        Ok(Self::from_slice(&self.0[r]))
    }
}

// Memory-backed values are read lazily; we only know where they are until someone asks for the bytes.
#[derive(Debug, Clone)]
pub enum AddrOrValueBlob {
    Addr(u64),
    Blob(ValueBlob),
}

impl AddrOrValueBlob {
    pub fn addr(&self) -> Option<u64> { match self { Self::Addr(a) => Some(*a), _ => None } }
    pub fn blob_ref(&self) -> Option<&ValueBlob> { match self { Self::Blob(b) => Some(b), _ => None } }

    pub fn read(&self, range: Range<usize>, session: &Session) -> Result<Vec<u8>> {
        match self {
            Self::Blob(b) => Ok(b.byte_range(range)?.0),
            Self::Addr(a) => {
                let mut buf = vec![0u8; range.len()];
                let start = a.checked_add(range.start as u64).ok_or_else(|| error!(MemoryAccess, "address overflow: 0x{:x}+{}", a, range.start))?;
                session.read_memory(start, &mut buf)?;
                Ok(buf)
            }
        }
    }

    fn offset(&self, off: usize, len: usize) -> Result<Self> {
        Ok(match self {
            Self::Addr(a) => Self::Addr(a.wrapping_add(off as u64)),
            Self::Blob(b) => Self::Blob(b.byte_range(off..off+len)?),
        })
    }
}

#[derive(Clone, Debug)]
pub struct Value {
    pub val: AddrOrValueBlob,
    pub type_: Rc<TypeInfo>,
}

impl Value {
    pub fn at(addr: u64, type_: Rc<TypeInfo>) -> Self { Self {val: AddrOrValueBlob::Addr(addr), type_} }
    pub fn from_blob(blob: ValueBlob, type_: Rc<TypeInfo>) -> Self { Self {val: AddrOrValueBlob::Blob(blob), type_} }

    pub fn addr(&self) -> Option<u64> { self.val.addr() }
    pub fn size(&self) -> usize { self.type_.calculate_size() }

    // Same location, different type. The target type's size is not checked against anything.
    pub fn reinterpret(&self, type_: &Rc<TypeInfo>) -> Value { Value {val: self.val.clone(), type_: type_.clone()} }

    pub fn read_bytes(&self, session: &Session) -> Result<Vec<u8>> {
        self.val.read(0..self.size(), session)
    }

    pub fn field(&self, name: &str) -> Result<Value> {
        let t = self.type_.strip_typedefs();
        if t.t.as_struct().is_none() {
            return err!(TypeResolution, "no field '{}': {} is a {}", name, self.type_, t.t.kind_name());
        }
        let f = match t.find_field(name) {
            Some(f) => f,
            None => return err!(TypeResolution, "no field '{}' in {}", name, self.type_),
        };
        Ok(Value {val: self.val.offset(f.offset, f.type_.calculate_size())?, type_: f.type_.clone()})
    }

    // Integer-like value (primitive, enum, pointer) as raw bits, zero-extended.
    pub fn read_uint(&self, session: &Session) -> Result<u64> {
        let size = self.size();
        if size == 0 || size > 8 {
            return err!(TooLong, "can't read {}-byte {} as integer", size, self.type_);
        }
        let bytes = self.val.read(0..size, session)?;
        let mut a = [0u8; 8];
        a[..size].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(a))
    }

    // Like read_uint(), but sign-extends signed primitives and enums with signed underlying type.
    pub fn read_int(&self, session: &Session) -> Result<i64> {
        Ok(int_from_bits(self.read_uint(session)?, &self.type_))
    }

    pub fn read_pointer(&self, session: &Session) -> Result<u64> {
        if !self.type_.strip_typedefs().is_pointer() {
            return err!(TypeResolution, "expected pointer, got {}", self.type_);
        }
        self.read_uint(session)
    }

    pub fn pointee_type(&self, session: &Session) -> Result<Rc<TypeInfo>> {
        let t = self.type_.strip_typedefs();
        match &t.t {
            Type::Pointer(p) => session.resolve_type_ref(&p.type_),
            _ => err!(TypeResolution, "expected pointer, got {}", self.type_),
        }
    }

    pub fn deref(&self, session: &Session) -> Result<Value> {
        let target = self.pointee_type(session)?;
        let addr = self.read_pointer(session)?;
        if addr == 0 {
            return err!(Decode, "null pointer");
        }
        Ok(Value::at(addr, target))
    }

    // `p[idx]` for a pointer p.
    pub fn pointer_element(&self, idx: u64, session: &Session) -> Result<Value> {
        let target = self.pointee_type(session)?;
        let addr = self.read_pointer(session)?;
        if addr == 0 {
            return err!(Decode, "null pointer");
        }
        let stride = target.calculate_size() as u64;
        let addr = idx.checked_mul(stride).and_then(|o| addr.checked_add(o)).ok_or_else(|| error!(Decode, "element {} of {} is out of address space", idx, self.type_))?;
        Ok(Value::at(addr, target))
    }

    // `a[idx]` for an array a, bounds-checked against the array's declared length.
    pub fn array_element(&self, idx: usize) -> Result<Value> {
        let t = self.type_.strip_typedefs();
        let a = match &t.t {
            Type::Array(a) => a,
            _ => return err!(TypeResolution, "expected array, got {}", self.type_),
        };
        if idx >= a.len {
            return err!(Decode, "index {} out of bounds of {}", idx, self.type_);
        }
        let stride = if a.stride == 0 {a.type_.calculate_size()} else {a.stride};
        Ok(Value {val: self.val.offset(idx * stride, a.type_.calculate_size())?, type_: a.type_.clone()})
    }

    // `&v`, as a pointer value synthesized locally.
    pub fn address_of(&self, session: &Session) -> Result<Value> {
        match self.addr() {
            Some(a) => Ok(Value::from_blob(ValueBlob::new(a), TypeInfo::pointer_to(&self.type_, session.pointer_size()))),
            None => err!(Usage, "value of type {} has no address", self.type_),
        }
    }
}

// Zero-extended bits of an integer-like value of type `t` -> its numeric value.
pub fn int_from_bits(x: u64, t: &Rc<TypeInfo>) -> i64 {
    let size = t.calculate_size();
    let signed = match &t.strip_typedefs().t {
        Type::Primitive(p) => p.contains(PrimitiveFlags::SIGNED),
        Type::Enum(e) => e.type_.strip_typedefs().t.as_primitive().map_or(false, |p| p.contains(PrimitiveFlags::SIGNED)),
        _ => false,
    };
    if signed && size > 0 && size < 8 && x & (1u64 << (size*8-1)) != 0 {
        return (x | !((1u64 << (size*8)) - 1)) as i64;
    }
    x as i64
}

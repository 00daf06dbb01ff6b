use crate::{*, error::*};
use std::{rc::Rc, fmt};
use bitflags::*;

// Type descriptors as handed over by the introspection API. Immutable once obtained; shared via Rc.
// Pointers refer to their target either directly or by name (forward declaration), because node types of linked structures
// point to themselves and an Rc graph can't express that. Named targets are resolved through the session's symbol cache on dereference.

bitflags! { pub struct PrimitiveFlags: u8 {
    const SIGNED = 0x1;
    const FLOAT = 0x2;
    // char/int8_t/uint8_t; arrays of these are shown as strings.
    const CHAR = 0x4;
    const BOOL = 0x8;
    const UNSPECIFIED = 0x10; // void
}}

#[derive(Clone, Debug)]
pub enum TypeRef {
    Resolved(Rc<TypeInfo>),
    Declared(String),
}
impl TypeRef {
    pub fn name(&self) -> &str { match self { Self::Resolved(t) => &t.name, Self::Declared(n) => n } }
}

#[derive(Clone, Debug)]
pub struct PointerType {
    pub type_: TypeRef,
}

#[derive(Clone, Debug)]
pub struct ArrayType {
    pub type_: Rc<TypeInfo>,
    pub len: usize,
    pub stride: usize,
}

#[derive(Clone, Debug)]
pub struct StructField {
    pub name: String,
    pub offset: usize, // bytes
    pub type_: Rc<TypeInfo>,
}
impl StructField {
    pub fn new(name: &str, offset: usize, type_: &Rc<TypeInfo>) -> Self { Self {name: name.to_string(), offset, type_: type_.clone()} }
}

#[derive(Clone, Debug, Default)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug)]
pub struct Enumerand {
    pub name: String,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub enumerands: Vec<Enumerand>,
    pub type_: Rc<TypeInfo>,
}

#[derive(Clone, Debug)]
pub enum Type {
    Unknown,
    Primitive(PrimitiveFlags),
    Pointer(PointerType),
    Array(ArrayType),
    Struct(StructType),
    Enum(EnumType),
    // Alias; `name` of the TypeInfo is the alias name.
    Typedef(Rc<TypeInfo>),
}
impl Type {
    pub fn as_primitive(&self) -> Option<PrimitiveFlags> { match self { &Type::Primitive(f) => Some(f), _ => None } }
    pub fn as_pointer(&self) -> Option<&PointerType> { match self { Type::Pointer(p) => Some(p), _ => None } }
    pub fn as_array(&self) -> Option<&ArrayType> { match self { Type::Array(a) => Some(a), _ => None } }
    pub fn as_struct(&self) -> Option<&StructType> { match self { Type::Struct(s) => Some(s), _ => None } }
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Unknown => "unknown",
            Type::Primitive(_) => "primitive type",
            Type::Pointer(_) => "pointer",
            Type::Array(_) => "array",
            Type::Struct(_) => "struct",
            Type::Enum(_) => "enum",
            Type::Typedef(_) => "typedef",
        }
    }
}

// Template argument of an instantiation: either a type (`Vector<int, ...>`) or an integer constant (`TypedBuffer<float, 4>`).
#[derive(Clone, Debug)]
pub enum TemplateArg {
    Type(Rc<TypeInfo>),
    Value(i64),
}

#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub name: String, // empty for anonymous types, including all pointers and arrays
    pub size: usize,
    pub t: Type,
    pub template_args: Vec<TemplateArg>,
}

impl TypeInfo {
    pub fn primitive(name: &str, size: usize, flags: PrimitiveFlags) -> Rc<TypeInfo> {
        Rc::new(TypeInfo {name: name.to_string(), size, t: Type::Primitive(flags), template_args: Vec::new()})
    }
    pub fn new_struct(name: &str, size: usize, fields: Vec<StructField>) -> Rc<TypeInfo> {
        Rc::new(TypeInfo {name: name.to_string(), size, t: Type::Struct(StructType {fields}), template_args: Vec::new()})
    }
    pub fn template_struct(name: &str, size: usize, fields: Vec<StructField>, template_args: Vec<TemplateArg>) -> Rc<TypeInfo> {
        Rc::new(TypeInfo {name: name.to_string(), size, t: Type::Struct(StructType {fields}), template_args})
    }
    pub fn new_enum(name: &str, underlying: &Rc<TypeInfo>, enumerands: &[(&str, i64)]) -> Rc<TypeInfo> {
        let enumerands = enumerands.iter().map(|(n, v)| Enumerand {name: n.to_string(), value: *v}).collect();
        Rc::new(TypeInfo {name: name.to_string(), size: underlying.size, t: Type::Enum(EnumType {enumerands, type_: underlying.clone()}), template_args: Vec::new()})
    }
    pub fn typedef(name: &str, target: &Rc<TypeInfo>) -> Rc<TypeInfo> {
        Rc::new(TypeInfo {name: name.to_string(), size: target.size, t: Type::Typedef(target.clone()), template_args: Vec::new()})
    }
    pub fn pointer_to(target: &Rc<TypeInfo>, pointer_size: usize) -> Rc<TypeInfo> {
        Self::pointer_to_ref(TypeRef::Resolved(target.clone()), pointer_size)
    }
    // Pointer to a type known only by name, resolved on dereference.
    pub fn pointer_to_declared(target_name: &str, pointer_size: usize) -> Rc<TypeInfo> {
        Self::pointer_to_ref(TypeRef::Declared(target_name.to_string()), pointer_size)
    }
    fn pointer_to_ref(type_: TypeRef, pointer_size: usize) -> Rc<TypeInfo> {
        Rc::new(TypeInfo {name: String::new(), size: pointer_size, t: Type::Pointer(PointerType {type_}), template_args: Vec::new()})
    }
    pub fn array_of(element: &Rc<TypeInfo>, len: usize) -> Rc<TypeInfo> {
        let stride = element.calculate_size();
        Rc::new(TypeInfo {name: String::new(), size: stride * len, t: Type::Array(ArrayType {type_: element.clone(), len, stride}), template_args: Vec::new()})
    }

    pub fn strip_typedefs(self: &Rc<Self>) -> Rc<TypeInfo> {
        let mut t = self.clone();
        for _ in 0..100 {
            let next = match &t.t {
                Type::Typedef(target) => target.clone(),
                _ => return t,
            };
            t = next;
        }
        t
    }

    // Names along the alias chain, from the declared name down to the stripped type's name. Empty names skipped.
    pub fn alias_names(self: &Rc<Self>) -> Vec<String> {
        let mut names = Vec::new();
        let mut t = self.clone();
        for _ in 0..100 {
            if !t.name.is_empty() {
                names.push(t.name.clone());
            }
            let next = match &t.t {
                Type::Typedef(target) => target.clone(),
                _ => break,
            };
            t = next;
        }
        names
    }

    pub fn calculate_size(&self) -> usize {
        match &self.t {
            Type::Typedef(target) if self.size == 0 => target.calculate_size(),
            Type::Enum(e) if self.size == 0 => e.type_.calculate_size(),
            Type::Array(a) if self.size == 0 => a.len * a.stride,
            _ => self.size,
        }
    }

    pub fn fields(&self) -> &[StructField] { match &self.t { Type::Struct(s) => &s.fields, _ => &[] } }
    pub fn find_field(&self, name: &str) -> Option<&StructField> { self.fields().iter().find(|f| f.name == name) }

    pub fn is_pointer(&self) -> bool { self.t.as_pointer().is_some() }

    // Array of 1-byte elements: the shape a string literal (and an encoded synthetic value) has.
    pub fn is_byte_array(&self) -> bool {
        match &self.t {
            Type::Array(a) => a.type_.strip_typedefs().calculate_size() == 1,
            _ => false,
        }
    }

    // "blender::Vector<int, 4, blender::GuardedAllocator>" -> "blender::Vector". None if not a template instantiation.
    pub fn template_head(&self) -> Option<&str> {
        if self.t.as_struct().is_none() {
            return None;
        }
        let i = self.name.find('<')?;
        let head = self.name[..i].trim_end();
        if head.is_empty() { None } else { Some(head) }
    }

    pub fn template_arg_type(&self, idx: usize) -> Result<Rc<TypeInfo>> {
        match self.template_args.get(idx) {
            Some(TemplateArg::Type(t)) => Ok(t.clone()),
            Some(TemplateArg::Value(v)) => err!(TypeResolution, "template argument {} of {} is a value ({}), expected a type", idx, self.name, v),
            None => err!(TypeResolution, "{} has no template argument {}", self.name, idx),
        }
    }

    pub fn template_arg_value(&self, idx: usize) -> Result<i64> {
        match self.template_args.get(idx) {
            Some(TemplateArg::Value(v)) => Ok(*v),
            Some(TemplateArg::Type(t)) => err!(TypeResolution, "template argument {} of {} is a type ({}), expected a value", idx, self.name, t),
            None => err!(TypeResolution, "{} has no template argument {}", self.name, idx),
        }
    }
}

// C-like spelling: "Mesh *", "char[64]", "blender::Vector<int>".
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.name.is_empty() {
            return write!(f, "{}", self.name);
        }
        match &self.t {
            Type::Pointer(p) => {
                match &p.type_ {
                    TypeRef::Resolved(t) => write!(f, "{}", t)?,
                    TypeRef::Declared(n) => write!(f, "{}", n)?,
                }
                write!(f, " *")
            }
            Type::Array(a) => write!(f, "{}[{}]", a.type_, a.len),
            t => write!(f, "<anonymous {}>", t.kind_name()),
        }
    }
}

pub struct BuiltinTypes {
    pub void: Rc<TypeInfo>,
    pub bool_: Rc<TypeInfo>,
    pub char8: Rc<TypeInfo>,
    pub u8_: Rc<TypeInfo>,
    pub i32_: Rc<TypeInfo>,
    pub u32_: Rc<TypeInfo>,
    pub i64_: Rc<TypeInfo>,
    pub u64_: Rc<TypeInfo>,
    pub f32_: Rc<TypeInfo>,
    pub f64_: Rc<TypeInfo>,
}
impl BuiltinTypes {
    pub fn new() -> Self {
        Self {
            void: TypeInfo::primitive("void", 0, PrimitiveFlags::UNSPECIFIED),
            bool_: TypeInfo::primitive("bool", 1, PrimitiveFlags::BOOL),
            char8: TypeInfo::primitive("char", 1, PrimitiveFlags::CHAR | PrimitiveFlags::SIGNED),
            u8_: TypeInfo::primitive("unsigned char", 1, PrimitiveFlags::empty()),
            i32_: TypeInfo::primitive("int", 4, PrimitiveFlags::SIGNED),
            u32_: TypeInfo::primitive("unsigned int", 4, PrimitiveFlags::empty()),
            i64_: TypeInfo::primitive("long", 8, PrimitiveFlags::SIGNED),
            u64_: TypeInfo::primitive("unsigned long", 8, PrimitiveFlags::empty()),
            f32_: TypeInfo::primitive("float", 4, PrimitiveFlags::FLOAT),
            f64_: TypeInfo::primitive("double", 8, PrimitiveFlags::FLOAT),
        }
    }
}

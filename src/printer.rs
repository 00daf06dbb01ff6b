use crate::{*, error::*, types::*, value::*, session::*, synthetic::*, util::*};
use serde::{Serialize, Deserialize};
use std::rc::Rc;

// How the host should lay out a node's children. For Map, consecutive children are (key, value) pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayHint {
    Plain,
    Array,
    Map,
}

// Anything the renderer can be asked to render.
#[derive(Clone, Debug)]
pub enum Renderable {
    MemoryBacked(Value),
    Synthetic(SyntheticValue),
}
impl Renderable {
    pub fn addr(&self) -> Option<u64> { match self { Self::MemoryBacked(v) => v.addr(), _ => None } }

    // For hosts that can only carry memory-like values around. Dispatch turns it back into the synthetic value.
    pub fn into_value(self, session: &Session) -> Result<Value> {
        match self {
            Self::MemoryBacked(v) => Ok(v),
            Self::Synthetic(s) => Ok(EncodedValue::encode(&s)?.into_value(&session.builtin_types.char8)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Child {
    pub label: String,
    pub value: Renderable,
}
impl Child {
    pub fn memory(label: impl Into<String>, v: Value) -> Self { Self {label: label.into(), value: Renderable::MemoryBacked(v)} }
    pub fn synthetic(label: impl Into<String>, v: SyntheticValue) -> Self { Self {label: label.into(), value: Renderable::Synthetic(v)} }
    pub fn text(label: impl Into<String>, s: impl Into<String>) -> Self { Self::synthetic(label, SyntheticValue::Text(s.into())) }
    pub fn diagnostic(label: impl Into<String>, e: &Error) -> Self { Self::synthetic(label, SyntheticValue::diagnostic(e)) }

    // Field-level containment: a failed field becomes an inline diagnostic under its own label. Cancellation passes through.
    pub fn from_result(label: impl Into<String>, r: Result<Value>) -> Result<Self> {
        match r {
            Ok(v) => Ok(Self::memory(label, v)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Ok(Self::diagnostic(label, &e)),
        }
    }
}

pub type ChildIter<'s> = Box<dyn Iterator<Item = Result<Child>> + 's>;

// Renderer capabilities. Children are produced lazily; nothing should be read before the consumer pulls the child that needs it.
// Iterators must be finite: bound every walk by a declared size and by Settings limits.
pub trait Printer {
    fn summary(&self, session: &Session) -> Result<Option<String>> { Ok(None) }
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> { Ok(None) }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Plain }
}

// Caps a child sequence at `max` items; if more are available, the last child is a "..." marker.
pub fn limit_children<'s>(iter: ChildIter<'s>, max: usize) -> ChildIter<'s> {
    let mut iter = iter.peekable();
    let mut count = 0usize;
    Box::new(std::iter::from_fn(move || {
        if count > max {
            return None;
        }
        if count == max {
            count += 1;
            return match iter.peek() {
                Some(_) => Some(Ok(Child::text("...", format!("<more than {} children>", max)))),
                None => None,
            };
        }
        count += 1;
        iter.next()
    }))
}

// One-line text for primitives, enums, pointers and char arrays. None for aggregates.
pub fn format_scalar(v: &Value, session: &Session) -> Result<Option<String>> {
    let t = v.type_.strip_typedefs();
    Ok(Some(match &t.t {
        Type::Primitive(p) if p.contains(PrimitiveFlags::UNSPECIFIED) => "void".to_string(),
        Type::Primitive(p) if p.contains(PrimitiveFlags::BOOL) => match v.read_uint(session)? { 0 => "false".to_string(), 1 => "true".to_string(), x => format!("<invalid bool {}>", x) },
        Type::Primitive(p) if p.contains(PrimitiveFlags::FLOAT) => {
            let bits = v.read_uint(session)?;
            match t.calculate_size() {
                4 => format!("{}", f32::from_bits(bits as u32)),
                8 => format!("{}", f64::from_bits(bits)),
                n => return err!(TooLong, "unsupported {}-byte float", n),
            }
        }
        Type::Primitive(p) if p.contains(PrimitiveFlags::CHAR) && t.calculate_size() == 1 => {
            let x = v.read_int(session)?;
            if (0x20..0x7f).contains(&x) { format!("{} '{}'", x, x as u8 as char) } else { format!("{}", x) }
        }
        Type::Primitive(p) if p.contains(PrimitiveFlags::SIGNED) => format!("{}", v.read_int(session)?),
        Type::Primitive(_) => format!("{}", v.read_uint(session)?),
        Type::Enum(e) => {
            let x = v.read_int(session)?;
            match e.enumerands.iter().find(|en| en.value == x) {
                Some(en) => en.name.clone(),
                None => format!("({}) {}", v.type_, x),
            }
        }
        Type::Pointer(_) => format!("0x{:x}", v.read_pointer(session)?),
        Type::Array(a) if t.is_byte_array() => {
            let len = a.len.min(session.settings.max_string_len);
            let bytes = v.val.read(0..len, session)?;
            let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
            let s = format!("{:?}", String::from_utf8_lossy(&bytes[..end]));
            if end == len && len < a.len { format!("{}...", s) } else { s }
        }
        Type::Unknown => "<unknown type>".to_string(),
        _ => return Ok(None),
    }))
}

// Fallback when no registered printer matches: scalars as text, structs as their declared fields, arrays element by element.
pub struct RawPrinter {
    pub value: Value,
}

impl Printer for RawPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        format_scalar(&self.value, session)
    }

    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let t = self.value.type_.strip_typedefs();
        match &t.t {
            Type::Struct(_) => Ok(Some(raw_field_children(&self.value))),
            Type::Array(a) if !t.is_byte_array() => {
                let value = self.value.clone();
                let iter = (0..a.len).map(move |i| Child::from_result(i.to_string(), value.array_element(i)));
                Ok(Some(limit_children(Box::new(iter), session.settings.max_children)))
            }
            _ => Ok(None),
        }
    }

    fn display_hint(&self) -> DisplayHint {
        match &self.value.type_.strip_typedefs().t {
            Type::Array(_) => DisplayHint::Array,
            _ => DisplayHint::Plain,
        }
    }
}

// The declared fields of a struct value, labelled by field name.
pub fn raw_field_children<'s>(value: &Value) -> ChildIter<'s> {
    let t = value.type_.strip_typedefs();
    let value = value.clone();
    let names: Vec<String> = t.fields().iter().map(|f| f.name.clone()).collect();
    Box::new(names.into_iter().enumerate().map(move |(i, name)| {
        let label = if name.is_empty() {i.to_string()} else {name.clone()};
        Child::from_result(label, value.field(&name))
    }))
}

// Scalars and records that were synthesized rather than read.
pub struct SyntheticPrinter {
    pub value: SyntheticValue,
}

impl Printer for SyntheticPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        Ok(match &self.value {
            SyntheticValue::Text(s) => Some(s.clone()),
            SyntheticValue::Int(x) => Some(x.to_string()),
            SyntheticValue::UInt(x) => Some(x.to_string()),
            SyntheticValue::Float(x) => Some(x.to_string()),
            SyntheticValue::Bool(x) => Some(x.to_string()),
            SyntheticValue::Address(x) => Some(format!("0x{:x}", x)),
            SyntheticValue::Diagnostic(m) => Some(format!("<{}>", m)),
            SyntheticValue::Record(r) => r.summary.clone(),
            SyntheticValue::MemoryRef {..} | SyntheticValue::LinkedList {..} => return err!(Internal, "{:?} must be dispatched, not printed", self.value),
        })
    }

    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        match &self.value {
            SyntheticValue::Record(r) => {
                let children: Vec<Result<Child>> = r.children.iter().map(|(label, v)| Ok(Child::synthetic(label.clone(), v.clone()))).collect();
                Ok(Some(limit_children(Box::new(children.into_iter()), session.settings.max_children)))
            }
            _ => Ok(None),
        }
    }

    fn display_hint(&self) -> DisplayHint {
        match &self.value {
            SyntheticValue::Record(r) => r.hint,
            _ => DisplayHint::Plain,
        }
    }
}

// "[Address]" item that record printers put first.
pub fn address_item(value: &Value) -> Option<Child> {
    value.addr().map(|a| Child::synthetic(item_label("Address"), SyntheticValue::Address(a)))
}

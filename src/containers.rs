use crate::{*, error::*, types::*, value::*, session::*, printer::*, api::*};
use std::rc::Rc;

// Decoders for the container layouts of Blender's BLI library. Factories only look at types and never touch memory,
// so that constructing a printer can't fail because of a bad pointer. All reads happen in summary()/children(), where
// failures are contained per value or per element.

// Upper bound for any size/count read from memory. Anything above is garbage, not a container.
pub const MAX_PLAUSIBLE_COUNT: u64 = 1 << 32;

fn read_count(value: &Value, field: &str, session: &Session) -> Result<u64> {
    let n = value.field(field)?.read_int(session)?;
    if n < 0 {
        return err!(Decode, "negative {} in {}: {}", field, value.type_, n);
    }
    if n as u64 > MAX_PLAUSIBLE_COUNT {
        return err!(Sanity, "implausible {} in {}: {}", field, value.type_, n);
    }
    Ok(n as u64)
}

// Hash tables don't store their size; it's derived from running counters. The counters are authoritative even if a scan
// of the slots would count differently (e.g. when reading in the middle of a rehash).
pub fn size_from_counters(value: &Value, session: &Session) -> Result<u64> {
    let occupied_and_removed = read_count(value, "occupied_and_removed_slots_", session)?;
    let removed = read_count(value, "removed_slots_", session)?;
    if removed > occupied_and_removed {
        return err!(Decode, "{} removed slots out of {} used", removed, occupied_and_removed);
    }
    Ok(occupied_and_removed - removed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Occupied,
    Removed,
}
impl SlotState {
    pub fn from_tag(tag: i64) -> Result<Self> {
        match tag {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Occupied),
            2 => Ok(Self::Removed),
            x => err!(Decode, "unrecognized slot state {}", x),
        }
    }
}

// Contiguous typed elements starting at a pointer. Elements are computed, not read.
#[derive(Clone)]
struct Elements {
    base: u64,
    stride: u64,
    len: u64,
    type_: Rc<TypeInfo>,
}
impl Elements {
    fn from_pointer(data: &Value, len: u64, session: &Session) -> Result<Self> {
        let type_ = data.pointee_type(session)?;
        let base = data.read_pointer(session)?;
        if base == 0 && len > 0 {
            return err!(Decode, "null data pointer with {} elements", len);
        }
        let stride = type_.calculate_size() as u64;
        if stride == 0 && len > 0 {
            return err!(Decode, "elements of {} have zero size", type_);
        }
        if len.checked_mul(stride).and_then(|n| base.checked_add(n)).is_none() {
            return err!(Decode, "{} elements of {} at 0x{:x} overflow the address space", len, type_, base);
        }
        Ok(Self {base, stride, len, type_})
    }

    fn get(&self, i: u64) -> Value { Value::at(self.base + i * self.stride, self.type_.clone()) }

    fn children<'s>(self, session: &'s Session) -> ChildIter<'s> {
        let iter = (0..self.len).map(move |i| -> Result<Child> { Ok(Child::memory(i.to_string(), self.get(i))) });
        limit_children(Box::new(iter), session.settings.max_children)
    }
}

// The slots_ array of a hash table: an Array<Slot> with data_ and size_.
fn slots(table: &Value, session: &Session) -> Result<Elements> {
    let slots = table.field("slots_")?;
    let count = read_count(&slots, "size_", session)?;
    Elements::from_pointer(&slots.field("data_")?, count, session)
}

fn check_fields(value: &Value, names: &[&str]) -> Result<()> {
    let t = value.type_.strip_typedefs();
    for name in names {
        if t.find_field(name).is_none() {
            return err!(NotContainer, "{} has no field '{}'", value.type_, name);
        }
    }
    Ok(())
}

fn template_arg_type(value: &Value, idx: usize) -> Result<Rc<TypeInfo>> { value.type_.strip_typedefs().template_arg_type(idx) }

fn template_arg_count(value: &Value, idx: usize) -> Result<usize> {
    let n = value.type_.strip_typedefs().template_arg_value(idx)?;
    if n < 0 || n as u64 > MAX_PLAUSIBLE_COUNT {
        return err!(Sanity, "bad size template argument {} in {}", n, value.type_);
    }
    Ok(n as usize)
}

// blender::Vector: [begin_, end_) with spare capacity up to capacity_end_.
pub struct VectorPrinter {
    value: Value,
}

impl VectorPrinter {
    fn layout(&self, session: &Session) -> Result<(Elements, u64)> {
        let begin_field = self.value.field("begin_")?;
        let begin = begin_field.read_pointer(session)?;
        let end = self.value.field("end_")?.read_pointer(session)?;
        let capacity_end = self.value.field("capacity_end_")?.read_pointer(session)?;
        let stride = begin_field.pointee_type(session)?.calculate_size() as u64;
        if end < begin || capacity_end < end {
            return err!(Decode, "vector pointers out of order: begin 0x{:x}, end 0x{:x}, capacity end 0x{:x}", begin, end, capacity_end);
        }
        if stride == 0 || (end - begin) % stride != 0 {
            return err!(Decode, "vector length of {} bytes is not a multiple of element size {}", end - begin, stride);
        }
        let len = (end - begin) / stride;
        if len > MAX_PLAUSIBLE_COUNT {
            return err!(Sanity, "implausible vector length {}", len);
        }
        Ok((Elements::from_pointer(&begin_field, len, session)?, (capacity_end - begin) / stride))
    }
}

impl Printer for VectorPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        let (elements, capacity) = self.layout(session)?;
        Ok(Some(format!("length: {}, capacity: {}", elements.len, capacity)))
    }
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        Ok(Some(self.layout(session)?.0.children(session)))
    }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_vector(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_fields(value, &["begin_", "end_", "capacity_end_"])?;
    value.field("begin_")?.pointee_type(session)?;
    Ok(Box::new(VectorPrinter {value: value.clone()}))
}

// blender::Set: open addressing, one state tag per slot, key stored in the slot's key_buffer_.
pub struct SetPrinter {
    value: Value,
    key_type: Rc<TypeInfo>,
}

impl Printer for SetPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        Ok(Some(format!("Size: {}", size_from_counters(&self.value, session)?)))
    }

    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let slots = slots(&self.value, session)?;
        let key_type = self.key_type.clone();
        let table_type = self.value.type_.clone();
        let iter = (0..slots.len).filter_map(move |i| {
            let slot = slots.get(i);
            let key = || -> Result<Option<Value>> {
                match SlotState::from_tag(slot.field("state_")?.read_int(session)?)? {
                    SlotState::Occupied => Ok(Some(slot.field("key_buffer_")?.reinterpret(&key_type))),
                    _ => Ok(None),
                }
            };
            match key() {
                Ok(Some(k)) => Some(Ok(Child::memory(i.to_string(), k))),
                Ok(None) => None,
                Err(e) if e.is_cancelled() => Some(Err(e)),
                Err(e) => {
                    session.report_contained(&format!("slot {} of {}", i, table_type), &e);
                    Some(Ok(Child::diagnostic(i.to_string(), &e)))
                }
            }
        });
        Ok(Some(limit_children(Box::new(iter), session.settings.max_children)))
    }

    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_set(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_fields(value, &["slots_", "occupied_and_removed_slots_", "removed_slots_"])?;
    Ok(Box::new(SetPrinter {value: value.clone(), key_type: template_arg_type(value, 0)?}))
}

// blender::Map. Slots of pointer-keyed maps have no state tag: the two largest pointer values mark empty and removed slots.
// Children come in (key, value) pairs, labelled by slot index.
pub struct MapPrinter {
    value: Value,
    key_type: Rc<TypeInfo>,
    value_type: Rc<TypeInfo>,
    pointer_keys: bool,
}

impl MapPrinter {
    fn entry(&self, slot: &Value, session: &Session) -> Result<Option<(Value, Value)>> {
        let occupied = if self.pointer_keys {
            let key = slot.field("key_")?.read_uint(session)?;
            let bits = (self.key_type.calculate_size() * 8).min(64);
            let max = if bits == 64 {u64::MAX} else {(1u64 << bits) - 1};
            key < max.saturating_sub(1)
        } else {
            SlotState::from_tag(slot.field("state_")?.read_int(session)?)? == SlotState::Occupied
        };
        if !occupied {
            return Ok(None);
        }
        let key = if self.pointer_keys {slot.field("key_")?} else {slot.field("key_buffer_")?.reinterpret(&self.key_type)};
        Ok(Some((key, slot.field("value_buffer_")?.reinterpret(&self.value_type))))
    }
}

impl Printer for MapPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        Ok(Some(format!("Size: {}", size_from_counters(&self.value, session)?)))
    }

    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let slots = slots(&self.value, session)?;
        let this = MapPrinter {value: self.value.clone(), key_type: self.key_type.clone(), value_type: self.value_type.clone(), pointer_keys: self.pointer_keys};
        let iter = (0..slots.len).flat_map(move |i| -> Vec<Result<Child>> {
            let (key_label, value_label) = (format!("[{}] key", i), format!("[{}] value", i));
            match this.entry(&slots.get(i), session) {
                Ok(Some((k, v))) => vec![Ok(Child::memory(key_label, k)), Ok(Child::memory(value_label, v))],
                Ok(None) => Vec::new(),
                Err(e) if e.is_cancelled() => vec![Err(e)],
                // Both halves, so the pairs stay aligned.
                Err(e) => {
                    session.report_contained(&format!("slot {} of {}", i, this.value.type_), &e);
                    vec![Ok(Child::diagnostic(key_label, &e)), Ok(Child::diagnostic(value_label, &e))]
                }
            }
        });
        Ok(Some(limit_children(Box::new(iter), session.settings.max_children & !1)))
    }

    fn display_hint(&self) -> DisplayHint { DisplayHint::Map }
}

pub fn new_map(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_fields(value, &["slots_", "occupied_and_removed_slots_", "removed_slots_"])?;
    let key_type = template_arg_type(value, 0)?;
    let pointer_keys = key_type.strip_typedefs().is_pointer();
    Ok(Box::new(MapPrinter {value: value.clone(), value_type: template_arg_type(value, 1)?, key_type, pointer_keys}))
}

// blender::MultiValueMap is a Map from key to Vector of values.
pub fn new_multi_value_map(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    new_map(&value.field("map_")?, session)
}

// blender::TypedBuffer<T, N>: untyped storage for N elements of T.
pub struct TypedBufferPrinter {
    array: Value,
}

impl Printer for TypedBufferPrinter {
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let array = self.array.clone();
        let len = array.type_.t.as_array().map_or(0, |a| a.len);
        let iter = (0..len).map(move |i| Child::from_result(i.to_string(), array.array_element(i)));
        Ok(Some(limit_children(Box::new(iter), session.settings.max_children)))
    }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_typed_buffer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    let elem = template_arg_type(value, 0)?;
    let len = template_arg_count(value, 1)?;
    let array_type = TypeInfo::array_of(&elem, len);
    if array_type.calculate_size() > value.size() {
        return err!(Decode, "{} elements of {} don't fit in {} ({} bytes)", len, elem, value.type_, value.size());
    }
    Ok(Box::new(TypedBufferPrinter {array: value.reinterpret(&array_type)}))
}

// blender::Array, Span, MutableSpan: data_ pointer and size_.
pub struct SlicePrinter {
    value: Value,
}

impl SlicePrinter {
    fn elements(&self, session: &Session) -> Result<Elements> {
        let len = read_count(&self.value, "size_", session)?;
        Elements::from_pointer(&self.value.field("data_")?, len, session)
    }
}

impl Printer for SlicePrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        Ok(Some(format!("Size: {}", read_count(&self.value, "size_", session)?)))
    }
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        Ok(Some(self.elements(session)?.children(session)))
    }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_slice(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_fields(value, &["data_", "size_"])?;
    value.field("data_")?.pointee_type(session)?;
    Ok(Box::new(SlicePrinter {value: value.clone()}))
}

// blender::VectorSet: keys are kept densely in keys_, in insertion order; the slots only index into it.
pub struct VectorSetPrinter {
    value: Value,
}

impl Printer for VectorSetPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        Ok(Some(format!("Size: {}", size_from_counters(&self.value, session)?)))
    }
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let len = size_from_counters(&self.value, session)?;
        Ok(Some(Elements::from_pointer(&self.value.field("keys_")?, len, session)?.children(session)))
    }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_vector_set(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_fields(value, &["keys_", "occupied_and_removed_slots_", "removed_slots_"])?;
    value.field("keys_")?.pointee_type(session)?;
    Ok(Box::new(VectorSetPrinter {value: value.clone()}))
}

// blender::VArray, VMutableArray: virtual arrays. Elements aren't necessarily stored anywhere, so each one is obtained
// by calling impl_->get(i) in the inspected process.
pub struct VArrayPrinter {
    value: Value,
}

impl VArrayPrinter {
    fn size(&self, session: &Session) -> Result<u64> {
        read_count(&self.value.field("impl_")?.deref(session)?, "size_", session)
    }
}

impl Printer for VArrayPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        Ok(Some(format!("Size: {}", self.size(session)?)))
    }
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let len = self.size(session)?;
        let imp = self.value.field("impl_")?;
        let iter = (0..len).map(move |i| Child::from_result(i.to_string(), session.call_method_on(&imp, "get", &[CallArg::Int(i as i64)])));
        Ok(Some(limit_children(Box::new(iter), session.settings.max_children)))
    }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_varray(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_fields(value, &["impl_"])?;
    if !value.field("impl_")?.type_.strip_typedefs().is_pointer() {
        return err!(NotContainer, "{}::impl_ is not a pointer", value.type_);
    }
    Ok(Box::new(VArrayPrinter {value: value.clone()}))
}

// blender::vec_struct_base<T, N>: small vectors of 2-4 components have x/y/z/w members, others a values[] array.
pub struct MathVectorPrinter {
    value: Value,
    len: usize,
}

impl MathVectorPrinter {
    fn component(&self, i: usize) -> Result<Value> {
        if (2..=4).contains(&self.len) {
            let name = ["x", "y", "z", "w"][i];
            if self.value.type_.strip_typedefs().find_field(name).is_some() {
                return self.value.field(name);
            }
        }
        self.value.field("values")?.array_element(i)
    }
}

impl Printer for MathVectorPrinter {
    fn summary(&self, session: &Session) -> Result<Option<String>> {
        let mut parts: Vec<String> = Vec::with_capacity(self.len);
        for i in 0..self.len {
            parts.push(format_scalar(&self.component(i)?, session)?.unwrap_or_else(|| "?".to_string()));
        }
        Ok(Some(format!("({})", parts.join(", "))))
    }
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let children: Vec<Result<Child>> = (0..self.len).map(|i| Child::from_result(i.to_string(), self.component(i))).collect();
        Ok(Some(Box::new(children.into_iter())))
    }
    fn display_hint(&self) -> DisplayHint { DisplayHint::Array }
}

pub fn new_math_vector(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    let len = template_arg_count(value, 1)?;
    if len == 0 || len > 16 {
        return err!(NotContainer, "{} is not a small vector", value.type_);
    }
    let p = MathVectorPrinter {value: value.clone(), len};
    p.component(len - 1)?;
    Ok(Box::new(p))
}

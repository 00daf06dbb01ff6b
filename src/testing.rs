// Fabricated type layouts for tests. Offsets are chosen for 8-byte pointers and don't need to match any real build.
use crate::{*, types::*, session::*, settings::*, snapshot::*, registry::*};
use std::{rc::Rc, sync::Arc};

// Each test gets a private printer table, so tests that replace the global one don't interfere.
pub fn session(image: MemoryImage) -> (Rc<MemoryImage>, Session) { session_with(image, Settings::default()) }

pub fn session_with(image: MemoryImage, settings: Settings) -> (Rc<MemoryImage>, Session) {
    let image = Rc::new(image);
    let s = Session::with_settings(image.clone(), settings).with_registry(Arc::new(Registry::new(default_printers())));
    (image, s)
}

pub fn round8(n: usize) -> usize { (n + 7) & !7 }

fn ptr(t: &Rc<TypeInfo>) -> Rc<TypeInfo> { TypeInfo::pointer_to(t, 8) }

pub fn vector_type(elem: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let p = ptr(elem);
    TypeInfo::template_struct(&format!("blender::Vector<{}, 4, blender::GuardedAllocator>", elem), 24,
        vec![StructField::new("begin_", 0, &p), StructField::new("end_", 8, &p), StructField::new("capacity_end_", 16, &p)],
        vec![TemplateArg::Type(elem.clone()), TemplateArg::Value(4)])
}

// data_ @0, size_ @8
pub fn array_type(elem: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    TypeInfo::template_struct(&format!("blender::Array<{}, 4, blender::GuardedAllocator>", elem), 16,
        vec![StructField::new("data_", 0, &ptr(elem)), StructField::new("size_", 8, &b.i64_)],
        vec![TemplateArg::Type(elem.clone()), TemplateArg::Value(4)])
}

pub fn span_type(head: &str, elem: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    TypeInfo::template_struct(&format!("{}<{}>", head, elem), 16,
        vec![StructField::new("data_", 0, &ptr(elem)), StructField::new("size_", 8, &b.i64_)],
        vec![TemplateArg::Type(elem.clone())])
}

pub fn typed_buffer_type(elem: &Rc<TypeInfo>, n: usize) -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    let size = elem.calculate_size() * n;
    TypeInfo::template_struct(&format!("blender::TypedBuffer<{}, {}>", elem, n), size,
        vec![StructField::new("buffer_", 0, &TypeInfo::array_of(&b.u8_, size))],
        vec![TemplateArg::Type(elem.clone()), TemplateArg::Value(n as i64)])
}

fn slot_state_type() -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    TypeInfo::new_enum("blender::SlotState", &b.u8_, &[("Empty", 0), ("Occupied", 1), ("Removed", 2)])
}

// state_ @0, key_buffer_ @8
pub fn set_slot_type(key: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let ks = round8(key.calculate_size());
    TypeInfo::template_struct(&format!("blender::SimpleSetSlot<{}>", key), 8 + ks,
        vec![StructField::new("state_", 0, &slot_state_type()), StructField::new("key_buffer_", 8, &typed_buffer_type(key, 1))],
        vec![TemplateArg::Type(key.clone())])
}

// Pointer keys: key_ @0, value_buffer_ @8. Otherwise: state_ @0, key_buffer_ @8, value_buffer_ @8+round8(key size).
pub fn map_slot_type(key: &Rc<TypeInfo>, value: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let ks = round8(key.calculate_size());
    let vs = round8(value.calculate_size());
    if key.strip_typedefs().is_pointer() {
        TypeInfo::template_struct(&format!("blender::IntrusiveMapSlot<{}, {}>", key, value), 8 + vs,
            vec![StructField::new("key_", 0, key), StructField::new("value_buffer_", 8, &typed_buffer_type(value, 1))],
            vec![TemplateArg::Type(key.clone()), TemplateArg::Type(value.clone())])
    } else {
        TypeInfo::template_struct(&format!("blender::SimpleMapSlot<{}, {}>", key, value), 8 + ks + vs,
            vec![StructField::new("state_", 0, &slot_state_type()), StructField::new("key_buffer_", 8, &typed_buffer_type(key, 1)), StructField::new("value_buffer_", 8 + ks, &typed_buffer_type(value, 1))],
            vec![TemplateArg::Type(key.clone()), TemplateArg::Type(value.clone())])
    }
}

pub const SLOTS_OFFSET: u64 = 32;

// removed_slots_ @0, occupied_and_removed_slots_ @8, usable_slots_ @16, slot_mask_ @24, slots_ @32
fn hash_table_type(name: String, slot: &Rc<TypeInfo>, template_args: Vec<TemplateArg>) -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    TypeInfo::template_struct(&name, 48,
        vec![StructField::new("removed_slots_", 0, &b.i64_), StructField::new("occupied_and_removed_slots_", 8, &b.i64_),
             StructField::new("usable_slots_", 16, &b.i64_), StructField::new("slot_mask_", 24, &b.u64_),
             StructField::new("slots_", SLOTS_OFFSET as usize, &array_type(slot))],
        template_args)
}

pub fn set_type(key: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    hash_table_type(format!("blender::Set<{}, 4, blender::DefaultProbingStrategy>", key), &set_slot_type(key), vec![TemplateArg::Type(key.clone())])
}

pub fn map_type(key: &Rc<TypeInfo>, value: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    hash_table_type(format!("blender::Map<{}, {}, 4, blender::DefaultProbingStrategy>", key, value), &map_slot_type(key, value),
        vec![TemplateArg::Type(key.clone()), TemplateArg::Type(value.clone())])
}

pub fn multi_value_map_type(key: &Rc<TypeInfo>, value: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let inner = map_type(key, &vector_type(value));
    TypeInfo::template_struct(&format!("blender::MultiValueMap<{}, {}>", key, value), inner.size,
        vec![StructField::new("map_", 0, &inner)],
        vec![TemplateArg::Type(key.clone()), TemplateArg::Type(value.clone())])
}

// removed_slots_ @0, occupied_and_removed_slots_ @8, keys_ @16
pub fn vector_set_type(key: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    TypeInfo::template_struct(&format!("blender::VectorSet<{}>", key), 24,
        vec![StructField::new("removed_slots_", 0, &b.i64_), StructField::new("occupied_and_removed_slots_", 8, &b.i64_), StructField::new("keys_", 16, &ptr(key))],
        vec![TemplateArg::Type(key.clone())])
}

// impl_ @0 -> {vtable @0, size_ @8}
pub fn varray_type(head: &str, elem: &Rc<TypeInfo>) -> Rc<TypeInfo> {
    let b = BuiltinTypes::new();
    let imp = TypeInfo::template_struct(&format!("blender::VArrayImpl<{}>", elem), 16,
        vec![StructField::new("_vptr", 0, &ptr(&b.void)), StructField::new("size_", 8, &b.i64_)],
        vec![TemplateArg::Type(elem.clone())]);
    TypeInfo::template_struct(&format!("{}<{}>", head, elem), 8,
        vec![StructField::new("impl_", 0, &ptr(&imp))],
        vec![TemplateArg::Type(elem.clone())])
}

pub fn math_vector_type(elem: &Rc<TypeInfo>, n: usize) -> Rc<TypeInfo> {
    let stride = elem.calculate_size();
    let fields = if (2..=4).contains(&n) {
        ["x", "y", "z", "w"][..n].iter().enumerate().map(|(i, name)| StructField::new(name, i * stride, elem)).collect()
    } else {
        vec![StructField::new("values", 0, &TypeInfo::array_of(elem, n))]
    };
    TypeInfo::template_struct(&format!("blender::vec_struct_base<{}, {}>", elem, n), stride * n, fields,
        vec![TemplateArg::Type(elem.clone()), TemplateArg::Value(n as i64)])
}

pub fn write_counters(image: &mut MemoryImage, table_addr: u64, occupied_and_removed: i64, removed: i64) {
    image.write_i64(table_addr, removed);
    image.write_i64(table_addr + 8, occupied_and_removed);
}

// Points the table's slots_ array at `data` with `count` slots.
pub fn write_slots(image: &mut MemoryImage, table_addr: u64, data: u64, count: i64) {
    image.write_u64(table_addr + SLOTS_OFFSET, data);
    image.write_i64(table_addr + SLOTS_OFFSET + 8, count);
}

pub const OB_MESH: i64 = 1;
pub const OB_LAMP: i64 = 10;
pub const OB_CAMERA: i64 = 11;

// Small subset of Blender's DNA structs.
pub struct Dna {
    pub id: Rc<TypeInfo>,           // next @0, prev @8, name[66] @16; 88 bytes
    pub object: Rc<TypeInfo>,       // id @0, type @88, data @96
    pub mesh: Rc<TypeInfo>,         // id @0, totvert @88
    pub light: Rc<TypeInfo>,        // id @0, energy @88
    pub camera: Rc<TypeInfo>,       // id @0, lens @88
    pub scene: Rc<TypeInfo>,        // id @0, r_cfra @88; no dedicated printer
    pub link_data: Rc<TypeInfo>,    // next @0, prev @8, data @16
    pub list_base: Rc<TypeInfo>,    // first @0, last @8
    pub modifier_data: Rc<TypeInfo>, // next @0, prev @8, type @16, name[64] @20
    pub constraint: Rc<TypeInfo>,   // next @0, prev @8, name[64] @16
    pub operator: Rc<TypeInfo>,     // idname[64] @0, ptr @64
}

impl Dna {
    pub fn new() -> Self {
        let b = BuiltinTypes::new();
        let void_ptr = ptr(&b.void);
        let id = TypeInfo::new_struct("ID", 88, vec![
            StructField::new("next", 0, &TypeInfo::pointer_to_declared("ID", 8)), StructField::new("prev", 8, &TypeInfo::pointer_to_declared("ID", 8)),
            StructField::new("name", 16, &TypeInfo::array_of(&b.char8, 66))]);
        let with_id = |name: &str, field: &str, t: &Rc<TypeInfo>| TypeInfo::new_struct(name, 96, vec![StructField::new("id", 0, &id), StructField::new(field, 88, t)]);
        let object = TypeInfo::new_struct("Object", 104, vec![StructField::new("id", 0, &id), StructField::new("type", 88, &b.i32_), StructField::new("data", 96, &void_ptr)]);
        let link = |name: &str| TypeInfo::pointer_to_declared(name, 8);
        Self {
            mesh: with_id("Mesh", "totvert", &b.i32_),
            light: with_id("Light", "energy", &b.f32_),
            camera: with_id("Camera", "lens", &b.f32_),
            scene: with_id("Scene", "r_cfra", &b.i32_),
            link_data: TypeInfo::new_struct("LinkData", 24, vec![StructField::new("next", 0, &link("LinkData")), StructField::new("prev", 8, &link("LinkData")), StructField::new("data", 16, &void_ptr)]),
            list_base: TypeInfo::new_struct("ListBase", 16, vec![StructField::new("first", 0, &void_ptr), StructField::new("last", 8, &void_ptr)]),
            modifier_data: TypeInfo::new_struct("ModifierData", 88, vec![
                StructField::new("next", 0, &link("ModifierData")), StructField::new("prev", 8, &link("ModifierData")),
                StructField::new("type", 16, &b.i32_), StructField::new("name", 20, &TypeInfo::array_of(&b.char8, 64))]),
            constraint: TypeInfo::new_struct("bConstraint", 80, vec![
                StructField::new("next", 0, &link("bConstraint")), StructField::new("prev", 8, &link("bConstraint")),
                StructField::new("name", 16, &TypeInfo::array_of(&b.char8, 64))]),
            operator: TypeInfo::new_struct("wmOperator", 72, vec![StructField::new("idname", 0, &TypeInfo::array_of(&b.char8, 64)), StructField::new("ptr", 64, &void_ptr)]),
            object,
            id,
        }
    }

    // Types and enumerators, so that name lookups from printers succeed.
    pub fn register(&self, image: &mut MemoryImage) {
        for t in [&self.id, &self.object, &self.mesh, &self.light, &self.camera, &self.scene, &self.link_data, &self.list_base, &self.modifier_data, &self.constraint, &self.operator] {
            image.add_type(t.clone());
        }
        let b = BuiltinTypes::new();
        image.add_const("OB_MESH", &b.i32_, OB_MESH);
        image.add_const("OB_LAMP", &b.i32_, OB_LAMP);
        image.add_const("OB_CAMERA", &b.i32_, OB_CAMERA);
    }

    pub fn image() -> (Self, MemoryImage) {
        let dna = Self::new();
        let mut image = MemoryImage::new();
        dna.register(&mut image);
        (dna, image)
    }
}

// An ID header: null next/prev and the given name.
pub fn write_id(image: &mut MemoryImage, addr: u64, name: &str) {
    image.write_u64(addr, 0);
    image.write_u64(addr + 8, 0);
    image.write_c_string(addr + 16, name, 66);
    image.write(addr + 82, &[0u8; 6]);
}

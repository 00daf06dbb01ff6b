use crate::{*, error::*, types::*, value::*, session::*, printer::*, synthetic::*, api::*, lists::*, util::*};

// Printers for Blender's DNA records. Each shows "[Address]", then the record's own items labelled "[Key]",
// then the declared fields as they are.

pub type ItemsFn = fn(&Value, &Session) -> Result<Vec<Child>>;

pub struct StructPrinter {
    value: Value,
    items: ItemsFn,
}

impl Printer for StructPrinter {
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let value = self.value.clone();
        let items = self.items;
        let head = address_item(&self.value).map(Ok).into_iter();
        // Computed on first pull. A failure here becomes one diagnostic child; the raw fields still follow.
        let own = std::iter::once(()).flat_map(move |()| match items(&value, session) {
            Ok(children) => children.into_iter().map(Ok).collect::<Vec<Result<Child>>>(),
            Err(e) => vec![Err(e)],
        });
        Ok(Some(Box::new(head.chain(own).chain(raw_field_children(&self.value)))))
    }
}

fn check_struct(value: &Value) -> Result<()> {
    if value.type_.strip_typedefs().t.as_struct().is_none() {
        return err!(NotContainer, "{} is not a struct", value.type_);
    }
    Ok(())
}

fn struct_printer(value: &Value, items: ItemsFn) -> Result<Box<dyn Printer>> {
    check_struct(value)?;
    Ok(Box::new(StructPrinter {value: value.clone(), items}))
}

// Contents of a char array up to the first NUL. Unreadable memory gives an empty string, invalid UTF-8 a marker.
pub fn read_c_string(value: &Value, session: &Session) -> Result<String> {
    let len = value.size().min(session.settings.max_string_len);
    let bytes = match value.val.read(0..len, session) {
        Ok(b) => b,
        // The array may straddle the end of a mapping while the string itself doesn't.
        Err(e) if e.is_memory_access() => {
            let mut b: Vec<u8> = Vec::new();
            for i in 0..len {
                match value.val.read(i..i+1, session) {
                    Ok(c) if c[0] != 0 => b.push(c[0]),
                    Ok(_) => break,
                    Err(e) if e.is_memory_access() => return Ok(String::new()),
                    Err(e) => return Err(e),
                }
            }
            b
        }
        Err(e) => return Err(e),
    };
    Ok(match c_string_from_bytes(&bytes) {
        Ok(s) => s,
        Err(_) => "<utf8 decode error>".to_string(),
    })
}

fn name_item(key: &str, value: &Value, field: &str, session: &Session) -> Result<Child> {
    Ok(Child::text(item_label(key), read_c_string(&value.field(field)?, session)?))
}

// Asks the inspected process whether this is an original datablock or an evaluated copy.
pub fn is_original_id(id: &Value, session: &Session) -> Result<bool> {
    let address = id.addr().ok_or_else(|| error!(Usage, "{} value has no address", id.type_))?;
    let arg = CallArg::Pointer {address, type_: TypeInfo::pointer_to(&id.type_, session.pointer_size())};
    Ok(session.call_function("DEG_is_original_id", &[arg])?.read_uint(session)? != 0)
}

pub fn id_items(id: &Value, session: &Session) -> Result<Vec<Child>> {
    let mut items = vec![name_item("Name", id, "name", session)?];
    items.push(match is_original_id(id, session) {
        Ok(b) => Child::synthetic(item_label("Is Original"), SyntheticValue::Bool(b)),
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            session.report_contained("DEG_is_original_id", &e);
            Child::diagnostic(item_label("Is Original"), &e)
        }
    });
    Ok(items)
}

// Object::data points to the object's type-specific datablock; which one is determined by Object::type.
const OBJECT_DATA_TYPES: [(&str, &str); 3] = [("OB_MESH", "Mesh"), ("OB_LAMP", "Light"), ("OB_CAMERA", "Camera")];

pub fn object_items(object: &Value, session: &Session) -> Result<Vec<Child>> {
    let mut items = id_items(&object.field("id")?, session)?;
    let object_type = object.field("type")?.read_int(session)?;
    let data = object.field("data")?;
    for (enum_name, type_name) in OBJECT_DATA_TYPES {
        let x = match session.resolve_enum(enum_name) {
            Ok(x) => x,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                session.report_contained("object type", &e);
                continue;
            }
        };
        if x == object_type {
            let data = session.resolve_type(&format!("{} *", type_name)).map(|t| data.reinterpret(&t));
            items.push(Child::from_result(item_label(format!("{} Data", type_name)), data)?);
            return Ok(items);
        }
    }
    items.push(Child::memory(item_label("Data"), data));
    Ok(items)
}

pub fn operator_items(op: &Value, session: &Session) -> Result<Vec<Child>> {
    Ok(vec![name_item("Idname", op, "idname", session)?])
}

pub fn modifier_items(modifier: &Value, session: &Session) -> Result<Vec<Child>> {
    let mut items = vec![name_item("Name", modifier, "name", session)?];
    if let Some(address) = modifier.addr() {
        items.push(Child::synthetic(item_label("Modifier List"), SyntheticValue::LinkedList {any_link_address: address, data_type: "ModifierData".to_string()}));
    }
    Ok(items)
}

pub fn constraint_items(constraint: &Value, session: &Session) -> Result<Vec<Child>> {
    Ok(vec![name_item("Name", constraint, "name", session)?])
}

// ListBase is untyped: links are walked as LinkData, whose first member is `next` like in every linkable DNA struct.
// The chain is walked once to count it, keeping nothing, and then again as the link items are pulled.
pub fn list_base_items<'s>(list: &Value, session: &'s Session) -> ChildIter<'s> {
    let first = match list.field("first").and_then(|f| Ok(f.reinterpret(&session.resolve_type("LinkData *")?))) {
        Ok(f) => f,
        Err(e) => return Box::new(std::iter::once(Err(e))),
    };
    let mut length = 0u64;
    for link in PointerChain::new(first.clone(), "next", session) {
        match link {
            Ok(_) => length += 1,
            Err(e) if e.is_memory_access() => return Box::new(std::iter::once(Ok(Child::text(item_label("Length"), "<memory error>")))),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        }
    }
    let links = PointerChain::new(first, "next", session).enumerate().map(|(i, link)| -> Result<Child> { Ok(Child::memory(item_label(i), link?)) });
    let length_item = Child::synthetic(item_label("Length"), SyntheticValue::UInt(length));
    Box::new(std::iter::once(Ok(length_item)).chain(limit_children(Box::new(links), session.settings.max_children)))
}

pub struct ListBasePrinter {
    value: Value,
}

impl Printer for ListBasePrinter {
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let value = self.value.clone();
        let head = address_item(&self.value).map(Ok).into_iter();
        let items = std::iter::once(()).flat_map(move |()| list_base_items(&value, session));
        Ok(Some(Box::new(head.chain(items).chain(raw_field_children(&self.value)))))
    }
}

// Anything that starts with an ID header.
pub fn generic_id_items(value: &Value, session: &Session) -> Result<Vec<Child>> {
    id_items(&value.field("id")?, session)
}

pub fn new_id_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> { struct_printer(value, id_items) }
pub fn new_object_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> { struct_printer(value, object_items) }
pub fn new_operator_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> { struct_printer(value, operator_items) }
pub fn new_modifier_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> { struct_printer(value, modifier_items) }
pub fn new_constraint_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> { struct_printer(value, constraint_items) }
pub fn new_list_base_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    check_struct(value)?;
    Ok(Box::new(ListBasePrinter {value: value.clone()}))
}
pub fn new_generic_id_printer(value: &Value, session: &Session) -> Result<Box<dyn Printer>> { struct_printer(value, generic_id_items) }

#[cfg(test)]
mod tests {
    use crate::{*, records::*, snapshot::*, testing::*};

    fn children(s: &Session, p: &dyn Printer) -> Vec<Child> {
        p.children(s).unwrap().unwrap().map(|c| c.unwrap()).collect()
    }

    fn labels(c: &[Child]) -> Vec<&str> { c.iter().map(|c| c.label.as_str()).collect() }

    fn text(c: &Child) -> String {
        match &c.value {
            Renderable::Synthetic(SyntheticValue::Text(t)) => t.clone(),
            r => panic!("{:?}", r),
        }
    }

    fn original_ids(image: &mut MemoryImage, original: u64) {
        let b = BuiltinTypes::new();
        image.add_function("DEG_is_original_id", move |_, args| match args {
            [CallArg::Pointer {address, type_}] if format!("{}", type_) == "ID *" =>
                Ok(Value::from_blob(ValueBlob::from_vec(vec![(*address == original) as u8]), b.bool_.clone())),
            _ => err!(Evaluation, "bad arguments"),
        });
    }

    #[test]
    fn object_with_mesh() {
        let (dna, mut image) = Dna::image();
        write_id(&mut image, 0x10000, "OBCube");
        image.write_i32(0x10000 + 88, OB_MESH as i32);
        image.write(0x10000 + 92, &[0u8; 4]);
        image.write_u64(0x10000 + 96, 0x20000);
        original_ids(&mut image, 0x10000);
        let (_image, s) = session(image);
        let p = new_object_printer(&Value::at(0x10000, dna.object.clone()), &s).unwrap();
        let c = children(&s, &*p);
        assert_eq!(labels(&c), vec!["[Address]", "[Name]", "[Is Original]", "[Mesh Data]", "id", "type", "data"]);
        assert!(matches!(c[0].value, Renderable::Synthetic(SyntheticValue::Address(0x10000))));
        assert_eq!(text(&c[1]), "OBCube");
        assert!(matches!(c[2].value, Renderable::Synthetic(SyntheticValue::Bool(true))));
        match &c[3].value {
            Renderable::MemoryBacked(v) => {
                assert_eq!(format!("{}", v.type_), "Mesh *");
                assert_eq!(v.read_pointer(&s).unwrap(), 0x20000);
            }
            r => panic!("{:?}", r),
        }
    }

    #[test]
    fn object_data_kinds() {
        for (kind, label) in [(OB_CAMERA, "[Camera Data]"), (OB_LAMP, "[Light Data]"), (0, "[Data]")] {
            let (dna, mut image) = Dna::image();
            write_id(&mut image, 0x10000, "OBThing");
            image.write_i32(0x10000 + 88, kind as i32);
            image.write(0x10000 + 92, &[0u8; 12]);
            let (_image, s) = session(image);
            let p = new_object_printer(&Value::at(0x10000, dna.object.clone()), &s).unwrap();
            let c = children(&s, &*p);
            assert_eq!(c[3].label, label);
            // No remote evaluation in this image: contained.
            match &c[2].value {
                Renderable::Synthetic(v) => assert!(v.is_diagnostic()),
                r => panic!("{:?}", r),
            }
        }
    }

    #[test]
    fn names() {
        let (dna, mut image) = Dna::image();
        image.write(0x5000, b"Cube\0");
        image.write(0x6000, &[0xff, 0xfe, 0x41, 0]);
        image.write(0x6004, &[0u8; 60]);
        let (_image, s) = session(image);
        let name = |addr: u64| read_c_string(&Value::at(addr, TypeInfo::array_of(&s.builtin_types.char8, 64)), &s).unwrap();
        // Only the first 5 bytes are mapped.
        assert_eq!(name(0x5000), "Cube");
        assert_eq!(name(0x6000), "<utf8 decode error>");
        assert_eq!(name(0x7000), "");
        let p = new_operator_printer(&Value::at(0x5000, dna.operator.clone()), &s).unwrap();
        let c = children(&s, &*p);
        assert_eq!(labels(&c)[..2], ["[Address]", "[Idname]"]);
        assert_eq!(text(&c[1]), "Cube");
    }

    #[test]
    fn list_base() {
        let (dna, mut image) = Dna::image();
        for i in 0..3u64 {
            image.write_u64(0x1000 + i * 0x100, if i < 2 {0x1000 + (i + 1) * 0x100} else {0});
            image.write(0x1008 + i * 0x100, &[0u8; 16]);
        }
        image.write_u64(0x100, 0x1000);
        image.write_u64(0x108, 0x1200);
        image.write_u64(0x200, 0x9000);
        image.write_u64(0x208, 0x9000);
        let (_image, s) = session(image);
        let p = new_list_base_printer(&Value::at(0x100, dna.list_base.clone()), &s).unwrap();
        let c = children(&s, &*p);
        assert_eq!(labels(&c), vec!["[Address]", "[Length]", "[0]", "[1]", "[2]", "first", "last"]);
        assert!(matches!(c[1].value, Renderable::Synthetic(SyntheticValue::UInt(3))));

        let broken = new_list_base_printer(&Value::at(0x200, dna.list_base.clone()), &s).unwrap();
        let c = children(&s, &*broken);
        assert_eq!(labels(&c), vec!["[Address]", "[Length]", "first", "last"]);
        assert_eq!(text(&c[1]), "<memory error>");
    }

    #[test]
    fn list_base_links_read_on_demand() {
        let (dna, mut image) = Dna::image();
        let n = 2000u64;
        // LinkData nodes back to back, 24 bytes each: next, prev, data.
        for i in 0..n {
            let node = 0x10000 + i * 24;
            image.write_u64(node, if i + 1 < n {node + 24} else {0});
            image.write(node + 8, &[0u8; 16]);
        }
        image.write_u64(0x100, 0x10000);
        image.write_u64(0x108, 0x10000 + (n - 1) * 24);
        let (_image, s) = session(image);
        let p = new_list_base_printer(&Value::at(0x100, dna.list_base.clone()), &s).unwrap();
        let mut c = p.children(&s).unwrap().unwrap();
        assert_eq!(c.next().unwrap().unwrap().label, "[Address]");
        let length = c.next().unwrap().unwrap();
        assert_eq!(length.label, "[Length]");
        assert!(matches!(length.value, Renderable::Synthetic(SyntheticValue::UInt(2000))));
        let link = c.next().unwrap().unwrap();
        assert_eq!(link.label, "[0]");
        // Each further link is read only when it's pulled.
        s.request_cancel();
        assert!(c.next().unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    fn modifier_list_item() {
        let (dna, mut image) = Dna::image();
        image.write(0x1000, &[0u8; 20]);
        image.write_c_string(0x1014, "Subdivision", 64);
        image.write(0x1054, &[0u8; 4]);
        let (_image, s) = session(image);
        let p = new_modifier_printer(&Value::at(0x1000, dna.modifier_data.clone()), &s).unwrap();
        let c = children(&s, &*p);
        assert_eq!(text(&c[1]), "Subdivision");
        match &c[2].value {
            Renderable::Synthetic(SyntheticValue::LinkedList {any_link_address, data_type}) => {
                assert_eq!(*any_link_address, 0x1000);
                assert_eq!(data_type, "ModifierData");
            }
            r => panic!("{:?}", r),
        }
    }

    #[test]
    fn failed_items_dont_hide_fields() {
        let (dna, mut image) = Dna::image();
        image.write_c_string(0x1000, "x", 66);
        let (_image, s) = session(image);
        // Object whose `type` field is unmapped.
        let p = new_object_printer(&Value::at(0xf00, dna.object.clone()), &s).unwrap();
        let c: Vec<Result<Child>> = p.children(&s).unwrap().unwrap().collect();
        assert!(c[0].is_ok());
        assert!(c[1].as_ref().unwrap_err().is_memory_access());
        assert_eq!(c.len(), 5);
        assert_eq!(c[4].as_ref().unwrap().label, "data");
        assert!(new_list_base_printer(&Value::at(0x100, s.builtin_types.i32_.clone()), &s).is_err());
    }
}

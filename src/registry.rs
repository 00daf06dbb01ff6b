use crate::{*, error::*, types::*, value::*, session::*, printer::*, synthetic::*, containers::*, records::*, lists::*};
use std::sync::{Arc, OnceLock, RwLock};

// Maps a value's type to a printer. Entries are matched in fixed phases, and within a phase in table order:
//  1. sentinel-prefixed byte arrays decode into synthetic values (not in the table; always first),
//  2. pointers to a few structs are dereferenced and the pointee dispatched,
//  3. exact type name, trying every name along the typedef chain,
//  4. template head ("blender::Vector" for "blender::Vector<int, 4, ...>"),
//  5. structural predicates, e.g. "first field is `ID id`".
// A factory that fails (missing field, unresolvable type) just means "no match"; lookup moves on.
// No match at all falls back to RawPrinter.

pub type PrinterFactory = fn(&Value, &Session) -> Result<Box<dyn Printer>>;

#[derive(Clone)]
pub enum Matcher {
    PointerToStruct(Vec<String>),
    Exact(String),
    TemplateHead(String),
    // Struct whose first declared field is named `field` and has type `base`.
    BaseRecord {field: String, base: String},
    Predicate(fn(&TypeInfo) -> bool),
}

#[derive(Clone)]
pub struct PrinterEntry {
    pub name: String,
    pub matcher: Matcher,
    pub factory: PrinterFactory,
}
impl PrinterEntry {
    pub fn new(name: &str, matcher: Matcher, factory: PrinterFactory) -> Self { Self {name: name.to_string(), matcher, factory} }
    pub fn exact(type_name: &str, factory: PrinterFactory) -> Self { Self::new(type_name, Matcher::Exact(type_name.to_string()), factory) }
    pub fn template(head: &str, factory: PrinterFactory) -> Self { Self::new(head, Matcher::TemplateHead(head.to_string()), factory) }
}

pub struct Registry {
    entries: RwLock<Arc<Vec<PrinterEntry>>>,
}

impl Registry {
    pub fn new(entries: Vec<PrinterEntry>) -> Self { Self {entries: RwLock::new(Arc::new(entries))} }

    // Last registration wins: the whole table is swapped, entries aren't merged.
    pub fn replace(&self, entries: Vec<PrinterEntry>) {
        let mut lock = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *lock = Arc::new(entries);
    }

    pub fn entries(&self) -> Arc<Vec<PrinterEntry>> { self.entries.read().unwrap_or_else(|e| e.into_inner()).clone() }

    // Phases 2-5. Ok(None) if nothing matched.
    pub fn lookup(&self, value: &Value, session: &Session) -> Result<Option<(String, Box<dyn Printer>)>> {
        let entries = self.entries();
        let t = value.type_.strip_typedefs();

        if let Some(ptr) = t.t.as_pointer() {
            let target_names = match &ptr.type_ {
                TypeRef::Resolved(target) => target.alias_names(),
                TypeRef::Declared(name) => vec![name.clone()],
            };
            for e in entries.iter() {
                if let Matcher::PointerToStruct(names) = &e.matcher {
                    if names.iter().any(|n| target_names.contains(n)) {
                        if let Some(found) = try_entry(e, value, session)? {
                            return Ok(Some(found));
                        }
                    }
                }
            }
            return Ok(None);
        }

        for name in value.type_.alias_names() {
            for e in entries.iter() {
                if matches!(&e.matcher, Matcher::Exact(n) if *n == name) {
                    if let Some(found) = try_entry(e, value, session)? {
                        return Ok(Some(found));
                    }
                }
            }
        }

        if let Some(head) = t.template_head() {
            for e in entries.iter() {
                if matches!(&e.matcher, Matcher::TemplateHead(h) if h == head) {
                    if let Some(found) = try_entry(e, value, session)? {
                        return Ok(Some(found));
                    }
                }
            }
        }

        for e in entries.iter() {
            let hit = match &e.matcher {
                Matcher::BaseRecord {field, base} => match t.fields().first() {
                    Some(f) => f.name == *field && f.type_.alias_names().contains(base),
                    None => false,
                },
                Matcher::Predicate(f) => f(&t),
                _ => false,
            };
            if hit {
                if let Some(found) = try_entry(e, value, session)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}

fn try_entry(e: &PrinterEntry, value: &Value, session: &Session) -> Result<Option<(String, Box<dyn Printer>)>> {
    match (e.factory)(value, session) {
        Ok(p) => Ok(Some((e.name.clone(), p))),
        Err(err) if err.is_cancelled() => Err(err),
        Err(err) => {
            log!(session.log.borrow_mut(), "printer '{}' doesn't apply to {}: {}", e.name, value.type_, err);
            Ok(None)
        }
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

// The process-wide table, initialized with default_printers(). Sessions use it unless given another.
pub fn global_registry() -> Arc<Registry> {
    GLOBAL.get_or_init(|| Arc::new(Registry::new(default_printers()))).clone()
}

// Replaces the global table. Existing sessions see the new table on their next lookup.
pub fn register_printers(entries: Vec<PrinterEntry>) {
    global_registry().replace(entries);
}

// Pointer indirection: render `Object *` like the Object it points to. Null or unprintable pointee = no match.
pub fn deref_and_dispatch(value: &Value, session: &Session) -> Result<Box<dyn Printer>> {
    let target = value.deref(session)?;
    match session.registry().lookup(&target, session)? {
        Some((_, p)) => Ok(p),
        None => err!(NotContainer, "no printer for {}", target.type_),
    }
}

pub fn default_printers() -> Vec<PrinterEntry> {
    vec![
        PrinterEntry::new("blender-pointer", Matcher::PointerToStruct(vec!["Object".to_string(), "wmOperator".to_string()]), deref_and_dispatch),

        PrinterEntry::exact("ID", new_id_printer),
        PrinterEntry::exact("Object", new_object_printer),
        PrinterEntry::exact("wmOperator", new_operator_printer),
        PrinterEntry::exact("ModifierData", new_modifier_printer),
        PrinterEntry::exact("bConstraint", new_constraint_printer),
        PrinterEntry::exact("ListBase", new_list_base_printer),

        PrinterEntry::template("blender::Vector", new_vector),
        PrinterEntry::template("blender::Set", new_set),
        PrinterEntry::template("blender::Map", new_map),
        PrinterEntry::template("blender::MultiValueMap", new_multi_value_map),
        PrinterEntry::template("blender::TypedBuffer", new_typed_buffer),
        PrinterEntry::template("blender::Array", new_slice),
        PrinterEntry::template("blender::VectorSet", new_vector_set),
        PrinterEntry::template("blender::VArray", new_varray),
        PrinterEntry::template("blender::VMutableArray", new_varray),
        PrinterEntry::template("blender::vec_struct_base", new_math_vector),
        PrinterEntry::template("blender::Span", new_slice),
        PrinterEntry::template("blender::MutableSpan", new_slice),

        PrinterEntry::new("blender-id", Matcher::BaseRecord {field: "id".to_string(), base: "ID".to_string()}, new_generic_id_printer),
    ]
}

// Renderable -> printer, including synthetic values and sentinel-encoded ones. Never fails for memory values;
// fails for synthetic references that can't be resolved.
pub fn dispatch(session: &Session, r: &Renderable) -> Result<Box<dyn Printer>> {
    dispatch_with_depth(session, r, 0)
}

// Encoded values can refer to memory that holds encoded values again.
const MAX_INDIRECTIONS: usize = 16;

fn dispatch_with_depth(session: &Session, r: &Renderable, depth: usize) -> Result<Box<dyn Printer>> {
    if depth > MAX_INDIRECTIONS {
        return err!(Sanity, "more than {} levels of synthetic indirection", MAX_INDIRECTIONS);
    }
    let value = match r {
        Renderable::Synthetic(v) => return synthetic_printer(session, v, depth),
        Renderable::MemoryBacked(v) => v,
    };
    if let Some(decoded) = extract_encoded(value, session) {
        return synthetic_printer(session, &decoded, depth);
    }
    match session.registry().lookup(value, session)? {
        Some((_, p)) => Ok(p),
        None => Ok(Box::new(RawPrinter {value: value.clone()})),
    }
}

fn synthetic_printer(session: &Session, v: &SyntheticValue, depth: usize) -> Result<Box<dyn Printer>> {
    match v {
        SyntheticValue::MemoryRef {address, type_name} => {
            let t = session.resolve_type(type_name)?;
            dispatch_with_depth(session, &Renderable::MemoryBacked(Value::at(*address, t)), depth + 1)
        }
        SyntheticValue::LinkedList {any_link_address, data_type} => Ok(Box::new(LinkedListPrinter {any_link_address: *any_link_address, data_type: data_type.clone()})),
        _ => Ok(Box::new(SyntheticPrinter {value: v.clone()})),
    }
}

use crate::{*, error::*, types::*, value::*, api::*};
use std::{cell::RefCell, collections::HashMap, rc::Rc};

// Memoized name -> type and name -> enumerator lookups. Keyed by the exact input string, kept for the whole session:
// types and enumerator values don't change while the process is paused. Failed lookups are not remembered.
#[derive(Default)]
pub struct SymbolCache {
    types: RefCell<HashMap<String, Rc<TypeInfo>>>,
    enums: RefCell<HashMap<String, i64>>,
}

impl SymbolCache {
    pub fn new() -> Self { Self::default() }

    // Accepts C-style pointer spelling: "Mesh *", "LinkData**". Trailing `*`s are stripped, the base name is looked up once,
    // and the pointer type is applied that many times.
    pub fn resolve_type(&self, api: &dyn Introspection, name: &str) -> Result<Rc<TypeInfo>> {
        if let Some(t) = self.types.borrow().get(name) {
            return Ok(t.clone());
        }
        let depth = name.matches('*').count();
        let base_name = name.replace('*', "");
        let base_name = base_name.trim();
        if base_name.is_empty() {
            return err!(TypeResolution, "empty type name: '{}'", name);
        }
        let cached_base = self.types.borrow().get(base_name).cloned();
        let mut t = match cached_base {
            Some(t) => t,
            None => {
                let t = api.lookup_type(base_name)?;
                self.types.borrow_mut().insert(base_name.to_string(), t.clone());
                t
            }
        };
        for _ in 0..depth {
            t = TypeInfo::pointer_to(&t, api.pointer_size());
        }
        self.types.borrow_mut().insert(name.to_string(), t.clone());
        Ok(t)
    }

    pub fn resolve_enum(&self, api: &dyn Introspection, name: &str) -> Result<i64> {
        if let Some(v) = self.enums.borrow().get(name) {
            return Ok(*v);
        }
        let sym = api.lookup_global(name)?;
        let v = match sym.location {
            SymbolLocation::Const(v) => v,
            SymbolLocation::Addr(addr) => {
                let size = sym.type_.calculate_size();
                if size == 0 || size > 8 {
                    return err!(TypeResolution, "{} is not an integer constant ({})", name, sym.type_);
                }
                let mut a = [0u8; 8];
                api.read_memory(addr, &mut a[..size])?;
                int_from_bits(u64::from_le_bytes(a), &sym.type_)
            }
        };
        self.enums.borrow_mut().insert(name.to_string(), v);
        Ok(v)
    }
}

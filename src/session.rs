use crate::{*, error::*, types::*, value::*, api::*, cache::*, memory::*, settings::*, registry::*, log::Log};
use std::{cell::{Cell, RefCell}, rc::Rc, sync::Arc};

// Everything one inspection needs: the host's API handle plus state that lives as long as the process stays paused
// (memory cache, symbol cache). Create a new Session after the process runs again.
pub struct Session {
    pub api: Rc<dyn Introspection>,
    pub settings: Settings,
    pub builtin_types: BuiltinTypes,
    pub symbols: SymbolCache,
    pub log: RefCell<Log>,

    memory: RefCell<CachedMemReader>,
    registry: Arc<Registry>,
    cancel_requested: Cell<bool>,
}

impl Session {
    pub fn new(api: Rc<dyn Introspection>) -> Self { Self::with_settings(api, Settings::default()) }

    pub fn with_settings(api: Rc<dyn Introspection>, settings: Settings) -> Self {
        let memory = RefCell::new(CachedMemReader::new(settings.page_size));
        Self {api, settings, builtin_types: BuiltinTypes::new(), symbols: SymbolCache::new(), log: RefCell::new(Log::new()), memory, registry: global_registry(), cancel_requested: Cell::new(false)}
    }

    // Use a private printer table instead of the global one.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    // The host wants rendering to stop (e.g. the user pressed a key). Every subsequent memory read or remote call
    // fails with Cancelled, which containment lets through, so lazy producers unwind.
    pub fn request_cancel(&self) { self.cancel_requested.set(true); }
    pub fn reset_cancel(&self) { self.cancel_requested.set(false); }
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel_requested.get() { err!(Cancelled, "cancelled") } else { Ok(()) }
    }

    pub fn read_memory(&self, addr: u64, out: &mut [u8]) -> Result<()> {
        self.check_cancelled()?;
        self.memory.borrow_mut().read(&*self.api, addr, out)
    }

    pub fn memory_stats(&self) -> MemReaderStats { self.memory.borrow().stats.clone() }

    pub fn resolve_type(&self, name: &str) -> Result<Rc<TypeInfo>> { self.symbols.resolve_type(&*self.api, name) }
    pub fn resolve_enum(&self, name: &str) -> Result<i64> { self.symbols.resolve_enum(&*self.api, name) }

    pub fn resolve_type_ref(&self, r: &TypeRef) -> Result<Rc<TypeInfo>> {
        match r {
            TypeRef::Resolved(t) => Ok(t.clone()),
            TypeRef::Declared(name) => self.resolve_type(name),
        }
    }

    pub fn pointer_size(&self) -> usize { self.api.pointer_size() }

    pub fn call_function(&self, name: &str, args: &[CallArg]) -> Result<Value> {
        self.check_cancelled()?;
        self.api.call_function(name, args)
    }

    // `receiver->method(args)`. The receiver is staged for exactly the duration of the call and released on every path,
    // including errors and cancellation.
    pub fn call_method_on(&self, receiver: &Value, method: &str, args: &[CallArg]) -> Result<Value> {
        self.check_cancelled()?;
        let binding = self.api.bind_argument(receiver)?;
        defer! { self.api.unbind_argument(binding); }
        self.api.call_method(binding, method, args)
    }

    // A failure that rendering recovered from. Kept in the session log and forwarded to the logger.
    pub fn report_contained(&self, context: &str, e: &Error) {
        ::log::warn!(target: "typeview", "{}: {:?}", context, e);
        log!(self.log.borrow_mut(), "{}: {}", context, e);
    }

    pub fn log_lines(&self) -> Vec<String> { self.log.borrow().lines.iter().cloned().collect() }
}

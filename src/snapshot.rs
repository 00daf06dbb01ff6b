use crate::{*, error::*, types::*, value::*, api::*};
use std::{cell::{Cell, RefCell}, collections::{BTreeMap, HashMap}, rc::Rc};

type FunctionImpl = Box<dyn Fn(&MemoryImage, &[CallArg]) -> Result<Value>>;
type MethodImpl = Box<dyn Fn(&MemoryImage, &Value, &[CallArg]) -> Result<Value>>;

// Introspection over a fabricated or captured process image: memory regions, a type table, globals, and optionally
// native implementations of functions the renderer may call remotely. Reads outside written regions fail like
// unmapped memory would. Counts lookups and tracks argument bindings so callers can check caching and cleanup.
pub struct MemoryImage {
    // start address -> bytes. Regions never overlap or touch; write() merges them.
    regions: BTreeMap<u64, Vec<u8>>,
    types: HashMap<String, Rc<TypeInfo>>,
    globals: HashMap<String, GlobalSymbol>,
    functions: HashMap<String, FunctionImpl>,
    methods: HashMap<String, MethodImpl>,
    pointer_size: usize,

    bindings: RefCell<HashMap<ArgumentBinding, Value>>,
    next_binding: Cell<u64>,
    max_bindings: Cell<usize>,
    type_lookups: Cell<usize>,
    global_lookups: Cell<usize>,
    memory_reads: Cell<usize>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self {regions: BTreeMap::new(), types: HashMap::new(), globals: HashMap::new(), functions: HashMap::new(), methods: HashMap::new(), pointer_size: 8,
              bindings: RefCell::new(HashMap::new()), next_binding: Cell::new(1), max_bindings: Cell::new(0), type_lookups: Cell::new(0), global_lookups: Cell::new(0), memory_reads: Cell::new(0)}
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let end = addr.saturating_add(bytes.len() as u64);
        let touching: Vec<u64> = self.regions.range(..=end).filter(|(&start, data)| start + data.len() as u64 >= addr).map(|(&start, _)| start).collect();
        let mut start = addr;
        let mut merged_end = end;
        for &s in &touching {
            start = start.min(s);
            merged_end = merged_end.max(s + self.regions[&s].len() as u64);
        }
        let mut buf = vec![0u8; (merged_end - start) as usize];
        for s in touching {
            if let Some(data) = self.regions.remove(&s) {
                let off = (s - start) as usize;
                buf[off..off + data.len()].copy_from_slice(&data);
            }
        }
        let off = (addr - start) as usize;
        buf[off..off + bytes.len()].copy_from_slice(bytes);
        self.regions.insert(start, buf);
    }

    pub fn write_u8(&mut self, addr: u64, x: u8) { self.write(addr, &[x]); }
    pub fn write_i32(&mut self, addr: u64, x: i32) { self.write(addr, &x.to_le_bytes()); }
    pub fn write_u32(&mut self, addr: u64, x: u32) { self.write(addr, &x.to_le_bytes()); }
    pub fn write_i64(&mut self, addr: u64, x: i64) { self.write(addr, &x.to_le_bytes()); }
    pub fn write_u64(&mut self, addr: u64, x: u64) { self.write(addr, &x.to_le_bytes()); }
    pub fn write_f32(&mut self, addr: u64, x: f32) { self.write(addr, &x.to_le_bytes()); }
    pub fn write_f64(&mut self, addr: u64, x: f64) { self.write(addr, &x.to_le_bytes()); }

    // Pointer-sized little-endian value.
    pub fn write_pointer(&mut self, addr: u64, x: u64) {
        let bytes = x.to_le_bytes();
        let n = self.pointer_size.min(8);
        self.write(addr, &bytes[..n]);
    }

    // NUL-terminated, zero-padded to `capacity` bytes (like a `char name[N]` field). Truncated if too long.
    pub fn write_c_string(&mut self, addr: u64, s: &str, capacity: usize) {
        let mut buf = vec![0u8; capacity];
        let n = s.len().min(capacity.saturating_sub(1));
        buf[..n].copy_from_slice(&s.as_bytes()[..n]);
        self.write(addr, &buf);
    }

    pub fn add_type(&mut self, t: Rc<TypeInfo>) { self.types.insert(t.name.clone(), t); }
    pub fn add_global(&mut self, name: &str, type_: &Rc<TypeInfo>, addr: u64) {
        self.globals.insert(name.to_string(), GlobalSymbol {name: name.to_string(), type_: type_.clone(), location: SymbolLocation::Addr(addr)});
    }
    pub fn add_const(&mut self, name: &str, type_: &Rc<TypeInfo>, value: i64) {
        self.globals.insert(name.to_string(), GlobalSymbol {name: name.to_string(), type_: type_.clone(), location: SymbolLocation::Const(value)});
    }

    pub fn add_function<F: Fn(&MemoryImage, &[CallArg]) -> Result<Value> + 'static>(&mut self, name: &str, f: F) { self.functions.insert(name.to_string(), Box::new(f)); }
    pub fn add_method<F: Fn(&MemoryImage, &Value, &[CallArg]) -> Result<Value> + 'static>(&mut self, name: &str, f: F) { self.methods.insert(name.to_string(), Box::new(f)); }

    pub fn set_pointer_size(&mut self, size: usize) { self.pointer_size = size; }

    pub fn active_bindings(&self) -> usize { self.bindings.borrow().len() }
    pub fn max_active_bindings(&self) -> usize { self.max_bindings.get() }
    pub fn type_lookup_count(&self) -> usize { self.type_lookups.get() }
    pub fn global_lookup_count(&self) -> usize { self.global_lookups.get() }
    pub fn memory_read_count(&self) -> usize { self.memory_reads.get() }
}

impl Introspection for MemoryImage {
    fn read_memory(&self, addr: u64, out: &mut [u8]) -> Result<()> {
        self.memory_reads.set(self.memory_reads.get() + 1);
        let mut pos = 0usize;
        while pos < out.len() {
            let a = match addr.checked_add(pos as u64) {
                Some(a) => a,
                None => return err!(MemoryAccess, "address overflow at 0x{:x}+{}", addr, pos),
            };
            let (start, data) = match self.regions.range(..=a).next_back() {
                Some((&start, data)) if a - start < data.len() as u64 => (start, data),
                _ => return err!(MemoryAccess, "can't read {} bytes at 0x{:x}: 0x{:x} is not mapped", out.len(), addr, a),
            };
            let off = (a - start) as usize;
            let n = (data.len() - off).min(out.len() - pos);
            out[pos..pos + n].copy_from_slice(&data[off..off + n]);
            pos += n;
        }
        Ok(())
    }

    fn lookup_type(&self, name: &str) -> Result<Rc<TypeInfo>> {
        self.type_lookups.set(self.type_lookups.get() + 1);
        match self.types.get(name) {
            Some(t) => Ok(t.clone()),
            None => err!(TypeResolution, "no type '{}'", name),
        }
    }

    fn lookup_global(&self, name: &str) -> Result<GlobalSymbol> {
        self.global_lookups.set(self.global_lookups.get() + 1);
        match self.globals.get(name) {
            Some(g) => Ok(g.clone()),
            None => err!(TypeResolution, "no symbol '{}'", name),
        }
    }

    fn pointer_size(&self) -> usize { self.pointer_size }

    fn bind_argument(&self, value: &Value) -> Result<ArgumentBinding> {
        let binding = ArgumentBinding(self.next_binding.get());
        self.next_binding.set(binding.0 + 1);
        let mut bindings = self.bindings.borrow_mut();
        bindings.insert(binding, value.clone());
        self.max_bindings.set(self.max_bindings.get().max(bindings.len()));
        Ok(binding)
    }

    fn unbind_argument(&self, binding: ArgumentBinding) {
        self.bindings.borrow_mut().remove(&binding);
    }

    fn call_function(&self, name: &str, args: &[CallArg]) -> Result<Value> {
        match self.functions.get(name) {
            Some(f) => f(self, args),
            None => err!(Evaluation, "no function '{}' in image", name),
        }
    }

    fn call_method(&self, receiver: ArgumentBinding, method: &str, args: &[CallArg]) -> Result<Value> {
        let value = match self.bindings.borrow().get(&receiver) {
            Some(v) => v.clone(),
            None => return err!(Evaluation, "stale argument binding {}", receiver.0),
        };
        match self.methods.get(method) {
            Some(f) => f(self, &value, args),
            None => err!(Evaluation, "no method '{}' for {}", method, value.type_),
        }
    }
}

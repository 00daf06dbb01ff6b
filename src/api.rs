use crate::{*, error::*, types::*, value::*};
use std::rc::Rc;

// The host's introspection interface over a paused (or dumped) process. Everything here is read-only except the remote calls,
// which run code in the inspected process. Implementations report unreadable memory as ErrorCode::MemoryAccess and unknown
// names as ErrorCode::TypeResolution; the renderer relies on these codes to contain failures.

#[derive(Clone, Debug)]
pub enum SymbolLocation {
    Addr(u64),
    // Enumerators and other constants without storage.
    Const(i64),
}

#[derive(Clone, Debug)]
pub struct GlobalSymbol {
    pub name: String,
    pub type_: Rc<TypeInfo>,
    pub location: SymbolLocation,
}

// Handle of a value staged in the inspected process for the duration of one remote call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArgumentBinding(pub u64);

#[derive(Clone, Debug)]
pub enum CallArg {
    Int(i64),
    // Typed pointer literal, e.g. `(ID *)0x7f00001000`.
    Pointer {address: u64, type_: Rc<TypeInfo>},
    Bound(ArgumentBinding),
}

pub trait Introspection {
    fn read_memory(&self, addr: u64, out: &mut [u8]) -> Result<()>;
    fn lookup_type(&self, name: &str) -> Result<Rc<TypeInfo>>;
    fn lookup_global(&self, name: &str) -> Result<GlobalSymbol>;

    fn pointer_size(&self) -> usize { 8 }

    // Remote evaluation. Post-mortem backends can't run code, hence the defaults.
    // Callers must pair every successful bind_argument() with unbind_argument(); see Session::call_method_on().
    fn bind_argument(&self, value: &Value) -> Result<ArgumentBinding> { err!(Evaluation, "can't stage a {} value: remote evaluation not supported", value.type_) }
    fn unbind_argument(&self, binding: ArgumentBinding) {}
    fn call_function(&self, name: &str, args: &[CallArg]) -> Result<Value> { err!(Evaluation, "can't call {}: remote evaluation not supported", name) }
    fn call_method(&self, receiver: ArgumentBinding, method: &str, args: &[CallArg]) -> Result<Value> { err!(Evaluation, "can't call method {}: remote evaluation not supported", method) }
}

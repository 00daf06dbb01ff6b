use std::mem::ManuallyDrop;

pub struct ScopeGuard<F: FnOnce()> { f: ManuallyDrop<F> }
impl<F: FnOnce()> ScopeGuard<F> { pub fn new(f: F) -> Self { Self {f: ManuallyDrop::new(f)} } }
impl<T: FnOnce()> Drop for ScopeGuard<T> { fn drop(&mut self) { (unsafe {ManuallyDrop::take(&mut self.f)})(); } }
#[macro_export]
macro_rules! defer { ($($t:tt)*) => { let _guard = $crate::util::ScopeGuard::new(|| { $($t)* }); }; }

// Decodes a NUL-terminated (or buffer-terminated) char array as UTF8.
pub fn c_string_from_bytes(bytes: &[u8]) -> std::result::Result<String, std::str::Utf8Error> {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    Ok(std::str::from_utf8(&bytes[..end])?.to_string())
}

// Label of a synthesized item, e.g. "[Address]". Raw fields keep their plain names, so the two are easy to tell apart.
pub fn item_label(key: impl std::fmt::Display) -> String {
    format!("[{}]", key)
}

use crate::{*, error::*, api::*};
use std::{collections::HashMap, rc::Rc};

// Page cache over Introspection::read_memory(). The inspected process is paused for the whole session, so pages never go stale.
// Pages that can't be read whole (e.g. a mapping boundary inside the page) are remembered as such, and reads touching them
// go to the API directly with the exact requested range.
pub struct CachedMemReader {
    page_size: usize,
    pages: HashMap<u64, Option<Rc<[u8]>>>,
    pub stats: MemReaderStats,
}

#[derive(Default, Debug, Clone, Copy)]
pub struct MemReaderStats {
    pub page_reads: usize,
    pub direct_reads: usize,
    pub hits: usize,
}

impl CachedMemReader {
    // Page size is rounded up to a power of two.
    pub fn new(page_size: usize) -> Self {
        Self {page_size: page_size.max(1).next_power_of_two(), pages: HashMap::new(), stats: MemReaderStats::default()}
    }

    pub fn read(&mut self, api: &dyn Introspection, addr: u64, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let end = match addr.checked_add(out.len() as u64) {
            None => return err!(MemoryAccess, "address range overflows: 0x{:x} + {}", addr, out.len()),
            Some(e) => e };
        let page_size = self.page_size as u64;
        let first_page = addr & !(page_size - 1);
        let mut page = first_page;
        let mut pos = 0usize;
        while page < end {
            let data = match self.get_page(api, page) {
                Some(d) => d,
                None => {
                    self.stats.direct_reads += 1;
                    return api.read_memory(addr, out);
                }
            };
            let start_in_page = if page == first_page {(addr - page) as usize} else {0};
            let n = (self.page_size - start_in_page).min(out.len() - pos);
            out[pos..pos+n].copy_from_slice(&data[start_in_page..start_in_page+n]);
            pos += n;
            page = match page.checked_add(page_size) {
                None => break,
                Some(p) => p };
        }
        Ok(())
    }

    fn get_page(&mut self, api: &dyn Introspection, page: u64) -> Option<Rc<[u8]>> {
        if let Some(p) = self.pages.get(&page) {
            self.stats.hits += 1;
            return p.clone();
        }
        self.stats.page_reads += 1;
        let mut buf = vec![0u8; self.page_size];
        let r = match api.read_memory(page, &mut buf) {
            Ok(()) => Some(Rc::from(buf)),
            Err(_) => None,
        };
        self.pages.insert(page, r.clone());
        r
    }
}

use crate::{*, error::*, types::*, value::*, session::*, printer::*, util::*};
use std::{collections::HashSet, rc::Rc};

// Follows `node->field` from a pointer value until null, a repeated address (cycle or corruption), or the node limit.
// Yields the pointer values themselves, starting with `first`. After an error nothing more is yielded.
pub struct PointerChain<'s> {
    session: &'s Session,
    next: Option<Value>,
    field: String,
    visited: HashSet<u64>,
    limit: usize,
    pending_error: Option<Error>,
}

impl<'s> PointerChain<'s> {
    pub fn new(first: Value, field: &str, session: &'s Session) -> Self {
        Self {session, next: Some(first), field: field.to_string(), visited: HashSet::new(), limit: session.settings.max_list_nodes, pending_error: None}
    }
}

impl<'s> Iterator for PointerChain<'s> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        let cur = self.next.take()?;
        let addr = match cur.read_pointer(self.session) {
            Ok(a) => a,
            Err(e) => return Some(Err(e)),
        };
        if addr == 0 || !self.visited.insert(addr) {
            return None;
        }
        if self.visited.len() > self.limit {
            return Some(err!(Sanity, "list is longer than {} nodes", self.limit));
        }
        match cur.deref(self.session).and_then(|node| node.field(&self.field)) {
            Ok(p) => self.next = Some(p),
            Err(e) => self.pending_error = Some(e),
        }
        Some(Ok(cur))
    }
}

// All nodes of a doubly linked list, given any one of them: reverse(prev chain) followed by the next chain without its
// first element (which is `any_link` again). Each direction has its own cycle guard, so a cyclic list terminates after at
// most one lap per direction. The prev chain is collected up front, the next chain is walked lazily.
pub fn full_doubly_linked_list<'s>(any_link: Value, session: &'s Session) -> Result<impl Iterator<Item = Result<Value>> + 's> {
    let mut previous: Vec<Value> = PointerChain::new(any_link.clone(), "prev", session).collect::<Result<_>>()?;
    previous.reverse();
    Ok(previous.into_iter().map(Ok).chain(PointerChain::new(any_link, "next", session).skip(1)))
}

// The doubly linked list that contains the node at `any_link_address`, as a list of `data_type *` items.
pub struct LinkedListPrinter {
    pub any_link_address: u64,
    pub data_type: String,
}

impl Printer for LinkedListPrinter {
    fn children<'s>(&self, session: &'s Session) -> Result<Option<ChildIter<'s>>> {
        let pointer_type = session.resolve_type(&format!("{} *", self.data_type))?;
        let any_link = Value::from_blob(ValueBlob::new(self.any_link_address), pointer_type);
        let iter = full_doubly_linked_list(any_link, session)?.enumerate().map(|(i, link)| -> Result<Child> { Ok(Child::memory(item_label(i), link?)) });
        Ok(Some(limit_children(Box::new(iter), session.settings.max_children)))
    }
}

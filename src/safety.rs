use crate::{*, error::*, session::*, printer::*, registry::*};

// Entry point for hosts. Whatever goes wrong while rendering one value (unreadable memory, broken layout, bad payload,
// failed remote call) is turned into a diagnostic in place of the thing that failed, and rendering continues with
// the siblings. The only error that escapes is Cancelled.

pub struct Rendered<'s> {
    pub summary: Option<String>,
    pub hint: DisplayHint,
    pub children: Option<SafeChildren<'s>>,
}

pub fn diagnostic_text(e: &Error) -> String { format!("<{}: {}>", e.category(), e) }

pub fn render<'s>(session: &'s Session, r: &Renderable) -> Result<Rendered<'s>> {
    let printer = match dispatch(session, r) {
        Ok(p) => p,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            session.report_contained("dispatch", &e);
            return Ok(Rendered {summary: Some(diagnostic_text(&e)), hint: DisplayHint::Plain, children: None});
        }
    };
    let summary = match printer.summary(session) {
        Ok(s) => s,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            session.report_contained("summary", &e);
            Some(diagnostic_text(&e))
        }
    };
    let children = match printer.children(session) {
        Ok(c) => c.map(|c| SafeChildren::new(session, c)),
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            session.report_contained("children", &e);
            Some(SafeChildren::new(session, Box::new(std::iter::once(Ok(Child::diagnostic("<error>", &e))))))
        }
    };
    Ok(Rendered {summary, hint: printer.display_hint(), children})
}

// Child sequence in which failed children are replaced by diagnostics. Cancelled is passed through once, then the
// sequence ends, without pulling anything more from the producer.
pub struct SafeChildren<'s> {
    session: &'s Session,
    inner: ChildIter<'s>,
    index: usize,
    fused: bool,
}

impl<'s> SafeChildren<'s> {
    pub fn new(session: &'s Session, inner: ChildIter<'s>) -> Self { Self {session, inner, index: 0, fused: false} }
}

impl<'s> Iterator for SafeChildren<'s> {
    type Item = Result<Child>;

    fn next(&mut self) -> Option<Result<Child>> {
        if self.fused {
            return None;
        }
        let item = self.inner.next()?;
        let index = self.index;
        self.index += 1;
        Some(match item {
            Ok(c) => Ok(c),
            Err(e) if e.is_cancelled() => {
                self.fused = true;
                Err(e)
            }
            Err(e) => {
                self.session.report_contained(&format!("child {}", index), &e);
                Ok(Child::diagnostic(index.to_string(), &e))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{*, safety::*, snapshot::*, testing::*, synthetic::*, types::*, value::*, api::*};
    use std::rc::Rc;

    #[test]
    fn field_failure_contained() {
        let b = BuiltinTypes::new();
        // A struct straddling the end of mapped memory: `a` is readable, `b` is not, `c` is a vector with a broken header.
        let t = TypeInfo::new_struct("Thing", 40, vec![
            StructField::new("a", 0, &b.i32_), StructField::new("b", 8, &b.i64_), StructField::new("c", 16, &vector_type(&b.i32_))]);
        let mut image = MemoryImage::new();
        image.write_i32(0x1000, 42);
        let (_image, s) = session(image);
        let r = render(&s, &Renderable::MemoryBacked(Value::at(0x1000, t))).unwrap();
        let children: Vec<Child> = r.children.unwrap().map(|c| c.unwrap()).collect();
        assert_eq!(children.iter().map(|c| c.label.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let a = render(&s, &children[0].value).unwrap();
        assert_eq!(a.summary.unwrap(), "42");
        let bad = render(&s, &children[1].value).unwrap();
        assert!(bad.summary.unwrap().starts_with("<memory error"));
        let c = render(&s, &children[2].value).unwrap();
        assert!(c.summary.unwrap().starts_with("<memory error"));
        let c_children: Vec<Child> = c.children.unwrap().map(|c| c.unwrap()).collect();
        assert_eq!(c_children.len(), 1);
        assert!(matches!(&c_children[0].value, Renderable::Synthetic(SyntheticValue::Diagnostic(_))));
        assert!(!s.log_lines().is_empty());
    }

    #[test]
    fn errors_in_sequence_become_diagnostics() {
        let (_image, s) = session(MemoryImage::new());
        let items: Vec<Result<Child>> = vec![Ok(Child::text("0", "a")), err!(Decode, "bad slot"), Ok(Child::text("2", "c"))];
        let children: Vec<Child> = SafeChildren::new(&s, Box::new(items.into_iter())).map(|c| c.unwrap()).collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children[1].label, "1");
        match &children[1].value {
            Renderable::Synthetic(SyntheticValue::Diagnostic(m)) => assert!(m.contains("bad slot")),
            r => panic!("{:?}", r),
        }
    }

    #[test]
    fn cancellation_propagates() {
        let (_image, s) = session(MemoryImage::new());
        let pulled = Rc::new(std::cell::Cell::new(0));
        let p = pulled.clone();
        let items = (0..10).map(move |i| -> Result<Child> {
            p.set(p.get() + 1);
            if i == 3 { err!(Cancelled, "stop") } else { Ok(Child::text(i.to_string(), "x")) }
        });
        let mut safe = SafeChildren::new(&s, Box::new(items));
        let results: Vec<Result<Child>> = safe.by_ref().collect();
        assert_eq!(results.len(), 4);
        assert!(results[3].as_ref().unwrap_err().is_cancelled());
        assert!(safe.next().is_none());
        assert_eq!(pulled.get(), 4);

        // Cancellation during a remote call surfaces from render() itself.
        let b = BuiltinTypes::new();
        let mut image = MemoryImage::new();
        image.write_u64(0x100, 0x2000);
        image.write_u64(0x2000, 0);
        image.write_i64(0x2008, 2);
        image.add_method("get", |_, _, _| err!(Cancelled, "interrupted"));
        let (image, s) = session(image);
        let r = render(&s, &Renderable::MemoryBacked(Value::at(0x100, varray_type("blender::VArray", &b.i32_)))).unwrap();
        let first = r.children.unwrap().next().unwrap();
        assert!(first.unwrap_err().is_cancelled());
        assert_eq!(image.active_bindings(), 0);

        s.request_cancel();
        assert!(render(&s, &Renderable::MemoryBacked(Value::at(0x100, b.i32_.clone()))).err().unwrap().is_cancelled());
    }

    #[test]
    fn encoded_values_render_like_synthetic_ones() {
        let (_image, s) = session(MemoryImage::new());
        let record = SyntheticValue::Record(SyntheticRecord {
            summary: Some("stats".to_string()),
            hint: DisplayHint::Map,
            children: vec![("k".to_string(), SyntheticValue::Int(-1)), ("v".to_string(), SyntheticValue::text("x"))],
        });
        let direct = render(&s, &Renderable::Synthetic(record.clone())).unwrap();
        let smuggled = Renderable::Synthetic(record).into_value(&s).unwrap();
        assert!(smuggled.type_.is_byte_array());
        let decoded = render(&s, &Renderable::MemoryBacked(smuggled)).unwrap();
        assert_eq!(direct.summary, decoded.summary);
        assert_eq!(direct.hint, decoded.hint);
        let labels = |r: Rendered| -> Vec<String> { r.children.unwrap().map(|c| c.unwrap().label).collect() };
        assert_eq!(labels(direct), labels(decoded));
    }

    #[test]
    fn base_record_fallback() {
        let (dna, mut image) = Dna::image();
        write_id(&mut image, 0x1000, "SCScene");
        image.write_i32(0x1000 + 88, 250);
        image.write(0x1000 + 92, &[0u8; 4]);
        let (_image, s) = session(image);
        let r = render(&s, &Renderable::MemoryBacked(Value::at(0x1000, dna.scene.clone()))).unwrap();
        let children: Vec<Child> = r.children.unwrap().map(|c| c.unwrap()).collect();
        let labels: Vec<&str> = children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["[Address]", "[Name]", "[Is Original]", "id", "r_cfra"]);
        let name = render(&s, &children[1].value).unwrap();
        assert_eq!(name.summary.unwrap(), "SCScene");
    }
}

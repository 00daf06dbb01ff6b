use crate::{*, error::*, session::*, printer::*, safety::*};
use std::fmt::Write;

// Plain-text tree of a value, one node per line, the way a console host would show it:
//   root summary
//     label = summary
//       nested = ...
// Map-like nodes show their children pairwise as `key => value`. Expansion stops at settings.max_depth and at values
// already being expanded higher up on the same path (same address and type), so self-referencing data terminates.
pub fn format_tree(session: &Session, r: &Renderable) -> Result<String> {
    let mut out = String::new();
    let mut path: Vec<(u64, String)> = Vec::new();
    format_node(session, None, r, 0, &mut path, &mut out)?;
    Ok(out)
}

fn path_key(r: &Renderable) -> Option<(u64, String)> {
    match r {
        Renderable::MemoryBacked(v) => v.addr().map(|a| (a, v.type_.to_string())),
        Renderable::Synthetic(_) => None,
    }
}

fn format_node(session: &Session, label: Option<&str>, r: &Renderable, depth: usize, path: &mut Vec<(u64, String)>, out: &mut String) -> Result<()> {
    let indent = "  ".repeat(depth);
    let key = path_key(r);
    if let Some(k) = &key {
        if path.contains(k) {
            writeln!(out, "{}{}<recursive 0x{:x}>", indent, label_prefix(label), k.0)?;
            return Ok(());
        }
    }
    let rendered = render(session, r)?;
    let summary = match (&rendered.summary, &rendered.children) {
        (Some(s), _) => s.clone(),
        (None, Some(_)) => "{...}".to_string(),
        (None, None) => String::new(),
    };
    let mut children = match rendered.children {
        Some(c) => c,
        None => {
            writeln!(out, "{}{}{}", indent, label_prefix(label), summary)?;
            return Ok(());
        }
    };
    if depth >= session.settings.max_depth {
        writeln!(out, "{}{}{} ...", indent, label_prefix(label), summary)?;
        return Ok(());
    }
    writeln!(out, "{}{}{}", indent, label_prefix(label), summary)?;

    if let Some(k) = key.clone() {
        path.push(k);
    }
    let result = (|| -> Result<()> {
        if rendered.hint == DisplayHint::Map {
            while let Some(first) = children.next() {
                let first = first?;
                match children.next() {
                    Some(second) => format_pair(session, &first, &second?, depth + 1, path, out)?,
                    None => format_node(session, Some(&first.label), &first.value, depth + 1, path, out)?,
                }
            }
        } else {
            for child in children {
                let child = child?;
                format_node(session, Some(&child.label), &child.value, depth + 1, path, out)?;
            }
        }
        Ok(())
    })();
    if key.is_some() {
        path.pop();
    }
    result
}

fn label_prefix(label: Option<&str>) -> String {
    match label {
        Some(l) => format!("{} = ", l),
        None => String::new(),
    }
}

// `key => value`, with the value's children nested below.
fn format_pair(session: &Session, key: &Child, value: &Child, depth: usize, path: &mut Vec<(u64, String)>, out: &mut String) -> Result<()> {
    let k = render(session, &key.value)?;
    let key_text = k.summary.unwrap_or_else(|| key.label.clone());
    let mut value_text = String::new();
    format_node(session, None, &value.value, depth, path, &mut value_text)?;
    let value_text = value_text.trim_start();
    write!(out, "{}{} => {}", "  ".repeat(depth), key_text, value_text)?;
    Ok(())
}

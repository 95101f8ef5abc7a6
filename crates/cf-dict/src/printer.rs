//! Formatted serialization of dictionaries.
//!
//! Output follows the solver's conventional layout: a comment banner, the
//! `FoamFile` header block, a starred separator, the keyword-aligned body,
//! and a closing separator. Keywords within a scope are padded to a common
//! column; generated (keyword-less) entries such as directives print bare.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::value::{Dictionary, Field, FieldType, Value};
use crate::DictResult;

const TAB_WIDTH: usize = 4;

/// Lists up to this many scalar/word items print on one line.
const INLINE_LIST_MAX: usize = 10;

pub const HEADER_SEPARATOR: &str = "\
// * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * * //

";

pub const EOF_SEPARATOR: &str = "\
// ************************************************************************* //
";

/// Comment banner stamped at the top of generated files.
pub fn file_banner() -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "/*---------------------------------------------------------------------------*\\
 * caseflow {}
 * Auto-generated on: {}
\\*---------------------------------------------------------------------------*/

",
        env!("CARGO_PKG_VERSION"),
        timestamp
    )
}

/// Serialize a dictionary body without banner or separators.
pub fn serialize(data: &Dictionary) -> String {
    let mut printer = DictPrinter::new();
    printer.write_dict_body(data);
    printer.out
}

/// Write a complete input file: banner, optional `FoamFile` header block,
/// separator, body, and EOF separator.
pub fn write_file(
    path: &Path,
    header: Option<&Dictionary>,
    data: &Dictionary,
) -> DictResult<()> {
    let mut out = file_banner();
    if let Some(header) = header {
        let mut printer = DictPrinter::new();
        printer.write_entry("FoamFile", &Value::Dict(header.clone()), 8 + TAB_WIDTH);
        out.push_str(&printer.out);
    }
    out.push_str(HEADER_SEPARATOR);
    out.push_str(&serialize(data));
    out.push_str(EOF_SEPARATOR);
    fs::write(path, out)?;
    Ok(())
}

struct DictPrinter {
    out: String,
    indent: usize,
}

impl DictPrinter {
    fn new() -> Self {
        DictPrinter {
            out: String::new(),
            indent: 0,
        }
    }

    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push(' ');
        }
    }

    fn write_dict_body(&mut self, data: &Dictionary) {
        let width = data
            .iter()
            .filter(|(_, v)| !is_keyless(v))
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or(0)
            + TAB_WIDTH;
        for (key, value) in data.iter() {
            self.write_entry(key, value, width);
        }
    }

    fn write_entry(&mut self, key: &str, value: &Value, width: usize) {
        match value {
            Value::Directive { name, arg } => {
                self.pad();
                let _ = writeln!(self.out, "{} {}", name, inline_atom(arg));
            }
            Value::Macro(mac) => {
                self.pad();
                let _ = writeln!(self.out, "{};", mac);
            }
            Value::Dict(nested) => {
                self.pad();
                self.out.push_str(key);
                self.out.push('\n');
                self.write_brace_block(nested);
                self.out.push('\n');
            }
            _ => {
                self.pad();
                let _ = write!(self.out, "{:<1$} ", key, width);
                self.write_value(value);
                self.out.push_str(";\n");
            }
        }
    }

    fn write_brace_block(&mut self, nested: &Dictionary) {
        self.pad();
        self.out.push_str("{\n");
        self.indent += TAB_WIDTH;
        self.write_dict_body(nested);
        self.indent -= TAB_WIDTH;
        self.pad();
        self.out.push_str("}\n");
    }

    /// Write a right-hand-side value without the trailing semicolon.
    fn write_value(&mut self, value: &Value) {
        match value {
            Value::Field(field) => self.write_field(field),
            Value::IntList(_) | Value::FloatList(_) | Value::List(_) => {
                self.write_list(value);
            }
            Value::Dict(nested) => {
                // Dict in value position (rare; list elements mostly)
                self.out.push('\n');
                self.write_brace_block(nested);
            }
            other => self.out.push_str(&inline_atom(other)),
        }
    }

    fn write_field(&mut self, field: &Field) {
        match field.ftype {
            FieldType::Uniform => {
                self.out.push_str("uniform ");
                self.write_value(&field.value);
            }
            FieldType::Nonuniform => {
                self.out.push_str("nonuniform ");
                if let Some(tag) = &field.list_type {
                    self.out.push_str(tag);
                    self.out.push(' ');
                }
                if let Some(len) = list_len(&field.value) {
                    let _ = write!(self.out, "{} ", len);
                }
                self.write_list(&field.value);
            }
        }
    }

    fn write_list(&mut self, value: &Value) {
        if let Some(inline) = inline_list(value) {
            self.out.push_str(&inline);
            return;
        }
        match value {
            Value::IntList(items) => {
                self.open_list();
                for item in items {
                    self.pad();
                    let _ = writeln!(self.out, "{}", item);
                }
                self.close_list();
            }
            Value::FloatList(items) => {
                self.open_list();
                for item in items {
                    self.pad();
                    let _ = writeln!(self.out, "{}", fmt_float(*item));
                }
                self.close_list();
            }
            Value::List(items) => {
                self.open_list();
                for item in items {
                    self.write_list_item(item);
                }
                self.close_list();
            }
            other => self.out.push_str(&inline_atom(other)),
        }
    }

    fn write_list_item(&mut self, item: &Value) {
        match item {
            // Single-pair dicts render as `name { ... }` list elements.
            Value::Dict(pair) if pair.len() == 1 => {
                if let Some((key, Value::Dict(nested))) = pair.iter().next() {
                    self.pad();
                    self.out.push_str(key);
                    self.out.push('\n');
                    self.write_brace_block(nested);
                    return;
                }
                self.pad();
                self.out.push('\n');
                self.write_brace_block(pair);
            }
            Value::Dict(nested) => {
                self.write_brace_block(nested);
            }
            Value::IntList(_) | Value::FloatList(_) | Value::List(_) => {
                if let Some(inline) = inline_list(item) {
                    self.pad();
                    self.out.push_str(&inline);
                    self.out.push('\n');
                } else {
                    self.write_list(item);
                    self.out.push('\n');
                }
            }
            other => {
                self.pad();
                self.out.push_str(&inline_atom(other));
                self.out.push('\n');
            }
        }
    }

    fn open_list(&mut self) {
        self.out.push('\n');
        self.pad();
        self.out.push_str("(\n");
        self.indent += TAB_WIDTH;
    }

    fn close_list(&mut self) {
        self.indent -= TAB_WIDTH;
        self.pad();
        self.out.push(')');
    }
}

fn is_keyless(value: &Value) -> bool {
    matches!(value, Value::Directive { .. } | Value::Macro(_))
}

fn list_len(value: &Value) -> Option<usize> {
    match value {
        Value::IntList(v) => Some(v.len()),
        Value::FloatList(v) => Some(v.len()),
        Value::List(v) => Some(v.len()),
        _ => None,
    }
}

/// One-line rendering for lists that fit: empty lists, short numeric lists,
/// and short lists of words.
fn inline_list(value: &Value) -> Option<String> {
    match value {
        Value::IntList(items) if items.len() <= INLINE_LIST_MAX => {
            let body: Vec<String> = items.iter().map(|v| v.to_string()).collect();
            Some(format!("({})", body.join(" ")))
        }
        Value::FloatList(items) if items.len() <= INLINE_LIST_MAX => {
            let body: Vec<String> = items.iter().map(|v| fmt_float(*v)).collect();
            Some(format!("({})", body.join(" ")))
        }
        Value::List(items) if items.is_empty() => Some("()".to_string()),
        Value::List(items)
            if items.len() <= INLINE_LIST_MAX
                && items
                    .iter()
                    .all(|v| matches!(v, Value::Word(_) | Value::Str(_))) =>
        {
            let body: Vec<String> = items.iter().map(inline_atom).collect();
            Some(format!("( {} )", body.join(" ")))
        }
        _ => None,
    }
}

/// Single-line rendering of an atomic value.
fn inline_atom(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => fmt_float(*v),
        Value::Bool(v) => if *v { "on" } else { "off" }.to_string(),
        Value::Word(w) => w.clone(),
        Value::Str(s) => format!("\"{}\"", s),
        Value::Macro(m) => m.clone(),
        Value::Dimensions(dims) => dims.to_string(),
        Value::DimValue { name, dims, value } => {
            format!("{} {} {}", name, dims, inline_atom(value))
        }
        Value::Directive { name, arg } => format!("{} {}", name, inline_atom(arg)),
        Value::Multi(atoms) => {
            let body: Vec<String> = atoms.iter().map(inline_atom).collect();
            body.join(" ")
        }
        other => inline_list(other).unwrap_or_default(),
    }
}

/// Format a float so it re-reads as a float: integral values keep one
/// decimal place, everything else uses the shortest exact representation.
fn fmt_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_str;

    #[test]
    fn keywords_align_within_scope() {
        let dict = parse_str("application simpleSolver;\ndeltaT 0.005;").unwrap();
        let text = serialize(&dict);
        assert!(text.contains("application     simpleSolver;"));
        assert!(text.contains("deltaT          0.005;"));
    }

    #[test]
    fn bools_print_as_switches() {
        let mut dict = crate::Dictionary::new();
        dict.insert("runTimeModifiable", Value::Bool(true));
        dict.insert("writeCompression", Value::Bool(false));
        let text = serialize(&dict);
        assert!(text.contains("runTimeModifiable     on;"));
        assert!(text.contains("writeCompression      off;"));
    }

    #[test]
    fn integral_floats_keep_a_decimal_point() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(101300.0), "101300.0");
        assert_eq!(fmt_float(0.005), "0.005");
        let reparsed = parse_str(&format!("deltaT {};", fmt_float(2.0))).unwrap();
        assert_eq!(reparsed.get("deltaT"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn nonuniform_field_counts_follow_payload() {
        let dict = parse_str("field nonuniform List<scalar> 3 (1.5 2.5 3.5);").unwrap();
        let text = serialize(&dict);
        assert!(text.contains("nonuniform List<scalar> 3 (1.5 2.5 3.5);"));
    }

    #[test]
    fn long_lists_wrap() {
        let items: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let dict = parse_str(&format!("cells ({});", items.join(" "))).unwrap();
        let text = serialize(&dict);
        assert!(text.contains("(\n"));
        assert!(text.contains("    0\n"));
    }

    #[test]
    fn reserialized_text_reparses_identically() {
        let src = "
ddtSchemes
{
    default         steadyState;
}
divSchemes
{
    div(phi,U)      Gauss linearUpwind grad(U);
}
nu              nu [0 2 -1 0 0 0 0] 1e-05;
internalField   uniform (8.0 0 0);
";
        let first = parse_str(src).unwrap();
        let text = serialize(&first);
        let second = parse_str(&text).unwrap();
        assert_eq!(first, second);
    }
}

use bsondump_codec::{DecoderState, Node, NodeCounts, NodeValue};
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// 每个节点一行 JSON
    Json,
}

impl OutputFormat {
    pub fn parse(format: &str) -> Option<Self> {
        match format.to_lowercase().as_str() {
            "text" | "line" => Some(OutputFormat::Text),
            "json" | "jsonl" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    decoded_size: usize,
    document_size: i32,
    counts: &'a NodeCounts,
}

#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    color: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    pub fn write_preamble(&self, out: &mut impl Write, path: &Path) -> io::Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(out, "[bsondump] reading from {}", path.display())?;
        }
        Ok(())
    }

    pub fn write_document_size(&self, out: &mut impl Write, size: i32) -> io::Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(out, "BSON document size {}", size)?;
        }
        Ok(())
    }

    pub fn write_node(&self, out: &mut impl Write, node: &Node<'_>) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => self.write_text_node(out, node),
            OutputFormat::Json => writeln!(out, "{}", node_json(node)),
        }
    }

    fn write_text_node(&self, out: &mut impl Write, node: &Node<'_>) -> io::Result<()> {
        let indent = "  ".repeat(node.depth);

        if let NodeValue::Unrecognized(tag) = node.value {
            let line = format!("ERROR {} unhandled bson type {}", node.name, tag);
            if self.color {
                return writeln!(out, "{}{}", indent, line.red());
            }
            return writeln!(out, "{}{}", indent, line);
        }

        if node.value.is_end_of_object() {
            let label = node.value.type_name();
            if self.color {
                return writeln!(out, "{}", label.cyan());
            }
            return writeln!(out, "{}", label);
        }

        let label = format!("{:<13}", format!("{}:", node.value.type_name()));
        let label = if self.color {
            label.cyan().to_string()
        } else {
            label
        };
        writeln!(out, "{}{}{} = {}", label, indent, node.name, node.value)
    }

    pub fn write_summary(&self, out: &mut impl Write, state: &DecoderState) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                let counts = &state.counts;
                let line = format!(
                    "BSON decoded {} bytes (double:{}, string:{}, bin:{}, bool:{}, int32:{}, int64:{})",
                    state.total_decoded_size,
                    counts.double,
                    counts.string,
                    counts.binary,
                    counts.boolean,
                    counts.int32,
                    counts.int64
                );
                if self.color {
                    writeln!(out, "{}", line.dimmed())
                } else {
                    writeln!(out, "{}", line)
                }
            }
            OutputFormat::Json => {
                let summary = Summary {
                    decoded_size: state.total_decoded_size,
                    document_size: state.total_document_size,
                    counts: &state.counts,
                };
                let line = serde_json::to_string(&summary).map_err(io::Error::other)?;
                writeln!(out, "{}", line)
            }
        }
    }
}

fn node_json(node: &Node<'_>) -> Value {
    json!({
        "depth": node.depth,
        "type": node.value.type_name(),
        "tag": node.value.tag(),
        "name": node.name,
        "value": value_json(&node.value),
    })
}

fn value_json(value: &NodeValue<'_>) -> Value {
    match value {
        NodeValue::EndOfObject
        | NodeValue::Document
        | NodeValue::Array
        | NodeValue::Undefined
        | NodeValue::Null
        | NodeValue::MinKey
        | NodeValue::MaxKey
        | NodeValue::Unrecognized(_) => Value::Null,
        NodeValue::Double(d) => json!(d),
        NodeValue::String(s) | NodeValue::Symbol(s) | NodeValue::JavaScript(s) => json!(s),
        NodeValue::JavaScriptWithScope { code } => json!(code),
        NodeValue::Boolean(b) => json!(b),
        NodeValue::Int32(n) => json!(n),
        NodeValue::Int64(n) => json!(n),
        NodeValue::DateTime(ms) => json!(ms),
        NodeValue::Timestamp(ts) => json!(ts),
        NodeValue::Binary { subtype, data } => json!({
            "subtype": subtype,
            "len": data.len(),
        }),
        NodeValue::Regex { pattern, options } => json!({
            "pattern": pattern,
            "options": options,
        }),
        NodeValue::DbPointer { namespace, id } => json!({
            "namespace": namespace,
            "id": hex(id),
        }),
        NodeValue::ObjectId(id) => json!(hex(id)),
        NodeValue::Decimal128(raw) => json!(hex(raw)),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

//! Human-readable rendering of an archive, for debugging.
//!
//! The output is diagnostic only; its format may change between releases.

use crate::block::{Block, KeyId, ObjId, TypeId};
use crate::decoder::{flatten, Node, NodeKind, DEFAULT_MAX_DEPTH};
use crate::error::ArchiveResult;
use crate::index::{KeyTable, TypeTable};
use crate::io_stream::Contents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    /// Render the linear block stream.
    pub blocks:          bool,
    /// Render the flattened tree and object map.
    pub tree:            bool,
    /// Payload bytes shown in hex per binary block; 0 hides payloads.
    pub payload_preview: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self { blocks: true, tree: true, payload_preview: 16 }
    }
}

pub fn render(contents: &Contents<'_>, options: &DumpOptions) -> ArchiveResult<String> {
    let mut out = String::new();
    let header = &contents.header;
    out.push_str(&format!(
        "format v{}  user v{}  packed={}\n",
        header.format_version,
        header.user_version,
        header.packed_integers()
    ));

    out.push_str(&format!("types ({}):\n", contents.types.len()));
    for entry in contents.types.entries() {
        out.push_str(&format!("  t{:<4} {} v{}\n", entry.id, entry.name, entry.version));
    }
    out.push_str(&format!("keys ({}):\n", contents.keys.len()));
    for (id, name) in contents.keys.iter() {
        out.push_str(&format!("  {:<5} {}\n", id.to_string(), name));
    }

    if options.blocks {
        out.push_str(&format!("blocks ({}):\n", contents.blocks.len()));
        let mut depth = 0usize;
        for linear in &contents.blocks {
            if linear.block == Block::End {
                depth = depth.saturating_sub(1);
            }
            out.push_str(&format!(
                "  {:>8}  {}{}\n",
                linear.offset,
                "  ".repeat(depth),
                describe_block(&linear.block, contents, options.payload_preview)
            ));
            if linear.block.opens_container() {
                depth += 1;
            }
        }
    }

    if options.tree {
        let tree = flatten(&contents.blocks, &contents.keys, &contents.types, DEFAULT_MAX_DEPTH)?;
        out.push_str("tree:\n");
        render_node(&mut out, &tree.root, "<root>", 1, contents);
        let mut objects: Vec<(&ObjId, &Node)> = tree.objects.iter().collect();
        objects.sort_by_key(|(obj, _)| **obj);
        out.push_str(&format!("objects ({}):\n", objects.len()));
        for (obj, node) in objects {
            render_node(&mut out, node, &obj.to_string(), 1, contents);
        }
    }
    Ok(out)
}

fn key_label(keys: &KeyTable, key: KeyId) -> String {
    keys.describe(key)
}

fn type_label(types: &TypeTable, type_id: TypeId) -> String {
    types
        .get(type_id)
        .map(|entry| format!("{} v{}", entry.name, entry.version))
        .unwrap_or_else(|| type_id.to_string())
}

fn describe_block(block: &Block, contents: &Contents<'_>, preview: usize) -> String {
    let mut line = block.tag().name().to_owned();
    if let Some(key) = block.key() {
        line.push_str(&format!(" key={}", key_label(&contents.keys, key)));
    }
    if let Some(type_id) = block.type_id() {
        line.push_str(&format!(" type={}", type_label(&contents.types, type_id)));
    }
    match block {
        Block::StrongPtr(_, obj) | Block::ConditionalPtr(_, obj) => line.push_str(&format!(" -> {obj}")),
        _ => {
            if let Some(obj) = block.defined_obj() {
                line.push_str(&format!(" obj={obj}"));
            }
        }
    }
    if let Some(payload) = block.payload() {
        line.push_str(&format!(" [{} bytes]", payload.len()));
        if preview > 0 {
            let shown = payload.start..payload.end.min(payload.start + preview);
            let more = if shown.end < payload.end { ".." } else { "" };
            line.push_str(&format!(" {}{}", hex::encode(&contents.data[shown]), more));
        }
    }
    line
}

fn render_node(out: &mut String, node: &Node, label: &str, depth: usize, contents: &Contents<'_>) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!("{label}: {}", node.kind.name()));
    if let Some(type_id) = node.type_id {
        out.push_str(&format!(" {}", type_label(&contents.types, type_id)));
    }
    match &node.kind {
        NodeKind::StrongPtr(obj) | NodeKind::ConditionalPtr(obj) => out.push_str(&format!(" -> {obj}")),
        NodeKind::Binary(range) => out.push_str(&format!(" [{} bytes]", range.len())),
        NodeKind::Nil | NodeKind::Container => {}
    }
    out.push('\n');
    for (key, child) in &node.keyed {
        render_node(out, child, &key_label(&contents.keys, *key), depth + 1, contents);
    }
    for (index, child) in node.positional.iter().rev().enumerate() {
        render_node(out, child, &format!("[{index}]"), depth + 1, contents);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_stream::LinearBlock;
    use crate::superblock::Superblock;

    #[test]
    fn renders_blocks_and_tree() {
        let data = b"\x2a".to_vec();
        let mut keys = KeyTable::default();
        let answer = keys.intern("answer");
        let blocks = vec![
            Block::IdValue(KeyId::POSITIONAL, ObjId(0)),
            Block::BinValue(answer, 0..1),
            Block::End,
        ];
        let contents = Contents {
            data:   &data,
            header: Superblock::new(3, true),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(i, block)| LinearBlock { block, offset: i as u64, next: i as u64 + 1 })
                .collect(),
            types:  TypeTable::default(),
            keys,
        };
        let text = render(&contents, &DumpOptions::default()).unwrap();
        assert!(text.contains("user v3"));
        assert!(text.contains("BinValue key=answer [1 bytes] 2a"));
        assert!(text.contains("<root>: strong pointer -> #0"));
        assert!(text.contains("answer: binary value [1 bytes]"));
    }
}

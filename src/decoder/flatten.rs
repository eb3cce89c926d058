//! Pass 2: rebuild the tree from the linear block list.
//!
//! Every identity-bearing node (`IdValue`, `IdRef` and their `Bin` forms) is
//! moved out of the tree into the object map and replaced in place by a
//! `StrongPtr` stub.  Afterwards no object is reachable through more than
//! one path, so construction never revisits a subtree.
//!
//! The walk is iterative; nesting depth only grows the explicit stack.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::block::{Block, KeyId, ObjId, TypeId};
use crate::error::{ArchiveError, ArchiveResult};
use crate::index::{KeyTable, TypeTable};
use crate::io_stream::LinearBlock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Nil,
    Container,
    Binary(Range<usize>),
    StrongPtr(ObjId),
    ConditionalPtr(ObjId),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Nil               => "nil",
            NodeKind::Container         => "container",
            NodeKind::Binary(_)         => "binary value",
            NodeKind::StrongPtr(_)      => "strong pointer",
            NodeKind::ConditionalPtr(_) => "conditional pointer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind:       NodeKind,
    pub type_id:    Option<TypeId>,
    /// Identity this node defines.  Only set on nodes in the object map.
    pub obj:        Option<ObjId>,
    /// Offset of the block that produced this node.
    pub offset:     u64,
    pub keyed:      BTreeMap<KeyId, Node>,
    /// Positional children, last element first: `pop()` yields them in
    /// encoding order.
    pub positional: Vec<Node>,
}

impl Node {
    fn from_block(block: &Block, offset: u64) -> Self {
        let kind = match block {
            Block::Nil(_) => NodeKind::Nil,
            Block::StrongPtr(_, obj) => NodeKind::StrongPtr(*obj),
            Block::ConditionalPtr(_, obj) => NodeKind::ConditionalPtr(*obj),
            _ => match block.payload() {
                Some(range) => NodeKind::Binary(range),
                None => NodeKind::Container,
            },
        };
        Self {
            kind,
            type_id: block.type_id(),
            obj: block.defined_obj(),
            offset,
            keyed: BTreeMap::new(),
            positional: Vec::new(),
        }
    }

    fn stub(obj: ObjId, offset: u64) -> Self {
        Self {
            kind: NodeKind::StrongPtr(obj),
            type_id: None,
            obj: None,
            offset,
            keyed: BTreeMap::new(),
            positional: Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.keyed.len() + self.positional.len()
    }
}

/// The flattened archive: the root plus every identity-bearing subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub root:    Node,
    pub objects: HashMap<ObjId, Node>,
}

pub fn flatten(
    blocks: &[LinearBlock],
    keys: &KeyTable,
    types: &TypeTable,
    max_depth: usize,
) -> ArchiveResult<Tree> {
    let mut stack: Vec<(KeyId, Node)> = Vec::new();
    let mut objects = HashMap::new();
    let mut root = None;

    for linear in blocks {
        let offset = linear.offset;
        let Some(key) = linear.block.key() else {
            let (key, mut node) = stack.pop().ok_or(ArchiveError::UnexpectedEnd { offset })?;
            node.positional.reverse();
            attach(&mut stack, &mut objects, &mut root, keys, key, node)?;
            continue;
        };

        if !key.is_positional() && keys.name(key).is_none() {
            return Err(ArchiveError::UnknownKeyId { key, offset });
        }
        if let Some(type_id) = linear.block.type_id() {
            if types.get(type_id).is_none() {
                return Err(ArchiveError::UnknownTypeId { type_id, offset });
            }
        }

        let node = Node::from_block(&linear.block, offset);
        if linear.block.opens_container() {
            if stack.len() >= max_depth {
                return Err(ArchiveError::DepthExceeded { limit: max_depth, offset });
            }
            stack.push((key, node));
        } else {
            attach(&mut stack, &mut objects, &mut root, keys, key, node)?;
        }
    }

    if !stack.is_empty() {
        return Err(ArchiveError::UnterminatedContainer { open: stack.len() });
    }
    let root = root.ok_or(ArchiveError::MissingRoot)?;
    tracing::debug!(objects = objects.len(), "tree flattened");
    Ok(Tree { root, objects })
}

/// File a completed node under its parent, splicing it into the object
/// map first if it defines an identity.
fn attach(
    stack: &mut [(KeyId, Node)],
    objects: &mut HashMap<ObjId, Node>,
    root: &mut Option<Node>,
    keys: &KeyTable,
    key: KeyId,
    node: Node,
) -> ArchiveResult<()> {
    let offset = node.offset;
    let node = match node.obj {
        Some(obj) => {
            if objects.contains_key(&obj) {
                return Err(ArchiveError::DuplicateObjId { obj, offset });
            }
            objects.insert(obj, node);
            Node::stub(obj, offset)
        }
        None => node,
    };

    match stack.last_mut() {
        Some((_, parent)) if key.is_positional() => parent.positional.push(node),
        Some((_, parent)) => {
            if parent.keyed.contains_key(&key) {
                return Err(ArchiveError::DuplicateKeyInArchive { key: keys.describe(key), offset });
            }
            parent.keyed.insert(key, node);
        }
        None if root.is_some() => return Err(ArchiveError::TrailingRoot { offset }),
        None => *root = Some(node),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TypeEntry;

    fn linear(blocks: Vec<Block>) -> Vec<LinearBlock> {
        blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| LinearBlock { block, offset: i as u64 * 10, next: i as u64 * 10 + 10 })
            .collect()
    }

    fn tables() -> (KeyTable, TypeTable) {
        let mut keys = KeyTable::default();
        keys.intern("a");
        keys.intern("b");
        let mut types = TypeTable::default();
        types.insert(TypeEntry { id: 0, name: "T".into(), version: 1 }).unwrap();
        (keys, types)
    }

    fn run(blocks: Vec<Block>) -> ArchiveResult<Tree> {
        let (keys, types) = tables();
        flatten(&linear(blocks), &keys, &types, 64)
    }

    #[test]
    fn identity_nodes_are_spliced_out() {
        let tree = run(vec![
            Block::Value(KeyId(0)),
            Block::IdRef(KeyId(1), TypeId(0), ObjId(0)),
            Block::IdValue(KeyId(1), ObjId(1)),
            Block::End,
            Block::End,
            Block::StrongPtr(KeyId(2), ObjId(0)),
            Block::End,
        ])
        .unwrap();
        assert_eq!(tree.root.keyed[&KeyId(1)].kind, NodeKind::StrongPtr(ObjId(0)));
        assert_eq!(tree.objects.len(), 2);
        let outer = &tree.objects[&ObjId(0)];
        assert_eq!(outer.type_id, Some(TypeId(0)));
        assert_eq!(outer.keyed[&KeyId(1)].kind, NodeKind::StrongPtr(ObjId(1)));
    }

    #[test]
    fn positional_children_pop_in_order() {
        let mut tree = run(vec![
            Block::Value(KeyId(0)),
            Block::BinValue(KeyId(0), 1..2),
            Block::BinValue(KeyId(0), 2..3),
            Block::Nil(KeyId(0)),
            Block::End,
        ])
        .unwrap();
        assert_eq!(tree.root.positional.pop().unwrap().kind, NodeKind::Binary(1..2));
        assert_eq!(tree.root.positional.pop().unwrap().kind, NodeKind::Binary(2..3));
        assert_eq!(tree.root.positional.pop().unwrap().kind, NodeKind::Nil);
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(run(vec![Block::End]), Err(ArchiveError::UnexpectedEnd { offset: 0 })));
        assert!(matches!(run(vec![]), Err(ArchiveError::MissingRoot)));
        assert!(matches!(
            run(vec![Block::Value(KeyId(0)), Block::Value(KeyId(1))]),
            Err(ArchiveError::UnterminatedContainer { open: 2 })
        ));
        assert!(matches!(
            run(vec![Block::Nil(KeyId(0)), Block::Nil(KeyId(0))]),
            Err(ArchiveError::TrailingRoot { offset: 10 })
        ));
        assert!(matches!(
            run(vec![Block::Value(KeyId(0)), Block::Nil(KeyId(1)), Block::Nil(KeyId(1)), Block::End]),
            Err(ArchiveError::DuplicateKeyInArchive { ref key, offset: 20 }) if key == "a"
        ));
        assert!(matches!(
            run(vec![Block::Value(KeyId(0)), Block::Nil(KeyId(9)), Block::End]),
            Err(ArchiveError::UnknownKeyId { key: KeyId(9), .. })
        ));
        assert!(matches!(
            run(vec![Block::Ref(KeyId(0), TypeId(4)), Block::End]),
            Err(ArchiveError::UnknownTypeId { type_id: TypeId(4), .. })
        ));
    }

    #[test]
    fn duplicate_identity_definition() {
        let result = run(vec![
            Block::Value(KeyId(0)),
            Block::IdValue(KeyId(1), ObjId(3)),
            Block::End,
            Block::IdValue(KeyId(2), ObjId(3)),
            Block::End,
            Block::End,
        ]);
        assert!(matches!(result, Err(ArchiveError::DuplicateObjId { obj: ObjId(3), offset: 30 })));
    }

    #[test]
    fn depth_limit() {
        let mut blocks = vec![Block::Value(KeyId(0)); 5];
        blocks.extend(vec![Block::End; 5]);
        let (keys, types) = tables();
        assert!(matches!(
            flatten(&linear(blocks), &keys, &types, 3),
            Err(ArchiveError::DepthExceeded { limit: 3, offset: 30 })
        ));
    }
}

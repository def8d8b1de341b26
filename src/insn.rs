use std::collections::HashMap;

use crate::opcodes;

/// Anchor for branch targets and exception range boundaries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct Label(u32);

/// Stable handle to a node of an [`InsnList`]. Handles stay valid after other
/// nodes are removed; a handle to a removed node resolves to `None`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct InsnId(usize);

/// Constant pushed by `ldc`, `ldc_w` or `ldc2_w`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
    /// Pool entry carried by index: method handles, method types, dynamic
    /// constants and strings that are not valid modified UTF-8.
    Pooled { index: u16, wide: bool },
}

impl Constant {
    /// Long and double constants occupy two stack slots and need `ldc2_w`.
    pub(crate) fn is_wide(&self) -> bool {
        match self {
            Constant::Long(_) | Constant::Double(_) => true,
            Constant::Pooled { wide, .. } => *wide,
            _ => false,
        }
    }
}

/// One element of a method body.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Instruction {
    /// Pseudo-instruction marking the position of a label.
    Label(Label),
    /// Opcode without operands, including `iconst_<n>`.
    Op(u8),
    /// `bipush`, `sipush` and `newarray`.
    Int { opcode: u8, operand: i32 },
    /// Local variable access; the `<op>_<n>` short forms are folded into this.
    Var { opcode: u8, index: u16 },
    Iinc { index: u16, increment: i16 },
    /// `new`, `anewarray`, `checkcast` and `instanceof`.
    Type { opcode: u8, class: String },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    Method {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        interface: bool,
    },
    InvokeDynamic { index: u16 },
    Ldc(Constant),
    Jump { opcode: u8, target: Label },
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        keys: Vec<i32>,
        targets: Vec<Label>,
    },
    MultiANewArray { class: String, dimensions: u8 },
}

impl Instruction {
    /// Opcode of a real instruction; `None` for label anchors.
    pub(crate) fn opcode(&self) -> Option<u8> {
        let opcode = match self {
            Instruction::Label(_) => return None,
            Instruction::Op(opcode)
            | Instruction::Int { opcode, .. }
            | Instruction::Var { opcode, .. }
            | Instruction::Type { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Method { opcode, .. }
            | Instruction::Jump { opcode, .. } => *opcode,
            Instruction::Iinc { .. } => opcodes::IINC,
            Instruction::InvokeDynamic { .. } => opcodes::INVOKEDYNAMIC,
            Instruction::Ldc(_) => opcodes::LDC,
            Instruction::TableSwitch { .. } => opcodes::TABLESWITCH,
            Instruction::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
            Instruction::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
        };
        Some(opcode)
    }

    pub(crate) fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    /// Labels this instruction may transfer control to.
    pub(crate) fn branch_targets(&self) -> Vec<Label> {
        match self {
            Instruction::Jump { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            }
            | Instruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut labels = targets.clone();
                labels.push(*default);
                labels
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn is_switch(&self) -> bool {
        matches!(
            self,
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. }
        )
    }
}

#[derive(Clone, Debug)]
struct Node {
    instruction: Instruction,
    prev: Option<InsnId>,
    next: Option<InsnId>,
    removed: bool,
}

/// Mutable instruction sequence of one method body.
///
/// Nodes live in an arena and are linked in both directions, so removing a
/// node never moves another one. Labels are anchor nodes inside the sequence;
/// they are never removed, which keeps every branch target resolvable no
/// matter which real instructions a pass deletes around them.
#[derive(Clone, Debug, Default)]
pub(crate) struct InsnList {
    nodes: Vec<Node>,
    first: Option<InsnId>,
    last: Option<InsnId>,
    len: usize,
    anchors: HashMap<Label, InsnId>,
    next_label: u32,
}

impl InsnList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, label anchors included.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Allocate a label that is not yet placed in the sequence.
    pub(crate) fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Append an instruction and return its handle.
    pub(crate) fn push(&mut self, instruction: Instruction) -> InsnId {
        let id = InsnId(self.nodes.len());
        if let Instruction::Label(label) = instruction {
            self.anchors.insert(label, id);
            if label.0 >= self.next_label {
                self.next_label = label.0 + 1;
            }
        }
        self.nodes.push(Node {
            instruction,
            prev: self.last,
            next: None,
            removed: false,
        });
        match self.last {
            Some(last) => self.nodes[last.0].next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        self.len += 1;
        id
    }

    pub(crate) fn get(&self, id: InsnId) -> Option<&Instruction> {
        self.node(id).map(|node| &node.instruction)
    }

    pub(crate) fn opcode(&self, id: InsnId) -> Option<u8> {
        self.get(id).and_then(Instruction::opcode)
    }

    pub(crate) fn first(&self) -> Option<InsnId> {
        self.first
    }

    pub(crate) fn next(&self, id: InsnId) -> Option<InsnId> {
        self.node(id).and_then(|node| node.next)
    }

    pub(crate) fn prev(&self, id: InsnId) -> Option<InsnId> {
        self.node(id).and_then(|node| node.prev)
    }

    /// First real instruction of the method, skipping leading labels.
    pub(crate) fn first_real(&self) -> Option<InsnId> {
        self.skip_labels(self.first)
    }

    /// Next real instruction after `id`, skipping labels.
    pub(crate) fn next_real(&self, id: InsnId) -> Option<InsnId> {
        self.skip_labels(self.next(id))
    }

    /// Node that anchors `label`, if it is placed in this list.
    pub(crate) fn anchor(&self, label: Label) -> Option<InsnId> {
        self.anchors
            .get(&label)
            .copied()
            .filter(|id| self.node(*id).is_some())
    }

    /// Real instruction a branch to `label` executes first.
    pub(crate) fn target(&self, label: Label) -> Option<InsnId> {
        self.anchor(label).and_then(|id| self.next_real(id))
    }

    /// Handles of all live nodes in order. Passes that remove nodes iterate
    /// over this snapshot instead of walking the links they are editing.
    pub(crate) fn ids(&self) -> Vec<InsnId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.first,
        }
    }

    /// Logical index of `id` in the current sequence, computed on demand.
    pub(crate) fn position(&self, id: InsnId) -> Option<usize> {
        self.iter().position(|(candidate, _)| candidate == id)
    }

    /// Replace a real instruction in place and return the previous one.
    /// Label anchors cannot be replaced; `None` is returned and nothing changes.
    pub(crate) fn set(&mut self, id: InsnId, instruction: Instruction) -> Option<Instruction> {
        if instruction.is_label() {
            return None;
        }
        let node = self.node_mut(id)?;
        if node.instruction.is_label() {
            return None;
        }
        Some(std::mem::replace(&mut node.instruction, instruction))
    }

    /// Mutable access to a real instruction. Label anchors are not exposed.
    pub(crate) fn get_mut(&mut self, id: InsnId) -> Option<&mut Instruction> {
        let node = self.node_mut(id)?;
        if node.instruction.is_label() {
            return None;
        }
        Some(&mut node.instruction)
    }

    /// Unlink a real instruction and return it. Label anchors are kept and
    /// `None` is returned for them, as for already removed handles.
    pub(crate) fn remove(&mut self, id: InsnId) -> Option<Instruction> {
        let node = self.node(id)?;
        if node.instruction.is_label() {
            return None;
        }
        let (prev, next) = (node.prev, node.next);
        match prev {
            Some(prev) => self.nodes[prev.0].next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.nodes[next.0].prev = prev,
            None => self.last = prev,
        }
        let node = &mut self.nodes[id.0];
        node.removed = true;
        node.prev = None;
        node.next = None;
        self.len -= 1;
        Some(node.instruction.clone())
    }

    fn skip_labels(&self, mut cursor: Option<InsnId>) -> Option<InsnId> {
        while let Some(id) = cursor {
            if !self.nodes[id.0].instruction.is_label() {
                return Some(id);
            }
            cursor = self.nodes[id.0].next;
        }
        None
    }

    fn node(&self, id: InsnId) -> Option<&Node> {
        self.nodes.get(id.0).filter(|node| !node.removed)
    }

    fn node_mut(&mut self, id: InsnId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).filter(|node| !node.removed)
    }
}

impl FromIterator<Instruction> for InsnList {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        let mut list = InsnList::new();
        for instruction in iter {
            list.push(instruction);
        }
        list
    }
}

/// Forward iterator over live nodes.
pub(crate) struct Iter<'a> {
    list: &'a InsnList,
    cursor: Option<InsnId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InsnId, &'a Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = &self.list.nodes[id.0];
        self.cursor = node.next;
        Some((id, &node.instruction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{GOTO, ICONST_1, IRETURN, NOP};

    fn opcodes_of(list: &InsnList) -> Vec<Option<u8>> {
        list.iter().map(|(_, insn)| insn.opcode()).collect()
    }

    #[test]
    fn remove_keeps_order_and_other_handles() {
        let mut list = InsnList::new();
        let a = list.push(Instruction::Op(NOP));
        let b = list.push(Instruction::Op(ICONST_1));
        let c = list.push(Instruction::Op(IRETURN));

        assert_eq!(Some(Instruction::Op(ICONST_1)), list.remove(b));

        assert_eq!(vec![Some(NOP), Some(IRETURN)], opcodes_of(&list));
        assert_eq!(Some(c), list.next(a));
        assert_eq!(Some(a), list.prev(c));
        assert!(list.get(b).is_none());
        assert!(list.remove(b).is_none());
        assert_eq!(2, list.len());
    }

    #[test]
    fn removing_head_and_tail_updates_ends() {
        let mut list = InsnList::new();
        let a = list.push(Instruction::Op(NOP));
        let b = list.push(Instruction::Op(ICONST_1));
        let c = list.push(Instruction::Op(IRETURN));

        list.remove(a);
        list.remove(c);

        assert_eq!(Some(b), list.first());
        assert_eq!(None, list.next(b));
        assert_eq!(Some(0), list.position(b));
    }

    #[test]
    fn labels_survive_removal_of_their_target() {
        let mut list = InsnList::new();
        let label = list.new_label();
        list.push(Instruction::Jump {
            opcode: GOTO,
            target: label,
        });
        let anchor = list.push(Instruction::Label(label));
        let dead = list.push(Instruction::Op(NOP));
        let live = list.push(Instruction::Op(IRETURN));

        assert_eq!(Some(dead), list.target(label));
        list.remove(dead);

        assert_eq!(Some(live), list.target(label));
        assert!(list.remove(anchor).is_none());
        assert_eq!(Some(anchor), list.anchor(label));
    }

    #[test]
    fn set_refuses_to_replace_label_anchors() {
        let mut list = InsnList::new();
        let label = list.new_label();
        let anchor = list.push(Instruction::Label(label));
        let op = list.push(Instruction::Op(NOP));

        assert!(list.set(anchor, Instruction::Op(NOP)).is_none());
        assert_eq!(Some(Instruction::Op(NOP)), list.set(op, Instruction::Op(IRETURN)));
        assert_eq!(Some(IRETURN), list.opcode(op));
    }

    #[test]
    fn pushed_labels_do_not_collide_with_new_ones() {
        let mut list = InsnList::new();
        list.push(Instruction::Label(Label(7)));

        let fresh = list.new_label();

        assert!(fresh > Label(7));
    }
}

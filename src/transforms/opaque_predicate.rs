use tracing::{debug, warn};

use crate::context::DeobfuscationContext;
use crate::insn::{InsnList, Instruction};
use crate::opcodes;
use crate::transforms::{Result, Transformer};

/// Removes always-false conditions built on a constant of the main class.
///
/// The obfuscator copies a static flag of the main class into a local at
/// method entry and injects `iload <flag>; if<cond> <label>` pairs in front of
/// real comparisons:
///
/// ```text
/// getstatic OrbDefence.D:Z
/// istore 7
/// ...
/// iload 2
/// iload 7      // injected
/// ifne L11     // injected
/// if_icmpeq L12
/// ```
///
/// Every load of the flag slot is removed with the instruction that consumes
/// it. A legitimate reuse of the same slot later in the method would be
/// removed as well.
pub(crate) struct OpaquePredicateRemover;

impl Transformer for OpaquePredicateRemover {
    fn name(&self) -> &'static str {
        "OpaquePredicateRemover"
    }

    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize> {
        let mut changed = 0;
        for class in &mut context.classes {
            for method in &mut class.methods {
                if !method.has_code() {
                    continue;
                }
                let Some((flag, slot)) = flag_slot(&method.instructions, &context.main_class)
                else {
                    continue;
                };
                warn!(
                    "suspicious load of {}.{} into local {} at {}",
                    context.main_class,
                    flag,
                    slot,
                    method.display_name(&class.name)
                );
                let read = (context.main_class.as_str(), flag.as_str());
                changed += clean_method(&mut method.instructions, read, slot, &method.name);
            }
        }
        Ok(changed)
    }
}

/// `(field name, local slot)` when the method opens with
/// `getstatic <main class>.<field>; istore <slot>`.
fn flag_slot(list: &InsnList, main_class: &str) -> Option<(String, u16)> {
    let first = list.first_real()?;
    let Some(Instruction::Field {
        opcode: opcodes::GETSTATIC,
        owner,
        name,
        ..
    }) = list.get(first)
    else {
        return None;
    };
    if owner != main_class {
        return None;
    }
    match list.next(first).and_then(|next| list.get(next)) {
        Some(Instruction::Var {
            opcode: opcodes::ISTORE,
            index,
        }) => Some((name.clone(), *index)),
        _ => None,
    }
}

/// Strip every store of the flag read and every load of `slot` with its consumer.
fn clean_method(list: &mut InsnList, flag: (&str, &str), slot: u16, method: &str) -> usize {
    let mut removed = 0;
    for id in list.ids() {
        match list.get(id) {
            Some(Instruction::Var {
                opcode: opcodes::ISTORE,
                index,
            }) if *index == slot => {
                let Some(read) = list.prev(id) else {
                    continue;
                };
                let is_flag_read = matches!(
                    list.get(read),
                    Some(Instruction::Field {
                        opcode: opcodes::GETSTATIC,
                        owner,
                        name,
                        ..
                    }) if (owner.as_str(), name.as_str()) == flag
                );
                if is_flag_read {
                    list.remove(read);
                    list.remove(id);
                    removed += 1;
                }
            }
            Some(Instruction::Var {
                opcode: opcodes::ILOAD,
                index,
            }) if *index == slot => {
                let consumer = list
                    .next(id)
                    .filter(|next| list.get(*next).is_some_and(|insn| !insn.is_label()));
                let Some(consumer) = consumer else {
                    warn!(
                        "{}: load of local {} at index {:?} has no consumer to remove",
                        method,
                        slot,
                        list.position(id)
                    );
                    continue;
                };
                debug!(
                    "{}: removing iload {} and {:?}",
                    method,
                    slot,
                    list.get(consumer)
                );
                list.remove(consumer);
                list.remove(id);
                removed += 1;
            }
            _ => {}
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::Label;
    use crate::opcodes::{GETSTATIC, ICONST_0, ICONST_1, IF_ICMPEQ, IFNE, ILOAD, IRETURN, ISTORE};
    use crate::transforms::fixtures::{MAIN_CLASS, class, context, method, real};

    fn flag_read(owner: &str) -> Instruction {
        Instruction::Field {
            opcode: GETSTATIC,
            owner: owner.to_string(),
            name: "FLAG".to_string(),
            descriptor: "Z".to_string(),
        }
    }

    fn iload(index: u16) -> Instruction {
        Instruction::Var {
            opcode: ILOAD,
            index,
        }
    }

    /// `getstatic <owner>.FLAG; istore 7; iload 2; iload 7; ifne L1;
    /// iload 3; if_icmpeq L2; iconst_0; ireturn; L1: L2: iconst_1; ireturn`
    fn guarded(owner: &str) -> (InsnList, Label, Label) {
        let mut list = InsnList::new();
        let opaque = list.new_label();
        let real_target = list.new_label();
        list.push(flag_read(owner));
        list.push(Instruction::Var {
            opcode: ISTORE,
            index: 7,
        });
        list.push(iload(2));
        list.push(iload(7));
        list.push(Instruction::Jump {
            opcode: IFNE,
            target: opaque,
        });
        list.push(iload(3));
        list.push(Instruction::Jump {
            opcode: IF_ICMPEQ,
            target: real_target,
        });
        list.push(Instruction::Op(ICONST_0));
        list.push(Instruction::Op(IRETURN));
        list.push(Instruction::Label(opaque));
        list.push(Instruction::Label(real_target));
        list.push(Instruction::Op(ICONST_1));
        list.push(Instruction::Op(IRETURN));
        (list, opaque, real_target)
    }

    #[test]
    fn flag_loads_and_their_branches_are_removed() {
        let (list, opaque, real_target) = guarded(MAIN_CLASS);
        let mut context = context(vec![class("a", vec![method("a", "(III)I", list)])]);

        let changed = OpaquePredicateRemover.process(&mut context).expect("process");

        assert_eq!(2, changed);
        let list = &context.classes[0].methods[0].instructions;
        assert_eq!(
            vec![
                iload(2),
                iload(3),
                Instruction::Jump {
                    opcode: IF_ICMPEQ,
                    target: real_target,
                },
                Instruction::Op(ICONST_0),
                Instruction::Op(IRETURN),
                Instruction::Op(ICONST_1),
                Instruction::Op(IRETURN),
            ],
            real(list)
        );
        assert!(list.anchor(opaque).is_some());
    }

    #[test]
    fn reads_of_other_classes_are_ignored() {
        let (list, _, _) = guarded("Other");
        let before = real(&list);
        let mut context = context(vec![class("a", vec![method("a", "(III)I", list)])]);

        let changed = OpaquePredicateRemover.process(&mut context).expect("process");

        assert_eq!(0, changed);
        assert_eq!(before, real(&context.classes[0].methods[0].instructions));
    }

    #[test]
    fn load_without_consumer_is_left_intact() {
        let mut list = InsnList::new();
        let end = list.new_label();
        list.push(flag_read(MAIN_CLASS));
        list.push(Instruction::Var {
            opcode: ISTORE,
            index: 7,
        });
        list.push(iload(7));
        list.push(Instruction::Label(end));
        list.push(Instruction::Op(IRETURN));
        let mut context = context(vec![class("a", vec![method("a", "()I", list)])]);

        let changed = OpaquePredicateRemover.process(&mut context).expect("process");

        assert_eq!(1, changed);
        assert_eq!(
            vec![iload(7), Instruction::Op(IRETURN)],
            real(&context.classes[0].methods[0].instructions)
        );
    }
}

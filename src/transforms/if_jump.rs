use tracing::debug;

use crate::context::DeobfuscationContext;
use crate::insn::Instruction;
use crate::opcodes;
use crate::transforms::{Result, Transformer};

/// Points conditional branches that land on a `goto` straight at the `goto`'s
/// destination. One hop per run; `goto_w` is never followed.
pub(crate) struct RedundantJumpCollapser;

impl Transformer for RedundantJumpCollapser {
    fn name(&self) -> &'static str {
        "RedundantJumpCollapser"
    }

    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize> {
        let mut changed = 0;
        for class in &mut context.classes {
            for method in &mut class.methods {
                let list = &mut method.instructions;
                for id in list.ids() {
                    let Some(Instruction::Jump { opcode, target }) = list.get(id) else {
                        continue;
                    };
                    if !opcodes::is_conditional_branch(*opcode) {
                        continue;
                    }
                    let destination = match list.target(*target).and_then(|goto| list.get(goto)) {
                        Some(Instruction::Jump {
                            opcode: opcodes::GOTO,
                            target: destination,
                        }) if destination != target => *destination,
                        _ => continue,
                    };
                    if let Some(Instruction::Jump { target, .. }) = list.get_mut(id) {
                        debug!("{}: {:?} -> {:?}", method.name, target, destination);
                        *target = destination;
                        changed += 1;
                    }
                }
            }
        }
        Ok(changed)
    }
}

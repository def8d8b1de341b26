use tracing::debug;

use crate::context::DeobfuscationContext;
use crate::insn::{Constant, Instruction};
use crate::opcodes;
use crate::transforms::{Result, Transformer};

/// The JVM only honours the low five bits of a 32-bit shift distance.
const SHIFT_MASK: i32 = 0x1F;

/// Reduces obfuscated shift distances such as `x >> 1171161633` to `x >> 1`.
pub(crate) struct BitshiftNormalizer;

impl Transformer for BitshiftNormalizer {
    fn name(&self) -> &'static str {
        "BitshiftNormalizer"
    }

    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize> {
        let mut changed = 0;
        for class in &mut context.classes {
            for method in &mut class.methods {
                let list = &mut method.instructions;
                for id in list.ids() {
                    if !list.opcode(id).is_some_and(opcodes::is_int_shift) {
                        continue;
                    }
                    let Some(previous) = list.prev(id) else {
                        continue;
                    };
                    if let Some(Instruction::Ldc(Constant::Integer(distance))) =
                        list.get_mut(previous)
                    {
                        let masked = *distance & SHIFT_MASK;
                        if masked != *distance {
                            debug!(
                                "{}: shift distance {} -> {}",
                                method.name, distance, masked
                            );
                            *distance = masked;
                            changed += 1;
                        }
                    }
                }
            }
        }
        Ok(changed)
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use tracing::debug;

use crate::classfile::RawHandler;
use crate::constant_pool::ConstantPool;
use crate::insn::{Constant, InsnList, Instruction, Label};
use crate::ir::ExceptionRange;
use crate::opcodes;

const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Decode a method body into an instruction list. A label is placed at every
/// branch target and exception table boundary.
pub(crate) fn decode_code(
    code: &[u8],
    handlers: &[RawHandler],
    pool: &ConstantPool,
) -> Result<(InsnList, Vec<ExceptionRange>)> {
    let mut list = InsnList::new();
    let mut labels = BTreeMap::new();
    let mut boundaries = BTreeSet::new();

    let mut offset = 0usize;
    while offset < code.len() {
        boundaries.insert(offset);
        if let Some(targets) = branch_targets(code, offset)? {
            for target in targets {
                place_label(&mut list, &mut labels, target, code.len())?;
            }
        }
        offset += opcode_length(code, offset)?;
    }
    if offset != code.len() {
        anyhow::bail!("last instruction overruns the code array");
    }
    for handler in handlers {
        for pc in [handler.start_pc, handler.end_pc, handler.handler_pc] {
            place_label(&mut list, &mut labels, pc as usize, code.len())?;
        }
    }
    for target in labels.keys() {
        if *target != code.len() && !boundaries.contains(target) {
            anyhow::bail!("branch target {} is not an instruction boundary", target);
        }
    }

    let mut offset = 0usize;
    while offset < code.len() {
        if let Some(label) = labels.get(&offset) {
            list.push(Instruction::Label(*label));
        }
        let instruction = decode_instruction(code, offset, &labels, pool)
            .with_context(|| format!("decode instruction at offset {}", offset))?;
        list.push(instruction);
        offset += opcode_length(code, offset)?;
    }
    if let Some(label) = labels.get(&code.len()) {
        list.push(Instruction::Label(*label));
    }

    let mut ranges = Vec::with_capacity(handlers.len());
    for handler in handlers {
        let catch_type = if handler.catch_type == 0 {
            None
        } else {
            Some(
                pool.class_name(handler.catch_type)
                    .context("resolve catch type")?,
            )
        };
        ranges.push(ExceptionRange {
            start: labels[&(handler.start_pc as usize)],
            end: labels[&(handler.end_pc as usize)],
            handler: labels[&(handler.handler_pc as usize)],
            catch_type,
        });
    }

    Ok((list, ranges))
}

fn place_label(
    list: &mut InsnList,
    labels: &mut BTreeMap<usize, Label>,
    offset: usize,
    code_length: usize,
) -> Result<Label> {
    if offset > code_length {
        anyhow::bail!("target {} lies outside the code array", offset);
    }
    Ok(*labels.entry(offset).or_insert_with(|| list.new_label()))
}

fn label_at(labels: &BTreeMap<usize, Label>, offset: usize, relative: i64) -> Result<Label> {
    let target = offset as i64 + relative;
    usize::try_from(target)
        .ok()
        .and_then(|target| labels.get(&target).copied())
        .with_context(|| format!("no label at branch target {}", target))
}

fn decode_instruction(
    code: &[u8],
    offset: usize,
    labels: &BTreeMap<usize, Label>,
    pool: &ConstantPool,
) -> Result<Instruction> {
    let opcode = code[offset];
    let instruction = match opcode {
        opcodes::NOP..=opcodes::DCONST_1 => Instruction::Op(opcode),
        opcodes::BIPUSH => Instruction::Int {
            opcode,
            operand: read_u8(code, offset + 1)? as i8 as i32,
        },
        opcodes::SIPUSH => Instruction::Int {
            opcode,
            operand: read_i16(code, offset + 1)? as i32,
        },
        opcodes::LDC => {
            let index = read_u8(code, offset + 1)? as u16;
            Instruction::Ldc(pool.loadable(index)?)
        }
        opcodes::LDC_W | opcodes::LDC2_W => {
            let index = read_u16(code, offset + 1)?;
            Instruction::Ldc(pool.loadable(index)?)
        }
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
            Instruction::Var {
                opcode,
                index: read_u8(code, offset + 1)? as u16,
            }
        }
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
            let relative = opcode - opcodes::ILOAD_0;
            Instruction::Var {
                opcode: opcodes::ILOAD + relative / 4,
                index: (relative % 4) as u16,
            }
        }
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
            let relative = opcode - opcodes::ISTORE_0;
            Instruction::Var {
                opcode: opcodes::ISTORE + relative / 4,
                index: (relative % 4) as u16,
            }
        }
        opcodes::IALOAD..=opcodes::SALOAD => Instruction::Op(opcode),
        opcodes::IASTORE..=0x83 => Instruction::Op(opcode),
        opcodes::IINC => Instruction::Iinc {
            index: read_u8(code, offset + 1)? as u16,
            increment: read_u8(code, offset + 2)? as i8 as i16,
        },
        0x85..=0x98 => Instruction::Op(opcode),
        opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
            Instruction::Jump {
                opcode,
                target: label_at(labels, offset, read_i16(code, offset + 1)? as i64)?,
            }
        }
        opcodes::GOTO_W | opcodes::JSR_W => Instruction::Jump {
            opcode,
            target: label_at(labels, offset, read_i32(code, offset + 1)? as i64)?,
        },
        opcodes::TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let default = label_at(labels, offset, read_i32(code, base)? as i64)?;
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            let count = switch_count(low, high)?;
            let mut targets = Vec::with_capacity(count);
            for arm in 0..count {
                let relative = read_i32(code, base + 12 + arm * 4)?;
                targets.push(label_at(labels, offset, relative as i64)?);
            }
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        opcodes::LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let default = label_at(labels, offset, read_i32(code, base)? as i64)?;
            let pairs = read_i32(code, base + 4)?;
            let pairs = usize::try_from(pairs).context("invalid lookupswitch pairs")?;
            let mut keys = Vec::with_capacity(pairs);
            let mut targets = Vec::with_capacity(pairs);
            for pair in 0..pairs {
                let at = base + 8 + pair * 8;
                keys.push(read_i32(code, at)?);
                targets.push(label_at(labels, offset, read_i32(code, at + 4)? as i64)?);
            }
            Instruction::LookupSwitch {
                default,
                keys,
                targets,
            }
        }
        opcodes::IRETURN..=opcodes::RETURN => Instruction::Op(opcode),
        opcodes::GETSTATIC..=opcodes::PUTFIELD => {
            let member = pool.member_ref(read_u16(code, offset + 1)?)?;
            Instruction::Field {
                opcode,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
            }
        }
        opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => {
            let member = pool.member_ref(read_u16(code, offset + 1)?)?;
            Instruction::Method {
                opcode,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
                interface: member.interface,
            }
        }
        opcodes::INVOKEDYNAMIC => Instruction::InvokeDynamic {
            index: read_u16(code, offset + 1)?,
        },
        opcodes::NEW | opcodes::ANEWARRAY | opcodes::CHECKCAST | opcodes::INSTANCEOF => {
            Instruction::Type {
                opcode,
                class: pool.class_name(read_u16(code, offset + 1)?)?,
            }
        }
        opcodes::NEWARRAY => Instruction::Int {
            opcode,
            operand: read_u8(code, offset + 1)? as i32,
        },
        opcodes::ARRAYLENGTH | opcodes::ATHROW | opcodes::MONITORENTER | opcodes::MONITOREXIT => {
            Instruction::Op(opcode)
        }
        opcodes::WIDE => {
            let widened = read_u8(code, offset + 1)?;
            let index = read_u16(code, offset + 2)?;
            match widened {
                opcodes::IINC => Instruction::Iinc {
                    index,
                    increment: read_i16(code, offset + 4)?,
                },
                opcodes::ILOAD..=opcodes::ALOAD
                | opcodes::ISTORE..=opcodes::ASTORE
                | opcodes::RET => Instruction::Var {
                    opcode: widened,
                    index,
                },
                _ => anyhow::bail!("invalid wide opcode 0x{:02x}", widened),
            }
        }
        opcodes::MULTIANEWARRAY => Instruction::MultiANewArray {
            class: pool.class_name(read_u16(code, offset + 1)?)?,
            dimensions: read_u8(code, offset + 3)?,
        },
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(instruction)
}

/// Encode an instruction list and its exception ranges back into a code array
/// and exception table. Constants the body references are added to `pool`.
///
/// Every branch label must be placed in the list. Exception ranges that became
/// empty because everything they covered was removed are dropped.
pub(crate) fn encode_code(
    list: &InsnList,
    ranges: &[ExceptionRange],
    pool: &mut ConstantPool,
) -> Result<(Vec<u8>, Vec<RawHandler>)> {
    let mut plan = Vec::with_capacity(list.len());
    for (_, instruction) in list.iter() {
        let operand = pool_operand(instruction, pool)?;
        plan.push((instruction, operand));
    }

    let mut offsets = Vec::with_capacity(plan.len());
    let mut labels = HashMap::new();
    let mut offset = 0usize;
    for (instruction, operand) in &plan {
        if let Instruction::Label(label) = instruction {
            labels.insert(*label, offset);
        }
        offsets.push(offset);
        offset += encoded_length(instruction, *operand, offset);
    }
    if offset > MAX_CODE_LENGTH {
        anyhow::bail!(
            "method body of {} bytes exceeds the {} byte limit",
            offset,
            MAX_CODE_LENGTH
        );
    }

    let mut code = Vec::with_capacity(offset);
    for ((instruction, operand), at) in plan.iter().zip(offsets) {
        emit(&mut code, instruction, *operand, at, &labels)
            .with_context(|| format!("encode instruction at offset {}", at))?;
    }

    let mut handlers = Vec::with_capacity(ranges.len());
    for range in ranges {
        let start = resolve(&labels, range.start)?;
        let end = resolve(&labels, range.end)?;
        let handler_pc = resolve(&labels, range.handler)?;
        if start >= end {
            debug!(
                "dropping empty exception range {}..{} for {:?}",
                start, end, range.catch_type
            );
            continue;
        }
        let catch_type = match &range.catch_type {
            Some(name) => pool.add_class(name)?,
            None => 0,
        };
        handlers.push(RawHandler {
            start_pc: start as u16,
            end_pc: end as u16,
            handler_pc: handler_pc as u16,
            catch_type,
        });
    }

    Ok((code, handlers))
}

fn resolve(labels: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    labels
        .get(&label)
        .copied()
        .with_context(|| format!("{:?} is not placed in the method body", label))
}

fn pool_operand(instruction: &Instruction, pool: &mut ConstantPool) -> Result<u16> {
    let index = match instruction {
        Instruction::Type { class, .. } | Instruction::MultiANewArray { class, .. } => {
            pool.add_class(class)?
        }
        Instruction::Field {
            owner,
            name,
            descriptor,
            ..
        } => pool.add_field_ref(owner, name, descriptor)?,
        Instruction::Method {
            owner,
            name,
            descriptor,
            interface,
            ..
        } => pool.add_method_ref(owner, name, descriptor, *interface)?,
        Instruction::Ldc(constant) => pool.add_constant(constant)?,
        Instruction::InvokeDynamic { index } => {
            pool.entry(*index)?;
            *index
        }
        _ => 0,
    };
    Ok(index)
}

fn encoded_length(instruction: &Instruction, operand: u16, offset: usize) -> usize {
    match instruction {
        Instruction::Label(_) => 0,
        Instruction::Op(_) => 1,
        Instruction::Int { opcode, .. } => {
            if *opcode == opcodes::SIPUSH {
                3
            } else {
                2
            }
        }
        Instruction::Var { opcode, index } => {
            if *index <= 3 && *opcode != opcodes::RET {
                1
            } else if *index <= u8::MAX as u16 {
                2
            } else {
                4
            }
        }
        Instruction::Iinc { index, increment } => {
            if *index <= u8::MAX as u16 && i8::try_from(*increment).is_ok() {
                3
            } else {
                6
            }
        }
        Instruction::Type { .. } | Instruction::Field { .. } => 3,
        Instruction::Method { opcode, .. } => {
            if *opcode == opcodes::INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Instruction::InvokeDynamic { .. } => 5,
        Instruction::Ldc(constant) => {
            if constant.is_wide() || operand > u8::MAX as u16 {
                3
            } else {
                2
            }
        }
        Instruction::Jump { opcode, .. } => {
            if matches!(*opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                5
            } else {
                3
            }
        }
        Instruction::TableSwitch { targets, .. } => 1 + padding(offset) + 12 + targets.len() * 4,
        Instruction::LookupSwitch { targets, .. } => 1 + padding(offset) + 8 + targets.len() * 8,
        Instruction::MultiANewArray { .. } => 4,
    }
}

fn emit(
    code: &mut Vec<u8>,
    instruction: &Instruction,
    operand: u16,
    at: usize,
    labels: &HashMap<Label, usize>,
) -> Result<()> {
    let relative = |label: Label| -> Result<i64> { Ok(resolve(labels, label)? as i64 - at as i64) };
    match instruction {
        Instruction::Label(_) => {}
        Instruction::Op(opcode) => code.push(*opcode),
        Instruction::Int { opcode, operand } => match *opcode {
            opcodes::BIPUSH => {
                let value = i8::try_from(*operand).context("bipush operand out of range")?;
                code.extend_from_slice(&[*opcode, value as u8]);
            }
            opcodes::SIPUSH => {
                let value = i16::try_from(*operand).context("sipush operand out of range")?;
                code.push(*opcode);
                code.extend_from_slice(&value.to_be_bytes());
            }
            opcodes::NEWARRAY => {
                let value = u8::try_from(*operand).context("newarray type out of range")?;
                code.extend_from_slice(&[*opcode, value]);
            }
            _ => anyhow::bail!("opcode 0x{:02x} takes no immediate", opcode),
        },
        Instruction::Var { opcode, index } => {
            if *index <= 3 && *opcode != opcodes::RET {
                let short = match *opcode {
                    opcodes::ILOAD..=opcodes::ALOAD => {
                        opcodes::ILOAD_0 + (opcode - opcodes::ILOAD) * 4
                    }
                    opcodes::ISTORE..=opcodes::ASTORE => {
                        opcodes::ISTORE_0 + (opcode - opcodes::ISTORE) * 4
                    }
                    _ => anyhow::bail!("opcode 0x{:02x} is not a local variable access", opcode),
                };
                code.push(short + *index as u8);
            } else if *index <= u8::MAX as u16 {
                code.extend_from_slice(&[*opcode, *index as u8]);
            } else {
                code.extend_from_slice(&[opcodes::WIDE, *opcode]);
                code.extend_from_slice(&index.to_be_bytes());
            }
        }
        Instruction::Iinc { index, increment } => {
            match (u8::try_from(*index), i8::try_from(*increment)) {
                (Ok(index), Ok(increment)) => {
                    code.extend_from_slice(&[opcodes::IINC, index, increment as u8])
                }
                _ => {
                    code.extend_from_slice(&[opcodes::WIDE, opcodes::IINC]);
                    code.extend_from_slice(&index.to_be_bytes());
                    code.extend_from_slice(&increment.to_be_bytes());
                }
            }
        }
        Instruction::Type { opcode, .. } | Instruction::Field { opcode, .. } => {
            code.push(*opcode);
            code.extend_from_slice(&operand.to_be_bytes());
        }
        Instruction::Method {
            opcode, descriptor, ..
        } => {
            code.push(*opcode);
            code.extend_from_slice(&operand.to_be_bytes());
            if *opcode == opcodes::INVOKEINTERFACE {
                let count = argument_slots(descriptor)? + 1;
                code.extend_from_slice(&[count, 0]);
            }
        }
        Instruction::InvokeDynamic { .. } => {
            code.push(opcodes::INVOKEDYNAMIC);
            code.extend_from_slice(&operand.to_be_bytes());
            code.extend_from_slice(&[0, 0]);
        }
        Instruction::Ldc(constant) => {
            if constant.is_wide() {
                code.push(opcodes::LDC2_W);
                code.extend_from_slice(&operand.to_be_bytes());
            } else if operand > u8::MAX as u16 {
                code.push(opcodes::LDC_W);
                code.extend_from_slice(&operand.to_be_bytes());
            } else {
                code.extend_from_slice(&[opcodes::LDC, operand as u8]);
            }
        }
        Instruction::Jump { opcode, target } => {
            let relative = relative(*target)?;
            code.push(*opcode);
            if matches!(*opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                code.extend_from_slice(&(relative as i32).to_be_bytes());
            } else {
                let relative = i16::try_from(relative)
                    .with_context(|| format!("branch offset {} does not fit 16 bits", relative))?;
                code.extend_from_slice(&relative.to_be_bytes());
            }
        }
        Instruction::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            if switch_count(*low, *high)? != targets.len() {
                anyhow::bail!("tableswitch {}..={} has {} targets", low, high, targets.len());
            }
            code.push(opcodes::TABLESWITCH);
            code.extend(std::iter::repeat_n(0, padding(at)));
            code.extend_from_slice(&(relative(*default)? as i32).to_be_bytes());
            code.extend_from_slice(&low.to_be_bytes());
            code.extend_from_slice(&high.to_be_bytes());
            for target in targets {
                code.extend_from_slice(&(relative(*target)? as i32).to_be_bytes());
            }
        }
        Instruction::LookupSwitch {
            default,
            keys,
            targets,
        } => {
            if keys.len() != targets.len() {
                anyhow::bail!("lookupswitch has {} keys and {} targets", keys.len(), targets.len());
            }
            code.push(opcodes::LOOKUPSWITCH);
            code.extend(std::iter::repeat_n(0, padding(at)));
            code.extend_from_slice(&(relative(*default)? as i32).to_be_bytes());
            code.extend_from_slice(&(keys.len() as i32).to_be_bytes());
            for (key, target) in keys.iter().zip(targets) {
                code.extend_from_slice(&key.to_be_bytes());
                code.extend_from_slice(&(relative(*target)? as i32).to_be_bytes());
            }
        }
        Instruction::MultiANewArray { dimensions, .. } => {
            code.push(opcodes::MULTIANEWARRAY);
            code.extend_from_slice(&operand.to_be_bytes());
            code.push(*dimensions);
        }
    }
    Ok(())
}

/// Argument size in local variable slots, as `invokeinterface` encodes it.
fn argument_slots(descriptor: &str) -> Result<u8> {
    let arguments = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(arguments, _)| arguments)
        .with_context(|| format!("invalid method descriptor {}", descriptor))?;
    let mut slots = 0u32;
    let mut chars = arguments.chars();
    while let Some(c) = chars.next() {
        let mut c = c;
        let mut array = false;
        while c == '[' {
            array = true;
            c = chars
                .next()
                .with_context(|| format!("invalid method descriptor {}", descriptor))?;
        }
        if c == 'L' {
            chars
                .by_ref()
                .find(|c| *c == ';')
                .with_context(|| format!("invalid method descriptor {}", descriptor))?;
        }
        slots += if !array && matches!(c, 'J' | 'D') { 2 } else { 1 };
    }
    u8::try_from(slots).with_context(|| format!("too many arguments in {}", descriptor))
}

fn branch_targets(code: &[u8], offset: usize) -> Result<Option<Vec<usize>>> {
    let opcode = code[offset];
    let relatives: Vec<i64> = match opcode {
        opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
            vec![read_i16(code, offset + 1)? as i64]
        }
        opcodes::GOTO_W | opcodes::JSR_W => vec![read_i32(code, offset + 1)? as i64],
        opcodes::TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            let mut relatives = vec![read_i32(code, base)? as i64];
            for arm in 0..switch_count(low, high)? {
                relatives.push(read_i32(code, base + 12 + arm * 4)? as i64);
            }
            relatives
        }
        opcodes::LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let pairs = read_i32(code, base + 4)?;
            let pairs = usize::try_from(pairs).context("invalid lookupswitch pairs")?;
            let mut relatives = vec![read_i32(code, base)? as i64];
            for pair in 0..pairs {
                relatives.push(read_i32(code, base + 8 + pair * 8 + 4)? as i64);
            }
            relatives
        }
        _ => return Ok(None),
    };
    let mut targets = Vec::with_capacity(relatives.len());
    for relative in relatives {
        let target = offset as i64 + relative;
        targets.push(usize::try_from(target).context("negative branch target")?);
    }
    Ok(Some(targets))
}

fn switch_count(low: i32, high: i32) -> Result<usize> {
    let count = (high as i64) - (low as i64) + 1;
    usize::try_from(count).context("invalid tableswitch range")
}

pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        opcodes::BIPUSH => 2,
        opcodes::SIPUSH => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        opcodes::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        opcodes::RET => 2,
        opcodes::TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            1 + padding(offset) + 12 + switch_count(low, high)? * 4
        }
        opcodes::LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let pairs = read_i32(code, base + 4)?;
            let pairs = usize::try_from(pairs).context("invalid lookupswitch pairs")?;
            1 + padding(offset) + 8 + pairs * 8
        }
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        opcodes::NEW => 3,
        opcodes::NEWARRAY => 2,
        opcodes::ANEWARRAY => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        opcodes::WIDE => {
            if read_u8(code, offset + 1)? == opcodes::IINC {
                6
            } else {
                4
            }
        }
        opcodes::MULTIANEWARRAY => 4,
        0xc6 | 0xc7 => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    if offset + length > code.len() {
        anyhow::bail!("instruction at offset {} overruns the code array", offset);
    }
    Ok(length)
}

fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u8(code: &[u8], offset: usize) -> Result<u8> {
    code.get(offset)
        .copied()
        .context("bytecode u8 out of bounds")
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_i16(code: &[u8], offset: usize) -> Result<i16> {
    Ok(read_u16(code, offset)? as i16)
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode u32 out of bounds")?;
    Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::context::DeobfuscationContext;
use crate::insn::{Constant, InsnId, InsnList, Instruction};
use crate::ir::{ClassModel, FieldAccess};
use crate::opcodes;
use crate::operand::{OperandError, extract_int, is_int_push};
use crate::transforms::{Result, Transformer};

const STRING_ARRAY: &str = "[Ljava/lang/String;";

/// Replaces `getstatic z; <index>; aaload` reads of the class's private string
/// table with the constant stored at that index, then drops the table once
/// nothing reads it.
pub(crate) struct StringInliner;

impl Transformer for StringInliner {
    fn name(&self) -> &'static str {
        "StringInliner"
    }

    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize> {
        let mut changed = 0;
        for class in &mut context.classes {
            changed += inline_class(class)?;
        }
        Ok(changed)
    }
}

fn inline_class(class: &mut ClassModel) -> Result<usize> {
    let table_access = FieldAccess::PRIVATE | FieldAccess::STATIC | FieldAccess::FINAL;
    let Some(table) = class
        .fields
        .iter()
        .find(|field| field.access == table_access && field.descriptor == STRING_ARRAY)
        .map(|field| field.name.clone())
    else {
        debug!("{}: no string table field", class.name);
        return Ok(0);
    };

    let class_name = class.name.clone();
    let Some(initializer) = class.class_initializer_mut() else {
        warn!("{}: string table {} has no class initializer", class_name, table);
        return Ok(0);
    };
    let list = &initializer.instructions;
    let Some(store) = find_field_access(list, opcodes::PUTSTATIC, &table) else {
        warn!("{}: no store into string table {}", class_name, table);
        return Ok(0);
    };
    let Some((construction, values)) = collect_table(list, store)? else {
        warn!("{}: construction of string table {} not found", class_name, table);
        return Ok(0);
    };
    debug!(
        "{}: string table {} holds {} constants",
        class_name,
        table,
        values.len()
    );

    let mut changed = 0;
    let mut surviving = 0;
    for method in &mut class.methods {
        let list = &mut method.instructions;
        for id in list.ids() {
            if !is_field_access(list, id, opcodes::GETSTATIC, &table) {
                continue;
            }
            let Some((index_push, load)) = indexed_load(list, id) else {
                continue;
            };
            let Some(instruction) = list.get(index_push) else {
                continue;
            };
            let index = extract_int(instruction)?;
            let Some(value) = values.get(&index) else {
                warn!(
                    "{}.{}: no constant for index {} of {}",
                    class_name, method.name, index, table
                );
                continue;
            };
            list.set(id, Instruction::Ldc(value.clone()));
            list.remove(index_push);
            list.remove(load);
            changed += 1;
        }
        surviving += list
            .ids()
            .into_iter()
            .filter(|id| is_field_access(list, *id, opcodes::GETSTATIC, &table))
            .count();
    }

    if surviving > 0 {
        warn!(
            "{}: {} reads of string table {} remain, keeping the table",
            class_name, surviving, table
        );
        return Ok(changed);
    }
    if let Some(initializer) = class.class_initializer_mut() {
        for id in construction {
            initializer.instructions.remove(id);
        }
    }
    class.remove_field(&table, STRING_ARRAY);
    Ok(changed)
}

fn is_field_access(list: &InsnList, id: InsnId, opcode: u8, field: &str) -> bool {
    matches!(
        list.get(id),
        Some(Instruction::Field {
            opcode: actual,
            name,
            descriptor,
            ..
        }) if *actual == opcode && name == field && descriptor == STRING_ARRAY
    )
}

fn find_field_access(list: &InsnList, opcode: u8, field: &str) -> Option<InsnId> {
    list.ids()
        .into_iter()
        .find(|id| is_field_access(list, *id, opcode, field))
}

/// Walk back from the table store to the `anewarray` that allocated it.
/// Returns the nodes to delete, the length push in front of `anewarray`
/// included, and the constants keyed by the index stored before each.
fn collect_table(
    list: &InsnList,
    store: InsnId,
) -> Result<Option<(Vec<InsnId>, HashMap<i32, Constant>)>> {
    let mut construction = vec![store];
    let mut values = HashMap::new();
    let mut cursor = list.prev(store);
    while let Some(id) = cursor {
        cursor = list.prev(id);
        match list.get(id) {
            Some(Instruction::Label(_)) | None => {}
            Some(Instruction::Type {
                opcode: opcodes::ANEWARRAY,
                ..
            }) => {
                construction.push(id);
                let Some(length) = cursor.filter(|length| {
                    list.get(*length).is_some_and(is_int_push)
                }) else {
                    return Ok(None);
                };
                construction.push(length);
                return Ok(Some((construction, values)));
            }
            Some(Instruction::Ldc(value)) => {
                construction.push(id);
                let index = cursor.and_then(|index| list.get(index)).ok_or_else(|| {
                    OperandError::UnsupportedEncoding("table constant without index".to_string())
                })?;
                values.insert(extract_int(index)?, value.clone());
            }
            Some(_) => construction.push(id),
        }
    }
    Ok(None)
}

/// `(index push, aaload)` following a table read.
fn indexed_load(list: &InsnList, read: InsnId) -> Option<(InsnId, InsnId)> {
    let index_push = list.next(read)?;
    if !is_int_push(list.get(index_push)?) {
        return None;
    }
    let load = list.next(index_push)?;
    (list.opcode(load)? == opcodes::AALOAD).then_some((index_push, load))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FieldModel;
    use crate::opcodes::{
        AALOAD, AASTORE, ANEWARRAY, ARETURN, ARRAYLENGTH, DUP, GETSTATIC, ICONST_0, ICONST_1,
        ICONST_2, ICONST_5, IRETURN, PUTSTATIC, RETURN,
    };
    use crate::transforms::Error;
    use crate::transforms::fixtures::{class, context, init_tracing, method, real};

    fn table_access(opcode: u8) -> Instruction {
        Instruction::Field {
            opcode,
            owner: "a".to_string(),
            name: "z".to_string(),
            descriptor: STRING_ARRAY.to_string(),
        }
    }

    fn text(value: &str) -> Instruction {
        Instruction::Ldc(Constant::String(value.to_string()))
    }

    fn initializer() -> InsnList {
        [
            Instruction::Op(ICONST_2),
            Instruction::Type {
                opcode: ANEWARRAY,
                class: "java/lang/String".to_string(),
            },
            Instruction::Op(DUP),
            Instruction::Op(ICONST_0),
            text("alpha"),
            Instruction::Op(AASTORE),
            Instruction::Op(DUP),
            Instruction::Op(ICONST_1),
            text("beta"),
            Instruction::Op(AASTORE),
            table_access(PUTSTATIC),
            Instruction::Op(RETURN),
        ]
        .into_iter()
        .collect()
    }

    fn reader(index: u8) -> InsnList {
        [
            table_access(GETSTATIC),
            Instruction::Op(index),
            Instruction::Op(AALOAD),
            Instruction::Op(ARETURN),
        ]
        .into_iter()
        .collect()
    }

    fn table_class(methods: Vec<crate::ir::MethodModel>) -> ClassModel {
        let mut class = class("a", methods);
        class.fields.push(FieldModel {
            access: FieldAccess::PRIVATE | FieldAccess::STATIC | FieldAccess::FINAL,
            name: "z".to_string(),
            descriptor: STRING_ARRAY.to_string(),
            attributes: Vec::new(),
        });
        class
    }

    #[test]
    fn table_reads_become_constants() {
        init_tracing();
        let mut context = context(vec![table_class(vec![
            method("<clinit>", "()V", initializer()),
            method("b", "()Ljava/lang/String;", reader(ICONST_1)),
        ])]);

        let changed = StringInliner.process(&mut context).expect("process");

        assert_eq!(1, changed);
        let class = &context.classes[0];
        assert!(class.fields.is_empty());
        assert_eq!(
            vec![Instruction::Op(RETURN)],
            real(&class.methods[0].instructions)
        );
        assert_eq!(
            vec![text("beta"), Instruction::Op(ARETURN)],
            real(&class.methods[1].instructions)
        );
    }

    #[test]
    fn unknown_index_is_left_intact() {
        let mut context = context(vec![table_class(vec![
            method("<clinit>", "()V", initializer()),
            method("b", "()Ljava/lang/String;", reader(ICONST_5)),
        ])]);

        let changed = StringInliner.process(&mut context).expect("process");

        assert_eq!(0, changed);
        let class = &context.classes[0];
        assert_eq!(1, class.fields.len());
        assert_eq!(
            real(&initializer()),
            real(&class.methods[0].instructions)
        );
        assert_eq!(
            real(&reader(ICONST_5)),
            real(&class.methods[1].instructions)
        );
    }

    #[test]
    fn unindexed_reads_keep_the_table() {
        let length: InsnList = [
            table_access(GETSTATIC),
            Instruction::Op(ARRAYLENGTH),
            Instruction::Op(IRETURN),
        ]
        .into_iter()
        .collect();
        let mut context = context(vec![table_class(vec![
            method("<clinit>", "()V", initializer()),
            method("b", "()Ljava/lang/String;", reader(ICONST_0)),
            method("c", "()I", length),
        ])]);

        let changed = StringInliner.process(&mut context).expect("process");

        assert_eq!(1, changed);
        let class = &context.classes[0];
        assert_eq!(1, class.fields.len());
        assert_eq!(
            real(&initializer()),
            real(&class.methods[0].instructions)
        );
        assert_eq!(
            vec![text("alpha"), Instruction::Op(ARETURN)],
            real(&class.methods[1].instructions)
        );
    }

    #[test]
    fn table_constant_without_index_fails_the_pass() {
        let broken: InsnList = [
            Instruction::Op(ICONST_1),
            Instruction::Type {
                opcode: ANEWARRAY,
                class: "java/lang/String".to_string(),
            },
            Instruction::Op(DUP),
            text("alpha"),
            Instruction::Op(AASTORE),
            table_access(PUTSTATIC),
            Instruction::Op(RETURN),
        ]
        .into_iter()
        .collect();
        let mut context = context(vec![table_class(vec![method("<clinit>", "()V", broken)])]);

        let result = StringInliner.process(&mut context);

        assert!(matches!(
            result,
            Err(Error::Operand(OperandError::UnsupportedEncoding(_)))
        ));
    }

    #[test]
    fn missing_initializer_skips_the_class() {
        let mut context = context(vec![table_class(vec![method(
            "b",
            "()Ljava/lang/String;",
            reader(ICONST_0),
        )])]);

        let changed = StringInliner.process(&mut context).expect("process");

        assert_eq!(0, changed);
        assert_eq!(1, context.classes[0].fields.len());
        assert_eq!(
            real(&reader(ICONST_0)),
            real(&context.classes[0].methods[0].instructions)
        );
    }

    #[test]
    fn public_arrays_are_not_tables() {
        let mut class = table_class(vec![method("<clinit>", "()V", initializer())]);
        class.fields[0].access = FieldAccess::PUBLIC | FieldAccess::STATIC;
        let mut context = context(vec![class]);

        StringInliner.process(&mut context).expect("process");

        assert_eq!(
            real(&initializer()),
            real(&context.classes[0].methods[0].instructions)
        );
    }
}

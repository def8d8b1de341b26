use tracing::{debug, warn};

use crate::context::DeobfuscationContext;
use crate::insn::{Constant, InsnList, Instruction};
use crate::ir::ClassModel;
use crate::opcodes;
use crate::operand::{OperandError, extract_int};
use crate::transforms::{Result, Transformer};

/// `char[] z(String)`: XORs a single-character string with the string key.
const TO_CHARS: &str = "(Ljava/lang/String;)[C";
/// `String z(char[])`: XORs every character with a switch-selected key.
const FROM_CHARS: &str = "([C)Ljava/lang/String;";

/// Decrypts `ldc "..."; invokestatic z(String); invokestatic z(char[])`
/// sequences in place and removes the two helper methods.
pub(crate) struct StringDecryptor;

impl Transformer for StringDecryptor {
    fn name(&self) -> &'static str {
        "StringDecryptor"
    }

    fn process(&self, context: &mut DeobfuscationContext) -> Result<usize> {
        let mut changed = 0;
        for class in &mut context.classes {
            changed += decrypt_class(class)?;
        }
        Ok(changed)
    }
}

/// Key material recovered from the helper bodies.
#[derive(Debug, PartialEq)]
struct Keys {
    string_key: i32,
    schedule: Vec<i8>,
}

impl Keys {
    fn decrypt(&self, text: &str) -> Option<String> {
        let mut units: Vec<u16> = text.encode_utf16().collect();
        if units.is_empty() {
            return None;
        }
        if units.len() < 2 {
            units[0] ^= self.string_key as u16;
        }
        if !self.schedule.is_empty() {
            for (i, unit) in units.iter_mut().enumerate() {
                *unit ^= self.schedule[i % self.schedule.len()] as i16 as u16;
            }
        }
        String::from_utf16(&units).ok()
    }
}

fn decrypt_class(class: &mut ClassModel) -> Result<usize> {
    let (Some(to_chars), Some(from_chars)) = (
        class.static_method_index_by_descriptor(TO_CHARS),
        class.static_method_index_by_descriptor(FROM_CHARS),
    ) else {
        debug!("{}: no string decryption helpers", class.name);
        return Ok(0);
    };
    let to_chars_name = class.methods[to_chars].name.clone();
    let from_chars_name = class.methods[from_chars].name.clone();
    let keys = Keys {
        string_key: string_key(&class.methods[to_chars].instructions)?,
        schedule: key_schedule(&class.methods[from_chars].instructions)?,
    };
    debug!(
        "{}: string key {}, key schedule {:?}",
        class.name, keys.string_key, keys.schedule
    );

    let owner = class.name.clone();
    let is_call = |instruction: Option<&Instruction>, name: &str, descriptor: &str| {
        matches!(
            instruction,
            Some(Instruction::Method {
                opcode: opcodes::INVOKESTATIC,
                owner: actual_owner,
                name: actual_name,
                descriptor: actual_descriptor,
                ..
            }) if *actual_owner == owner && actual_name == name && actual_descriptor == descriptor
        )
    };

    let is_reference = |instruction: &Instruction, name: &str, descriptor: &str| {
        matches!(
            instruction,
            Instruction::Method {
                owner: actual_owner,
                name: actual_name,
                descriptor: actual_descriptor,
                ..
            } if *actual_owner == owner && actual_name == name && actual_descriptor == descriptor
        )
    };

    let mut changed = 0;
    let mut surviving = 0;
    for (index, method) in class.methods.iter_mut().enumerate() {
        if index == to_chars || index == from_chars {
            continue;
        }
        let list = &mut method.instructions;
        for id in list.ids() {
            let Some(Instruction::Ldc(Constant::String(text))) = list.get(id) else {
                continue;
            };
            let Some(first_call) = list.next(id) else {
                continue;
            };
            if !is_call(list.get(first_call), &to_chars_name, TO_CHARS) {
                continue;
            }
            let second_call = list.next(first_call);
            if !is_call(second_call.and_then(|id| list.get(id)), &from_chars_name, FROM_CHARS) {
                continue;
            }
            let Some(plain) = keys.decrypt(text) else {
                warn!(
                    "{}.{}: cannot decrypt {:?}",
                    owner, method.name, text
                );
                continue;
            };
            debug!("decrypted {:?} into {:?}", text, plain);
            list.set(id, Instruction::Ldc(Constant::String(plain)));
            list.remove(first_call);
            if let Some(second_call) = second_call {
                list.remove(second_call);
            }
            changed += 1;
        }
        surviving += list
            .iter()
            .filter(|(_, insn)| {
                is_reference(*insn, &to_chars_name, TO_CHARS)
                    || is_reference(*insn, &from_chars_name, FROM_CHARS)
            })
            .count();
    }

    if surviving > 0 {
        warn!(
            "{}: {} calls to {} or {} remain, keeping the helpers",
            owner, surviving, to_chars_name, from_chars_name
        );
        return Ok(changed);
    }
    class.remove_method(&to_chars_name, TO_CHARS);
    class.remove_method(&from_chars_name, FROM_CHARS);
    Ok(changed)
}

/// Integer pushed right after the first `caload` of the `char[] z(String)`
/// helper, 0 when the helper reads no character.
fn string_key(list: &InsnList) -> Result<i32> {
    let Some(caload) = list
        .iter()
        .find(|(_, insn)| insn.opcode() == Some(opcodes::CALOAD))
        .map(|(id, _)| id)
    else {
        debug!("no caload in string helper, string key is 0");
        return Ok(0);
    };
    let key = list.next(caload).and_then(|id| list.get(id)).ok_or_else(|| {
        OperandError::UnsupportedEncoding("caload without string key".to_string())
    })?;
    Ok(extract_int(key)?)
}

/// Keys pushed at each arm of the first switch of the `String z(char[])`
/// helper, default arm last. The helper keeps them in a byte array.
fn key_schedule(list: &InsnList) -> Result<Vec<i8>> {
    let Some(labels) = list
        .iter()
        .find(|(_, insn)| insn.is_switch())
        .map(|(_, insn)| insn.branch_targets())
    else {
        return Ok(Vec::new());
    };
    let mut schedule = Vec::with_capacity(labels.len());
    for label in labels {
        let pushed = list
            .target(label)
            .and_then(|id| list.get(id))
            .ok_or_else(|| OperandError::UnsupportedEncoding(format!("empty switch arm {label:?}")))?;
        schedule.push(extract_int(pushed)? as i8);
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FrameSize, MethodAccess, MethodModel};
    use crate::opcodes::{
        ALOAD, ARETURN, BIPUSH, CALOAD, CASTORE, DUP, DUP2, GOTO, I2C, ICONST_0, ILOAD,
        INVOKEVIRTUAL, IRETURN, IXOR,
    };
    use crate::transforms::Error;
    use crate::transforms::fixtures::{class, context, init_tracing, method, real};

    const STRING_KEY: i32 = 42;
    const SCHEDULE: [i32; 5] = [17, -3, 100, 9, -128];

    fn bipush(operand: i32) -> Instruction {
        Instruction::Int {
            opcode: BIPUSH,
            operand,
        }
    }

    fn call(name: &str, descriptor: &str) -> Instruction {
        Instruction::Method {
            opcode: opcodes::INVOKESTATIC,
            owner: "a".to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface: false,
        }
    }

    fn text(value: &str) -> Instruction {
        Instruction::Ldc(Constant::String(value.to_string()))
    }

    fn to_chars_helper() -> MethodModel {
        let list = [
            Instruction::Var {
                opcode: ALOAD,
                index: 0,
            },
            Instruction::Method {
                opcode: INVOKEVIRTUAL,
                owner: "java/lang/String".to_string(),
                name: "toCharArray".to_string(),
                descriptor: "()[C".to_string(),
                interface: false,
            },
            Instruction::Op(DUP),
            Instruction::Op(ICONST_0),
            Instruction::Op(DUP2),
            Instruction::Op(CALOAD),
            bipush(STRING_KEY),
            Instruction::Op(IXOR),
            Instruction::Op(I2C),
            Instruction::Op(CASTORE),
            Instruction::Op(ARETURN),
        ]
        .into_iter()
        .collect();
        method("z", TO_CHARS, list)
    }

    fn from_chars_helper() -> MethodModel {
        from_chars_helper_with(bipush)
    }

    fn from_chars_helper_with(arm: impl Fn(i32) -> Instruction) -> MethodModel {
        let mut list = InsnList::new();
        let arms: Vec<_> = (0..SCHEDULE.len()).map(|_| list.new_label()).collect();
        let end = list.new_label();
        list.push(Instruction::Var {
            opcode: ILOAD,
            index: 1,
        });
        list.push(Instruction::TableSwitch {
            low: 0,
            high: 3,
            default: arms[4],
            targets: arms[..4].to_vec(),
        });
        for (label, key) in arms.iter().zip(SCHEDULE) {
            list.push(Instruction::Label(*label));
            list.push(arm(key));
            list.push(Instruction::Jump {
                opcode: GOTO,
                target: end,
            });
        }
        list.push(Instruction::Label(end));
        list.push(Instruction::Op(IRETURN));
        method("z", FROM_CHARS, list)
    }

    fn encrypt(plain: &str) -> String {
        let mut units: Vec<u16> = plain.encode_utf16().collect();
        for (i, unit) in units.iter_mut().enumerate() {
            *unit ^= SCHEDULE[i % SCHEDULE.len()] as i8 as i16 as u16;
        }
        if units.len() < 2 {
            units[0] ^= STRING_KEY as u16;
        }
        String::from_utf16(&units).expect("valid UTF-16")
    }

    fn encrypted_load(plain: &str) -> InsnList {
        [
            text(&encrypt(plain)),
            call("z", TO_CHARS),
            call("z", FROM_CHARS),
            Instruction::Op(ARETURN),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn keys_are_read_from_the_helpers() {
        assert_eq!(
            STRING_KEY,
            string_key(&to_chars_helper().instructions).expect("string key")
        );
        assert_eq!(
            vec![17, -3, 100, 9, -128],
            key_schedule(&from_chars_helper().instructions).expect("schedule")
        );
    }

    #[test]
    fn strings_are_decrypted_and_helpers_removed() {
        init_tracing();
        let mut context = context(vec![class(
            "a",
            vec![
                to_chars_helper(),
                from_chars_helper(),
                method("b", "()Ljava/lang/String;", encrypted_load("Hello, world")),
                method("c", "()Ljava/lang/String;", encrypted_load("x")),
            ],
        )]);

        let changed = StringDecryptor.process(&mut context).expect("process");

        assert_eq!(2, changed);
        let class = &context.classes[0];
        assert_eq!(2, class.methods.len());
        assert_eq!(
            vec![text("Hello, world"), Instruction::Op(ARETURN)],
            real(&class.methods[0].instructions)
        );
        assert_eq!(
            vec![text("x"), Instruction::Op(ARETURN)],
            real(&class.methods[1].instructions)
        );
    }

    #[test]
    fn single_character_strings_use_the_string_key() {
        let keys = Keys {
            string_key: 1,
            schedule: vec![2],
        };

        assert_eq!(Some("d".to_string()), keys.decrypt("g"));
        assert_eq!(Some("ed".to_string()), keys.decrypt("gf"));
        assert_eq!(None, keys.decrypt(""));
    }

    #[test]
    fn missing_switch_leaves_multi_character_strings_unchanged() {
        let keys = Keys {
            string_key: 1,
            schedule: Vec::new(),
        };

        assert_eq!(Some("abc".to_string()), keys.decrypt("abc"));
    }

    #[test]
    fn surviving_calls_keep_the_helpers() {
        let dynamic = [
            Instruction::Var {
                opcode: ALOAD,
                index: 0,
            },
            call("z", TO_CHARS),
            call("z", FROM_CHARS),
            Instruction::Op(ARETURN),
        ]
        .into_iter()
        .collect();
        let mut context = context(vec![class(
            "a",
            vec![
                to_chars_helper(),
                from_chars_helper(),
                method("b", "(Ljava/lang/String;)Ljava/lang/String;", dynamic),
                method("c", "()Ljava/lang/String;", encrypted_load("kept")),
            ],
        )]);

        let changed = StringDecryptor.process(&mut context).expect("process");

        assert_eq!(1, changed);
        assert_eq!(4, context.classes[0].methods.len());
        assert_eq!(
            vec![text("kept"), Instruction::Op(ARETURN)],
            real(&context.classes[0].methods[3].instructions)
        );
    }

    #[test]
    fn classes_without_both_helpers_are_skipped() {
        let list = [text("abc"), Instruction::Op(ARETURN)].into_iter().collect();
        let mut context = context(vec![class(
            "a",
            vec![to_chars_helper(), method("b", "()Ljava/lang/String;", list)],
        )]);

        let changed = StringDecryptor.process(&mut context).expect("process");

        assert_eq!(0, changed);
        assert_eq!(2, context.classes[0].methods.len());
        assert_eq!(
            vec![text("abc"), Instruction::Op(ARETURN)],
            real(&context.classes[0].methods[1].instructions)
        );
    }

    #[test]
    fn instance_methods_with_helper_descriptors_are_not_helpers() {
        let instance = |name: &str, descriptor: &str| {
            MethodModel::new(
                MethodAccess::PUBLIC,
                name,
                descriptor,
                [
                    Instruction::Op(opcodes::ACONST_NULL),
                    Instruction::Op(ARETURN),
                ]
                .into_iter()
                .collect(),
                FrameSize {
                    max_stack: 1,
                    max_locals: 2,
                },
            )
        };
        let caller = [
            Instruction::Var {
                opcode: ALOAD,
                index: 0,
            },
            text("abc"),
            Instruction::Method {
                opcode: INVOKEVIRTUAL,
                owner: "a".to_string(),
                name: "encode".to_string(),
                descriptor: TO_CHARS.to_string(),
                interface: false,
            },
            Instruction::Op(ARETURN),
        ]
        .into_iter()
        .collect();
        let mut context = context(vec![class(
            "a",
            vec![
                instance("encode", TO_CHARS),
                instance("decode", FROM_CHARS),
                method("b", "()[C", caller),
            ],
        )]);

        let changed = StringDecryptor.process(&mut context).expect("process");

        assert_eq!(0, changed);
        let names: Vec<_> = context.classes[0]
            .methods
            .iter()
            .map(|method| method.name.as_str())
            .collect();
        assert_eq!(vec!["encode", "decode", "b"], names);
    }

    #[test]
    fn direct_calls_of_the_second_helper_keep_the_helpers() {
        let direct = [
            Instruction::Var {
                opcode: ALOAD,
                index: 0,
            },
            call("z", FROM_CHARS),
            Instruction::Op(ARETURN),
        ]
        .into_iter()
        .collect();
        let mut context = context(vec![class(
            "a",
            vec![
                to_chars_helper(),
                from_chars_helper(),
                method("b", "([CI)Ljava/lang/String;", direct),
                method("c", "()Ljava/lang/String;", encrypted_load("kept")),
            ],
        )]);

        let changed = StringDecryptor.process(&mut context).expect("process");

        assert_eq!(1, changed);
        assert_eq!(4, context.classes[0].methods.len());
        assert_eq!(
            vec![text("kept"), Instruction::Op(ARETURN)],
            real(&context.classes[0].methods[3].instructions)
        );
    }

    #[test]
    fn string_key_must_be_an_integer_push() {
        let list: InsnList = [
            Instruction::Op(CALOAD),
            Instruction::Var {
                opcode: ILOAD,
                index: 1,
            },
            Instruction::Op(IXOR),
        ]
        .into_iter()
        .collect();

        let result = string_key(&list);

        assert!(matches!(
            result,
            Err(Error::Operand(OperandError::UnsupportedEncoding(_)))
        ));
    }

    #[test]
    fn helper_without_caload_has_key_zero() {
        let list: InsnList = [Instruction::Op(ARETURN)].into_iter().collect();

        assert_eq!(0, string_key(&list).expect("string key"));
    }

    #[test]
    fn non_integer_switch_arm_fails_the_pass() {
        let from_chars = from_chars_helper_with(|_| Instruction::Var {
            opcode: ILOAD,
            index: 2,
        });
        let mut context = context(vec![class(
            "a",
            vec![
                to_chars_helper(),
                from_chars,
                method("b", "()Ljava/lang/String;", encrypted_load("abc")),
            ],
        )]);

        let result = StringDecryptor.process(&mut context);

        assert!(matches!(
            result,
            Err(Error::Operand(OperandError::UnsupportedEncoding(_)))
        ));
    }
}

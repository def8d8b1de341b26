use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::classfile::{read_bytes, read_u8, read_u16, read_u32};
use crate::insn::Constant;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// One constant pool slot.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) enum PoolEntry {
    /// Slot 0 and the slot following a long or double.
    Unusable,
    /// Modified UTF-8 bytes exactly as stored in the class file.
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
}

impl PoolEntry {
    fn is_wide(&self) -> bool {
        matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
    }
}

/// Field or method reference resolved to names.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MemberRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) interface: bool,
}

/// Constant pool that keeps every original entry at its original index and
/// only appends. Attributes carried as raw bytes therefore stay valid.
#[derive(Clone, Debug)]
pub(crate) struct ConstantPool {
    entries: Vec<PoolEntry>,
    lookup: HashMap<PoolEntry, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub(crate) fn new() -> Self {
        Self {
            entries: vec![PoolEntry::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Value of `constant_pool_count` in the class file.
    pub(crate) fn count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn parse(data: &[u8], offset: &mut usize) -> Result<Self> {
        let count = read_u16(data, offset)?;
        let mut pool = Self::new();
        while pool.entries.len() < count as usize {
            let tag = read_u8(data, offset)?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = read_u16(data, offset)? as usize;
                    PoolEntry::Utf8(read_bytes(data, offset, len)?.to_vec())
                }
                TAG_INTEGER => PoolEntry::Integer(read_u32(data, offset)? as i32),
                TAG_FLOAT => PoolEntry::Float(read_u32(data, offset)?),
                TAG_LONG => PoolEntry::Long(read_u64(data, offset)? as i64),
                TAG_DOUBLE => PoolEntry::Double(read_u64(data, offset)?),
                TAG_CLASS => PoolEntry::Class {
                    name_index: read_u16(data, offset)?,
                },
                TAG_STRING => PoolEntry::String {
                    string_index: read_u16(data, offset)?,
                },
                TAG_FIELDREF => PoolEntry::Fieldref {
                    class_index: read_u16(data, offset)?,
                    name_and_type_index: read_u16(data, offset)?,
                },
                TAG_METHODREF => PoolEntry::Methodref {
                    class_index: read_u16(data, offset)?,
                    name_and_type_index: read_u16(data, offset)?,
                },
                TAG_INTERFACE_METHODREF => PoolEntry::InterfaceMethodref {
                    class_index: read_u16(data, offset)?,
                    name_and_type_index: read_u16(data, offset)?,
                },
                TAG_NAME_AND_TYPE => PoolEntry::NameAndType {
                    name_index: read_u16(data, offset)?,
                    descriptor_index: read_u16(data, offset)?,
                },
                TAG_METHOD_HANDLE => PoolEntry::MethodHandle {
                    reference_kind: read_u8(data, offset)?,
                    reference_index: read_u16(data, offset)?,
                },
                TAG_METHOD_TYPE => PoolEntry::MethodType {
                    descriptor_index: read_u16(data, offset)?,
                },
                TAG_DYNAMIC => PoolEntry::Dynamic {
                    bootstrap_index: read_u16(data, offset)?,
                    name_and_type_index: read_u16(data, offset)?,
                },
                TAG_INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
                    bootstrap_index: read_u16(data, offset)?,
                    name_and_type_index: read_u16(data, offset)?,
                },
                TAG_MODULE => PoolEntry::Module {
                    name_index: read_u16(data, offset)?,
                },
                TAG_PACKAGE => PoolEntry::Package {
                    name_index: read_u16(data, offset)?,
                },
                _ => anyhow::bail!("unsupported constant pool tag: {}", tag),
            };
            pool.append(entry);
        }
        if pool.entries.len() != count as usize {
            anyhow::bail!("constant pool overruns its declared count of {}", count);
        }
        Ok(pool)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in &self.entries {
            match entry {
                PoolEntry::Unusable => {}
                PoolEntry::Utf8(bytes) => {
                    out.push(TAG_UTF8);
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(bytes);
                }
                PoolEntry::Integer(value) => {
                    out.push(TAG_INTEGER);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolEntry::Float(bits) => {
                    out.push(TAG_FLOAT);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolEntry::Long(value) => {
                    out.push(TAG_LONG);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolEntry::Double(bits) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolEntry::Class { name_index } => write_u16_entry(out, TAG_CLASS, *name_index),
                PoolEntry::String { string_index } => {
                    write_u16_entry(out, TAG_STRING, *string_index)
                }
                PoolEntry::Fieldref {
                    class_index,
                    name_and_type_index,
                } => write_pair_entry(out, TAG_FIELDREF, *class_index, *name_and_type_index),
                PoolEntry::Methodref {
                    class_index,
                    name_and_type_index,
                } => write_pair_entry(out, TAG_METHODREF, *class_index, *name_and_type_index),
                PoolEntry::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => write_pair_entry(
                    out,
                    TAG_INTERFACE_METHODREF,
                    *class_index,
                    *name_and_type_index,
                ),
                PoolEntry::NameAndType {
                    name_index,
                    descriptor_index,
                } => write_pair_entry(out, TAG_NAME_AND_TYPE, *name_index, *descriptor_index),
                PoolEntry::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    out.push(TAG_METHOD_HANDLE);
                    out.push(*reference_kind);
                    out.extend_from_slice(&reference_index.to_be_bytes());
                }
                PoolEntry::MethodType { descriptor_index } => {
                    write_u16_entry(out, TAG_METHOD_TYPE, *descriptor_index)
                }
                PoolEntry::Dynamic {
                    bootstrap_index,
                    name_and_type_index,
                } => write_pair_entry(out, TAG_DYNAMIC, *bootstrap_index, *name_and_type_index),
                PoolEntry::InvokeDynamic {
                    bootstrap_index,
                    name_and_type_index,
                } => write_pair_entry(
                    out,
                    TAG_INVOKE_DYNAMIC,
                    *bootstrap_index,
                    *name_and_type_index,
                ),
                PoolEntry::Module { name_index } => write_u16_entry(out, TAG_MODULE, *name_index),
                PoolEntry::Package { name_index } => {
                    write_u16_entry(out, TAG_PACKAGE, *name_index)
                }
            }
        }
    }

    pub(crate) fn entry(&self, index: u16) -> Result<&PoolEntry> {
        match self.entries.get(index as usize) {
            Some(PoolEntry::Unusable) | None => {
                anyhow::bail!("invalid constant pool index {}", index)
            }
            Some(entry) => Ok(entry),
        }
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<String> {
        match self.entry(index)? {
            PoolEntry::Utf8(bytes) => {
                let value = cesu8::from_java_cesu8(bytes)
                    .map_err(|_| anyhow::anyhow!("malformed modified UTF-8 at index {}", index))?;
                Ok(value.into_owned())
            }
            _ => anyhow::bail!("unexpected utf8 entry at index {}", index),
        }
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<String> {
        match self.entry(index)? {
            PoolEntry::Class { name_index } => self.utf8(*name_index),
            _ => anyhow::bail!("unexpected class entry at index {}", index),
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.entry(index)? {
            PoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => anyhow::bail!("unexpected name and type entry at index {}", index),
        }
    }

    pub(crate) fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let (class_index, name_and_type_index, interface) = match self.entry(index)? {
            PoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            }
            | PoolEntry::Methodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            PoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            _ => anyhow::bail!("unexpected member ref entry at index {}", index),
        };
        let owner = self.class_name(class_index).context("resolve member owner")?;
        let (name, descriptor) = self
            .name_and_type(name_and_type_index)
            .context("resolve member name and type")?;
        Ok(MemberRef {
            owner,
            name,
            descriptor,
            interface,
        })
    }

    /// Constant loaded by `ldc`/`ldc_w`/`ldc2_w` from `index`.
    pub(crate) fn loadable(&self, index: u16) -> Result<Constant> {
        let constant = match self.entry(index)? {
            PoolEntry::Integer(value) => Constant::Integer(*value),
            PoolEntry::Float(bits) => Constant::Float(f32::from_bits(*bits)),
            PoolEntry::Long(value) => Constant::Long(*value),
            PoolEntry::Double(bits) => Constant::Double(f64::from_bits(*bits)),
            PoolEntry::String { string_index } => match self.utf8(*string_index) {
                Ok(value) => Constant::String(value),
                Err(_) => Constant::Pooled {
                    index,
                    wide: false,
                },
            },
            PoolEntry::Class { name_index } => Constant::Class(self.utf8(*name_index)?),
            PoolEntry::MethodHandle { .. } | PoolEntry::MethodType { .. } => Constant::Pooled {
                index,
                wide: false,
            },
            PoolEntry::Dynamic {
                name_and_type_index,
                ..
            } => {
                let (_, descriptor) = self.name_and_type(*name_and_type_index)?;
                Constant::Pooled {
                    index,
                    wide: descriptor == "J" || descriptor == "D",
                }
            }
            _ => anyhow::bail!("constant pool index {} is not loadable", index),
        };
        Ok(constant)
    }

    pub(crate) fn add_utf8(&mut self, value: &str) -> Result<u16> {
        let bytes = cesu8::to_java_cesu8(value).into_owned();
        if bytes.len() > u16::MAX as usize {
            anyhow::bail!("string constant of {} bytes is too long", bytes.len());
        }
        self.intern(PoolEntry::Utf8(bytes))
    }

    pub(crate) fn add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.intern(PoolEntry::Class { name_index })
    }

    pub(crate) fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.intern(PoolEntry::String { string_index })
    }

    pub(crate) fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.intern(PoolEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub(crate) fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(PoolEntry::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    pub(crate) fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        let entry = if interface {
            PoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            }
        } else {
            PoolEntry::Methodref {
                class_index,
                name_and_type_index,
            }
        };
        self.intern(entry)
    }

    /// Pool index holding `constant`, appending an entry when none exists.
    pub(crate) fn add_constant(&mut self, constant: &Constant) -> Result<u16> {
        match constant {
            Constant::Integer(value) => self.intern(PoolEntry::Integer(*value)),
            Constant::Float(value) => self.intern(PoolEntry::Float(value.to_bits())),
            Constant::Long(value) => self.intern(PoolEntry::Long(*value)),
            Constant::Double(value) => self.intern(PoolEntry::Double(value.to_bits())),
            Constant::String(value) => self.add_string(value),
            Constant::Class(name) => self.add_class(name),
            Constant::Pooled { index, .. } => {
                self.entry(*index)?;
                Ok(*index)
            }
        }
    }

    fn intern(&mut self, entry: PoolEntry) -> Result<u16> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }
        let needed = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > u16::MAX as usize {
            anyhow::bail!("constant pool is full");
        }
        Ok(self.append(entry))
    }

    fn append(&mut self, entry: PoolEntry) -> u16 {
        let index = self.entries.len() as u16;
        let wide = entry.is_wide();
        self.lookup.entry(entry.clone()).or_insert(index);
        self.entries.push(entry);
        if wide {
            self.entries.push(PoolEntry::Unusable);
        }
        index
    }
}

fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64> {
    let high = read_u32(data, offset)? as u64;
    let low = read_u32(data, offset)? as u64;
    Ok((high << 32) | low)
}

fn write_u16_entry(out: &mut Vec<u8>, tag: u8, value: u16) {
    out.push(tag);
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_pair_entry(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    out.push(tag);
    out.extend_from_slice(&first.to_be_bytes());
    out.extend_from_slice(&second.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_reuses_existing_entries() {
        let mut pool = ConstantPool::new();

        let first = pool.add_method_ref("a", "z", "(Ljava/lang/String;)[C", false).expect("add");
        let second = pool.add_method_ref("a", "z", "(Ljava/lang/String;)[C", false).expect("add");

        assert_eq!(first, second);
        let member = pool.member_ref(first).expect("member ref");
        assert_eq!("a", member.owner);
        assert_eq!("z", member.name);
        assert!(!member.interface);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();

        let long = pool.add_constant(&Constant::Long(7)).expect("add long");
        let next = pool.add_constant(&Constant::Integer(1)).expect("add int");

        assert_eq!(1, long);
        assert_eq!(3, next);
        assert!(pool.entry(2).is_err());
        assert_eq!(4, pool.count());
    }

    #[test]
    fn parse_reads_back_written_pool() {
        let mut pool = ConstantPool::new();
        let string = pool.add_string("h\u{e9}llo\0").expect("add string");
        pool.add_constant(&Constant::Double(1.5)).expect("add double");
        let mut bytes = Vec::new();
        pool.write(&mut bytes);

        let mut offset = 0;
        let parsed = ConstantPool::parse(&bytes, &mut offset).expect("parse pool");

        assert_eq!(bytes.len(), offset);
        assert_eq!(pool.count(), parsed.count());
        assert_eq!(
            Constant::String("h\u{e9}llo\0".to_string()),
            parsed.loadable(string).expect("loadable")
        );
    }

    #[test]
    fn malformed_strings_are_carried_by_index() {
        let mut pool = ConstantPool::new();
        let utf8 = pool.intern(PoolEntry::Utf8(vec![0xed, 0xa0, 0x80])).expect("intern");
        let string = pool
            .intern(PoolEntry::String { string_index: utf8 })
            .expect("intern");

        let constant = pool.loadable(string).expect("loadable");

        assert_eq!(
            Constant::Pooled {
                index: string,
                wide: false
            },
            constant
        );
    }
}

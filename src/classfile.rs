use anyhow::{Context, Result};

use crate::code::{decode_code, encode_code};
use crate::constant_pool::ConstantPool;
use crate::ir::{
    ClassAccess, ClassModel, FieldAccess, FieldModel, FrameSize, MethodAccess, MethodModel,
    RawAttribute,
};
use crate::insn::InsnList;

const MAGIC: u32 = 0xCAFE_BABE;
const CODE: &str = "Code";

/// Decode class file bytes into an editable [`ClassModel`].
pub(crate) fn parse_class(data: &[u8]) -> Result<ClassModel> {
    let mut offset = 0usize;
    let magic = read_u32(data, &mut offset)?;
    if magic != MAGIC {
        anyhow::bail!("invalid class file magic");
    }
    let minor_version = read_u16(data, &mut offset)?;
    let major_version = read_u16(data, &mut offset)?;
    let constant_pool = ConstantPool::parse(data, &mut offset).context("parse constant pool")?;
    let access = ClassAccess::from_bits_retain(read_u16(data, &mut offset)?);
    let this_class = read_u16(data, &mut offset)?;
    let name = constant_pool
        .class_name(this_class)
        .context("resolve class name")?;
    let super_class = read_u16(data, &mut offset)?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(
            constant_pool
                .class_name(super_class)
                .context("resolve super class name")?,
        )
    };

    let interface_count = read_u16(data, &mut offset)?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = read_u16(data, &mut offset)?;
        interfaces.push(
            constant_pool
                .class_name(index)
                .context("resolve interface name")?,
        );
    }

    let field_count = read_u16(data, &mut offset)?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field(data, &mut offset, &constant_pool).context("parse field")?);
    }

    let method_count = read_u16(data, &mut offset)?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(parse_method(data, &mut offset, &constant_pool).context("parse method")?);
    }

    let attributes = parse_attributes(data, &mut offset, &constant_pool)?;
    if offset != data.len() {
        anyhow::bail!("{} trailing bytes after class file", data.len() - offset);
    }

    Ok(ClassModel {
        minor_version,
        major_version,
        constant_pool,
        access,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

fn parse_field(data: &[u8], offset: &mut usize, pool: &ConstantPool) -> Result<FieldModel> {
    let access = FieldAccess::from_bits_retain(read_u16(data, offset)?);
    let name = pool
        .utf8(read_u16(data, offset)?)
        .context("resolve field name")?;
    let descriptor = pool
        .utf8(read_u16(data, offset)?)
        .context("resolve field descriptor")?;
    let attributes = parse_attributes(data, offset, pool)?;
    Ok(FieldModel {
        access,
        name,
        descriptor,
        attributes,
    })
}

fn parse_method(data: &[u8], offset: &mut usize, pool: &ConstantPool) -> Result<MethodModel> {
    let access = MethodAccess::from_bits_retain(read_u16(data, offset)?);
    let name = pool
        .utf8(read_u16(data, offset)?)
        .context("resolve method name")?;
    let descriptor = pool
        .utf8(read_u16(data, offset)?)
        .context("resolve method descriptor")?;

    let mut method = MethodModel {
        access,
        name,
        descriptor,
        instructions: InsnList::new(),
        exception_ranges: Vec::new(),
        frame: None,
        attributes: Vec::new(),
    };
    for attribute in parse_attributes(data, offset, pool)? {
        if attribute.name != CODE {
            method.attributes.push(attribute);
            continue;
        }
        if method.frame.is_some() {
            anyhow::bail!("duplicate Code attribute in {}", method.name);
        }
        let code = parse_code_attribute(&attribute.info, pool)
            .with_context(|| format!("decode {}{}", method.name, method.descriptor))?;
        method.frame = Some(code.frame);
        method.instructions = code.instructions;
        method.exception_ranges = code.exception_ranges;
    }
    Ok(method)
}

/// Decoded Code attribute.
struct CodeAttribute {
    frame: FrameSize,
    instructions: InsnList,
    exception_ranges: Vec<crate::ir::ExceptionRange>,
}

fn parse_code_attribute(info: &[u8], pool: &ConstantPool) -> Result<CodeAttribute> {
    let mut offset = 0usize;
    let max_stack = read_u16(info, &mut offset)?;
    let max_locals = read_u16(info, &mut offset)?;
    let code_length = read_u32(info, &mut offset)? as usize;
    let code = read_bytes(info, &mut offset, code_length)?;
    let table_length = read_u16(info, &mut offset)?;
    let mut table = Vec::with_capacity(table_length as usize);
    for _ in 0..table_length {
        table.push(RawHandler {
            start_pc: read_u16(info, &mut offset)?,
            end_pc: read_u16(info, &mut offset)?,
            handler_pc: read_u16(info, &mut offset)?,
            catch_type: read_u16(info, &mut offset)?,
        });
    }
    // Nested attributes (frames, line and local variable tables) are keyed by
    // bytecode offsets that the passes invalidate; they are not carried over.
    skip_attributes(info, &mut offset)?;

    let (instructions, exception_ranges) = decode_code(code, &table, pool)?;
    Ok(CodeAttribute {
        frame: FrameSize {
            max_stack,
            max_locals,
        },
        instructions,
        exception_ranges,
    })
}

/// Exception table entry as stored in the Code attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RawHandler {
    pub(crate) start_pc: u16,
    pub(crate) end_pc: u16,
    pub(crate) handler_pc: u16,
    pub(crate) catch_type: u16,
}

fn parse_attributes(
    data: &[u8],
    offset: &mut usize,
    pool: &ConstantPool,
) -> Result<Vec<RawAttribute>> {
    let count = read_u16(data, offset)?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool
            .utf8(read_u16(data, offset)?)
            .context("resolve attribute name")?;
        let length = read_u32(data, offset)? as usize;
        let info = read_bytes(data, offset, length)?.to_vec();
        attributes.push(RawAttribute { name, info });
    }
    Ok(attributes)
}

fn skip_attributes(data: &[u8], offset: &mut usize) -> Result<()> {
    let count = read_u16(data, offset)?;
    for _ in 0..count {
        read_u16(data, offset)?;
        let length = read_u32(data, offset)? as usize;
        read_bytes(data, offset, length)?;
    }
    Ok(())
}

/// Encode a [`ClassModel`] into class file bytes.
///
/// The model's constant pool is cloned and extended with whatever the rewritten
/// bodies reference, so the original entries keep their indices.
pub(crate) fn write_class(class: &ClassModel) -> Result<Vec<u8>> {
    let mut pool = class.constant_pool.clone();
    let mut body = Vec::new();

    write_u16(&mut body, class.access.bits());
    write_u16(&mut body, pool.add_class(&class.name)?);
    let super_index = match &class.super_name {
        Some(super_name) => pool.add_class(super_name)?,
        None => 0,
    };
    write_u16(&mut body, super_index);
    write_len(&mut body, class.interfaces.len(), "interfaces")?;
    for interface in &class.interfaces {
        write_u16(&mut body, pool.add_class(interface)?);
    }

    write_len(&mut body, class.fields.len(), "fields")?;
    for field in &class.fields {
        write_u16(&mut body, field.access.bits());
        write_u16(&mut body, pool.add_utf8(&field.name)?);
        write_u16(&mut body, pool.add_utf8(&field.descriptor)?);
        write_attributes(&mut body, &field.attributes, &mut pool, None)?;
    }

    write_len(&mut body, class.methods.len(), "methods")?;
    for method in &class.methods {
        write_u16(&mut body, method.access.bits());
        write_u16(&mut body, pool.add_utf8(&method.name)?);
        write_u16(&mut body, pool.add_utf8(&method.descriptor)?);
        let code = match method.frame {
            Some(frame) => Some(
                write_code_attribute(method, frame, &mut pool)
                    .with_context(|| format!("encode {}", method.display_name(&class.name)))?,
            ),
            None => None,
        };
        write_attributes(&mut body, &method.attributes, &mut pool, code)?;
    }

    write_attributes(&mut body, &class.attributes, &mut pool, None)?;

    let mut out = Vec::with_capacity(body.len() + 1024);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    write_u16(&mut out, class.minor_version);
    write_u16(&mut out, class.major_version);
    pool.write(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

fn write_code_attribute(
    method: &MethodModel,
    frame: FrameSize,
    pool: &mut ConstantPool,
) -> Result<RawAttribute> {
    let (code, handlers) = encode_code(&method.instructions, &method.exception_ranges, pool)?;
    let mut info = Vec::with_capacity(code.len() + 12 + handlers.len() * 8);
    write_u16(&mut info, frame.max_stack);
    write_u16(&mut info, frame.max_locals);
    info.extend_from_slice(&(code.len() as u32).to_be_bytes());
    info.extend_from_slice(&code);
    write_len(&mut info, handlers.len(), "exception handlers")?;
    for handler in handlers {
        write_u16(&mut info, handler.start_pc);
        write_u16(&mut info, handler.end_pc);
        write_u16(&mut info, handler.handler_pc);
        write_u16(&mut info, handler.catch_type);
    }
    write_u16(&mut info, 0);
    Ok(RawAttribute {
        name: CODE.to_string(),
        info,
    })
}

fn write_attributes(
    out: &mut Vec<u8>,
    attributes: &[RawAttribute],
    pool: &mut ConstantPool,
    code: Option<RawAttribute>,
) -> Result<()> {
    write_len(out, attributes.len() + code.is_some() as usize, "attributes")?;
    for attribute in code.iter().chain(attributes) {
        write_u16(out, pool.add_utf8(&attribute.name)?);
        let length = u32::try_from(attribute.info.len())
            .with_context(|| format!("attribute {} is too large", attribute.name))?;
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&attribute.info);
    }
    Ok(())
}

fn write_len(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = u16::try_from(len).with_context(|| format!("too many {what}: {len}"))?;
    write_u16(out, len);
    Ok(())
}

pub(crate) fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8> {
    let byte = *data.get(*offset).context("class file out of bounds")?;
    *offset += 1;
    Ok(byte)
}

pub(crate) fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16> {
    let bytes = read_bytes(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *offset;
    let end = start.checked_add(len).context("class file out of bounds")?;
    let slice = data.get(start..end).context("class file out of bounds")?;
    *offset = end;
    Ok(slice)
}

use bitflags::bitflags;

use crate::constant_pool::ConstantPool;
use crate::insn::{InsnList, Label};

bitflags! {
    /// Class access flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct ClassAccess: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Field access flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct FieldAccess: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Method access flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct MethodAccess: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// Attribute carried through unchanged. Its payload may hold constant pool
/// indices, which stay valid because the pool is only ever appended to.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RawAttribute {
    pub(crate) name: String,
    pub(crate) info: Vec<u8>,
}

/// Editable representation of one class file.
#[derive(Clone, Debug)]
pub(crate) struct ClassModel {
    pub(crate) minor_version: u16,
    pub(crate) major_version: u16,
    pub(crate) constant_pool: ConstantPool,
    pub(crate) access: ClassAccess,
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) fields: Vec<FieldModel>,
    pub(crate) methods: Vec<MethodModel>,
    pub(crate) attributes: Vec<RawAttribute>,
}

/// Field declaration.
#[derive(Clone, Debug)]
pub(crate) struct FieldModel {
    pub(crate) access: FieldAccess,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) attributes: Vec<RawAttribute>,
}

/// Method declaration and its editable body.
#[derive(Clone, Debug)]
pub(crate) struct MethodModel {
    pub(crate) access: MethodAccess,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) instructions: InsnList,
    pub(crate) exception_ranges: Vec<ExceptionRange>,
    /// Frame sizing from the Code attribute; `None` for abstract and native methods.
    pub(crate) frame: Option<FrameSize>,
    pub(crate) attributes: Vec<RawAttribute>,
}

/// Operand stack and local variable sizing of a Code attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FrameSize {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
}

/// Protected region with its handler. `catch_type` is `None` for `any`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ExceptionRange {
    pub(crate) start: Label,
    pub(crate) end: Label,
    pub(crate) handler: Label,
    pub(crate) catch_type: Option<String>,
}

pub(crate) const CLASS_INITIALIZER: &str = "<clinit>";

impl ClassModel {
    /// Empty class shell with a fresh constant pool.
    pub(crate) fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            minor_version: 0,
            major_version: 49,
            constant_pool: ConstantPool::new(),
            access: ClassAccess::PUBLIC | ClassAccess::SUPER,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Index of the first static method with the given descriptor, whatever
    /// its name.
    pub(crate) fn static_method_index_by_descriptor(&self, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|method| {
            method.access.contains(MethodAccess::STATIC) && method.descriptor == descriptor
        })
    }

    pub(crate) fn class_initializer_mut(&mut self) -> Option<&mut MethodModel> {
        self.methods
            .iter_mut()
            .find(|method| method.name == CLASS_INITIALIZER)
    }

    pub(crate) fn remove_method(&mut self, name: &str, descriptor: &str) -> Option<MethodModel> {
        let index = self
            .methods
            .iter()
            .position(|method| method.name == name && method.descriptor == descriptor)?;
        Some(self.methods.remove(index))
    }

    pub(crate) fn remove_field(&mut self, name: &str, descriptor: &str) -> Option<FieldModel> {
        let index = self
            .fields
            .iter()
            .position(|field| field.name == name && field.descriptor == descriptor)?;
        Some(self.fields.remove(index))
    }
}

impl MethodModel {
    /// Method with a body; frame sizing is carried from the original Code attribute.
    pub(crate) fn new(
        access: MethodAccess,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        instructions: InsnList,
        frame: FrameSize,
    ) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            instructions,
            exception_ranges: Vec::new(),
            frame: Some(frame),
            attributes: Vec::new(),
        }
    }

    pub(crate) fn has_code(&self) -> bool {
        self.frame.is_some()
    }

    /// `Class.name(descriptor)` for diagnostics.
    pub(crate) fn display_name(&self, owner: &str) -> String {
        format!("{owner}.{}{}", self.name, self.descriptor)
    }
}

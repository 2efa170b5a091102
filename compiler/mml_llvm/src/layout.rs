//! C-rule struct layout: sizes, alignments, field offsets.
//!
//! Nested structs compute size and alignment recursively, with tail padding
//! included, so a nested 16-byte struct inside a larger record occupies a
//! full aligned slot. TBAA field offsets and ABI classification both read
//! from here.

/// A field in a laid-out struct.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    /// LLVM type of the field.
    pub llvm: String,
    /// MML type name, for TBAA tags.
    pub mml: String,
    pub offset: u64,
    pub size: u64,
    pub align: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub size: u64,
    pub align: u64,
}

impl StructLayout {
    /// Lay out fields with C alignment rules. Each entry is
    /// `(name, llvm type, mml name, size, align)`.
    pub fn compute(name: &str, fields: Vec<(String, String, String, u64, u64)>) -> StructLayout {
        let mut offset = 0u64;
        let mut align = 1u64;
        let mut out = Vec::with_capacity(fields.len());
        for (fname, llvm, mml, fsize, falign) in fields {
            offset = round_up(offset, falign);
            out.push(FieldLayout {
                name: fname,
                llvm,
                mml,
                offset,
                size: fsize,
                align: falign,
            });
            offset += fsize;
            align = align.max(falign);
        }
        // Tail padding to the struct's own alignment.
        let size = round_up(offset, align);
        StructLayout {
            name: name.to_string(),
            fields: out,
            size,
            align,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// `true` when every field is a float/double of the same type and there
    /// are at most four: a homogeneous floating-point aggregate.
    pub fn is_hfa(&self) -> bool {
        if self.fields.is_empty() || self.fields.len() > 4 {
            return false;
        }
        let first = &self.fields[0].llvm;
        (first == "float" || first == "double") && self.fields.iter().all(|f| &f.llvm == first)
    }
}

/// Size and alignment of an LLVM scalar type.
pub fn scalar_size_align(llvm: &str) -> (u64, u64) {
    match llvm {
        "i1" | "i8" => (1, 1),
        "i16" => (2, 2),
        "i32" | "float" => (4, 4),
        "i64" | "double" | "ptr" => (8, 8),
        _ => (8, 8),
    }
}

pub fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, llvm: &str, mml: &str) -> (String, String, String, u64, u64) {
        let (size, align) = scalar_size_align(llvm);
        (name.into(), llvm.into(), mml.into(), size, align)
    }

    #[test]
    fn runtime_string_is_24_bytes() {
        let layout = StructLayout::compute(
            "String",
            vec![
                scalar("length", "i64", "Int"),
                scalar("data", "ptr", "CharPtr"),
                scalar("__cap", "i64", "Int"),
            ],
        );
        assert_eq!(layout.size, 24);
        assert_eq!(layout.align, 8);
        assert_eq!(layout.field("data").unwrap().offset, 8);
        assert_eq!(layout.field("__cap").unwrap().offset, 16);
    }

    #[test]
    fn mixed_fields_pad_to_alignment() {
        // { i8, i64 } pads the first field's slot to offset 8.
        let layout = StructLayout::compute(
            "Mixed",
            vec![scalar("tag", "i8", "Byte"), scalar("value", "i64", "Int")],
        );
        assert_eq!(layout.field("value").unwrap().offset, 8);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn tail_padding_is_included() {
        // { i64, i8 } has 7 bytes of tail padding.
        let layout = StructLayout::compute(
            "Tail",
            vec![scalar("value", "i64", "Int"), scalar("tag", "i8", "Byte")],
        );
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn nested_struct_occupies_full_slot() {
        // A 16-byte nested struct starting at offset 8 runs to 24.
        let layout = StructLayout::compute(
            "Outer",
            vec![
                scalar("head", "i64", "Int"),
                ("inner".into(), "%struct.Inner".into(), "Inner".into(), 16, 8),
                scalar("tail", "i8", "Byte"),
            ],
        );
        let inner = layout.field("inner").unwrap();
        assert_eq!(inner.offset, 8);
        assert_eq!(layout.field("tail").unwrap().offset, 24);
        assert_eq!(layout.size, 32);
    }

    #[test]
    fn hfa_detection() {
        let hfa = StructLayout::compute(
            "Vec2",
            vec![scalar("x", "double", "Double"), scalar("y", "double", "Double")],
        );
        assert!(hfa.is_hfa());
        let not_hfa = StructLayout::compute(
            "Mixed",
            vec![scalar("x", "double", "Double"), scalar("n", "i64", "Int")],
        );
        assert!(!not_hfa.is_hfa());
        let too_many = StructLayout::compute(
            "Five",
            vec![
                scalar("a", "float", "Float"),
                scalar("b", "float", "Float"),
                scalar("c", "float", "Float"),
                scalar("d", "float", "Float"),
                scalar("e", "float", "Float"),
            ],
        );
        assert!(!too_many.is_hfa());
    }
}

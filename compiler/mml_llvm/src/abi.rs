//! Aggregate ABI classification at native call boundaries.
//!
//! User-to-user calls stay native to LLVM's defaults; only declarations of
//! `@native` functions and their call sites are lowered:
//!
//! | Target  | > 16 B                | <= 16 B              | HFA            |
//! |---------|-----------------------|----------------------|----------------|
//! | x86_64  | `ptr byval` / `sret`  | split into fields    | > 16 B rule    |
//! | AArch64 | plain `ptr` / `sret`  | split into registers | keep as struct |
//! | Default | pass through          | pass through         | pass through   |

use crate::layout::StructLayout;
use crate::TargetAbi;

/// How one aggregate parameter is passed.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamClass {
    /// Keep the struct by value (Default ABI, AArch64 HFAs).
    Direct,
    /// `ptr byval(%T) align 8` (x86_64 large aggregates).
    ByvalPtr,
    /// Plain `ptr` with a caller-side copy (AArch64 large aggregates).
    PlainPtr,
    /// Pass each field as its own scalar argument.
    Split(Vec<String>),
}

/// How an aggregate return is produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ReturnClass {
    /// Return the struct value directly.
    Direct,
    /// Hidden first pointer argument: `ptr sret(%T) align 8`.
    Sret,
}

pub fn classify_param(abi: TargetAbi, layout: &StructLayout) -> ParamClass {
    match abi {
        TargetAbi::Default => ParamClass::Direct,
        TargetAbi::X86_64 => {
            // HFAs follow the large-aggregate rule on x86_64.
            if layout.size > 16 || layout.is_hfa() {
                ParamClass::ByvalPtr
            } else {
                ParamClass::Split(layout.fields.iter().map(|f| f.llvm.clone()).collect())
            }
        }
        TargetAbi::AArch64 => {
            if layout.is_hfa() {
                return ParamClass::Direct;
            }
            if layout.size > 16 {
                ParamClass::PlainPtr
            } else {
                ParamClass::Split(pack_small_aarch64(layout))
            }
        }
    }
}

pub fn classify_return(abi: TargetAbi, layout: &StructLayout) -> ReturnClass {
    match abi {
        TargetAbi::Default => ReturnClass::Direct,
        TargetAbi::X86_64 => {
            if layout.size > 16 || layout.is_hfa() {
                ReturnClass::Sret
            } else {
                ReturnClass::Direct
            }
        }
        TargetAbi::AArch64 => {
            if layout.is_hfa() {
                // HFAs stay in FP registers in both directions.
                ReturnClass::Direct
            } else if layout.size > 16 {
                ReturnClass::Sret
            } else {
                ReturnClass::Direct
            }
        }
    }
}

/// AAPCS64 small aggregates: two 8-byte scalars pack into one register
/// each; anything smaller collapses into a single slot.
fn pack_small_aarch64(layout: &StructLayout) -> Vec<String> {
    if layout.size <= 8 {
        return vec![if layout.fields.len() == 1 {
            layout.fields[0].llvm.clone()
        } else {
            "i64".to_string()
        }];
    }
    if layout
        .fields
        .iter()
        .all(|f| f.size == 8)
    {
        return layout.fields.iter().map(|f| f.llvm.clone()).collect();
    }
    vec!["i64".to_string(), "i64".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::scalar_size_align;

    fn layout(name: &str, fields: &[(&str, &str)]) -> StructLayout {
        StructLayout::compute(
            name,
            fields
                .iter()
                .map(|(fname, llvm)| {
                    let (size, align) = scalar_size_align(llvm);
                    ((*fname).to_string(), (*llvm).to_string(), "T".to_string(), size, align)
                })
                .collect(),
        )
    }

    #[test]
    fn x86_64_large_aggregate_is_byval_and_sret() {
        let string = layout("String", &[("length", "i64"), ("data", "ptr"), ("__cap", "i64")]);
        assert_eq!(classify_param(TargetAbi::X86_64, &string), ParamClass::ByvalPtr);
        assert_eq!(classify_return(TargetAbi::X86_64, &string), ReturnClass::Sret);
    }

    #[test]
    fn x86_64_small_aggregate_splits() {
        let pair = layout("Pair", &[("a", "i64"), ("b", "i64")]);
        assert_eq!(
            classify_param(TargetAbi::X86_64, &pair),
            ParamClass::Split(vec!["i64".into(), "i64".into()])
        );
        assert_eq!(classify_return(TargetAbi::X86_64, &pair), ReturnClass::Direct);
    }

    #[test]
    fn aarch64_large_aggregate_is_plain_ptr() {
        let string = layout("String", &[("length", "i64"), ("data", "ptr"), ("__cap", "i64")]);
        assert_eq!(classify_param(TargetAbi::AArch64, &string), ParamClass::PlainPtr);
        assert_eq!(classify_return(TargetAbi::AArch64, &string), ReturnClass::Sret);
    }

    #[test]
    fn aarch64_hfa_stays_in_fp_registers() {
        let vec4 = layout(
            "Vec4",
            &[("x", "double"), ("y", "double"), ("z", "double"), ("w", "double")],
        );
        assert!(vec4.size > 16);
        assert_eq!(classify_param(TargetAbi::AArch64, &vec4), ParamClass::Direct);
        assert_eq!(classify_return(TargetAbi::AArch64, &vec4), ReturnClass::Direct);
    }

    #[test]
    fn x86_64_hfa_follows_large_rule() {
        let vec2 = layout("Vec2", &[("x", "double"), ("y", "double")]);
        assert_eq!(classify_param(TargetAbi::X86_64, &vec2), ParamClass::ByvalPtr);
    }

    #[test]
    fn default_abi_passes_through() {
        let string = layout("String", &[("length", "i64"), ("data", "ptr"), ("__cap", "i64")]);
        assert_eq!(classify_param(TargetAbi::Default, &string), ParamClass::Direct);
        assert_eq!(classify_return(TargetAbi::Default, &string), ReturnClass::Direct);
    }
}

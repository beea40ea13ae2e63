//! Type storage builder: lowers an AST [`bm_ast::TypeExpr`] into a flat
//! [`Storages`] vector (`spec.md` §4.4).

use bm_ast::TypeExpr;
use bm_ir::{AbstractOp, Code, Storage};
use bm_types::Varint;

use crate::error::{Error, Result};
use crate::module::Module;

fn varint(n: u64) -> Result<Varint> {
    Varint::encode(n).map_err(|_| Error::VarintOverflow(n))
}

/// Appends `ty`'s flattened storage tags to `out`, recursing through
/// `ident_type` references and emitting the string-literal content ops
/// directly into `module`'s code buffer as a side effect.
pub fn define_storage(module: &mut Module, ty: &TypeExpr, out: &mut Vec<Storage>) -> Result<()> {
    match ty {
        TypeExpr::Bool => {
            out.push(Storage::Bool);
            Ok(())
        }
        TypeExpr::Int { bits, signed } => {
            if *bits == 0 {
                return Err(Error::UnsupportedType(format!(
                    "int type must have a positive bit width, got {bits}"
                )));
            }
            let bits = varint(*bits as u64)?;
            out.push(if *signed {
                Storage::Int { bits }
            } else {
                Storage::Uint { bits }
            });
            Ok(())
        }
        TypeExpr::Float { bits } => {
            out.push(Storage::Float {
                bits: varint(*bits as u64)?,
            });
            Ok(())
        }
        TypeExpr::StrLiteral { value } => {
            let len = value.len() as u64;
            out.push(Storage::Array { size: varint(len)? });
            out.push(Storage::Uint { bits: varint(8)? });
            let str_id = module.strings.intern(&mut module.ids, value);
            let literal = module.emit(Code::new(AbstractOp::ImmediateString).with_ident(str_id));
            module.emit(Code::new(AbstractOp::SpecifyFixedValue).with_reference(literal));
            Ok(())
        }
        TypeExpr::Ident(ident) => {
            let id = module.idents.lookup(&mut module.ids, ident);
            let resolved = module
                .type_env
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::MissingBinding(ident.node_id))?;
            define_storage(module, &resolved, out)
        }
        TypeExpr::Struct {
            base,
            recursive,
            bit_size,
        } => {
            let format_id = module.idents.lookup(&mut module.ids, base);
            let recursive = *recursive || module.recursive_formats.contains(&format_id);
            if recursive {
                out.push(Storage::RecursiveStructRef { reference: format_id });
            } else {
                let size_plus = match bit_size {
                    Some(n) => varint(n + 1)?,
                    None => varint(0)?,
                };
                out.push(Storage::StructRef {
                    reference: format_id,
                    size_plus,
                });
            }
            Ok(())
        }
        TypeExpr::Enum { base } => {
            let enum_id = module.idents.lookup(&mut module.ids, base);
            out.push(Storage::Enum { reference: enum_id });
            if let Some(underlying) = module.enum_underlying.get(&enum_id).cloned() {
                define_storage(module, &underlying, out)?;
            }
            Ok(())
        }
        TypeExpr::StructUnion { members } => {
            out.push(Storage::Variant {
                member_count: varint(members.len() as u64)?,
                reference: bm_types::ObjectId::NULL,
            });
            for member in members {
                define_storage(module, member, out)?;
            }
            Ok(())
        }
        TypeExpr::Union { .. } => Err(Error::UnsupportedType(
            "a discriminated Union type has no direct storage; lower it via define_union".to_string(),
        )),
        TypeExpr::Array { element, length } => {
            match length.as_deref() {
                Some(len_expr) => {
                    if let Some(n) = const_int(len_expr) {
                        out.push(Storage::Array { size: varint(n)? });
                        define_storage(module, element, out)?;
                    } else {
                        out.push(Storage::Vector);
                        define_storage(module, element, out)?;
                    }
                }
                None => {
                    out.push(Storage::Vector);
                    define_storage(module, element, out)?;
                }
            }
            Ok(())
        }
        TypeExpr::Ptr { inner } => {
            out.push(Storage::Ptr);
            define_storage(module, inner, out)
        }
        TypeExpr::Optional { inner } => {
            out.push(Storage::Optional);
            define_storage(module, inner, out)
        }
    }
}

/// Evaluates a constant integer array length at lowering time, when the AST
/// expresses it as a literal. Anything else is treated as dynamic.
fn const_int(expr: &bm_ast::Expr) -> Option<u64> {
    match expr {
        bm_ast::Expr::IntLiteral { value, .. } => u64::try_from(*value).ok(),
        bm_ast::Expr::Int64Literal { value, .. } => u64::try_from(*value).ok(),
        _ => None,
    }
}

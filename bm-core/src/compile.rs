//! The top-level driver: AST in, finished [`Module`] out (`spec.md` §5).
//!
//! Mirrors the shape of the teacher's own top-level entry points — a short
//! function that owns nothing itself and delegates every phase to its own
//! module, logged at `info` per phase the way `fuel-vm`'s interpreter logs
//! each major step of block production.

use bm_ast::Program;

use crate::error::Result;
use crate::field_lower::lower_program;
use crate::module::Module;
use crate::post_passes::run_all;

/// Lowers `program` to IR and runs the fixed post-pass pipeline, returning
/// the completed [`Module`]. Callers that want the on-disk form pass the
/// result to [`crate::serialize::BinaryModule::from_module`].
#[tracing::instrument(skip_all, fields(program = %program.ident.name))]
pub fn compile(program: &Program) -> Result<Module> {
    let mut module = Module::new();

    tracing::info!("lowering definitions");
    lower_program(&mut module, program)?;

    tracing::info!("running post-pass pipeline");
    run_all(&mut module, program)?;

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::{Field, FieldArguments, Format, Ident, Program, TypeExpr};

    fn ident(node_id: u64, name: &str) -> Ident {
        Ident::declaration(node_id, name)
    }

    #[test]
    fn compiles_a_trivial_program_to_a_balanced_module() {
        let program = Program {
            ident: ident(1, "p"),
            imports: Vec::new(),
            formats: vec![Format {
                ident: ident(2, "f"),
                fields: vec![Field {
                    ident: ident(3, "x"),
                    type_expr: TypeExpr::Int { bits: 16, signed: false },
                    arguments: FieldArguments::default(),
                    follow: None,
                    belong_struct: None,
                    is_state_variable: false,
                    bit_alignment: Some(0),
                    eventual_bit_alignment: Some(16),
                    next: None,
                }],
                functions: Vec::new(),
                recursive: false,
                bit_size: None,
            }],
            states: Vec::new(),
            enums: Vec::new(),
        };

        let module = compile(&program).expect("compiles");
        assert!(!module.code.is_empty());
        assert!(module.programs.len() == 1 || !module.ranges.is_empty());
    }
}

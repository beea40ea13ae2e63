//! Round-trip and structural-invariant tests mirroring `spec.md` §8's
//! numbered properties, exercised against modules compiled from small
//! hand-built programs rather than fuzzed inputs.

use bm_ast::{Field, FieldArguments, Format, Ident, Program, TypeExpr};
use bm_core::BinaryModule;
use bm_ir::AbstractOp;
use bm_types::Varint;

fn ident(node_id: u64, name: &str) -> Ident {
    Ident::declaration(node_id, name)
}

fn plain_field(name: &str, node: u64, ty: TypeExpr) -> Field {
    Field {
        ident: ident(node, name),
        type_expr: ty,
        arguments: FieldArguments::default(),
        follow: None,
        belong_struct: None,
        is_state_variable: false,
        bit_alignment: None,
        eventual_bit_alignment: None,
        next: None,
    }
}

fn sample_program() -> Program {
    let tag = plain_field("tag", 2, TypeExpr::Int { bits: 8, signed: false });
    let payload = plain_field("payload", 3, TypeExpr::Int { bits: 32, signed: false });
    let format = Format {
        ident: ident(1, "F"),
        fields: vec![tag, payload],
        functions: vec![],
        recursive: false,
        bit_size: None,
    };
    Program {
        ident: ident(0, "root"),
        imports: vec![],
        formats: vec![format],
        states: vec![],
        enums: vec![],
    }
}

/// Property 1: `serialize(compile(program))` parsed back through
/// `BinaryModule::from_bytes` reproduces a structurally identical module —
/// same table contents, same code buffer.
#[test]
fn property_1_serialize_then_parse_round_trips() {
    let module = bm_core::compile(&sample_program()).expect("compiles");
    let written = BinaryModule::from_module(&module).expect("flatten");
    let bytes = written.to_bytes().expect("encode");
    let parsed = BinaryModule::from_bytes(&bytes).expect("decode");
    assert_eq!(written, parsed);
    assert_eq!(parsed.code.len(), module.code.len());
}

/// Property 2: every varint payload under 2^30 round-trips through
/// `to_bytes`/`decode` byte for byte. `Varint`'s own unit tests already cover
/// prefix-boundary values; this confirms the same guarantee for a value
/// drawn from a real compiled module's `max_id`.
#[test]
fn property_2_varint_round_trips_below_30_bits() {
    let module = bm_core::compile(&sample_program()).expect("compiles");
    let max_id = module.ids.max_id().value();
    assert!(max_id < (1u64 << 30));

    let v = Varint::encode(max_id).expect("encodes");
    let bytes = v.to_bytes();
    let (decoded, rest) = Varint::decode(&bytes).expect("decodes");
    assert!(rest.is_empty());
    assert_eq!(decoded.value(), max_id);
}

/// Invariant 3: every `reference`/`left_ref`/`right_ref`/`belong` operand on
/// every instruction names a position that exists in the code buffer, and
/// every `ident` operand that a DEFINE_* instruction owns is present in the
/// ident index table pointing back at that same position.
#[test]
fn invariant_3_refs_and_idents_resolve_within_the_module() {
    let module = bm_core::compile(&sample_program()).expect("compiles");
    let len = module.code.len();

    for code in &module.code {
        for r in [code.reference, code.left_ref, code.right_ref, code.belong, code.fallback] {
            if let Some(r) = r {
                assert!(r.index() < len, "{:?} operand {:?} out of range", code.op, r);
            }
        }
        for p in &code.param {
            assert!(p.index() < len, "param {:?} out of range", p);
        }
        if code.op.is_definition() {
            if let Some(id) = code.ident {
                let pos = module.index.get(&id).expect("defined ident indexed");
                assert_eq!(module.code[*pos].op, code.op);
            }
        }
    }
}

/// Invariant 4: `DEFINE_X`/`END_X` brackets balance — walking the buffer
/// with a simple depth counter (incrementing on `opens_bracket`, decrementing
/// on `closes_bracket`) never goes negative and ends at zero.
#[test]
fn invariant_4_brackets_balance_and_never_go_negative() {
    let module = bm_core::compile(&sample_program()).expect("compiles");
    let mut depth: i64 = 0;
    for code in &module.code {
        if code.op.closes_bracket() {
            depth -= 1;
            assert!(depth >= 0, "closed a bracket that was never opened");
        }
        if code.op.opens_bracket() {
            depth += 1;
        }
    }
    assert_eq!(depth, 0, "every opened bracket closed");
}

/// Invariant 5: every range-tracked ident's recorded `Range` spans a
/// `DEFINE_*` instruction at `range.start` whose own `ident` matches the key.
#[test]
fn invariant_5_ranges_point_at_their_defining_instruction() {
    let module = bm_core::compile(&sample_program()).expect("compiles");
    assert!(!module.ranges.is_empty(), "the sample program defines at least one range-tracked construct");
    for (&id, range) in &module.ranges {
        let start = range.start as usize;
        let def = &module.code[start];
        assert_eq!(def.ident, Some(id), "range for {id} starts at an instruction defining a different ident");
        assert!(range.end() as usize <= module.code.len());
        assert!(range.end() > range.start);
    }
}

/// Invariant 6: a `PHI` instruction only ever appears immediately after an
/// `END_IF`, `END_MATCH`, or `END_LOOP`.
#[test]
fn invariant_6_phi_follows_a_branch_join() {
    let module = bm_core::compile(&sample_program()).expect("compiles");
    for (pos, code) in module.code.iter().enumerate() {
        if code.op == AbstractOp::Phi {
            assert!(pos > 0, "PHI can't be the first instruction");
            let prev = module.code[pos - 1].op;
            assert!(
                matches!(prev, AbstractOp::EndIf | AbstractOp::EndMatch | AbstractOp::EndLoop),
                "PHI at {pos} follows {prev:?}, not a branch join"
            );
        }
    }
}

/// Invariant 7: interning the same byte-key twice yields the same
/// `StorageRef` — two fields sharing a type produce identical storage
/// entries, not duplicates.
#[test]
fn invariant_7_identical_storages_intern_to_the_same_ref() {
    let a = plain_field("a", 2, TypeExpr::Int { bits: 32, signed: false });
    let b = plain_field("b", 3, TypeExpr::Int { bits: 32, signed: false });
    let format = Format {
        ident: ident(1, "F"),
        fields: vec![a, b],
        functions: vec![],
        recursive: false,
        bit_size: None,
    };
    let program = Program {
        ident: ident(0, "root"),
        imports: vec![],
        formats: vec![format],
        states: vec![],
        enums: vec![],
    };
    let module = bm_core::compile(&program).expect("compiles");

    let storage_refs: Vec<_> = module
        .code
        .iter()
        .filter(|c| c.op == AbstractOp::SpecifyStorageType)
        .filter_map(|c| c.storage_ref)
        .collect();
    assert_eq!(storage_refs.len(), 2, "both fields specify a storage type");
    assert_eq!(storage_refs[0], storage_refs[1], "identical int(32) storages intern to one ref");
    assert_eq!(module.storages.entries().len(), 1, "the table holds only one distinct storage");
}

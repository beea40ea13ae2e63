//! The `Code` instruction record: one [`crate::AbstractOp`] plus whichever
//! sparse subset of operands that opcode actually uses (`spec.md` §3).
//!
//! Unlike the teacher's `fuel_asm::Instruction` — a fixed four-register
//! layout every opcode fills uniformly — an AbstractOp's operand set varies
//! opcode to opcode, so `Code` carries every possible operand as an
//! `Option`/`Vec` rather than reserving fixed slots.

use bm_types::{Decode, Encode, ObjectId, Varint};

use crate::endian::Endian;
use crate::flags::{CastType, CheckAt, DecodeFlags, EncodeFlags, FuncType, MergeMode, PackedOpType, SubRangeType};
use crate::op::AbstractOp;
use crate::ops_arith::{BinOp, UnOp};
use crate::storage::{StorageRef, Storages};

/// A position in the owning module's flat `Code` buffer, used wherever one
/// instruction refers to another (`ref`, `left_ref`, `right_ref`, `belong`,
/// `param`, `fallback`, `phi_params`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct CodeRef(pub u32);

impl CodeRef {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One arm contributed to a [`AbstractOp::Phi`] merge: the predecessor
/// branch's condition and the value it produced. `cond` is `None` for an
/// unconditional arm (a plain `else`, or a `match`'s `DEFAULT_CASE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct PhiParam {
    pub cond: Option<CodeRef>,
    pub value: CodeRef,
}

/// One instruction in the lowered program.
///
/// Every field beyond `op` is optional; which ones are populated is
/// determined entirely by `op` (see each [`AbstractOp`] variant's doc
/// comment for its operand set). Unused fields are `None`/empty, not zeroed
/// placeholders — there is no sentinel value shared across operand kinds.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Code {
    pub op: AbstractOp,
    pub ident: Option<ObjectId>,
    pub reference: Option<CodeRef>,
    pub left_ref: Option<CodeRef>,
    pub right_ref: Option<CodeRef>,
    pub belong: Option<CodeRef>,
    pub bop: Option<BinOp>,
    pub uop: Option<UnOp>,
    pub int_value: Option<i64>,
    pub int_value64: Option<i64>,
    pub bit_size: Option<Varint>,
    pub bit_size_plus: Option<Varint>,
    pub endian: Option<Endian>,
    pub storage: Option<Storages>,
    pub storage_ref: Option<StorageRef>,
    pub cast_type: Option<CastType>,
    pub merge_mode: Option<MergeMode>,
    pub check_at: Option<CheckAt>,
    pub packed_op_type: Option<PackedOpType>,
    pub sub_range_type: Option<SubRangeType>,
    pub func_type: Option<FuncType>,
    pub encode_flags: Option<EncodeFlags>,
    pub decode_flags: Option<DecodeFlags>,
    pub param: Vec<CodeRef>,
    pub metadata: Option<ObjectId>,
    pub phi_params: Vec<PhiParam>,
    pub fallback: Option<CodeRef>,
}

impl Code {
    /// A bare instruction with every operand empty.
    pub fn new(op: AbstractOp) -> Self {
        Code {
            op,
            ident: None,
            reference: None,
            left_ref: None,
            right_ref: None,
            belong: None,
            bop: None,
            uop: None,
            int_value: None,
            int_value64: None,
            bit_size: None,
            bit_size_plus: None,
            endian: None,
            storage: None,
            storage_ref: None,
            cast_type: None,
            merge_mode: None,
            check_at: None,
            packed_op_type: None,
            sub_range_type: None,
            func_type: None,
            encode_flags: None,
            decode_flags: None,
            param: Vec::new(),
            metadata: None,
            phi_params: Vec::new(),
            fallback: None,
        }
    }

    pub fn with_ident(mut self, ident: ObjectId) -> Self {
        self.ident = Some(ident);
        self
    }

    pub fn with_reference(mut self, reference: CodeRef) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_left_ref(mut self, left_ref: CodeRef) -> Self {
        self.left_ref = Some(left_ref);
        self
    }

    pub fn with_right_ref(mut self, right_ref: CodeRef) -> Self {
        self.right_ref = Some(right_ref);
        self
    }

    pub fn with_belong(mut self, belong: CodeRef) -> Self {
        self.belong = Some(belong);
        self
    }

    pub fn with_bop(mut self, bop: BinOp) -> Self {
        self.bop = Some(bop);
        self
    }

    pub fn with_uop(mut self, uop: UnOp) -> Self {
        self.uop = Some(uop);
        self
    }

    pub fn with_int_value(mut self, value: i64) -> Self {
        self.int_value = Some(value);
        self
    }

    pub fn with_int_value64(mut self, value: i64) -> Self {
        self.int_value64 = Some(value);
        self
    }

    pub fn with_bit_size(mut self, bit_size: Varint) -> Self {
        self.bit_size = Some(bit_size);
        self
    }

    pub fn with_bit_size_plus(mut self, bit_size_plus: Varint) -> Self {
        self.bit_size_plus = Some(bit_size_plus);
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn with_storage(mut self, storage: Storages) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_storage_ref(mut self, storage_ref: StorageRef) -> Self {
        self.storage_ref = Some(storage_ref);
        self
    }

    pub fn with_cast_type(mut self, cast_type: CastType) -> Self {
        self.cast_type = Some(cast_type);
        self
    }

    pub fn with_merge_mode(mut self, merge_mode: MergeMode) -> Self {
        self.merge_mode = Some(merge_mode);
        self
    }

    pub fn with_check_at(mut self, check_at: CheckAt) -> Self {
        self.check_at = Some(check_at);
        self
    }

    pub fn with_packed_op_type(mut self, packed_op_type: PackedOpType) -> Self {
        self.packed_op_type = Some(packed_op_type);
        self
    }

    pub fn with_sub_range_type(mut self, sub_range_type: SubRangeType) -> Self {
        self.sub_range_type = Some(sub_range_type);
        self
    }

    pub fn with_func_type(mut self, func_type: FuncType) -> Self {
        self.func_type = Some(func_type);
        self
    }

    pub fn with_encode_flags(mut self, encode_flags: EncodeFlags) -> Self {
        self.encode_flags = Some(encode_flags);
        self
    }

    pub fn with_decode_flags(mut self, decode_flags: DecodeFlags) -> Self {
        self.decode_flags = Some(decode_flags);
        self
    }

    pub fn with_param(mut self, param: Vec<CodeRef>) -> Self {
        self.param = param;
        self
    }

    pub fn with_metadata(mut self, metadata: ObjectId) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_phi_params(mut self, phi_params: Vec<PhiParam>) -> Self {
        self.phi_params = phi_params;
        self
    }

    pub fn with_fallback(mut self, fallback: CodeRef) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_only_requested_fields() {
        let code = Code::new(AbstractOp::EncodeInt)
            .with_reference(CodeRef(3))
            .with_bit_size(Varint::encode(16).unwrap())
            .with_endian(Endian::Big);
        assert_eq!(code.op, AbstractOp::EncodeInt);
        assert_eq!(code.reference, Some(CodeRef(3)));
        assert_eq!(code.bit_size.unwrap().value(), 16);
        assert_eq!(code.endian, Some(Endian::Big));
        assert!(code.left_ref.is_none());
        assert!(code.param.is_empty());
    }
}

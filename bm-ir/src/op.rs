/// The abstract opcode of a single [`crate::Code`] instruction.
///
/// This is the subset of the full ~250-opcode AbstractOp space that the
/// lowering and codec-synthesis passes in `bm-core` actually emit; unused
/// placeholder opcodes aren't enumerated (see `DESIGN.md`). Grouped the way
/// the teacher's `fuel_asm::opcode::OpcodeRepr` groups opcodes by execution
/// class, with one-line docs for the unremarkable members and longer docs
/// only where the shape is non-obvious.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display, bm_types::Encode, bm_types::Decode,
)]
#[repr(u8)]
#[non_exhaustive]
pub enum AbstractOp {
    // --- top-level and nested definitions -------------------------------
    /// Opens the single top-level program bracket.
    DefineProgram,
    /// Closes `DEFINE_PROGRAM`.
    EndProgram,
    /// Opens a struct-like format definition.
    DefineFormat,
    /// Closes `DEFINE_FORMAT`.
    EndFormat,
    /// Opens a named state (a format with no wire representation of its own).
    DefineState,
    /// Closes `DEFINE_STATE`.
    EndState,
    /// Opens an enum definition.
    DefineEnum,
    /// One enum member; `int_value` carries its underlying value.
    DefineEnumMember,
    /// Closes `DEFINE_ENUM`.
    EndEnum,
    /// Opens a field definition within a format or bit-field group.
    DefineField,
    /// Attaches the field's resolved [`crate::Storages`] to the enclosing `DEFINE_FIELD`.
    SpecifyStorageType,
    /// Closes `DEFINE_FIELD`.
    EndField,
    /// Opens a tagged-union type backing a field whose type is a `StructUnionType`.
    DefineUnion,
    /// One union member; `int_value` carries its 0-based discriminant.
    DefineUnionMember,
    /// Closes `DEFINE_UNION_MEMBER`.
    EndUnionMember,
    /// Closes `DEFINE_UNION`.
    EndUnion,
    /// Opens a synthesized property (discriminated-union view or merged conditional field).
    DefineProperty,
    /// Closes `DEFINE_PROPERTY`.
    EndProperty,
    /// Opens a function definition (including synthesized encode/decode coders).
    DefineFunction,
    /// Closes `DEFINE_FUNCTION`.
    EndFunction,
    /// Opens one function parameter.
    DefineParameter,
    /// Closes `DEFINE_PARAMETER`.
    EndParameter,
    /// Opens a run of adjacent sub-byte fields that together fill whole bytes.
    DefineBitField,
    /// Closes `DEFINE_BIT_FIELD`.
    EndBitField,

    // --- variables --------------------------------------------------------
    /// Binds `ident` to the value produced by `ref` (covers `var`, `const`, and compiler temporaries).
    DefineVariable,
    /// Binds `ident` to an *addressable* slot (element of an array/string) so writes through it propagate to the base.
    DefineVariableRef,

    // --- literals and simple expressions -----------------------------------
    /// A varint-sized integer literal.
    ImmediateInt,
    /// A raw 64-bit integer literal outside the varint range.
    ImmediateInt64,
    /// A single-character literal.
    ImmediateChar,
    /// A string literal; `ident` indexes the interned string table.
    ImmediateString,
    /// The literal `true`.
    ImmediateTrue,
    /// The literal `false`.
    ImmediateFalse,
    /// A type-valued literal, used by `cast`'s target type operand.
    ImmediateType,
    /// Pins a literal value onto the immediately preceding `IMMEDIATE_STRING`/array-typed definition.
    SpecifyFixedValue,
    /// A reference to a previously defined identifier.
    IdentRef,
    /// The builtin `.length` accessor on an array/vector/string.
    ArraySize,
    /// A non-`length` member access; `left_ref` base, `right_ref` member id.
    Access,
    /// An index expression; `left_ref` base, `right_ref` index value.
    Index,
    /// A unary operator application; `uop` carries the operator tag.
    Unary,
    /// A binary operator application; `bop` carries the operator tag.
    Binary,
    /// Stores `right_ref` into `left_ref`.
    Assign,
    /// Like `ASSIGN`, but the source value is first converted to the destination's storage type.
    AssignCast,
    /// Appends `right_ref` to the vector-valued `left_ref` (the lowering of an indexed `append_assign`).
    Append,
    /// A type-cast call; `cast_type` selects the conversion, `param` carries the argument(s).
    CallCast,
    /// A function call; `ref` is the callee, `param` the argument list.
    Call,
    /// Whether an optional or union-typed expression currently holds a value; wraps the union-arm disjunction from `handle_union_type`.
    FieldAvailable,
    /// A control-flow merge point; `phi_params` maps each predecessor arm's condition id to the value id it contributed.
    Phi,
    /// Narrows a union-typed field to one arm inside an `if`/`elif` branch that tests its discriminant.
    SwitchUnion,
    /// Tests whether a union-typed field currently holds the arm named by `ref`.
    CheckUnion,
    /// One arm of a discriminated-union property; `ref` is the arm's condition, `left_ref` the arm's field.
    ConditionalField,
    /// Seals a run of `CONDITIONAL_FIELD`s behind a single common-type getter/setter; `merge_mode` is always `CommonType`.
    MergedConditionalField,

    // --- control flow -------------------------------------------------------
    /// Opens an `if`; `ref` is the condition.
    If,
    /// Opens an `elif` arm of the enclosing `IF`; `ref` is its condition.
    Elif,
    /// Opens the unconditional `else` arm.
    Else,
    /// Closes an `if`/`elif`/`else` chain.
    EndIf,
    /// Opens a non-exhaustive `match`.
    Match,
    /// Opens an exhaustive `match` (the AST's `exhaustive` flag was set).
    ExhaustiveMatch,
    /// One `match` arm; `ref` is the pattern value.
    Case,
    /// The catch-all `match` arm ("any range" pattern).
    DefaultCase,
    /// Closes a `CASE`/`DEFAULT_CASE`.
    EndCase,
    /// Closes `MATCH`/`EXHAUSTIVE_MATCH`.
    EndMatch,
    /// Opens a loop with no condition (`loop { ... }`).
    LoopInfinite,
    /// Opens a conditionally-gated loop; `ref` is the continuation condition.
    LoopCondition,
    /// Closes a loop opened by `LOOP_INFINITE`/`LOOP_CONDITION`.
    EndLoop,
    /// Exits the innermost enclosing loop.
    Break,
    /// Jumps to the innermost enclosing loop's step/condition check.
    Continue,
    /// Increments `ref` by one (the step of a `for`-range/array/string loop).
    Inc,

    // --- endianness -----------------------------------------------------
    /// Tests whether the active endianness is little; `ref` is the dynamic endianness variable, or null for "native".
    IsLittleEndian,

    // --- encode synthesis -------------------------------------------------
    /// Encodes `ref` as a `bit_size`-wide integer with the given `endian`.
    EncodeInt,
    /// Encodes a variable-length vector of `bit_size`-wide integers (no length prefix).
    EncodeIntVector,
    /// Encodes a statically-sized (`array_length`-element) vector of `bit_size`-wide integers.
    EncodeIntVectorFixed,
    /// Asserts the just-evaluated length expression matches the target vector's actual length.
    LengthCheck,
    /// Calls a format's encode coder; `left_ref` starts as the format id and is retargeted to the synthesized function id by `bind_encoder_and_decoder`.
    CallEncode,
    /// Verifies a recursive struct's storage is initialized before encoding through it.
    CheckRecursiveStruct,

    // --- decode synthesis -------------------------------------------------
    /// Decodes a `bit_size`-wide integer with the given `endian` into `ident`.
    DecodeInt,
    /// Decodes a vector of `bit_size`-wide integers into `ident`, length driven by a prior `RESERVE_SIZE`.
    DecodeIntVector,
    /// Decodes a vector of `bit_size`-wide integers until the input is exhausted.
    DecodeIntVectorUntilEof,
    /// Tests whether at least one more element can be read from the input.
    CanRead,
    /// The number of bytes remaining in the input.
    RemainBytes,
    /// Pre-sizes `ident`'s backing storage to the just-decoded length.
    ReserveSize,
    /// Reads `bit_size`-wide elements without consuming them, for constant-terminator lookahead.
    PeekIntVector,
    /// Calls a format's decode coder; symmetric with `CALL_ENCODE`.
    CallDecode,
    /// Allocates a zero-valued instance of a recursive struct before decoding its fields into it.
    NewObject,

    // --- casts --------------------------------------------------------------
    /// A storage-to-storage conversion; `cast_type` selects which one (float bit-reinterpret, enum-to-int, int-to-enum, …).
    Cast,

    // --- sub-ranges and seeking -----------------------------------------
    /// Opens a bounded output window; `ref` is the byte length, `belong` the field.
    BeginEncodeSubRange,
    /// Closes `BEGIN_ENCODE_SUB_RANGE`.
    EndEncodeSubRange,
    /// Opens a bounded input window, symmetric with `BEGIN_ENCODE_SUB_RANGE`.
    BeginDecodeSubRange,
    /// Closes `BEGIN_DECODE_SUB_RANGE`.
    EndDecodeSubRange,
    /// Repositions the output cursor to `ref` bytes from the start.
    SeekEncoder,
    /// Repositions the input cursor to `ref` bytes from the start.
    SeekDecoder,

    // --- bit-field pack/unpack (post-pass expansion targets) --------------
    /// Opens a byte-granular encode of a packed bit-field group; `packed_op_type` selects fixed/variable width.
    BeginEncodePackedOperation,
    /// Closes `BEGIN_ENCODE_PACKED_OPERATION`.
    EndEncodePackedOperation,
    /// Opens a byte-granular decode of a packed bit-field group.
    BeginDecodePackedOperation,
    /// Closes `BEGIN_DECODE_PACKED_OPERATION`.
    EndDecodePackedOperation,

    // --- returns and synthesized property accessors ------------------------
    /// A successful `Result`-like coder return.
    RetSuccess,
    /// A pointer-returning union-member property getter.
    PropertyGetterPtr,
    /// An `Option`-returning union-member property getter.
    PropertyGetterOptional,

    // --- annotations ------------------------------------------------------
    /// A free-standing metadata annotation; `metadata` names it, `param` carries its argument values.
    Metadata,
}

impl AbstractOp {
    /// True for opcodes that open a bracketed region closed by a matching `END_*` sibling.
    /// `ELIF`/`ELSE` are markers inside the region an `IF` opens, not brackets of their own.
    pub const fn opens_bracket(self) -> bool {
        use AbstractOp::*;
        matches!(
            self,
            DefineProgram
                | DefineFormat
                | DefineState
                | DefineEnum
                | DefineField
                | DefineUnion
                | DefineUnionMember
                | DefineProperty
                | DefineFunction
                | DefineParameter
                | DefineBitField
                | If
                | Match
                | ExhaustiveMatch
                | Case
                | DefaultCase
                | LoopInfinite
                | LoopCondition
                | BeginEncodeSubRange
                | BeginDecodeSubRange
                | BeginEncodePackedOperation
                | BeginDecodePackedOperation
        )
    }

    /// True for opcodes that close a bracket opened by [`Self::opens_bracket`].
    pub const fn closes_bracket(self) -> bool {
        use AbstractOp::*;
        matches!(
            self,
            EndProgram
                | EndFormat
                | EndState
                | EndEnum
                | EndField
                | EndUnionMember
                | EndUnion
                | EndProperty
                | EndFunction
                | EndParameter
                | EndBitField
                | EndIf
                | EndCase
                | EndMatch
                | EndLoop
                | EndEncodeSubRange
                | EndDecodeSubRange
                | EndEncodePackedOperation
                | EndDecodePackedOperation
        )
    }

    /// True for `DEFINE_*` opcodes that introduce a new identifier (`spec.md` §3 invariant: every `ident` appears exactly once).
    pub const fn is_definition(self) -> bool {
        use AbstractOp::*;
        matches!(
            self,
            DefineProgram
                | DefineFormat
                | DefineState
                | DefineEnum
                | DefineEnumMember
                | DefineField
                | DefineUnion
                | DefineUnionMember
                | DefineProperty
                | DefineFunction
                | DefineParameter
                | DefineBitField
                | DefineVariable
                | DefineVariableRef
        )
    }
}

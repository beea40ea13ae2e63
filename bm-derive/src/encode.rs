use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::Data;

/// Derives `bm_types::Encode` for a plain struct (fields encoded in
/// declaration order) or a fieldless/tuple enum (a varint discriminant
/// followed by each variant's fields in order). Mirrors the struct/enum
/// split in the teacher's `fuel_derive::serialize`, minus alignment
/// bookkeeping this wire format doesn't need.
pub fn encode_derive(s: synstructure::Structure) -> TokenStream2 {
    let is_enum = matches!(s.ast().data, Data::Enum(_));
    let body = if is_enum {
        encode_enum(&s)
    } else {
        encode_struct(&s)
    };

    s.gen_impl(quote! {
        gen impl bm_types::Encode for @Self {
            fn encode<O: ::bm_types::Output + ?Sized>(&self, out: &mut O) -> ::bm_types::Result<()> {
                #body
                ::core::result::Result::Ok(())
            }
        }
    })
}

fn encode_struct(s: &synstructure::Structure) -> TokenStream2 {
    assert_eq!(s.variants().len(), 1, "structs must have exactly one variant");
    let encode_fields = s.variants()[0].each(|binding| {
        quote! {
            bm_types::Encode::encode(#binding, out)?;
        }
    });
    quote! {
        match self {
            #encode_fields
        }
    }
}

fn encode_enum(s: &synstructure::Structure) -> TokenStream2 {
    let arms = s.variants().iter().enumerate().map(|(i, variant)| {
        let pat = variant.pat();
        let index = i as u64;
        let encode_fields = variant.bindings().iter().map(|binding| {
            quote! {
                bm_types::Encode::encode(#binding, out)?;
            }
        });
        quote! {
            #pat => {
                ::bm_types::Output::write_varint(out, #index)?;
                #( #encode_fields )*
            }
        }
    });
    quote! {
        match self {
            #( #arms )*
        }
    }
}

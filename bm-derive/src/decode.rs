use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::Data;

/// Derives `bm_types::Decode`, the mirror image of [`crate::encode`].
pub fn decode_derive(s: synstructure::Structure) -> TokenStream2 {
    let is_enum = matches!(s.ast().data, Data::Enum(_));
    let body = if is_enum {
        decode_enum(&s)
    } else {
        decode_struct(&s)
    };

    s.gen_impl(quote! {
        gen impl bm_types::Decode for @Self {
            fn decode(input: &mut ::bm_types::Input<'_>) -> ::bm_types::Result<Self> {
                #body
            }
        }
    })
}

fn decode_struct(s: &synstructure::Structure) -> TokenStream2 {
    assert_eq!(s.variants().len(), 1, "structs must have exactly one variant");
    let ctor = s.variants()[0].construct(|field, _| {
        let ty = &field.ty;
        quote! { <#ty as bm_types::Decode>::decode(input)? }
    });
    quote! {
        ::core::result::Result::Ok(#ctor)
    }
}

fn decode_enum(s: &synstructure::Structure) -> TokenStream2 {
    let arms = s.variants().iter().enumerate().map(|(i, variant)| {
        let index = i as u64;
        let ctor = variant.construct(|field, _| {
            let ty = &field.ty;
            quote! { <#ty as bm_types::Decode>::decode(input)? }
        });
        quote! {
            #index => ::core::result::Result::Ok(#ctor),
        }
    });
    quote! {
        let tag = ::bm_types::Input::read_varint(input)?.value();
        match tag {
            #( #arms )*
            other => ::core::result::Result::Err(::bm_types::Error::UnknownDiscriminant { tag: other }),
        }
    }
}

//! This crate provides the derive macros for [epan](../epan/index.html).

use proc_macro::TokenStream;

use quote::{quote, ToTokens};

mod attributes;
mod model;
mod util;

use crate::attributes::*;
use crate::model::{handoff_body, StructInnards};
use crate::util::*;

/// Marks a struct as the protocol root.
#[proc_macro_derive(Protocol, attributes(epan))]
pub fn derive_protocol(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    let ret = derive_protocol_impl(&input).unwrap_or_else(|e| e.to_compile_error());
    ret.into()
}

fn derive_protocol_impl(input: &syn::DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let data = match &input.data {
        syn::Data::Enum(_) | syn::Data::Union(_) => {
            return make_err(input, "only structs can derive Protocol");
        }
        syn::Data::Struct(data) => data,
    };

    let innards = StructInnards::from_fields(&data.fields)?;
    if innards.is_unit_tuple() {
        return make_err(&input.ident, "a protocol needs named fields");
    }
    let proto_opts = init_options::<ProtocolOptions>(&input.attrs)?;

    let upper_cased = input.ident.to_upper_words();
    let snake_cased = input.ident.to_snake_case();

    let proto_desc = proto_opts.proto_desc.as_ref().unwrap_or(&upper_cased);
    let proto_name = proto_opts.proto_name.as_ref().unwrap_or(&upper_cased);
    let proto_filter = proto_opts.proto_filter.as_ref().unwrap_or(&snake_cased);

    let input_ident = &input.ident;
    let dissect_impl = innards.dissect_impl(input_ident);
    let handoff = handoff_body(&proto_opts.decode_from, proto_filter);

    let ret = quote! {
        #dissect_impl

        impl epan::Protocol for #input_ident {
            fn proto_desc() -> &'static str {
                #proto_desc
            }

            fn proto_name() -> &'static str {
                #proto_name
            }

            fn proto_filter() -> &'static str {
                #proto_filter
            }

            fn proto_reg_handoff(__builder: &mut epan::RegistryBuilder) {
                #handoff
            }
        }
    };

    Ok(ret)
}

/// Registers a type to be used as a field within the main `#[derive(Protocol)]` type.
#[proc_macro_derive(ProtocolField, attributes(epan))]
pub fn derive_protocol_field(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    let ret = derive_protocol_field_impl(&input).unwrap_or_else(|e| e.to_compile_error());
    ret.into()
}

fn derive_protocol_field_impl(input: &syn::DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if let Some(attr) = get_epan_attrs(&input.attrs).first() {
        return make_err(*attr, "epan attributes on a field type belong on its fields");
    }
    match &input.data {
        syn::Data::Struct(data) => {
            let innards = StructInnards::from_fields(&data.fields)?;
            Ok(innards.dissect_impl(&input.ident).to_token_stream())
        }
        syn::Data::Enum(data) => make_err(
            &data.enum_token,
            "#[derive(ProtocolField)] cannot be used on enums",
        ),
        syn::Data::Union(data) => make_err(
            &data.union_token,
            "#[derive(ProtocolField)] cannot be used on unions",
        ),
    }
}

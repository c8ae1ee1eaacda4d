use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;

use crate::util::*;

/// Implement this for things which can extract options out of meta items.
pub(crate) trait OptionBuilder {
    fn add_option(&mut self, meta: &syn::Meta) -> syn::Result<()>;
}

/// Initializes some set of options from a list of attributes. Note that each attribute may contain
/// multiple meta items, but each meta item should map to exactly one option.
pub(crate) fn init_options<T>(attrs: &[syn::Attribute]) -> syn::Result<T>
where
    T: OptionBuilder + Default,
{
    let mut opts = T::default();
    // Not all attributes are epan attributes, so we need to filter them out first.
    let meta_items = get_meta_items(get_epan_attrs(attrs).as_slice())?;
    for meta in &meta_items {
        opts.add_option(meta)?;
    }
    Ok(opts)
}

/// Options for the top level protocol.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProtocolOptions {
    /// The dissector table(s) to register the protocol to.
    pub(crate) decode_from: Vec<DecodeFrom>,
    pub(crate) proto_desc: Option<String>,
    pub(crate) proto_name: Option<String>,
    pub(crate) proto_filter: Option<String>,
}

/// Options for a field. A field may be a named field or the element of a unit tuple.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldOptions {
    pub(crate) hidden: Option<bool>,
    /// An identifier for an integer field which holds the byte length of this field.
    pub(crate) size_hint: Option<syn::Ident>,
    pub(crate) enc: Option<Enc>,
    pub(crate) display: Option<FieldDisplay>,
    pub(crate) taps: Vec<syn::Path>,
    /// Path to a custom function to display this field.
    pub(crate) decode_with: Option<syn::Path>,
    pub(crate) subdissector: Option<Subdissector>,
    /// Custom name for the field.
    pub(crate) rename: Option<String>,
    pub(crate) save: Option<bool>,
}

/// We differentiate between "regular" subdissector tables (those which have a name and a key,
/// e.g "udp.port" 1234) and "decode as" subdissectors, which only use the table's payload
/// binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Subdissector {
    DecodeAs(String),
    Table {
        table_name: String,
        /// A list of fields to try, in order, when finding the subdissector to use.
        fields: Vec<syn::Ident>,
    },
}

impl Subdissector {
    pub(crate) fn table_name(&self) -> &str {
        match self {
            Subdissector::DecodeAs(table_name) => table_name,
            Subdissector::Table { table_name, .. } => table_name,
        }
    }
}

/// The subdissector table to register with.
#[derive(Debug, Clone)]
pub(crate) enum DecodeFrom {
    DecodeAs(String),
    Uint(String, Vec<u32>),
}

impl DecodeFrom {
    /// Binds `__handle` into the table. Meant for the body of `proto_reg_handoff`.
    pub(crate) fn to_tokens(&self) -> proc_macro2::TokenStream {
        match self {
            DecodeFrom::DecodeAs(table) => quote! {
                __builder.set_payload(#table, &__handle);
            },
            DecodeFrom::Uint(table, keys) => quote! {#(
                __builder.add_uint(#table, #keys, &__handle);
            )*},
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enc {
    Big,
    Little,
}

impl Enc {
    fn parse(lit: &syn::LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "big" => Ok(Enc::Big),
            "little" => Ok(Enc::Little),
            _ => make_err(lit, "expected \"big\" or \"little\""),
        }
    }

    pub(crate) fn to_expr(self) -> syn::Expr {
        let variant = match self {
            Enc::Big => format_ident!("BigEndian"),
            Enc::Little => format_ident!("LittleEndian"),
        };
        syn::parse_quote! { epan::Encoding::#variant }
    }
}

/// How a field's value is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldDisplay(syn::Ident);

impl FieldDisplay {
    fn parse(lit: &syn::LitStr) -> syn::Result<Self> {
        let variant = match lit.value().as_str() {
            "none" => "None",
            "dec" => "Dec",
            "hex" => "Hex",
            "oct" => "Oct",
            "dec_hex" => "DecHex",
            "hex_dec" => "HexDec",
            "sep_colon" => "SepColon",
            "sep_dash" => "SepDash",
            "sep_dot" => "SepDot",
            "sep_space" => "SepSpace",
            _ => return make_err(lit, "unknown display, expected e.g. \"dec\" or \"hex\""),
        };
        Ok(FieldDisplay(format_ident!("{}", variant)))
    }

    pub(crate) fn to_expr(&self) -> syn::Expr {
        let variant = &self.0;
        syn::parse_quote! { epan::FieldDisplay::#variant }
    }
}

impl OptionBuilder for ProtocolOptions {
    fn add_option(&mut self, meta: &syn::Meta) -> syn::Result<()> {
        match meta {
            syn::Meta::NameValue(nv) => match nv.path.get_ident() {
                None => return make_err(meta, "expected identifier"),
                Some(ident) => match ident.to_string().as_str() {
                    META_DECODE_FROM => self.extract_decode_from(nv, meta)?,
                    META_PROTO_DESC => {
                        let proto_desc = lit_str(&nv.value)?.value();
                        self.proto_desc = Some(proto_desc);
                    }
                    META_PROTO_NAME => {
                        let proto_name = lit_str(&nv.value)?.value();
                        self.proto_name = Some(proto_name);
                    }
                    META_PROTO_FILTER => {
                        let proto_filter = lit_str(&nv.value)?.value();
                        if proto_filter.is_empty() || proto_filter.contains(char::is_whitespace) {
                            return make_err(&nv.value, "expected a filter name without spaces");
                        }
                        self.proto_filter = Some(proto_filter);
                    }
                    _ => return make_err(meta, "unrecognized attribute"),
                },
            },
            _ => return make_err(meta, "unexpected meta item"),
        };
        Ok(())
    }
}

impl ProtocolOptions {
    fn extract_decode_from(
        &mut self,
        nv: &syn::MetaNameValue,
        meta: &syn::Meta,
    ) -> Result<(), syn::Error> {
        // A single tuple is one table with its keys, not a list of tables.
        let items = match &nv.value {
            syn::Expr::Tuple(_) => vec![&nv.value],
            value => expr_items(value),
        };
        for item in items {
            match expr_items(item).as_slice() {
                [] => return make_err(meta, "expected at least one item"),
                [name] => {
                    let decode_from = lit_str(name)?.value();
                    self.decode_from.push(DecodeFrom::DecodeAs(decode_from));
                }
                [name, xs @ ..] => {
                    let name = lit_str(name)?.value();
                    let mut patterns: Vec<u32> = Vec::with_capacity(xs.len());
                    for x in xs {
                        let pattern = lit_int(x)?.base10_parse()?;
                        patterns.push(pattern);
                    }
                    self.decode_from.push(DecodeFrom::Uint(name, patterns));
                }
            }
        }
        Ok(())
    }
}

impl OptionBuilder for FieldOptions {
    fn add_option(&mut self, meta: &syn::Meta) -> syn::Result<()> {
        match meta {
            syn::Meta::Path(path) => match path.get_ident() {
                None => return make_err(meta, "expected identifier"),
                Some(ident) => match ident.to_string().as_str() {
                    META_HIDE => self.hidden = Some(true),
                    META_SAVE => self.save = Some(true),
                    _ => return make_err(meta, "unrecognized attribute"),
                },
            },
            syn::Meta::NameValue(nv) => match nv.path.get_ident() {
                None => return make_err(meta, "expected identifier"),
                Some(ident) => match ident.to_string().as_str() {
                    META_HIDE => {
                        let hidden = lit_bool(&nv.value)?.value;
                        self.hidden = Some(hidden);
                    }
                    META_SAVE => {
                        let save = lit_bool(&nv.value)?.value;
                        self.save = Some(save);
                    }
                    META_LEN => {
                        let len = lit_str(&nv.value)?.value();
                        self.size_hint = Some(format_ident!("{}", len));
                    }
                    META_ENC => self.enc = Some(Enc::parse(lit_str(&nv.value)?)?),
                    META_DISPLAY => {
                        self.display = Some(FieldDisplay::parse(lit_str(&nv.value)?)?);
                    }
                    META_DECODE_WITH => {
                        let decode_with = lit_str(&nv.value)?.value();
                        self.decode_with = Some(syn::parse_str::<syn::Path>(&decode_with)?);
                    }
                    META_TAP => self.taps = parse_str_list(&nv.value)?,
                    META_SUBDISSECTOR => self.extract_subdissector(nv, meta)?,
                    META_RENAME => {
                        let rename = lit_str(&nv.value)?.value();
                        self.rename = Some(rename);
                    }
                    _ => return make_err(meta, "unrecognized attribute"),
                },
            },
            syn::Meta::List(_) => return make_err(meta, "unexpected meta item"),
        };
        Ok(())
    }
}

impl FieldOptions {
    fn extract_subdissector(
        &mut self,
        nv: &syn::MetaNameValue,
        meta: &syn::Meta,
    ) -> Result<(), syn::Error> {
        match expr_items(&nv.value).as_slice() {
            [] => return make_err(meta, "expected at least one item"),
            [decode_as] => {
                let decode_as = lit_str(decode_as)?.value();
                self.subdissector = Some(Subdissector::DecodeAs(decode_as));
            }
            [table_name, items @ ..] => {
                let table_name = lit_str(table_name)?.value();

                let mut fields = Vec::with_capacity(items.len());
                for item in items {
                    let field = lit_str(item)?.value();
                    fields.push(format_ident!("{}", field));
                }

                self.subdissector = Some(Subdissector::Table { table_name, fields });
            }
        }
        Ok(())
    }

    /// Rejects combinations which cannot mean anything.
    pub(crate) fn validate(&self, span: &impl Spanned) -> syn::Result<()> {
        if self.subdissector.is_some() {
            if self.decode_with.is_some() {
                return make_err(span, "a field cannot have both subdissector and decode_with");
            }
            if self.save == Some(true) {
                return make_err(span, "a field handed to a subdissector cannot be saved");
            }
            if self.hidden == Some(true) {
                return make_err(span, "a field handed to a subdissector cannot be hidden");
            }
        }
        Ok(())
    }
}

const META_DECODE_FROM: &str = "decode_from";
const META_PROTO_DESC: &str = "proto_desc";
const META_PROTO_NAME: &str = "proto_name";
const META_PROTO_FILTER: &str = "proto_filter";
const META_HIDE: &str = "hide";
const META_SAVE: &str = "save";
const META_LEN: &str = "len_field";
const META_ENC: &str = "enc";
const META_DISPLAY: &str = "display";
const META_DECODE_WITH: &str = "decode_with";
const META_TAP: &str = "tap";
const META_SUBDISSECTOR: &str = "subdissector";
const META_RENAME: &str = "rename";

/// Extracts all the meta items from a list of attributes.
pub(crate) fn get_meta_items(attrs: &[&syn::Attribute]) -> syn::Result<Vec<syn::Meta>> {
    let mut xs = Vec::new();
    for attr in attrs {
        let pairs: Punctuated<syn::Meta, syn::Token![,]> =
            attr.parse_args_with(Punctuated::parse_terminated)?;
        xs.extend(pairs);
    }
    Ok(xs)
}

/// Extracts the attributes which start with some identifier.
pub(crate) fn get_attrs<'a>(attrs: &'a [syn::Attribute], ident: &str) -> Vec<&'a syn::Attribute> {
    attrs
        .iter()
        .filter(|attr| match attr.meta {
            syn::Meta::List(ref lst) => lst
                .path
                .segments
                .first()
                .filter(|s| s.ident == ident)
                .is_some(),
            _ => false,
        })
        .collect()
}

pub(crate) fn get_epan_attrs(attrs: &[syn::Attribute]) -> Vec<&syn::Attribute> {
    get_attrs(attrs, "epan")
}

pub(crate) fn get_docs(attrs: &[syn::Attribute]) -> Option<String> {
    let docs = attrs
        .iter()
        .filter_map(get_doc)
        .collect::<Vec<_>>()
        .join(" ");
    if docs.is_empty() {
        None
    } else {
        Some(docs)
    }
}

/// Extracts the doc comment contents from an attribute, if any.
fn get_doc(attr: &syn::Attribute) -> Option<String> {
    match attr.meta {
        syn::Meta::NameValue(ref nv) if nv.path.is_ident("doc") => lit_str(&nv.value)
            .ok()
            .map(|lit| lit.value().trim().to_string()),
        _ => None,
    }
}

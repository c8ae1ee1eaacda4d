use std::collections::HashSet;

use quote::{quote, ToTokens};
use syn::parse_quote;

use crate::attributes::*;
use crate::util::*;

/// The fields of a type deriving `Protocol` or `ProtocolField`.
pub(crate) enum StructInnards {
    /// A newtype. It decodes exactly like the type it wraps.
    UnitTuple(UnitTuple),
    NamedFields { fields: Vec<NamedField> },
}

pub(crate) struct UnitTuple(FieldMeta);

pub(crate) struct NamedField {
    ident: syn::Ident,
    meta: FieldMeta,
}

pub(crate) struct FieldMeta {
    ty: syn::Type,
    docs: Option<String>,
    options: FieldOptions,
}

impl FieldMeta {
    fn from_field(field: &syn::Field) -> syn::Result<Self> {
        let options = init_options::<FieldOptions>(&field.attrs)?;
        options.validate(field)?;
        Ok(FieldMeta {
            ty: field.ty.clone(),
            docs: get_docs(&field.attrs),
            options,
        })
    }

    fn blurb(&self) -> syn::Expr {
        match &self.docs {
            Some(docs) => parse_quote! { std::option::Option::Some(#docs) },
            None => parse_quote! { std::option::Option::None },
        }
    }

    fn display_as_expr(&self) -> syn::Expr {
        match &self.options.display {
            Some(display) => {
                let display = display.to_expr();
                parse_quote! { std::option::Option::Some(#display) }
            }
            None => parse_quote! { std::option::Option::None },
        }
    }

    fn enc_as_expr(&self) -> syn::Expr {
        match self.options.enc {
            Some(enc) => {
                let enc = enc.to_expr();
                parse_quote! { std::option::Option::Some(#enc) }
            }
            None => parse_quote! { std::option::Option::None },
        }
    }

    fn size_hint_as_expr(&self) -> syn::Expr {
        match &self.options.size_hint {
            Some(size_hint) => {
                let var = field_var(size_hint);
                parse_quote! { std::option::Option::Some(#var as usize) }
            }
            None => parse_quote! { std::option::Option::None },
        }
    }
}

impl StructInnards {
    pub(crate) fn from_fields(fields: &syn::Fields) -> syn::Result<Self> {
        match fields {
            syn::Fields::Named(fields) => Self::from_fields_named(fields),
            syn::Fields::Unnamed(fields) => Self::from_fields_unnamed(fields),
            syn::Fields::Unit => make_err(fields, "expected named fields or a unit tuple"),
        }
    }

    fn from_fields_named(fields: &syn::FieldsNamed) -> syn::Result<Self> {
        let mut named_fields: Vec<NamedField> = Vec::new();
        for field in &fields.named {
            let Some(ident) = field.ident.clone() else {
                return make_err(field, "expected a named field");
            };
            let meta = FieldMeta::from_field(field)?;
            check_references(&ident, &meta.options, &named_fields)?;
            named_fields.push(NamedField { ident, meta });
        }
        Ok(StructInnards::NamedFields {
            fields: named_fields,
        })
    }

    fn from_fields_unnamed(fields: &syn::FieldsUnnamed) -> syn::Result<Self> {
        let [field] = fields.unnamed.iter().collect::<Vec<_>>()[..] else {
            return make_err(fields, "expected only one field in tuple");
        };
        let meta = FieldMeta::from_field(field)?;
        let opts = &meta.options;
        if opts.size_hint.is_some()
            || opts.subdissector.is_some()
            || opts.decode_with.is_some()
            || !opts.taps.is_empty()
            || opts.save.is_some()
            || opts.hidden.is_some()
            || opts.rename.is_some()
        {
            return make_err(field, "only enc and display can be set on a unit tuple");
        }
        Ok(StructInnards::UnitTuple(UnitTuple(meta)))
    }

    pub(crate) fn is_unit_tuple(&self) -> bool {
        matches!(self, StructInnards::UnitTuple(_))
    }

    /// The whole `impl epan::Dissect` block for the type.
    pub(crate) fn dissect_impl(&self, ident: &syn::Ident) -> syn::ItemImpl {
        match self {
            StructInnards::UnitTuple(unit) => unit.dissect_impl(ident),
            StructInnards::NamedFields { fields } => {
                let fn_add_to_tree = add_to_tree_fn(fields);
                let fn_register = register_fn(fields);
                parse_quote! {
                    impl epan::Dissect for #ident {
                        type Emit = ();
                        #fn_add_to_tree
                        #fn_register
                        fn emit(
                            _args: &epan::DissectorArgs<'_>,
                        ) -> std::result::Result<(), epan::DissectError> {
                            std::result::Result::Ok(())
                        }
                    }
                }
            }
        }
    }
}

/// Fields named by `len_field` and `subdissector` must come before the field which uses them.
fn check_references(
    ident: &syn::Ident,
    options: &FieldOptions,
    previous: &[NamedField],
) -> syn::Result<()> {
    let mut refs: Vec<&syn::Ident> = options.size_hint.iter().collect();
    if let Some(Subdissector::Table { fields, .. }) = &options.subdissector {
        refs.extend(fields);
    }
    for r in refs {
        if !previous.iter().any(|f| f.ident == *r) {
            return make_err(
                r,
                &format!("`{ident}` refers to `{r}`, which must be a field declared before it"),
            );
        }
    }
    Ok(())
}

fn add_to_tree_fn(fields: &[NamedField]) -> syn::ItemFn {
    let plans = get_field_dissection_plans(fields);
    let dissect_fields = fields
        .iter()
        .zip(&plans)
        .flat_map(|(field, plan)| field.dissection_steps(plan));
    parse_quote! {
        #[allow(clippy::useless_conversion, clippy::redundant_clone)]
        fn add_to_tree(
            __args: &epan::DissectorArgs<'_>,
            __cx: &mut epan::PacketContext<'_>,
        ) -> std::result::Result<usize, epan::DissectError> {
            let __offset = __args.offset;
            let __parent = __args.add_subtree(__cx)?;
            #(#dissect_fields)*
            __cx.tree.set_end(__parent, __args.tvb, __offset);
            std::result::Result::Ok(__offset - __args.offset)
        }
    }
}

fn register_fn(fields: &[NamedField]) -> syn::ItemFn {
    let register_fields = fields.iter().flat_map(NamedField::registration_steps);
    parse_quote! {
        fn register(__args: &epan::RegisterArgs<'_>, __builder: &mut epan::RegistryBuilder) {
            epan::dissect::register_subtree(__args, __builder);
            #(#register_fields)*
        }
    }
}

impl UnitTuple {
    fn dissect_impl(&self, ident: &syn::Ident) -> syn::ItemImpl {
        let ty = &self.0.ty;
        let enc = self.0.enc_as_expr();
        let display = self.0.display_as_expr();
        let blurb = self.0.blurb();
        parse_quote! {
            impl epan::Dissect for #ident {
                type Emit = <#ty as epan::Dissect>::Emit;

                fn add_to_tree(
                    __args: &epan::DissectorArgs<'_>,
                    __cx: &mut epan::PacketContext<'_>,
                ) -> std::result::Result<usize, epan::DissectError> {
                    let __args_next = epan::DissectorArgs {
                        enc: __args.enc.or(#enc),
                        ..*__args
                    };
                    <#ty as epan::Dissect>::add_to_tree(&__args_next, __cx)
                }

                fn register(__args: &epan::RegisterArgs<'_>, __builder: &mut epan::RegistryBuilder) {
                    let __args_next = epan::RegisterArgs {
                        blurb: __args.blurb.or(#blurb),
                        display: __args.display.or(#display),
                        ..*__args
                    };
                    <#ty as epan::Dissect>::register(&__args_next, __builder);
                }

                fn emit(
                    __args: &epan::DissectorArgs<'_>,
                ) -> std::result::Result<Self::Emit, epan::DissectError> {
                    let __args_next = epan::DissectorArgs {
                        enc: __args.enc.or(#enc),
                        ..*__args
                    };
                    <#ty as epan::Dissect>::emit(&__args_next)
                }
            }
        }
    }
}

impl NamedField {
    fn decl_prefix_next(&self) -> syn::Stmt {
        let field_name = self.ident.to_string();
        parse_quote! {
            let __prefix_next = [__args.prefix, #field_name].join(".");
        }
    }

    fn registration_steps(&self) -> Vec<syn::Stmt> {
        let decl_prefix = self.decl_prefix_next();
        let ty = &self.meta.ty;

        let register: syn::Stmt = match &self.meta.options.subdissector {
            // The bytes go to another dissector, or to the data dissector, never into a field of
            // our own.
            Some(subd) => {
                let table_name = subd.table_name();
                parse_quote! {
                    __builder.register_table(#table_name);
                }
            }
            None => {
                let name = self
                    .meta
                    .options
                    .rename
                    .clone()
                    .unwrap_or(self.ident.to_title_case());
                let blurb = self.meta.blurb();
                let display = self.meta.display_as_expr();
                parse_quote! {
                    <#ty as epan::Dissect>::register(
                        &epan::RegisterArgs {
                            proto_id: __args.proto_id,
                            name: #name,
                            prefix: &__prefix_next,
                            blurb: #blurb,
                            display: #display,
                        },
                        __builder,
                    );
                }
            }
        };

        parse_quote! {
            #decl_prefix
            #register
        }
    }

    fn dissection_steps(&self, plan: &FieldDissectionPlan) -> Vec<syn::Stmt> {
        let decl_prefix_next = self.decl_prefix_next();
        let decl_args_next = self.decl_dissector_args();
        let var_name = field_var(&self.ident);

        let steps = plan.dissection_steps(&decl_args_next, &var_name);

        parse_quote! {
            #decl_prefix_next
            #(#steps)*
        }
    }

    fn decl_dissector_args(&self) -> syn::Stmt {
        let list_len = self.meta.size_hint_as_expr();
        let enc = self.meta.enc_as_expr();

        parse_quote! {
            let __args_next = epan::DissectorArgs {
                tvb: __args.tvb,
                proto_root: __args.proto_root,
                prefix: &__prefix_next,
                offset: __offset,
                parent: __parent,
                list_len: #list_len,
                enc: #enc,
            };
        }
    }
}

/// Works out, for each field, what has to be generated for it. Some of it depends on the fields
/// after it: a field used as a length or as a subdissector key must be emitted so its value is
/// around later.
fn get_field_dissection_plans(fields: &[NamedField]) -> Vec<FieldDissectionPlan<'_>> {
    let mut used_later: HashSet<&syn::Ident> = HashSet::new();
    for field in fields {
        if let Some(size_hint) = &field.meta.options.size_hint {
            used_later.insert(size_hint);
        }
        if let Some(Subdissector::Table { fields: keys, .. }) = &field.meta.options.subdissector {
            used_later.extend(keys);
        }
    }

    fields
        .iter()
        .map(|field| {
            let options = &field.meta.options;
            let build_ctx = !options.taps.is_empty() || options.decode_with.is_some();
            FieldDissectionPlan {
                emit: build_ctx || used_later.contains(&field.ident),
                save: options.save == Some(true),
                build_ctx,
                hide: options.hidden == Some(true),
                taps: &options.taps,
                add_strategy: AddStrategy::from_field_options(options),
                meta: &field.meta,
            }
        })
        .collect()
}

pub(crate) struct FieldDissectionPlan<'a> {
    emit: bool,
    save: bool,
    build_ctx: bool,
    hide: bool,
    taps: &'a [syn::Path],
    add_strategy: AddStrategy,

    meta: &'a FieldMeta,
}

enum AddStrategy {
    Subdissect(Subdissector),
    DecodeWith(syn::Path),
    Default,
}

impl AddStrategy {
    fn from_field_options(options: &FieldOptions) -> Self {
        if let Some(subd) = &options.subdissector {
            AddStrategy::Subdissect(subd.clone())
        } else if let Some(decode_fn) = &options.decode_with {
            AddStrategy::DecodeWith(decode_fn.clone())
        } else {
            AddStrategy::Default
        }
    }
}

impl FieldDissectionPlan<'_> {
    fn dissection_steps(
        &self,
        decl_args_next: impl ToTokens,
        field_var_name: &syn::Ident,
    ) -> Vec<syn::Stmt> {
        let emit_and_assign = self.emit_and_assign(field_var_name);
        let save_field = self.save_field();
        let build_tap_ctx = self.build_tap_ctx(field_var_name);
        let call_taps = self.call_taps();
        let exec_add_strategy = self.exec_add_strategy();
        let hide = self.hide_field();

        parse_quote! {
            #decl_args_next
            #emit_and_assign
            #save_field
            #build_tap_ctx
            #(#call_taps)*
            #(#exec_add_strategy)*
            #hide
            let __offset = __offset + __nr_bytes;
        }
    }

    fn emit_and_assign(&self, var_name: &syn::Ident) -> Option<syn::Stmt> {
        if !self.emit {
            return None;
        }
        let ty = &self.meta.ty;
        Some(parse_quote! {
            let #var_name = <#ty as epan::Dissect>::emit(&__args_next)?;
        })
    }

    fn save_field(&self) -> Option<syn::Stmt> {
        if !self.save {
            return None;
        }
        let ty = &self.meta.ty;
        Some(parse_quote! {
            <#ty as epan::Primitive>::save(&__args_next, &mut __cx.pinfo.fields)?;
        })
    }

    fn build_tap_ctx(&self, field_value: &syn::Ident) -> Option<syn::Stmt> {
        if !self.build_ctx {
            return None;
        }
        Some(parse_quote! {
            let __ctx = epan::tap::Context {
                field: #field_value.clone(),
                fields: &__cx.pinfo.fields,
                pinfo: &__cx.pinfo,
                tvb: __args.tvb,
                offset: __offset,
            };
        })
    }

    fn call_taps(&self) -> Vec<syn::Stmt> {
        self.taps
            .iter()
            .map(|tap_fn| {
                parse_quote! {
                    epan::tap::handle_tap(&__ctx, #tap_fn);
                }
            })
            .collect()
    }

    fn hide_field(&self) -> Option<syn::Stmt> {
        if !self.hide {
            return None;
        }
        Some(parse_quote! {
            {
                let __item = __cx.tree.last_child(__parent);
                __cx.tree.set_hidden(__item);
            }
        })
    }

    fn exec_add_strategy(&self) -> Vec<syn::Stmt> {
        let ty = &self.meta.ty;

        match &self.add_strategy {
            AddStrategy::Subdissect(subd) => self.try_subdissector(subd),
            AddStrategy::DecodeWith(decode_fn) => parse_quote! {
                let __s = epan::tap::handle_decode_with(&__ctx, #decode_fn);
                let __nr_bytes =
                    <#ty as epan::Primitive>::add_to_tree_format_value(&__args_next, __cx, &__s)?;
            },
            AddStrategy::Default => parse_quote! {
                let __nr_bytes = <#ty as epan::Dissect>::add_to_tree(&__args_next, __cx)?;
            },
        }
    }

    fn try_subdissector(&self, subd: &Subdissector) -> Vec<syn::Stmt> {
        let ty = &self.meta.ty;

        // When the size of the next protocol's bytes is given explicitly, the next layer is parked
        // under the current protocol's subtree. Otherwise it is added next to it, which is where
        // lower layers usually put their payload.
        let tree_next: syn::Expr = if self.meta.options.size_hint.is_some() {
            parse_quote! { __parent }
        } else {
            parse_quote! { __args.proto_root }
        };

        let found: syn::Expr = match subd {
            Subdissector::DecodeAs(table_name) => parse_quote! {
                epan::SubdissectorKey::try_subdissector(
                    &(),
                    __cx,
                    #table_name,
                    &__tvb_next,
                    __tree_next,
                )?
            },
            Subdissector::Table { table_name, fields } => {
                // There might be multiple fields to try, e.g. for UDP, the destination port and
                // the source port. They are tried in order until one has a dissector.
                let tries = fields.iter().map(|field| -> syn::Expr {
                    let key = field_var(field);
                    parse_quote! {
                        epan::SubdissectorKey::try_subdissector(
                            &#key,
                            __cx,
                            #table_name,
                            &__tvb_next,
                            __tree_next,
                        )?
                    }
                });
                parse_quote! { false #(|| #tries)* }
            }
        };

        parse_quote! {
            let __tvb_next = <#ty as epan::Subdissect>::setup_tvb_next(&__args_next)?;
            let __tree_next = #tree_next;
            if !(#found) {
                __cx.call_data(&__tvb_next, __tree_next)?;
            }
            let __nr_bytes = __tvb_next.reported_length();
        }
    }
}

/// Bindings made by `proto_reg_handoff`.
pub(crate) fn handoff_body(decode_from: &[DecodeFrom], proto_filter: &str) -> proc_macro2::TokenStream {
    if decode_from.is_empty() {
        return quote! {};
    }
    let add_dissector = decode_from.iter().map(DecodeFrom::to_tokens);
    quote! {
        let std::option::Option::Some(__handle) = __builder.find_dissector(#proto_filter) else {
            return;
        };
        #(#add_dissector)*
    }
}

use once_cell::sync::Lazy;
use quote::format_ident;
use regex::Regex;
use syn::spanned::Spanned;

pub(crate) fn make_err<T>(tok: &impl Spanned, msg: &str) -> Result<T, syn::Error> {
    Err(syn::Error::new(tok.span(), msg))
}

fn literal<'a, T>(
    expr: &'a syn::Expr,
    pick: impl FnOnce(&'a syn::Lit) -> Option<&'a T>,
    msg: &str,
) -> syn::Result<&'a T> {
    let lit = match expr {
        syn::Expr::Lit(syn::ExprLit { lit, .. }) => pick(lit),
        _ => None,
    };
    lit.ok_or_else(|| syn::Error::new(expr.span(), msg))
}

/// The string literal on the right of `name = "..."`.
pub(crate) fn lit_str(expr: &syn::Expr) -> syn::Result<&syn::LitStr> {
    literal(
        expr,
        |lit| match lit {
            syn::Lit::Str(s) => Some(s),
            _ => None,
        },
        "expected a string literal",
    )
}

pub(crate) fn lit_int(expr: &syn::Expr) -> syn::Result<&syn::LitInt> {
    literal(
        expr,
        |lit| match lit {
            syn::Lit::Int(i) => Some(i),
            _ => None,
        },
        "expected an integer literal",
    )
}

pub(crate) fn lit_bool(expr: &syn::Expr) -> syn::Result<&syn::LitBool> {
    literal(
        expr,
        |lit| match lit {
            syn::Lit::Bool(b) => Some(b),
            _ => None,
        },
        "expected a boolean literal",
    )
}

/// Parses `"a"` or `["a", "b"]` into one `T` per string, e.g. the paths of tap functions.
pub(crate) fn parse_str_list<T: syn::parse::Parse>(expr: &syn::Expr) -> syn::Result<Vec<T>> {
    expr_items(expr)
        .into_iter()
        .map(|item| lit_str(item)?.parse::<T>())
        .collect()
}

/// The elements of an array, tuple or parenthesized expression. Anything else is a list of one.
pub(crate) fn expr_items(expr: &syn::Expr) -> Vec<&syn::Expr> {
    match expr {
        syn::Expr::Array(arr) => arr.elems.iter().collect(),
        syn::Expr::Tuple(tup) => tup.elems.iter().collect(),
        syn::Expr::Paren(inner) => vec![&*inner.expr],
        _ => vec![expr],
    }
}

/// Name of the local variable holding the decoded value of a field.
pub(crate) fn field_var(field: &impl std::fmt::Display) -> syn::Ident {
    format_ident!("__{}", field.to_string())
}

static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("word boundary pattern is valid"));
static SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

fn snake_case(name: &str) -> String {
    let split = WORD_BOUNDARY.replace_all(name, "${1}_${2}");
    SPACES.replace_all(&split, "_").to_lowercase()
}

fn title_case(name: &str) -> String {
    snake_case(name)
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Default names derived from Rust identifiers: `MoldUdp64` is filtered as `mold_udp64` and
/// shown as `MOLD UDP64`, a field `src_port` is labelled `Src Port`.
pub(crate) trait CaseConvert {
    fn to_snake_case(&self) -> String;
    fn to_title_case(&self) -> String;
    fn to_upper_words(&self) -> String {
        self.to_title_case().to_uppercase()
    }
}

impl<T: ToString> CaseConvert for T {
    fn to_snake_case(&self) -> String {
        snake_case(&self.to_string())
    }

    fn to_title_case(&self) -> String {
        title_case(&self.to_string())
    }
}

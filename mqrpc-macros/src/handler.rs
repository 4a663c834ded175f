//! `#[handler]` expansion
//!
//! Input:
//! ```ignore
//! #[handler]
//! async fn add(a: i64, b: i64) -> Result<i64> {
//!     Ok(a + b)
//! }
//! ```
//!
//! Output:
//! ```ignore
//! fn add() -> Box<dyn ::mqrpc_server::Handler> {
//!     async fn inner_handler(a: i64, b: i64) -> Result<i64> {
//!         Ok(a + b)
//!     }
//!     ::mqrpc_server::from_typed_fn(|(__arg0, __arg1,): (i64, i64,)| {
//!         inner_handler(__arg0, __arg1)
//!     })
//! }
//! ```
//!
//! A function without arguments ignores whatever params the request carries.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, ReturnType};

pub fn handler_impl(input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);

    match expand(input_fn) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input_fn: ItemFn) -> syn::Result<TokenStream2> {
    let sig = &input_fn.sig;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new(
            sig.fn_token.span(),
            "#[handler] requires an async fn",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "#[handler] functions cannot be generic",
        ));
    }
    let return_type = match &sig.output {
        ReturnType::Type(_, ty) => ty,
        ReturnType::Default => {
            return Err(syn::Error::new(
                Span::call_site(),
                "#[handler] functions must return mqrpc_core::Result<T>",
            ))
        }
    };

    let mut pats = Vec::new();
    let mut types = Vec::new();
    for arg in &sig.inputs {
        match arg {
            FnArg::Typed(pat_type) => {
                pats.push(&pat_type.pat);
                types.push(&pat_type.ty);
            }
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "#[handler] cannot be used on methods",
                ))
            }
        }
    }

    let fn_name = &sig.ident;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let fn_block = &input_fn.block;

    let factory = if types.is_empty() {
        quote! {
            ::mqrpc_server::from_typed_fn(|_: ::mqrpc_server::__private::IgnoredAny| {
                inner_handler()
            })
        }
    } else {
        let idents: Vec<_> = (0..types.len()).map(|i| format_ident!("__arg{}", i)).collect();
        quote! {
            ::mqrpc_server::from_typed_fn(|(#(#idents,)*): (#(#types,)*)| {
                inner_handler(#(#idents),*)
            })
        }
    };

    Ok(quote! {
        #(#fn_attrs)*
        #fn_vis fn #fn_name() -> ::std::boxed::Box<dyn ::mqrpc_server::Handler> {
            async fn inner_handler(#(#pats: #types),*) -> #return_type #fn_block

            #factory
        }
    })
}

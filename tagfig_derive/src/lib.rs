//! Derive macro for `tagfig::Tagged`.
//!
//! Each named field becomes a static `FieldDescriptor` holding its
//! `#[tagfig(...)]` annotations, plus a `Slot` chosen from the field's type:
//!
//! | type | slot |
//! |---|---|
//! | `String`, integers, floats, `bool` | `primitive` |
//! | `Option<P>` | `optional_primitive` |
//! | `Vec<P>` | `primitive_list` |
//! | `S` / `Box<S>`, marked `nested` | `nested` |
//! | `Option<S>` / `Option<Box<S>>`, marked `nested` | `optional_nested` |
//! | `Vec<S>` / `Vec<Box<S>>`, marked `nested` | `nested_list` |
//! | anything else | `unsupported` |
//!
//! Types are classified by their spelling, so aliases of primitive types are
//! treated as unsupported.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod generate;
mod parse;

#[proc_macro_derive(Tagged, attributes(tagfig))]
pub fn derive_tagged(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match parse::parse_input(&input) {
        Ok(fields) => generate::tagged_impl(&input, &fields).into(),
        Err(err) => err.to_compile_error().into(),
    }
}

//! `#[derive(FuzzerSession)]` for types wrapping a `jsfuzz::fuzzer::FuzzingSession`.
//!
//! The session field is, in order of preference: the field marked
//! `#[session]`, the only field whose type is named `FuzzingSession`, the
//! field named `session`, or the single field of a newtype.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Field, Fields, Index, Member, Type, parse_macro_input};

#[proc_macro_derive(FuzzerSession, attributes(session))]
pub fn derive_fuzzer_session(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FuzzerSession can only be derived for structs",
        ));
    };
    let member = session_member(&input.ident, &data.fields)?;

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics AsRef<jsfuzz::fuzzer::FuzzingSession> for #name #ty_generics #where_clause {
            fn as_ref(&self) -> &jsfuzz::fuzzer::FuzzingSession {
                &self.#member
            }
        }

        impl #impl_generics AsMut<jsfuzz::fuzzer::FuzzingSession> for #name #ty_generics #where_clause {
            fn as_mut(&mut self) -> &mut jsfuzz::fuzzer::FuzzingSession {
                &mut self.#member
            }
        }
    })
}

fn session_member(name: &syn::Ident, fields: &Fields) -> syn::Result<Member> {
    let fields: Vec<(Member, &Field)> = match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|field| field.ident.clone().map(|ident| (Member::Named(ident), field)))
            .collect(),
        Fields::Unnamed(unnamed) => unnamed
            .unnamed
            .iter()
            .enumerate()
            .map(|(index, field)| {
                let index = Index {
                    index: index as u32,
                    span: field.span(),
                };
                (Member::Unnamed(index), field)
            })
            .collect(),
        Fields::Unit => {
            return Err(syn::Error::new_spanned(name, "FuzzerSession cannot be derived for unit structs"));
        }
    };

    let marked: Vec<&(Member, &Field)> = fields
        .iter()
        .filter(|(_, field)| field.attrs.iter().any(|attr| attr.path().is_ident("session")))
        .collect();
    match marked.as_slice() {
        [(member, _)] => return Ok(member.clone()),
        [_, second, ..] => {
            return Err(syn::Error::new_spanned(second.1, "only one field can be marked #[session]"));
        }
        [] => {}
    }

    let typed: Vec<&(Member, &Field)> = fields.iter().filter(|(_, field)| is_session_type(&field.ty)).collect();
    if let [(member, _)] = typed.as_slice() {
        return Ok(member.clone());
    }

    let by_name = fields
        .iter()
        .find(|(member, _)| matches!(member, Member::Named(ident) if ident == "session"));
    if let Some((member, _)) = by_name {
        return Ok(member.clone());
    }

    if let [(member, _)] = fields.as_slice() {
        return Ok(member.clone());
    }

    Err(syn::Error::new_spanned(
        name,
        "cannot tell which field holds the FuzzingSession: mark it with #[session]",
    ))
}

fn is_session_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "FuzzingSession"),
        _ => false,
    }
}

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub fn derive_trait(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let struct_name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    // Use ::apparatus::ecs::Trait which works both inside and outside the crate.
    // Inside the crate, this works because of `extern crate self as apparatus;` in lib.rs
    TokenStream::from(quote! {
        impl #impl_generics ::apparatus::ecs::Trait for #struct_name #ty_generics #where_clause {
        }
    })
}

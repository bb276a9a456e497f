use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Path, parse_macro_input};

/// Derive `Detail`, optionally naming the base detail class:
///
/// ```ignore
/// #[derive(Detail)]
/// #[detail(base = Steering)]
/// struct Flocking { .. }
/// ```
pub fn derive_detail(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let struct_name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let mut base: Option<Path> = None;
    for attr in ast.attrs.iter().filter(|attr| attr.path().is_ident("detail")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("base") {
                base = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported detail attribute, expected `base = Path`"))
            }
        });
        if let Err(err) = parsed {
            return err.to_compile_error().into();
        }
    }

    let base = match base {
        Some(path) => quote! { #path },
        None => quote! { () },
    };

    TokenStream::from(quote! {
        impl #impl_generics ::apparatus::ecs::Detail for #struct_name #ty_generics #where_clause {
            type Base = #base;
        }
    })
}

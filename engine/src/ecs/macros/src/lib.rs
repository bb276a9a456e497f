mod detail;
mod subject_trait;

use proc_macro::TokenStream;

#[proc_macro_derive(Trait)]
pub fn derive_trait(item: TokenStream) -> TokenStream {
    subject_trait::derive_trait(item)
}

#[proc_macro_derive(Detail, attributes(detail))]
pub fn derive_detail(item: TokenStream) -> TokenStream {
    detail::derive_detail(item)
}

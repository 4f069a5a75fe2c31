extern crate proc_macro2;
extern crate quote;
extern crate syn;
extern crate synstructure;

use quote::quote;
use synstructure::{decl_derive, AddBounds, Structure};

decl_derive! {
    [HostMark, attributes(cinder_gc)] =>
    /// Derive `HostMark` for a host `CData` payload that embeds further GC
    /// references.
    derive_host_mark
}

/// Derives `HostMark`, mirroring the field-at-a-time dispatch the teacher's
/// `Trace` derive uses: each field recurses through `HostMark::mark_fields`
/// rather than needing the macro to know which fields hold an `ObjRef`.
/// Fields tagged `#[cinder_gc(skip)]` (opaque payload pointers, refcount
/// cells, anything the GC must not walk) are left out of the match body
/// entirely, the same way `unsafe_ignore_trace` drops a binding.
fn derive_host_mark(mut s: Structure<'_>) -> proc_macro2::TokenStream {
    s.filter(|bi| {
        !bi.ast()
            .attrs
            .iter()
            .any(|attr| attr.path().is_ident("cinder_gc") && attr_is_skip(attr))
    });

    s.add_bounds(AddBounds::Fields);
    let mark_body = s.each(|bi| quote!(::cinder_gc::HostMark::mark_fields(#bi, mark)));

    s.bound_impl(
        quote!(::cinder_gc::HostMark),
        quote! {
            fn mark_fields(&self, mark: &mut dyn FnMut(::cinder_gc::ObjRef)) {
                match *self { #mark_body }
            }
        },
    )
}

fn attr_is_skip(attr: &syn::Attribute) -> bool {
    let mut skip = false;
    let _ = attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("skip") {
            skip = true;
        }
        Ok(())
    });
    skip
}

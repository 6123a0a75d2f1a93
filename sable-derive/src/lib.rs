//! Derive macros for [sable](https://crates.io/crates/sable).
//!
//! `#[derive(GpuStruct)]` turns a Rust struct with named fields into a shading type. For a struct `Light`, it
//! generates:
//!
//! - an implementation of `ToType`, describing the struct and its fields in declaration order;
//! - a `LightFields` struct, with the same visibility as `Light`, holding one `Field` token per field;
//! - an implementation of `GpuStruct`, whose `fields()` returns the tokens.
//!
//! Fields accept the `#[gpu(relaxed_precision)]` attribute.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned as _, Data, DeriveInput, Field, Fields};

#[proc_macro_derive(GpuStruct, attributes(gpu))]
pub fn derive_gpu_struct(input: TokenStream) -> TokenStream {
  let input = parse_macro_input!(input as DeriveInput);

  match gpu_struct(&input) {
    Ok(tokens) => tokens.into(),
    Err(err) => err.to_compile_error().into(),
  }
}

/// Per-field attributes.
#[derive(Debug, Default)]
struct FieldAttrs {
  relaxed_precision: bool,
}

impl FieldAttrs {
  fn parse(field: &Field) -> Result<Self, syn::Error> {
    let mut attrs = FieldAttrs::default();

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("gpu")) {
      attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("relaxed_precision") {
          attrs.relaxed_precision = true;
          Ok(())
        } else {
          Err(meta.error("unknown gpu attribute; expected `relaxed_precision`"))
        }
      })?;
    }

    Ok(attrs)
  }

  fn flags(&self) -> proc_macro2::TokenStream {
    if self.relaxed_precision {
      quote! { ::sable::field::FieldFlags::RELAXED_PRECISION }
    } else {
      quote! { ::sable::field::FieldFlags::empty() }
    }
  }
}

fn gpu_struct(input: &DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
  let ident = &input.ident;
  let vis = &input.vis;

  if !input.generics.params.is_empty() {
    return Err(syn::Error::new(
      input.generics.span(),
      "GpuStruct cannot be derived for generic structs",
    ));
  }

  let fields = match &input.data {
    Data::Struct(st) => match &st.fields {
      Fields::Named(fields) if !fields.named.is_empty() => &fields.named,
      Fields::Named(_) | Fields::Unit => {
        return Err(syn::Error::new(ident.span(), "GpuStruct needs at least one field"))
      }
      Fields::Unnamed(fields) => {
        return Err(syn::Error::new(fields.span(), "GpuStruct needs named fields"))
      }
    },
    Data::Enum(e) => return Err(syn::Error::new(e.enum_token.span, "GpuStruct can only be derived for structs")),
    Data::Union(u) => return Err(syn::Error::new(u.union_token.span, "GpuStruct can only be derived for structs")),
  };

  let fields_ident = format_ident!("{}Fields", ident);
  let name = ident.to_string();

  let mut struct_fields = Vec::new();
  let mut field_decls = Vec::new();
  let mut field_tokens = Vec::new();

  for (index, field) in fields.iter().enumerate() {
    let attrs = FieldAttrs::parse(field)?;
    let flags = attrs.flags();
    let ty = &field.ty;
    let index = index as u32;

    // named fields always have an ident
    let Some(field_ident) = &field.ident else {
      return Err(syn::Error::new(field.span(), "GpuStruct needs named fields"));
    };
    let field_name = field_ident.to_string();

    struct_fields.push(quote! {
      ::sable::types::StructField::new(#field_name, <#ty as ::sable::types::ToType>::ty()).with_flags(#flags)
    });

    field_decls.push(quote! {
      pub #field_ident: ::sable::field::Field<#ident, #ty>
    });

    field_tokens.push(quote! {
      #field_ident: ::sable::field::Field::new(#index, #field_name, #flags)
    });
  }

  let fields_doc = format!("Field tokens of [`{}`].", name);

  Ok(quote! {
    impl ::sable::types::ToType for #ident {
      fn ty() -> ::sable::types::Type {
        ::sable::types::Type::Struct(::std::rc::Rc::new(::sable::types::StructType {
          name: #name.to_owned(),
          fields: ::std::vec![#(#struct_fields),*],
        }))
      }
    }

    #[doc = #fields_doc]
    #[derive(Clone, Copy, Debug)]
    #vis struct #fields_ident {
      #(#field_decls),*
    }

    impl ::sable::types::GpuStruct for #ident {
      type Fields = #fields_ident;

      fn fields() -> Self::Fields {
        #fields_ident {
          #(#field_tokens),*
        }
      }
    }
  })
}

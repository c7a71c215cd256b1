//! Emitting the `Tagged` impl.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_quote};

use crate::parse::{ParsedField, Shape};

fn descriptor(field: &ParsedField) -> TokenStream {
    let name = &field.name;
    let exported = field.exported;
    let a = &field.attrs;
    let (env, default, test) = (&a.env, &a.default, &a.test);
    let (flag, cflag, cmd) = (&a.flag, &a.cflag, &a.cmd);
    let (usage, conf) = (&a.usage, &a.conf);
    quote! {
        ::tagfig::FieldDescriptor {
            name: #name,
            exported: #exported,
            env: #env,
            default: #default,
            test: #test,
            flag: #flag,
            cflag: #cflag,
            cmd: #cmd,
            usage: #usage,
            conf: #conf,
        }
    }
}

fn slot(field: &ParsedField) -> TokenStream {
    let ident = &field.ident;
    let ctor = match field.shape {
        Shape::Primitive => quote!(primitive),
        Shape::OptionalPrimitive => quote!(optional_primitive),
        Shape::Struct => quote!(nested),
        Shape::OptionalStruct => quote!(optional_nested),
        Shape::PrimitiveList => quote!(primitive_list),
        Shape::StructList => quote!(nested_list),
        Shape::Unsupported => quote!(unsupported),
    };
    quote!(::tagfig::Slot::#ctor(&mut self.#ident))
}

pub(crate) fn tagged_impl(input: &DeriveInput, fields: &[ParsedField]) -> TokenStream {
    let ident = &input.ident;
    // `Tagged: Any`, so every type parameter has to be 'static
    let mut generics = input.generics.clone();
    let params: Vec<_> = generics.type_params().map(|p| p.ident.clone()).collect();
    let predicates = &mut generics.make_where_clause().predicates;
    for param in params {
        predicates.push(parse_quote!(#param: 'static));
    }
    let (impl_generics, _, where_clause) = generics.split_for_impl();
    let (_, ty_generics, _) = input.generics.split_for_impl();
    let len = fields.len();
    let descriptors = fields.iter().map(descriptor);
    let entries = fields.iter().enumerate().map(|(i, field)| {
        let slot = slot(field);
        quote!(::tagfig::Field::new(&__TAGFIG_FIELDS[#i], #slot))
    });

    quote! {
        impl #impl_generics ::tagfig::Tagged for #ident #ty_generics #where_clause {
            fn fields(&mut self) -> ::std::vec::Vec<::tagfig::Field<'_>> {
                static __TAGFIG_FIELDS: [::tagfig::FieldDescriptor; #len] = [#(#descriptors),*];
                ::std::vec![#(#entries),*]
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_input;

    fn expand(input: DeriveInput) -> String {
        let fields = parse_input(&input).unwrap();
        tagged_impl(&input, &fields).to_string()
    }

    #[test]
    fn slots_follow_shapes() {
        let out = expand(parse_quote! {
            struct Demo {
                pub port: u16,
                pub timeout: Option<u64>,
                #[tagfig(nested)]
                pub inner: Option<Inner>,
                pub hosts: Vec<String>,
                pub elapsed: Duration,
            }
        });
        assert!(out.contains("Slot :: primitive (& mut self . port)"), "{out}");
        assert!(out.contains("Slot :: optional_primitive (& mut self . timeout)"));
        assert!(out.contains("Slot :: optional_nested (& mut self . inner)"));
        assert!(out.contains("Slot :: primitive_list (& mut self . hosts)"));
        assert!(out.contains("Slot :: unsupported (& mut self . elapsed)"));
        assert!(out.contains("[:: tagfig :: FieldDescriptor ; 5usize]"));
    }

    #[test]
    fn descriptor_carries_annotations() {
        let out = expand(parse_quote! {
            struct Demo {
                #[tagfig(env = "PORT", default = "80")]
                pub port: u16,
            }
        });
        assert!(out.contains("name : \"port\""), "{out}");
        assert!(out.contains("exported : true"));
        assert!(out.contains("env : \"PORT\""));
        assert!(out.contains("default : \"80\""));
        assert!(out.contains("test : \"\""));
    }

    #[test]
    fn generics_are_forwarded() {
        let out = expand(parse_quote! {
            struct Demo<T: Default> where T: Clone {
                #[tagfig(nested)]
                pub inner: T,
            }
        });
        assert!(out.contains("Tagged for Demo < T >"), "{out}");
        assert!(out.contains("where T : Clone , T : 'static"), "{out}");
    }

    #[test]
    fn plain_struct_gets_no_where_clause() {
        let out = expand(parse_quote! {
            struct Demo {
                pub port: u16,
            }
        });
        assert!(!out.contains("'static"), "{out}");
    }
}

//! Reading `#[tagfig(...)]` attributes and classifying field types.

use syn::ext::IdentExt;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, LitStr, PathArguments, Type, Visibility,
};

/// Annotation strings of one field. Missing keys stay empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct FieldAttrs {
    pub env: String,
    pub default: String,
    pub test: String,
    pub flag: String,
    pub cflag: String,
    pub cmd: String,
    pub usage: String,
    pub conf: String,
    pub nested: bool,
}

/// How the engine reaches the field; one variant per `Slot` constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Primitive,
    OptionalPrimitive,
    Struct,
    OptionalStruct,
    PrimitiveList,
    StructList,
    Unsupported,
}

pub(crate) struct ParsedField {
    pub ident: syn::Ident,
    /// Field name with any `r#` prefix removed.
    pub name: String,
    pub exported: bool,
    pub attrs: FieldAttrs,
    pub shape: Shape,
}

const PRIMITIVES: &[&str] = &[
    "String", "bool", "i8", "i16", "i32", "i64", "isize", "u8", "u16", "u32", "u64", "usize",
    "f32", "f64",
];

fn set_once(
    meta: &syn::meta::ParseNestedMeta,
    key: &str,
    slot: &mut String,
) -> Result<(), syn::Error> {
    let lit: LitStr = meta.value()?.parse()?;
    if !slot.is_empty() {
        return Err(meta.error(format!("duplicate tagfig key `{key}`")));
    }
    *slot = lit.value();
    Ok(())
}

pub(crate) fn parse_field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs, syn::Error> {
    let mut out = FieldAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("tagfig")) {
        attr.parse_nested_meta(|meta| {
            let Some(key) = meta.path.get_ident().map(|i| i.to_string()) else {
                return Err(meta.error("expected a tagfig key"));
            };
            match key.as_str() {
                "env" => set_once(&meta, "env", &mut out.env),
                "default" => set_once(&meta, "default", &mut out.default),
                "test" => set_once(&meta, "test", &mut out.test),
                "flag" => set_once(&meta, "flag", &mut out.flag),
                "cflag" => set_once(&meta, "cflag", &mut out.cflag),
                "cmd" => set_once(&meta, "cmd", &mut out.cmd),
                "usage" => set_once(&meta, "usage", &mut out.usage),
                "conf" => set_once(&meta, "conf", &mut out.conf),
                "nested" => {
                    out.nested = true;
                    Ok(())
                }
                other => Err(meta.error(format!(
                    "unknown tagfig key `{other}`; expected one of env, default, test, flag, \
                     cflag, cmd, usage, conf, nested"
                ))),
            }
        })?;
    }
    Ok(out)
}

/// The generic argument of `ty` when its last path segment is `wrapper`.
/// Matches `Option<T>` as well as `std::option::Option<T>`.
fn type_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(p) = ty else {
        return None;
    };
    if p.qself.is_some() {
        return None;
    }
    let last = p.path.segments.last()?;
    if last.ident != wrapper {
        return None;
    }
    match &last.arguments {
        PathArguments::AngleBracketed(args) => args.args.first().and_then(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

pub(crate) fn option_inner(ty: &Type) -> Option<&Type> {
    type_inner(ty, "Option")
}

pub(crate) fn vec_inner(ty: &Type) -> Option<&Type> {
    type_inner(ty, "Vec")
}

pub(crate) fn is_primitive(ty: &Type) -> bool {
    let Type::Path(p) = ty else {
        return false;
    };
    if p.qself.is_some() {
        return false;
    }
    p.path.segments.last().is_some_and(|last| {
        matches!(last.arguments, PathArguments::None)
            && PRIMITIVES.iter().any(|name| last.ident == name)
    })
}

/// Classify by syntax alone. Struct shapes need `nested`; without it any
/// non-primitive type is unsupported.
pub(crate) fn classify(ty: &Type, nested: bool) -> Shape {
    if is_primitive(ty) {
        return Shape::Primitive;
    }
    if let Some(inner) = option_inner(ty) {
        return if is_primitive(inner) {
            Shape::OptionalPrimitive
        } else if nested {
            Shape::OptionalStruct
        } else {
            Shape::Unsupported
        };
    }
    if let Some(inner) = vec_inner(ty) {
        return if is_primitive(inner) {
            Shape::PrimitiveList
        } else if nested {
            Shape::StructList
        } else {
            Shape::Unsupported
        };
    }
    if nested {
        Shape::Struct
    } else {
        Shape::Unsupported
    }
}

fn parse_field(field: &syn::Field) -> Result<ParsedField, syn::Error> {
    let Some(ident) = field.ident.clone() else {
        return Err(syn::Error::new_spanned(field, "Tagged requires named fields"));
    };
    let attrs = parse_field_attrs(&field.attrs)?;
    let shape = classify(&field.ty, attrs.nested);
    if attrs.nested
        && matches!(
            shape,
            Shape::Primitive | Shape::OptionalPrimitive | Shape::PrimitiveList
        )
    {
        return Err(syn::Error::new_spanned(
            &field.ty,
            "`nested` is only valid on struct fields",
        ));
    }
    Ok(ParsedField {
        name: ident.unraw().to_string(),
        ident,
        exported: matches!(field.vis, Visibility::Public(_)),
        attrs,
        shape,
    })
}

/// Every named field of the struct, in declaration order. Enums, unions,
/// tuple and unit structs are rejected, as are lifetime parameters.
pub(crate) fn parse_input(input: &DeriveInput) -> Result<Vec<ParsedField>, syn::Error> {
    if let Some(lifetime) = input.generics.lifetimes().next() {
        return Err(syn::Error::new_spanned(
            lifetime,
            "Tagged requires a 'static type; lifetime parameters are not supported",
        ));
    }
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    data.struct_token,
                    "Tagged requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Tagged can only be derived for structs",
            ));
        }
    };
    fields.iter().map(parse_field).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use syn::parse_quote;

    #[test]
    fn parses_every_key() {
        let input: DeriveInput = parse_quote! {
            struct Demo {
                #[tagfig(env = "PORT", default = "80", test = "<100", flag = "port,p")]
                #[tagfig(usage = "listen port", conf = "skipzero")]
                #[serde(default)]
                pub port: u16,
                #[tagfig(cflag = "debug,d", cmd = "root,persistent")]
                debug: bool,
            }
        };
        let fields = parse_input(&input).unwrap();
        assert_eq!(fields.len(), 2);

        let port = &fields[0];
        assert_eq!(port.name, "port");
        assert!(port.exported);
        assert_eq!(port.attrs.env, "PORT");
        assert_eq!(port.attrs.default, "80");
        assert_eq!(port.attrs.test, "<100");
        assert_eq!(port.attrs.flag, "port,p");
        assert_eq!(port.attrs.usage, "listen port");
        assert_eq!(port.attrs.conf, "skipzero");
        assert_eq!(port.shape, Shape::Primitive);

        let debug = &fields[1];
        assert!(!debug.exported);
        assert_eq!(debug.attrs.cflag, "debug,d");
        assert_eq!(debug.attrs.cmd, "root,persistent");
    }

    #[test]
    fn raw_identifiers_are_unprefixed() {
        let input: DeriveInput = parse_quote! {
            struct Demo {
                pub r#type: String,
            }
        };
        assert_eq!(parse_input(&input).unwrap()[0].name, "type");
    }

    #[test]
    fn pub_crate_is_not_exported() {
        let input: DeriveInput = parse_quote! {
            struct Demo {
                pub(crate) port: u16,
            }
        };
        assert!(!parse_input(&input).unwrap()[0].exported);
    }

    #[rstest]
    #[case(parse_quote!(struct Demo { #[tagfig(envv = "X")] pub a: u8 }), "unknown tagfig key")]
    #[case(parse_quote!(struct Demo { #[tagfig(env = "A", env = "B")] pub a: u8 }), "duplicate")]
    #[case(parse_quote!(struct Demo { #[tagfig(env = 3)] pub a: u8 }), "expected string literal")]
    #[case(parse_quote!(struct Demo { #[tagfig(nested)] pub a: u8 }), "only valid on struct")]
    #[case(parse_quote!(struct Demo(u8);), "named fields")]
    #[case(parse_quote!(enum Demo { A }), "only be derived for structs")]
    #[case(parse_quote!(struct Demo<'a> { pub name: &'a str }), "lifetime parameters")]
    fn rejects(#[case] input: DeriveInput, #[case] message: &str) {
        let err = parse_input(&input).err().unwrap();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[rstest]
    #[case(parse_quote!(u16), false, Shape::Primitive)]
    #[case(parse_quote!(std::string::String), false, Shape::Primitive)]
    #[case(parse_quote!(Option<i64>), false, Shape::OptionalPrimitive)]
    #[case(parse_quote!(std::option::Option<bool>), false, Shape::OptionalPrimitive)]
    #[case(parse_quote!(Option<Inner>), true, Shape::OptionalStruct)]
    #[case(parse_quote!(Option<Box<Inner>>), true, Shape::OptionalStruct)]
    #[case(parse_quote!(Option<Inner>), false, Shape::Unsupported)]
    #[case(parse_quote!(Vec<String>), false, Shape::PrimitiveList)]
    #[case(parse_quote!(Vec<Inner>), true, Shape::StructList)]
    #[case(parse_quote!(Vec<Box<Inner>>), true, Shape::StructList)]
    #[case(parse_quote!(Inner), true, Shape::Struct)]
    #[case(parse_quote!(Box<Inner>), true, Shape::Struct)]
    #[case(parse_quote!(Duration), false, Shape::Unsupported)]
    #[case(parse_quote!(HashMap<String, String>), false, Shape::Unsupported)]
    #[case(parse_quote!(Vec<Vec<u8>>), false, Shape::Unsupported)]
    #[case(parse_quote!(Option<Option<u8>>), false, Shape::Unsupported)]
    fn classifies(#[case] ty: Type, #[case] nested: bool, #[case] expected: Shape) {
        assert_eq!(classify(&ty, nested), expected);
    }

    #[rstest]
    #[case(parse_quote!(Option<u32>))]
    #[case(parse_quote!(std::option::Option<u32>))]
    #[case(parse_quote!(core::option::Option<u32>))]
    fn option_inner_matches_paths(#[case] ty: Type) {
        let expected: Type = parse_quote!(u32);
        assert_eq!(option_inner(&ty), Some(&expected));
    }
}

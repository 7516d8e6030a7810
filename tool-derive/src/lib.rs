use proc_macro::TokenStream;
use quote::quote;
use syn::{ Data, DeriveInput, Field, Fields, GenericArgument, Lit, PathArguments, Type, parse_macro_input };
use syn::spanned::Spanned;

/// Implements the #[derive(ToolParams)] macro
///
/// Generates `binance_mcp::registry::ToolParams` for a struct of tool
/// arguments, so the struct can back a typed tool:
///
/// ```ignore
/// use binance_mcp::ToolParams;
/// use serde::Deserialize;
///
/// #[derive(ToolParams, Deserialize)]
/// pub struct SymbolArgs {
///     #[param(description = "Ticker or coin name, e.g. BTCUSDT or bitcoin")]
///     symbol: String,
///
///     #[param(description = "Quote currency")]
///     quote: Option<String>,
/// }
///
/// let tool = ToolSpec::typed("get_price", "Get the price", |args: SymbolArgs| async move { ... });
/// ```
///
/// The macro will:
/// 1. Declare one parameter per named field, in field order
/// 2. Map the field type to a parameter type (`Option<T>` uses the type of `T`)
/// 3. Mark `Option<T>` fields optional and every other field required, unless
///    `#[param(required = ...)]` says otherwise
#[proc_macro_derive(ToolParams, attributes(param))]
pub fn derive_tool_params(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) =>
            match &data.fields {
                Fields::Named(fields) => &fields.named,
                Fields::Unit => {
                    return Ok(
                        quote! {
                        impl #impl_generics ::binance_mcp::registry::ToolParams for #struct_name #ty_generics #where_clause {
                            fn parameter_schema() -> ::binance_mcp::registry::ParameterSchema {
                                ::binance_mcp::registry::ParameterSchema::new()
                            }
                        }
                    }
                    );
                }
                Fields::Unnamed(_) => {
                    return Err(syn::Error::new(input.span(), "ToolParams requires named fields"));
                }
            }
        _ => {
            return Err(syn::Error::new(input.span(), "ToolParams can only be derived for structs"));
        }
    };

    let mut declarations = Vec::new();
    for field in fields {
        declarations.push(declare_parameter(field)?);
    }

    Ok(
        quote! {
        impl #impl_generics ::binance_mcp::registry::ToolParams for #struct_name #ty_generics #where_clause {
            fn parameter_schema() -> ::binance_mcp::registry::ParameterSchema {
                ::binance_mcp::registry::ParameterSchema::new()
                    #(#declarations)*
            }
        }
    }
    )
}

fn declare_parameter(field: &Field) -> syn::Result<proc_macro2::TokenStream> {
    let ident = field.ident.as_ref().ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;
    let name = ident.to_string().trim_start_matches("r#").to_string();

    let (inner, optional) = match option_inner(&field.ty) {
        Some(inner) => (inner, true),
        None => (&field.ty, false),
    };

    let mut description: Option<String> = None;
    let mut required = !optional;

    for attr in &field.attrs {
        if !attr.path().is_ident("param") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("description") {
                if let Lit::Str(s) = meta.value()?.parse::<Lit>()? {
                    description = Some(s.value());
                }
                Ok(())
            } else if meta.path.is_ident("required") {
                if let Lit::Bool(b) = meta.value()?.parse::<Lit>()? {
                    required = b.value();
                }
                Ok(())
            } else {
                Err(meta.error("unknown param attribute; expected `description` or `required`"))
            }
        })?;
    }

    let param_type = parameter_type(inner);
    let description = match description {
        Some(text) => quote! { ::std::option::Option::Some(#text) },
        None => quote! { ::std::option::Option::None },
    };

    Ok(
        quote! {
        .param(#name, ::binance_mcp::registry::ParamType::#param_type, #required, #description)
    }
    )
}

/// `T` when `ty` is `Option<T>`
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

// Helper function to determine the ParamType variant for a field type
fn parameter_type(ty: &Type) -> proc_macro2::TokenStream {
    let type_name = match ty {
        Type::Path(type_path) =>
            type_path.path.segments
                .last()
                .map(|s| s.ident.to_string())
                .unwrap_or_default(),
        Type::Reference(reference) => {
            return parameter_type(&reference.elem);
        }
        Type::Array(_) | Type::Slice(_) => {
            return quote! { Array };
        }
        _ => String::new(),
    };

    match type_name.as_str() {
        "String" | "str" | "char" => quote! { String },
        | "i8"
        | "i16"
        | "i32"
        | "i64"
        | "i128"
        | "isize"
        | "u8"
        | "u16"
        | "u32"
        | "u64"
        | "u128"
        | "usize" => quote! { Integer },
        "f32" | "f64" => quote! { Number },
        "bool" => quote! { Boolean },
        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => quote! { Array },
        "HashMap" | "BTreeMap" | "Map" => quote! { Object },
        // Value, enums and nested structs are left unchecked
        _ => quote! { Any },
    }
}

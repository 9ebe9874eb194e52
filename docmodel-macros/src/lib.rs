//! Procedural macros for the docmodel project.
//!
//! This crate provides `#[derive(Model)]`, which generates `Model::declare` from the
//! fields of a struct. Field types map to registry type names:
//!
//! | Rust type | Type name |
//! |-----------|-----------|
//! | `String`, `&str` | `string` |
//! | `bool` | `boolean` |
//! | `i8`, `i16`, `i32`, `u8`, `u16` | `integer` |
//! | `i64`, `u32`, `u64`, `isize`, `usize` | `long` |
//! | `f32`, `f64` | `number` |
//! | `ObjectId` | `objectId` |
//! | `DateTime` | `date` |
//! | `Bson` | `any` |
//! | `Document` | `object` |
//! | `Vec<T>` | array of `T` |
//! | `Option<T>` | optional `T` |
//! | anything else | nested model |
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "users", validation_level = "moderate")]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     #[index(unique)]
//!     pub email: String,
//!     #[field(default = 0)]
//!     pub logins: i32,
//!     #[relation(local_field = "_id", foreign_field = "author_id")]
//!     pub posts: Option<Vec<Post>>,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, Field, Fields, GenericArgument, LitBool, LitStr, PathArguments, Type,
    meta::ParseNestedMeta, parse_macro_input, spanned::Spanned,
};

const NAMED_FIELDS_ONLY: &str = "Model can only be derived for structs with named fields";

#[derive(Default)]
struct ModelAttrs {
    name: Option<LitStr>,
    collection: Option<LitStr>,
    database: Option<LitStr>,
    description: Option<LitStr>,
    additional_properties: bool,
    use_property_schemas: bool,
    validate: bool,
    validation_level: Option<TokenStream2>,
    validation_action: Option<TokenStream2>,
    sync: Option<TokenStream2>,
}

impl ModelAttrs {
    fn binds_collection(&self) -> bool {
        self.collection.is_some() || self.database.is_some() || self.validates()
    }

    fn validates(&self) -> bool {
        self.validate
            || self.validation_level.is_some()
            || self.validation_action.is_some()
            || self.sync.is_some()
    }
}

#[derive(Default)]
struct FieldAttrs {
    name: Option<String>,
    type_name: Option<LitStr>,
    required: Option<bool>,
    default: Option<Expr>,
    skip: bool,
}

struct RelationAttrs {
    kind: Option<LitStr>,
    target: Option<Type>,
    local_field: Option<LitStr>,
    foreign_field: Option<LitStr>,
}

#[derive(Default)]
struct IndexAttrs {
    unique: bool,
    direction: Option<Expr>,
    name: Option<LitStr>,
}

fn string_value(meta: &ParseNestedMeta) -> syn::Result<LitStr> {
    meta.value()?.parse::<LitStr>()
}

fn enum_variant(lit: &LitStr, ty: &str, variants: &[(&str, &str)]) -> syn::Result<TokenStream2> {
    let value = lit.value();
    let ty = syn::Ident::new(ty, lit.span());

    variants
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, variant)| {
            let variant = syn::Ident::new(variant, lit.span());
            quote! { ::docmodel::model::#ty::#variant }
        })
        .ok_or_else(|| syn::Error::new(lit.span(), format!("unknown {}: {}", ty, value)))
}

fn parse_model_attrs(input: &DeriveInput) -> syn::Result<ModelAttrs> {
    let mut attrs = ModelAttrs::default();

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                attrs.name = Some(string_value(&meta)?);
            } else if meta.path.is_ident("collection") {
                attrs.collection = Some(string_value(&meta)?);
            } else if meta.path.is_ident("database") {
                attrs.database = Some(string_value(&meta)?);
            } else if meta.path.is_ident("description") {
                attrs.description = Some(string_value(&meta)?);
            } else if meta.path.is_ident("additional_properties") {
                attrs.additional_properties = true;
            } else if meta.path.is_ident("use_property_schemas") {
                attrs.use_property_schemas = true;
            } else if meta.path.is_ident("validate") {
                attrs.validate = true;
            } else if meta.path.is_ident("validation_level") {
                attrs.validation_level = Some(enum_variant(
                    &string_value(&meta)?,
                    "ValidationLevel",
                    &[("off", "Off"), ("strict", "Strict"), ("moderate", "Moderate")],
                )?);
            } else if meta.path.is_ident("validation_action") {
                attrs.validation_action = Some(enum_variant(
                    &string_value(&meta)?,
                    "ValidationAction",
                    &[("error", "Error"), ("warn", "Warn")],
                )?);
            } else if meta.path.is_ident("sync") {
                attrs.sync = Some(enum_variant(
                    &string_value(&meta)?,
                    "SyncStrategy",
                    &[
                        ("never", "Never"),
                        ("if_not_exists", "IfNotExists"),
                        ("override", "Override"),
                    ],
                )?);
            } else {
                return Err(meta.error("unsupported model attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

/// The serialized name serde uses for a field, if renamed.
fn serde_rename(field: &Field) -> syn::Result<Option<String>> {
    let mut rename = None;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(syn::Token![=]) {
                rename = Some(string_value(&meta)?.value());
            } else if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                meta.parse_nested_meta(|nested| {
                    if nested.input.peek(syn::Token![=]) {
                        nested.value()?.parse::<Expr>()?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
    }

    Ok(rename)
}

fn parse_field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("field")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                attrs.name = Some(string_value(&meta)?.value());
            } else if meta.path.is_ident("type") {
                attrs.type_name = Some(string_value(&meta)?);
            } else if meta.path.is_ident("required") {
                attrs.required = Some(if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse::<LitBool>()?.value
                } else {
                    true
                });
            } else if meta.path.is_ident("default") {
                attrs.default = Some(meta.value()?.parse::<Expr>()?);
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
            } else {
                return Err(meta.error("unsupported field attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn parse_relation_attrs(field: &Field) -> syn::Result<Option<RelationAttrs>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("relation")) else {
        return Ok(None);
    };

    let mut attrs = RelationAttrs {
        kind: None,
        target: None,
        local_field: None,
        foreign_field: None,
    };

    if !matches!(attr.meta, syn::Meta::Path(_)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("kind") {
                attrs.kind = Some(string_value(&meta)?);
            } else if meta.path.is_ident("target") {
                attrs.target = Some(meta.value()?.parse::<Type>()?);
            } else if meta.path.is_ident("local_field") {
                attrs.local_field = Some(string_value(&meta)?);
            } else if meta.path.is_ident("foreign_field") {
                attrs.foreign_field = Some(string_value(&meta)?);
            } else {
                return Err(meta.error("unsupported relation attribute"));
            }
            Ok(())
        })?;
    }

    Ok(Some(attrs))
}

fn parse_index_attrs(field: &Field) -> syn::Result<Option<IndexAttrs>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("index")) else {
        return Ok(None);
    };

    let mut attrs = IndexAttrs::default();

    if !matches!(attr.meta, syn::Meta::Path(_)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("unique") {
                attrs.unique = true;
            } else if meta.path.is_ident("direction") {
                attrs.direction = Some(meta.value()?.parse::<Expr>()?);
            } else if meta.path.is_ident("name") {
                attrs.name = Some(string_value(&meta)?);
            } else {
                return Err(meta.error("unsupported index attribute"));
            }
            Ok(())
        })?;
    }

    Ok(Some(attrs))
}

/// The single generic argument of a wrapper such as `Option<T>` or `Vec<T>`.
fn wrapped<'t>(ty: &'t Type, wrapper: &str) -> Option<&'t Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };

    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn type_name(ty: &Type) -> Option<&'static str> {
    let ident = match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last()?.ident.to_string(),
        Type::Reference(reference) => return type_name(&reference.elem),
        _ => return None,
    };

    Some(match ident.as_str() {
        "String" | "str" => "string",
        "bool" => "boolean",
        "i8" | "i16" | "i32" | "u8" | "u16" => "integer",
        "i64" | "u32" | "u64" | "isize" | "usize" => "long",
        "f32" | "f64" => "number",
        "ObjectId" => "objectId",
        "DateTime" => "date",
        "Bson" => "any",
        "Document" => "object",
        _ => return None,
    })
}

/// `SimpleType` expression for a field type.
fn simple_type(ty: &Type) -> TokenStream2 {
    if let Some(inner) = wrapped(ty, "Option") {
        let inner = simple_type(inner);
        return quote! { #inner.optional() };
    }
    if let Some(inner) = wrapped(ty, "Vec") {
        let inner = simple_type(inner);
        return quote! { #inner.array() };
    }
    if let Some(inner) = wrapped(ty, "Box") {
        return simple_type(inner);
    }

    match type_name(ty) {
        Some(name) => quote! { ::docmodel::field::SimpleType::parse(#name) },
        None => quote! { ::docmodel::field::SimpleType::model::<#ty>() },
    }
}

/// The related model type and whether the property holds many of them.
fn relation_target(ty: &Type) -> (&Type, bool) {
    if let Some(inner) = wrapped(ty, "Option").or_else(|| wrapped(ty, "Box")) {
        return relation_target(inner);
    }
    match wrapped(ty, "Vec") {
        Some(inner) => (relation_target(inner).0, true),
        None => (ty, false),
    }
}

fn declare_field(field: &Field) -> syn::Result<TokenStream2> {
    let attrs = parse_field_attrs(field)?;
    if attrs.skip {
        return Ok(TokenStream2::new());
    }

    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new(field.span(), NAMED_FIELDS_ONLY))?;
    let property = match attrs.name {
        Some(name) => name,
        None => serde_rename(field)?.unwrap_or_else(|| ident.to_string()),
    };

    let mut statements = Vec::new();

    if let Some(relation) = parse_relation_attrs(field)? {
        let (inferred, many) = relation_target(&field.ty);
        let target = relation.target.as_ref().unwrap_or(inferred);
        let constructor = match relation.kind.as_ref().map(LitStr::value).as_deref() {
            Some("one_to_many" | "has_many") => quote! { one_to_many },
            Some("one_to_one" | "has_one" | "belongs_to") => quote! { one_to_one },
            Some(other) => {
                return Err(syn::Error::new(
                    relation.kind.span(),
                    format!("unknown relation kind: {}", other),
                ));
            }
            None if many => quote! { one_to_many },
            None => quote! { one_to_one },
        };
        let local_field = relation.local_field.map(|f| quote! { .local_field(#f) });
        let foreign_field = relation.foreign_field.map(|f| quote! { .foreign_field(#f) });

        statements.push(quote! {
            catalog.define_relation::<Self>(
                #property,
                ::docmodel::relation::RelationOptions::#constructor::<#target>()
                    #local_field
                    #foreign_field,
            )?;
        });
    } else {
        let simple_type = match &attrs.type_name {
            Some(name) => quote! { ::docmodel::field::SimpleType::parse(#name) },
            None => simple_type(&field.ty),
        };
        let required = attrs.required.map(|required| quote! { .required(#required) });
        let default = attrs.default.as_ref().map(|default| quote! { .default_value(#default) });

        statements.push(quote! {
            catalog.define_field::<Self>(
                #property,
                ::docmodel::field::FieldOptions::of(#simple_type)
                    #required
                    #default,
            )?;
        });
    }

    if let Some(index) = parse_index_attrs(field)? {
        let direction = index.direction.map(|direction| quote! { .spec(#direction) });
        let unique = index.unique.then(|| quote! { .unique() });
        let name = index.name.map(|name| quote! { .name(#name) });

        statements.push(quote! {
            catalog.define_index::<Self>(
                ::docmodel::index::IndexDeclaration::single(#property)
                    #direction
                    #unique
                    #name,
            )?;
        });
    }

    Ok(quote! { #(#statements)* })
}

fn expand_model(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "Model can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(input.span(), NAMED_FIELDS_ONLY));
    };

    let attrs = parse_model_attrs(input)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let name = attrs.name.as_ref().map(|name| quote! { .name(#name) });
    let description = attrs
        .description
        .as_ref()
        .map(|description| quote! { .description(#description) });
    let additional_properties = attrs
        .additional_properties
        .then(|| quote! { .additional_properties(true) });
    let use_property_schemas = attrs
        .use_property_schemas
        .then(|| quote! { .use_property_schemas(true) });

    let fields = fields
        .named
        .iter()
        .map(declare_field)
        .collect::<syn::Result<Vec<_>>>()?;

    let collection = attrs.binds_collection().then(|| {
        let collection_name = attrs.collection.as_ref().map(|name| quote! { .name(#name) });
        let database = attrs.database.as_ref().map(|database| quote! { .database(#database) });
        let validation = attrs.validates().then(|| {
            let level = attrs.validation_level.as_ref().map(|level| quote! { .level(#level) });
            let action = attrs.validation_action.as_ref().map(|action| quote! { .action(#action) });
            let sync = attrs.sync.as_ref().map(|sync| quote! { .sync(#sync) });

            quote! {
                .validation(
                    ::docmodel::model::ValidationPolicy::new()
                        #level
                        #action
                        #sync
                )
            }
        });

        quote! {
            catalog.define_collection::<Self>(
                ::docmodel::model::CollectionOptions::new()
                    #collection_name
                    #database
                    #validation,
            )?;
        }
    });

    Ok(quote! {
        impl #impl_generics ::docmodel::model::Model for #ident #ty_generics #where_clause {
            fn declare(
                catalog: &mut ::docmodel::catalog::Catalog,
            ) -> ::docmodel::error::DocModelResult<()> {
                catalog.define_schema::<Self>(
                    ::docmodel::model::ClassOptions::new()
                        #name
                        #description
                        #additional_properties
                        #use_property_schemas,
                )?;
                #(#fields)*
                #collection

                Ok(())
            }
        }
    })
}

/// Derives `Model` from the struct's fields.
///
/// Supported attributes:
///
/// - `#[model(collection = "...", database = "...", name = "...", description = "...",
///   additional_properties, use_property_schemas, validate, validation_level = "...",
///   validation_action = "...", sync = "...")]` on the struct
/// - `#[field(name = "...", type = "...", required = bool, default = <expr>, skip)]`
/// - `#[relation(kind = "...", target = Type, local_field = "...", foreign_field = "...")]`
/// - `#[index]`, `#[index(unique, direction = -1, name = "...")]`
#[proc_macro_derive(Model, attributes(model, field, relation, index))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_model(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

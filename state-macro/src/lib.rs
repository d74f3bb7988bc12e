//! Derive macros for the Stasis persistence engine.
//!
//! [`SaveObject`](macro@SaveObject) implements `stasis_state::SaveObject`
//! for a named-field struct, [`SaveStruct`](macro@SaveStruct) implements
//! `stasis_state::SaveStruct` for structs nested inside a save object.
//! Field inclusion is opt-in through the `#[save]` attribute; the property
//! kind is inferred from the field type.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, LitStr};

/// Derives `stasis_state::SaveObject`.
///
/// Saved fields are marked with `#[save]`. Two markers bind a field to the
/// object envelope instead of the property list: `#[save(id)]` on a `Guid`
/// field exposes it as the persistent identity, `#[save(name)]` on a
/// `String` field exposes it as the stable object name. Neither marked
/// field is stored as a property.
///
/// Struct-level options go through `#[save_object(...)]`:
///
/// ```ignore
/// #[derive(Default, SaveObject)]
/// #[save_object(category = "player", respawn = "never", spatial, callbacks)]
/// struct Avatar {
///     #[save(id)]
///     guid: Guid,
///     #[save]
///     health: i32,
/// }
/// ```
///
/// `category` is one of `"general"`, `"player"`, `"controller"` or
/// `"game_rules"`; `respawn` is one of `"default"`, `"always"` or
/// `"never"`. `spatial` routes packed core data through the type's
/// `Spatial` impl, `callbacks` routes lifecycle hooks through its
/// `SaveCallbacks` impl.
///
/// Container and reference field types are recorded as unsupported and
/// skipped during capture. Any other user type is treated as a nested
/// struct and must derive [`SaveStruct`](macro@SaveStruct).
#[proc_macro_derive(SaveObject, attributes(save, save_object))]
pub fn derive_save_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_save_object(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `stasis_state::SaveStruct` for a struct stored as a nested
/// property group. Fields are opted in with `#[save]`; the `id` and `name`
/// markers are not allowed here.
#[proc_macro_derive(SaveStruct, attributes(save))]
pub fn derive_save_struct(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_save_struct(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

fn expand_save_object(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = named_fields(input, "SaveObject")?;
    let options = parse_object_options(input)?;
    let saved = collect_saved_fields(fields, true)?;
    let body = build_property_body(&saved.properties);

    let name = &input.ident;
    let name_str = name.to_string();
    let defs = &body.defs;
    let read = read_method("read_property", &body.read_arms);
    let write = write_method("write_property", &body.write_arms);

    let mut extras = Vec::new();
    if let Some(id) = &saved.id_field {
        extras.push(quote! {
            fn persistent_id(&self) -> ::core::option::Option<stasis_state::Guid> {
                ::core::option::Option::Some(self.#id)
            }

            fn set_persistent_id(&mut self, id: stasis_state::Guid) -> bool {
                self.#id = id;
                true
            }
        });
    }
    if let Some(name_field) = &saved.name_field {
        extras.push(quote! {
            fn object_name(&self) -> &str {
                &self.#name_field
            }
        });
    }
    if let Some(category) = &options.category {
        extras.push(quote! {
            fn category(&self) -> stasis_state::ObjectCategory {
                stasis_state::ObjectCategory::#category
            }
        });
    }
    if let Some(respawn) = &options.respawn {
        extras.push(quote! {
            fn respawn_policy(&self) -> stasis_state::RespawnPolicy {
                stasis_state::RespawnPolicy::#respawn
            }
        });
    }
    if options.spatial {
        extras.push(quote! {
            fn as_spatial(&self) -> ::core::option::Option<&dyn stasis_state::Spatial> {
                ::core::option::Option::Some(self)
            }

            fn as_spatial_mut(&mut self) -> ::core::option::Option<&mut dyn stasis_state::Spatial> {
                ::core::option::Option::Some(self)
            }
        });
    }
    if options.callbacks {
        extras.push(quote! {
            fn as_callbacks(&mut self) -> ::core::option::Option<&mut dyn stasis_state::SaveCallbacks> {
                ::core::option::Option::Some(self)
            }
        });
    }

    Ok(quote! {
        impl stasis_state::SaveObject for #name {
            fn class_path(&self) -> &'static str {
                concat!(module_path!(), "::", #name_str)
            }

            fn save_properties(&self) -> &'static [stasis_state::PropertyDef] {
                static DEFS: &[stasis_state::PropertyDef] = &[#(#defs),*];
                DEFS
            }

            #read

            #write

            #(#extras)*
        }
    })
}

fn expand_save_struct(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = named_fields(input, "SaveStruct")?;
    let saved = collect_saved_fields(fields, false)?;
    let body = build_property_body(&saved.properties);

    let name = &input.ident;
    let defs = &body.defs;
    let read = read_method("read_field", &body.read_arms);
    let write = write_method("write_field", &body.write_arms);

    Ok(quote! {
        impl stasis_state::SaveStruct for #name {
            fn save_fields() -> &'static [stasis_state::PropertyDef] {
                static FIELDS: &[stasis_state::PropertyDef] = &[#(#defs),*];
                FIELDS
            }

            #read

            #write
        }
    })
}

// ---------------------------------------------------------------------------
// Field collection
// ---------------------------------------------------------------------------

enum Marker {
    Plain,
    Id,
    Name,
}

enum FieldKind {
    Leaf(&'static str),
    Nested(syn::Type),
    Unsupported,
}

struct SavedField {
    ident: Ident,
    name: String,
    kind: FieldKind,
}

struct SavedFields {
    properties: Vec<SavedField>,
    id_field: Option<Ident>,
    name_field: Option<Ident>,
}

fn named_fields<'a>(input: &'a DeriveInput, trait_name: &str) -> syn::Result<&'a syn::FieldsNamed> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                format!("`{trait_name}` can only be derived for structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            format!("`{trait_name}` can only be derived for structs"),
        )),
    }
}

fn collect_saved_fields(fields: &syn::FieldsNamed, allow_markers: bool) -> syn::Result<SavedFields> {
    let mut out = SavedFields {
        properties: Vec::new(),
        id_field: None,
        name_field: None,
    };
    for field in &fields.named {
        let mut marker = None;
        for attr in &field.attrs {
            if !attr.path().is_ident("save") {
                continue;
            }
            let mut parsed = Marker::Plain;
            if let syn::Meta::List(_) = &attr.meta {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("id") {
                        parsed = Marker::Id;
                        Ok(())
                    } else if meta.path.is_ident("name") {
                        parsed = Marker::Name;
                        Ok(())
                    } else {
                        Err(meta.error("expected `id` or `name`"))
                    }
                })?;
            }
            marker = Some(parsed);
        }
        let Some(marker) = marker else { continue };
        let Some(ident) = field.ident.clone() else { continue };
        match marker {
            Marker::Plain => {
                out.properties.push(SavedField {
                    name: ident.to_string(),
                    ident,
                    kind: classify(&field.ty),
                });
            }
            Marker::Id => {
                if !allow_markers {
                    return Err(syn::Error::new_spanned(
                        field,
                        "`save(id)` is not allowed on nested structs",
                    ));
                }
                if !matches!(classify(&field.ty), FieldKind::Leaf("Guid")) {
                    return Err(syn::Error::new_spanned(
                        field,
                        "`save(id)` field must be a `Guid`",
                    ));
                }
                if out.id_field.is_some() {
                    return Err(syn::Error::new_spanned(field, "duplicate `save(id)` field"));
                }
                out.id_field = Some(ident);
            }
            Marker::Name => {
                if !allow_markers {
                    return Err(syn::Error::new_spanned(
                        field,
                        "`save(name)` is not allowed on nested structs",
                    ));
                }
                if !matches!(classify(&field.ty), FieldKind::Leaf("String")) {
                    return Err(syn::Error::new_spanned(
                        field,
                        "`save(name)` field must be a `String`",
                    ));
                }
                if out.name_field.is_some() {
                    return Err(syn::Error::new_spanned(field, "duplicate `save(name)` field"));
                }
                out.name_field = Some(ident);
            }
        }
    }
    Ok(out)
}

/// Property kind inference from the last path segment of the field type.
fn classify(ty: &syn::Type) -> FieldKind {
    let syn::Type::Path(path) = ty else {
        return FieldKind::Unsupported;
    };
    let Some(segment) = path.path.segments.last() else {
        return FieldKind::Unsupported;
    };
    match segment.ident.to_string().as_str() {
        "bool" => FieldKind::Leaf("Bool"),
        "u8" => FieldKind::Leaf("U8"),
        "i32" => FieldKind::Leaf("I32"),
        "i64" => FieldKind::Leaf("I64"),
        "u32" => FieldKind::Leaf("U32"),
        "u64" => FieldKind::Leaf("U64"),
        "f32" => FieldKind::Leaf("F32"),
        "f64" => FieldKind::Leaf("F64"),
        "String" => FieldKind::Leaf("String"),
        "Guid" => FieldKind::Leaf("Guid"),
        "Vec3" => FieldKind::Leaf("Vec3"),
        "Quat" => FieldKind::Leaf("Quat"),
        "Transform" => FieldKind::Leaf("Transform"),
        "ObjectRef" => FieldKind::Leaf("Ref"),
        "Vec" | "VecDeque" | "Option" | "Box" | "Rc" | "Arc" | "HashMap" | "BTreeMap"
        | "HashSet" | "BTreeSet" => FieldKind::Unsupported,
        _ => FieldKind::Nested(ty.clone()),
    }
}

// ---------------------------------------------------------------------------
// Generated bodies
// ---------------------------------------------------------------------------

struct PropertyBody {
    defs: Vec<proc_macro2::TokenStream>,
    read_arms: Vec<proc_macro2::TokenStream>,
    write_arms: Vec<proc_macro2::TokenStream>,
}

fn build_property_body(properties: &[SavedField]) -> PropertyBody {
    let mut body = PropertyBody {
        defs: Vec::new(),
        read_arms: Vec::new(),
        write_arms: Vec::new(),
    };
    for (index, field) in properties.iter().enumerate() {
        let index = index as u16;
        let ident = &field.ident;
        let name = &field.name;
        match &field.kind {
            FieldKind::Leaf(variant_name) => {
                let variant = Ident::new(variant_name, Span::call_site());
                // String is the only non-Copy leaf.
                let get = if *variant_name == "String" {
                    quote!(self.#ident.clone())
                } else {
                    quote!(self.#ident)
                };
                let set = if *variant_name == "String" {
                    quote!(self.#ident = value.clone();)
                } else {
                    quote!(self.#ident = *value;)
                };
                body.defs.push(quote! {
                    stasis_state::PropertyDef {
                        name: #name,
                        kind: stasis_state::PropertyKind::#variant,
                        fields: stasis_state::no_fields,
                    }
                });
                body.read_arms.push(quote! {
                    #index => {
                        if !rest.is_empty() {
                            return ::core::option::Option::None;
                        }
                        ::core::option::Option::Some(stasis_state::PropertyValue::#variant(#get))
                    },
                });
                body.write_arms.push(quote! {
                    #index => {
                        if !rest.is_empty() {
                            return false;
                        }
                        if let stasis_state::PropertyValue::#variant(value) = value {
                            #set
                            true
                        } else {
                            false
                        }
                    },
                });
            }
            FieldKind::Nested(ty) => {
                body.defs.push(quote! {
                    stasis_state::PropertyDef {
                        name: #name,
                        kind: stasis_state::PropertyKind::Struct,
                        fields: <#ty as stasis_state::SaveStruct>::save_fields,
                    }
                });
                body.read_arms.push(quote! {
                    #index => <#ty as stasis_state::SaveStruct>::read_field(&self.#ident, rest),
                });
                body.write_arms.push(quote! {
                    #index => <#ty as stasis_state::SaveStruct>::write_field(&mut self.#ident, rest, value),
                });
            }
            FieldKind::Unsupported => {
                body.defs.push(quote! {
                    stasis_state::PropertyDef {
                        name: #name,
                        kind: stasis_state::PropertyKind::Unsupported,
                        fields: stasis_state::no_fields,
                    }
                });
            }
        }
    }
    body
}

fn read_method(fn_name: &str, arms: &[proc_macro2::TokenStream]) -> proc_macro2::TokenStream {
    let fn_name = Ident::new(fn_name, Span::call_site());
    if arms.is_empty() {
        return quote! {
            fn #fn_name(&self, _path: &[u16]) -> ::core::option::Option<stasis_state::PropertyValue> {
                ::core::option::Option::None
            }
        };
    }
    quote! {
        fn #fn_name(&self, path: &[u16]) -> ::core::option::Option<stasis_state::PropertyValue> {
            let (first, rest) = match path.split_first() {
                ::core::option::Option::Some(split) => split,
                ::core::option::Option::None => return ::core::option::Option::None,
            };
            match *first {
                #(#arms)*
                _ => ::core::option::Option::None,
            }
        }
    }
}

fn write_method(fn_name: &str, arms: &[proc_macro2::TokenStream]) -> proc_macro2::TokenStream {
    let fn_name = Ident::new(fn_name, Span::call_site());
    if arms.is_empty() {
        return quote! {
            fn #fn_name(&mut self, _path: &[u16], _value: &stasis_state::PropertyValue) -> bool {
                false
            }
        };
    }
    quote! {
        fn #fn_name(&mut self, path: &[u16], value: &stasis_state::PropertyValue) -> bool {
            let (first, rest) = match path.split_first() {
                ::core::option::Option::Some(split) => split,
                ::core::option::Option::None => return false,
            };
            match *first {
                #(#arms)*
                _ => false,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Struct-level options
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ObjectOptions {
    category: Option<Ident>,
    respawn: Option<Ident>,
    spatial: bool,
    callbacks: bool,
}

fn parse_object_options(input: &DeriveInput) -> syn::Result<ObjectOptions> {
    let mut options = ObjectOptions::default();
    for attr in &input.attrs {
        if !attr.path().is_ident("save_object") {
            continue;
        }
        if !matches!(attr.meta, syn::Meta::List(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("category") {
                let lit: LitStr = meta.value()?.parse()?;
                let value = lit.value();
                let variant = match value.as_str() {
                    "general" => "General",
                    "player" => "PlayerControlled",
                    "controller" => "Controller",
                    "game_rules" => "GameRules",
                    _ => return Err(meta.error(format!("unknown category `{value}`"))),
                };
                options.category = Some(Ident::new(variant, Span::call_site()));
                Ok(())
            } else if meta.path.is_ident("respawn") {
                let lit: LitStr = meta.value()?.parse()?;
                let value = lit.value();
                let variant = match value.as_str() {
                    "default" => "Default",
                    "always" => "Always",
                    "never" => "Never",
                    _ => return Err(meta.error(format!("unknown respawn policy `{value}`"))),
                };
                options.respawn = Some(Ident::new(variant, Span::call_site()));
                Ok(())
            } else if meta.path.is_ident("spatial") {
                options.spatial = true;
                Ok(())
            } else if meta.path.is_ident("callbacks") {
                options.callbacks = true;
                Ok(())
            } else {
                Err(meta.error("unknown `save_object` option"))
            }
        })?;
    }
    Ok(options)
}

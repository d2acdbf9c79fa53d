use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::punctuated::Punctuated;
use syn::{Attribute, Data, DeriveInput, Field, Fields, Ident, LitStr, Token};

pub fn derive_versioned_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let container = extract_container(input)?;
    let rename_all = serde_options(&input.attrs)?.rename_all;
    let fields = named_fields(input)?;
    let keys = extract_key_fields(fields)?;
    let field_names = serialized_field_names(fields, rename_all.as_deref())?;

    let model_id_ident = field_ident(keys.model_id)?;
    let model_id_json = json_name(keys.model_id, rename_all.as_deref())?;

    let partition = match keys.partition_key {
        Some(field) => {
            let ident = field_ident(field)?;
            let json = json_name(field, rename_all.as_deref())?;
            if json == model_id_json {
                return Err(syn::Error::new_spanned(
                    &field.ident,
                    "VersionedEntity derive: partition key serializes to the same field as the model id; drop `partition_key` for a single-key entity",
                ));
            }
            quote! {
                const PARTITION_KEY_FIELD: &'static str = #json;

                fn partition_key(&self) -> ::versioned_store::PartitionKeyValue {
                    ::versioned_store::PartitionKeyValue::from(
                        ::std::clone::Clone::clone(&self.#ident),
                    )
                }
            }
        }
        None => quote! {},
    };

    Ok(quote! {
        impl #impl_generics ::versioned_store::VersionedEntity for #name #ty_generics #where_clause {
            const CONTAINER: &'static str = #container;
            const MODEL_ID_FIELD: &'static str = #model_id_json;
            const FIELD_NAMES: &'static [&'static str] = &[#(#field_names),*];

            fn model_id(&self) -> &str {
                &self.#model_id_ident
            }

            #partition
        }
    })
}

fn field_ident(field: &Field) -> syn::Result<Ident> {
    field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

struct KeyFields<'a> {
    model_id: &'a Field,
    partition_key: Option<&'a Field>,
}

fn extract_container(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("versioned") {
            continue;
        }

        let mut container = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("container") {
                let value: LitStr = meta.value()?.parse()?;
                container = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `container = \"...\"`"))
            }
        })?;

        if let Some(c) = container {
            return Ok(c);
        }
    }

    // Default: snake_case struct name + "s"
    let name = input.ident.to_string();
    Ok(format!("{}s", to_snake_case(&name)))
}

fn named_fields(input: &DeriveInput) -> syn::Result<&Punctuated<Field, Token![,]>> {
    match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                "VersionedEntity derive only supports structs with named fields",
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            "VersionedEntity derive only supports structs",
        )),
    }
}

/// Serialized names of all written fields. Names owned by the stored
/// document (`id`, `version`, `_*`) are a compile error.
fn serialized_field_names(
    fields: &Punctuated<Field, Token![,]>,
    rename_all: Option<&str>,
) -> syn::Result<Vec<String>> {
    let mut names = Vec::new();
    for field in fields {
        let options = serde_options(&field.attrs)?;
        if options.skip || options.flatten {
            continue;
        }
        let name = json_name(field, rename_all)?;
        if name == "id" || name == "version" || name.starts_with('_') {
            return Err(syn::Error::new_spanned(
                &field.ident,
                format!(
                    "VersionedEntity derive: field serializes as `{}`, which is reserved for the stored document; rename it",
                    name
                ),
            ));
        }
        names.push(name);
    }
    Ok(names)
}

fn extract_key_fields(fields: &Punctuated<Field, Token![,]>) -> syn::Result<KeyFields<'_>> {
    let mut model_id: Option<&Field> = None;
    let mut partition_key: Option<&Field> = None;

    for field in fields {
        let (is_model_id, is_partition_key) = field_markers(field)?;

        if is_model_id && is_partition_key {
            return Err(syn::Error::new_spanned(
                &field.ident,
                "VersionedEntity derive: a field cannot be both `model_id` and `partition_key`; the two keys must be distinct fields",
            ));
        }
        if is_model_id {
            if model_id.is_some() {
                return Err(syn::Error::new_spanned(
                    &field.ident,
                    "VersionedEntity derive: only one field may be marked `model_id`",
                ));
            }
            model_id = Some(field);
        }
        if is_partition_key {
            if partition_key.is_some() {
                return Err(syn::Error::new_spanned(
                    &field.ident,
                    "VersionedEntity derive: only one field may be marked `partition_key`",
                ));
            }
            partition_key = Some(field);
        }
    }

    let model_id = model_id.ok_or_else(|| {
        syn::Error::new(
            Span::call_site(),
            "VersionedEntity derive: mark the logical key with #[versioned(model_id)]",
        )
    })?;

    Ok(KeyFields {
        model_id,
        partition_key,
    })
}

fn field_markers(field: &Field) -> syn::Result<(bool, bool)> {
    let mut is_model_id = false;
    let mut is_partition_key = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("versioned") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("model_id") {
                is_model_id = true;
                Ok(())
            } else if meta.path.is_ident("partition_key") {
                is_partition_key = true;
                Ok(())
            } else {
                Err(meta.error("expected `model_id` or `partition_key`"))
            }
        })?;
    }

    Ok((is_model_id, is_partition_key))
}

/// The name serde writes for a field: `#[serde(rename)]` first, then the
/// container's `rename_all`, then the identifier itself.
fn json_name(field: &Field, rename_all: Option<&str>) -> syn::Result<String> {
    if let Some(renamed) = serde_options(&field.attrs)?.rename {
        return Ok(renamed);
    }
    let ident = field.ident.as_ref().map(Ident::to_string).unwrap_or_default();
    let ident = ident.trim_start_matches("r#").to_string();
    Ok(match rename_all {
        Some(rule) => apply_rename_rule(&ident, rule),
        None => ident,
    })
}

/// The serde options that change what a field is written as.
#[derive(Default)]
struct SerdeOptions {
    rename: Option<String>,
    rename_all: Option<String>,
    flatten: bool,
    skip: bool,
}

fn serde_options(attrs: &[Attribute]) -> syn::Result<SerdeOptions> {
    let mut options = SerdeOptions::default();
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                options.rename = serialize_name(&meta)?;
            } else if meta.path.is_ident("rename_all") {
                options.rename_all = serialize_name(&meta)?;
            } else if meta.path.is_ident("flatten") {
                options.flatten = true;
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                options.skip = true;
            } else {
                skip_value(&meta)?;
            }
            Ok(())
        })?;
    }
    Ok(options)
}

/// `rename = "x"` or `rename(serialize = "x", deserialize = "y")`.
fn serialize_name(meta: &ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(Token![=]) {
        let value: LitStr = meta.value()?.parse()?;
        return Ok(Some(value.value()));
    }
    let mut name = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("serialize") {
            let value: LitStr = inner.value()?.parse()?;
            name = Some(value.value());
        } else {
            skip_value(&inner)?;
        }
        Ok(())
    })?;
    Ok(name)
}

/// Consume the value of a serde option this derive does not care about.
fn skip_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _: proc_macro2::TokenStream = content.parse()?;
    }
    Ok(())
}

fn apply_rename_rule(snake: &str, rule: &str) -> String {
    let words: Vec<&str> = snake.split('_').filter(|w| !w.is_empty()).collect();
    match rule {
        "lowercase" => snake.replace('_', "").to_lowercase(),
        "UPPERCASE" => snake.replace('_', "").to_uppercase(),
        "PascalCase" => words.iter().map(|w| capitalize(w)).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_string() } else { capitalize(w) })
            .collect(),
        "SCREAMING_SNAKE_CASE" => snake.to_uppercase(),
        "kebab-case" => snake.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => snake.replace('_', "-").to_uppercase(),
        _ => snake.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

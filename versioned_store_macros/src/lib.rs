mod versioned_entity;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(VersionedEntity)]
// ============================================================================

/// Derive `versioned_store::VersionedEntity` from field markers.
///
/// # Usage
///
/// Single key (the model id is also the partition key):
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone, VersionedEntity)]
/// #[serde(rename_all = "camelCase")]
/// #[versioned(container = "profiles")]
/// struct Profile {
///     #[versioned(model_id)]
///     fiscal_code: String,
///     status: String,
/// }
/// ```
///
/// Composed key (external reference key plus a distinct partition key):
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone, VersionedEntity)]
/// #[versioned(container = "activations")]
/// struct Activation {
///     #[versioned(model_id)]
///     service_id: String,
///     #[versioned(partition_key)]
///     tenant: i64,
/// }
/// ```
///
/// The macro supports:
/// - `container = "..."`: defaults to the snake_case struct name plus `s`
/// - field names as serde writes them (`rename`, `rename_all`)
/// - a compile error when one field is marked both `model_id` and
///   `partition_key`, or when both serialize to the same name
#[proc_macro_derive(VersionedEntity, attributes(versioned))]
pub fn derive_versioned_entity(input: TokenStream) -> TokenStream {
    versioned_entity::derive_versioned_entity(input)
}

/// Identity reconciliation.
///
/// Matches an incoming `(email, phone number)` pair against stored contacts,
/// links new information into the matching cluster, and merges clusters the
/// pair bridges.
mod resolver;

pub use resolver::{
    build_consolidated_contact, has_new_information, owning_primary_ids, IdentityResolver,
};

//! Data sources and their type-name registry.

pub mod policy_document;
pub mod secrets;
pub mod transit;

use crate::interface::DynamicDataSource;
use std::collections::HashMap;

fn entry<D: DynamicDataSource + 'static>(source: D) -> (&'static str, Box<dyn DynamicDataSource>) {
    (source.type_name(), Box::new(source))
}

/// Every data source type the provider offers.
pub fn registry() -> HashMap<&'static str, Box<dyn DynamicDataSource>> {
    HashMap::from([
        entry(secrets::GenericSecretLookup),
        entry(secrets::KvSecretV2Lookup),
        entry(policy_document::PolicyDocumentRenderer),
        entry(transit::TransitEncrypt),
        entry(transit::TransitDecrypt),
        entry(transit::TransitSign),
        entry(transit::TransitVerify),
    ])
}

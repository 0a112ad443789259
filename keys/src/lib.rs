//! Key construction for common binary formats.
//!
//! Symbol servers address artifacts by `<name>/<signature>/<name>` keys;
//! the signature encoding differs per format. These helpers build the two
//! common forms and route the result through [`SymbolKey`] sanitization so
//! a hostile file name cannot smuggle path segments into a cache.

use symstore::{StoreError, SymbolKey};
use uuid::Uuid;

/// Key for an executable image, from the COFF header's link timestamp and
/// mapped image size: `<filename>/<timestamp-hex><imagesize-hex>/<filename>`.
///
/// Both hex runs are lowercase without leading zeros.
pub fn image_key(
    file_name: &str,
    time_date_stamp: u32,
    size_of_image: u32,
) -> Result<SymbolKey, StoreError> {
    let file_name = single_segment(file_name)?;
    SymbolKey::new(format!(
        "{file_name}/{time_date_stamp:x}{size_of_image:x}/{file_name}"
    ))
}

/// Key for a debug database, from its signature GUID and age:
/// `<pdbname>/<guid-hex-nohyphens><age-hex>/<pdbname>`.
pub fn pdb_key(pdb_name: &str, signature: Uuid, age: u32) -> Result<SymbolKey, StoreError> {
    let pdb_name = single_segment(pdb_name)?;
    SymbolKey::new(format!(
        "{pdb_name}/{}{age:x}/{pdb_name}",
        signature.as_simple()
    ))
}

/// A file name must be exactly one path segment of the key it names.
fn single_segment(name: &str) -> Result<&str, StoreError> {
    if name.contains('/') {
        return Err(StoreError::InvalidKey(format!(
            "file name {name:?} contains a path separator"
        )));
    }
    Ok(name)
}

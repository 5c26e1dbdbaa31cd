//! Tokenizer for `/images/{uuid}[/sub-resource]` paths.
//!
//! Parsing is purely syntactic. The tag following the UUID is passed through
//! unmodified; deciding whether a tag is valid for a given method is up to
//! the dispatcher.

use crate::error::InvalidUrl;

/// Prefix every image resource path starts with.
pub const IMAGES_PREFIX: &str = "/images/";

/// Path of the image collection.
pub const IMAGES_COLLECTION: &str = "/images";

/// A decomposed image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResource {
    /// Image identifier, never empty
    pub uuid: String,

    /// Raw sub-resource tag including the leading slash (e.g. `/file`), or
    /// empty when the path addresses the image itself
    pub tag: String,
}

/// Sub-resources recognised by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubResource<'a> {
    /// The image manifest itself
    Manifest,
    File,
    Icon,
    Acl,
    /// Anything else, carrying the raw tag
    Other(&'a str),
}

impl ParsedResource {
    /// Classify the raw tag.
    pub fn subresource(&self) -> SubResource<'_> {
        match self.tag.as_str() {
            "" => SubResource::Manifest,
            "/file" => SubResource::File,
            "/icon" => SubResource::Icon,
            "/acl" => SubResource::Acl,
            other => SubResource::Other(other),
        }
    }
}

/// Split `/images/{uuid}{tag}` into its UUID and tag.
///
/// The remainder after the prefix is split at its first `/`; everything from
/// that slash onwards becomes the tag.
pub fn parse(path: &str) -> Result<ParsedResource, InvalidUrl> {
    let rest = path.strip_prefix(IMAGES_PREFIX).ok_or(InvalidUrl)?;

    let (uuid, tag) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };

    if uuid.is_empty() {
        return Err(InvalidUrl);
    }

    Ok(ParsedResource {
        uuid: uuid.to_string(),
        tag: tag.to_string(),
    })
}

//! Resource version and metadata types.
//!
//! A resource is a versioned external artifact (git ref, tarball, image).
//! Its configuration is opaque JSON handed to the resource script; versions
//! are flat string maps so they can be compared and persisted verbatim.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque resource configuration, passed through to the resource script.
pub type Source = serde_json::Map<String, serde_json::Value>;

/// Opaque per-operation parameters, passed through to the resource script.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A version identifier: a flat map of string key/value pairs.
pub type Version = HashMap<String, String>;

/// One name/value pair of operator-facing metadata about a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

//! In this module are declared the entities manipulated by this program

use std::collections::HashMap;

use clap::{builder::PossibleValue, ValueEnum};
use serde::Serialize;

/// The fields of a cached NVT record, in the order the import pipeline
/// stores them under `nvt:<oid>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NvtField {
    Filename,
    RequiredKeys,
    MandatoryKeys,
    ExcludedKeys,
    RequiredUdpPorts,
    RequiredPorts,
    Dependencies,
    /// The tag blob, see [`crate::nvticache::tags`].
    Tag,
    Cve,
    Bid,
    Xref,
    Category,
    Timeout,
    Family,
    Name,
}

/// The record layout. The position of a field in this table is its
/// index in the stored list.
pub const NVT_FIELDS: [NvtField; 15] = [
    NvtField::Filename,
    NvtField::RequiredKeys,
    NvtField::MandatoryKeys,
    NvtField::ExcludedKeys,
    NvtField::RequiredUdpPorts,
    NvtField::RequiredPorts,
    NvtField::Dependencies,
    NvtField::Tag,
    NvtField::Cve,
    NvtField::Bid,
    NvtField::Xref,
    NvtField::Category,
    NvtField::Timeout,
    NvtField::Family,
    NvtField::Name,
];

impl NvtField {
    /// The index of the field in the stored list.
    pub fn index(&self) -> usize {
        NVT_FIELDS
            .iter()
            .position(|f| f == self)
            .unwrap_or_default()
    }

    /// The key under which the field appears in decoded metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Filename => "filename",
            Self::RequiredKeys => "required_keys",
            Self::MandatoryKeys => "mandatory_keys",
            Self::ExcludedKeys => "excluded_keys",
            Self::RequiredUdpPorts => "required_udp_ports",
            Self::RequiredPorts => "required_ports",
            Self::Dependencies => "dependencies",
            Self::Tag => "tag",
            Self::Cve => "cve",
            Self::Bid => "bid",
            Self::Xref => "xref",
            Self::Category => "category",
            Self::Timeout => "timeout",
            Self::Family => "family",
            Self::Name => "name",
        }
    }

    /// Whether the field is copied as is into the decoded metadata.
    /// The key lists are only used by the scanner, the references and
    /// the tags have their own decoding.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            Self::Filename
                | Self::ExcludedKeys
                | Self::RequiredPorts
                | Self::Dependencies
                | Self::Category
                | Self::Timeout
                | Self::Family
                | Self::Name
        )
    }
}

/// The decoded metadata of an NVT: the positional fields and the tags.
pub type NvtMetadata = HashMap<String, String>;

/// A configurable option of an NVT.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NvtParam {
    /// The kind of input (entry, checkbox, radio, file, password).
    #[serde(rename = "type")]
    pub param_type: String,
    /// The default value, may be empty.
    pub default: String,
    /// The name of the option.
    pub name: String,
    /// Always a placeholder, the cache has no description.
    pub description: String,
}

impl NvtParam {
    /// Creates a new NvtParam
    pub fn new(param_type: &str, default: &str, name: &str, description: &str) -> Self {
        NvtParam {
            param_type: param_type.to_string(),
            default: default.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// The options of an NVT, by name.
pub type NvtParams = HashMap<String, NvtParam>;

/// The references of an NVT.
/// An empty stored field gives `[""]`, never an empty list.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NvtRefs {
    pub cve: Vec<String>,
    pub bid: Vec<String>,
    pub xref: Vec<String>,
}

/// Represents what can be asked from the command line
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryKind {
    /// The metadata merged with the tags
    Metadata,
    /// The decoded preferences and the timeout
    Params,
    /// The CVE, BID and other references
    Refs,
    /// The raw preferences
    Prefs,
    /// The script timeout
    Timeout,
    /// The raw tag blob
    Tag,
    /// All the cached OIDs
    Oids,
    /// The feed version of the cache
    Version,
}

impl QueryKind {
    /// Whether the query is about a single NVT
    pub fn needs_oid(&self) -> bool {
        !matches!(self, Self::Oids | Self::Version)
    }
}

impl ValueEnum for QueryKind {
    /// Lists the variants available for clap
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self::Metadata,
            Self::Params,
            Self::Refs,
            Self::Prefs,
            Self::Timeout,
            Self::Tag,
            Self::Oids,
            Self::Version,
        ]
    }

    /// Map each value to a possible value in clap
    fn to_possible_value(&self) -> Option<PossibleValue> {
        match &self {
            Self::Metadata => Some(PossibleValue::new("metadata")),
            Self::Params => Some(PossibleValue::new("params")),
            Self::Refs => Some(PossibleValue::new("refs")),
            Self::Prefs => Some(PossibleValue::new("prefs")),
            Self::Timeout => Some(PossibleValue::new("timeout")),
            Self::Tag => Some(PossibleValue::new("tag")),
            Self::Oids => Some(PossibleValue::new("oids")),
            Self::Version => Some(PossibleValue::new("version")),
        }
    }
}

/// The result of a query, ready to be written
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Map(HashMap<String, String>),
    Params(NvtParams),
    Refs(NvtRefs),
    List(Vec<String>),
    Scalar(Option<String>),
}

/// An enum to match the available writers
#[derive(Clone, Debug)]
pub enum Writers {
    /// TextStdoutWriter
    TextStdout,
    /// JsonWriter
    Json,
}

impl ValueEnum for Writers {
    /// Lists the variants available for clap
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::TextStdout, Self::Json]
    }

    /// Map each value to a possible value in clap
    fn to_possible_value(&self) -> Option<PossibleValue> {
        match &self {
            Self::TextStdout => Some(PossibleValue::new("text")),
            Self::Json => Some(PossibleValue::new("json")),
        }
    }
}

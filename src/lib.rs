//! Access to the NVT metadata cache kept by the scanner in the shared
//! redis knowledge base.
//!
//! A caller first claims a private namespace with [`kb::NamespaceAllocator`],
//! then reads records through [`nvticache::NvtCache`].

pub mod application;
pub mod errors;
pub mod kb;
pub mod models;
pub mod nvticache;
pub mod readers;
pub mod settings;
pub mod writers;

//! Document retrieval, structural extraction, and heading-tree reconstruction.
//!
//! This crate provides:
//! - [`DocumentFetcher`]: fetch a source and turn it into a [`DocumentStructure`],
//!   degrading to a minimal structure when anything goes wrong
//! - [`parse_document`]: HTML → [`DocumentStructure`] (title, description,
//!   headings, main text, term frequencies)
//! - [`HeadingTreeBuilder`]: rebuild the heading hierarchy from the flat,
//!   document-ordered heading stream
//!
//! [`DocumentStructure`]: siteadvisor_shared::DocumentStructure

pub mod fetcher;
pub mod headings;
pub mod parser;

pub use fetcher::{
    DocumentFetcher, DocumentRetrieval, HttpDocumentRetrieval, is_ssrf_target,
    public_redirects_only,
};
pub use headings::{HeadingTreeBuilder, build_heading_tree, flatten_tree};
pub use parser::parse_document;

//! Client for the external case-management system (CMS).
//!
//! Case and document metadata come from its SOAP web service; the document
//! list of a case is scraped from the case's public access page.
//! [`CachedCms`] memoises the slow-changing lookups through a
//! [`Cache`](fila_core::cache::Cache).

mod cached;
mod client;
mod model;
mod scrape;
mod soap;

pub mod error;

pub use cached::CachedCms;
pub use client::{Cms, CmsConfig, SeiClient};
pub use error::{Error, FaultDetail, RemoteFault, Result};
pub use model::{
  CaseInfo, DocumentMetadata, DocumentRow, Download, IssuingUnit, Series, Signature, UnitInfo,
};

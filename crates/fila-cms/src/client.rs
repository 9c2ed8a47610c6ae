//! The [`Cms`] capability and its SOAP implementation, [`SeiClient`].

use std::sync::Arc;

use async_trait::async_trait;
use fila_core::case::Unit;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;

use crate::{
  CaseInfo, DocumentMetadata, DocumentRow, Download, Error, IssuingUnit, Result, Series,
  Signature, UnitInfo, scrape,
  soap::{self, Element},
};

/// Suffix of the web-service endpoint; the rest of the URL is the base of
/// every public page link.
const WS_SUFFIX: &str = "/ws/SeiWS.php";

/// Read operations against the CMS. Dropping a returned future aborts the
/// request.
#[async_trait]
pub trait Cms: Send + Sync {
  /// Access link and originating unit of the case numbered `number`.
  async fn resolve_case(&self, number: &str) -> Result<CaseInfo>;

  /// The document table of a case's access page, in page order.
  async fn list_documents(&self, access_link: &str) -> Result<Vec<DocumentRow>>;

  async fn fetch_document_metadata(&self, number: &str) -> Result<DocumentMetadata>;

  async fn list_units(&self) -> Result<Vec<UnitInfo>>;

  /// GET `link`. Any non-2xx status is an error.
  async fn download(&self, link: &str) -> Result<Download>;
}

#[async_trait]
impl<C: Cms + ?Sized> Cms for Arc<C> {
  async fn resolve_case(&self, number: &str) -> Result<CaseInfo> {
    (**self).resolve_case(number).await
  }

  async fn list_documents(&self, access_link: &str) -> Result<Vec<DocumentRow>> {
    (**self).list_documents(access_link).await
  }

  async fn fetch_document_metadata(&self, number: &str) -> Result<DocumentMetadata> {
    (**self).fetch_document_metadata(number).await
  }

  async fn list_units(&self) -> Result<Vec<UnitInfo>> { (**self).list_units().await }

  async fn download(&self, link: &str) -> Result<Download> { (**self).download(link).await }
}

// ─── SOAP client ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CmsConfig {
  /// Web-service endpoint, e.g. `https://sei.example/sei/ws/SeiWS.php`.
  pub url:            String,
  /// Acronym of this system as registered in the CMS.
  pub system_acronym: String,
  /// Service identifier registered for this system.
  pub service_id:     String,
}

#[derive(Clone)]
pub struct SeiClient {
  config: CmsConfig,
  http:   reqwest::Client,
}

impl SeiClient {
  pub fn new(config: CmsConfig) -> Self { Self::with_http(config, reqwest::Client::new()) }

  pub fn with_http(config: CmsConfig, http: reqwest::Client) -> Self { Self { config, http } }

  fn base_url(&self) -> &str {
    self
      .config
      .url
      .strip_suffix(WS_SUFFIX)
      .unwrap_or(&self.config.url)
  }

  /// POST a SOAP call and return the `parametros` of its response.
  async fn call(&self, operation: &str, extra: &[(&str, &str)]) -> Result<Element> {
    let mut fields = vec![
      ("SiglaSistema", self.config.system_acronym.as_str()),
      ("IdentificacaoServico", self.config.service_id.as_str()),
    ];
    fields.extend_from_slice(extra);
    let body = soap::envelope(operation, &fields)?;

    tracing::debug!(operation, "cms call");
    let res = self
      .http
      .post(&self.config.url)
      .header(CONTENT_TYPE, "text/xml; charset=utf-8")
      .body(body)
      .send()
      .await?;
    let status = res.status();
    let bytes = res.bytes().await?;

    if status != StatusCode::OK {
      return Err(soap::fault(status.as_u16(), &bytes));
    }
    soap::response_params(&bytes)
  }
}

fn document_metadata(p: &Element) -> DocumentMetadata {
  let signatures = p
    .child("Assinaturas")
    .map(|a| {
      a.children_named("item")
        .map(|s| Signature {
          name:      s.text_at(&["Nome"]),
          role:      s.text_at(&["CargoFuncao"]),
          signed_at: s.text_at(&["DataHora"]),
          id:        s.text_at(&["Sigla"]),
        })
        .collect()
    })
    .unwrap_or_default();

  DocumentMetadata {
    document_id: p.text_at(&["IdDocumento"]),
    formatted_id: p.text_at(&["DocumentoFormatado"]),
    case_number: p.text_at(&["ProcedimentoFormatado"]),
    series: Series {
      id:   p.text_at(&["Serie", "IdSerie"]),
      name: p.text_at(&["Serie", "Nome"]),
    },
    number: p.text_at(&["Numero"]),
    date: p.text_at(&["Data"]),
    description: p.text_at(&["Descricao"]),
    access_link: p.text_at(&["LinkAcesso"]),
    issuing_unit: IssuingUnit {
      id:           p.text_at(&["UnidadeElaboradora", "IdUnidade"]),
      abbreviation: p.text_at(&["UnidadeElaboradora", "Sigla"]),
      description:  p.text_at(&["UnidadeElaboradora", "Descricao"]),
    },
    signatures,
  }
}

#[async_trait]
impl Cms for SeiClient {
  async fn resolve_case(&self, number: &str) -> Result<CaseInfo> {
    let p = self
      .call("consultarProcedimento", &[
        ("ProtocoloProcedimento", number),
        ("SinRetornarAndamentoGeracao", "S"),
      ])
      .await?;

    let access_link = p.text_at(&["LinkAcesso"]);
    if access_link.is_empty() {
      return Err(Error::Malformed(format!("case {number} has no access link")));
    }
    Ok(CaseInfo {
      access_link,
      unit: Unit {
        id:           p.text_at(&["AndamentoGeracao", "Unidade", "IdUnidade"]),
        abbreviation: p.text_at(&["AndamentoGeracao", "Unidade", "Sigla"]),
      },
    })
  }

  async fn list_documents(&self, access_link: &str) -> Result<Vec<DocumentRow>> {
    let res = self.http.get(access_link).send().await?;
    let status = res.status();
    let bytes = res.bytes().await?;
    if !status.is_success() {
      return Err(Error::Status {
        status: status.as_u16(),
        body:   String::from_utf8_lossy(&bytes).into_owned(),
      });
    }
    let html = scrape::decode_latin1(&bytes);
    scrape::document_rows(&html, self.base_url())
  }

  async fn fetch_document_metadata(&self, number: &str) -> Result<DocumentMetadata> {
    let p = self
      .call("consultarDocumento", &[
        ("ProtocoloDocumento", number),
        ("SinRetornarAssinaturas", "S"),
      ])
      .await?;
    Ok(document_metadata(&p))
  }

  async fn list_units(&self) -> Result<Vec<UnitInfo>> {
    let p = self.call("listarUnidades", &[]).await?;
    Ok(
      p.children_named("item")
        .map(|u| UnitInfo {
          id:           u.text_at(&["IdUnidade"]),
          abbreviation: u.text_at(&["Sigla"]),
          description:  u.text_at(&["Descricao"]),
        })
        .collect(),
    )
  }

  async fn download(&self, link: &str) -> Result<Download> {
    let res = self.http.get(link).send().await?;
    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(Error::Status {
        status: status.as_u16(),
        body,
      });
    }
    let content_type = res
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("application/octet-stream")
      .to_owned();
    let bytes = res.bytes().await?;
    Ok(Download {
      bytes,
      content_type,
    })
  }
}

//! Scraping the document table (`#tblDocumentos`) of a case's access page.
//!
//! The page is ISO-8859-1 HTML. Only the table itself is tokenised, which
//! keeps scripts and other markup quick-xml cannot read out of the way.

use quick_xml::{
  Reader,
  escape::{resolve_html5_entity, unescape_with},
  events::Event,
};

use crate::{DocumentRow, Error, Result};

const TABLE_ID: &str = "tblDocumentos";

/// Decode ISO-8859-1 bytes. Every byte maps to the code point of equal value.
pub fn decode_latin1(bytes: &[u8]) -> String { bytes.iter().map(|&b| char::from(b)).collect() }

/// Locate the markup of the `<table id="tblDocumentos">` element, from its
/// opening tag to the matching `</table>`.
fn table_slice(html: &str) -> Option<&str> {
  let id_at = html.find(&format!("\"{TABLE_ID}\"")).or_else(|| html.find(TABLE_ID))?;
  let start = html[..id_at].rfind("<table")?;

  let mut depth = 0usize;
  let mut pos = start;
  loop {
    let next_open = html[pos + 1..].find("<table").map(|i| i + pos + 1);
    let next_close = html[pos + 1..].find("</table").map(|i| i + pos + 1)?;
    match next_open {
      Some(open) if open < next_close => {
        depth += 1;
        pos = open;
      }
      _ if depth > 0 => {
        depth -= 1;
        pos = next_close;
      }
      _ => {
        let end = html[next_close..].find('>').map(|i| i + next_close + 1)?;
        return Some(&html[start..end]);
      }
    }
  }
}

/// Text with HTML entities resolved. A reference that is not a known entity
/// is kept literally, without giving up on the rest of the text.
fn text_of(raw: &[u8]) -> String {
  let raw = String::from_utf8_lossy(raw);
  let mut out = String::with_capacity(raw.len());
  let mut rest = raw.as_ref();
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    let tail = &rest[amp..];
    let Some(end) = tail.find(';') else {
      out.push_str(tail);
      rest = "";
      break;
    };
    match unescape_with(&tail[..=end], |entity| resolve_html5_entity(entity)) {
      Ok(text) => {
        out.push_str(&text);
        rest = &tail[end + 1..];
      }
      Err(_) => {
        out.push('&');
        rest = &tail[1..];
      }
    }
  }
  out.push_str(rest);
  out.replace('\u{a0}', " ")
}

#[derive(Default)]
struct Cell {
  text:      String,
  link_text: String,
  href:      Option<String>,
}

/// Parse the document rows of an access page. The header row and rows
/// without a document link are skipped. Relative links are resolved against
/// `base_url`.
pub fn document_rows(html: &str, base_url: &str) -> Result<Vec<DocumentRow>> {
  let Some(table) = table_slice(html) else {
    return Ok(Vec::new());
  };

  let mut reader = Reader::from_str(table);
  let config = reader.config_mut();
  config.check_end_names = false;
  config.allow_unmatched_ends = true;

  let mut rows = Vec::new();
  let mut table_depth = 0usize;
  let mut row_index = 0usize;
  let mut cells: Option<Vec<Cell>> = None;
  let mut cell: Option<Cell> = None;
  let mut in_link = false;

  loop {
    let event = reader
      .read_event()
      .map_err(|e| Error::Malformed(format!("document table: {e}")))?;
    match event {
      Event::Start(ref e) | Event::Empty(ref e) => {
        let empty = matches!(event, Event::Empty(_));
        match e.local_name().as_ref().to_ascii_lowercase().as_slice() {
          b"table" if !empty => table_depth += 1,
          b"tr" if table_depth == 1 => cells = Some(Vec::new()),
          b"td" if cells.is_some() && table_depth == 1 => cell = Some(Cell::default()),
          b"a" => {
            if let Some(c) = cell.as_mut().filter(|c| c.href.is_none()) {
              c.href = e
                .html_attributes()
                .flatten()
                .find(|a| a.key.local_name().as_ref().eq_ignore_ascii_case(b"href"))
                .map(|a| text_of(&a.value));
              in_link = !empty;
            }
          }
          _ => {}
        }
      }
      Event::Text(ref t) => {
        if let Some(c) = cell.as_mut() {
          let text = text_of(t);
          c.text.push_str(&text);
          if in_link {
            c.link_text.push_str(&text);
          }
        }
      }
      Event::End(ref e) => match e.local_name().as_ref().to_ascii_lowercase().as_slice() {
        b"table" => table_depth = table_depth.saturating_sub(1),
        b"a" => in_link = false,
        b"td" if table_depth == 1 => {
          if let (Some(c), Some(cs)) = (cell.take(), cells.as_mut()) {
            cs.push(c);
          }
        }
        b"tr" if table_depth == 1 => {
          if let Some(cs) = cells.take() {
            if row_index > 0 {
              if let Some(row) = build_row(cs, base_url) {
                rows.push(row);
              }
            }
            row_index += 1;
          }
        }
        _ => {}
      },
      Event::Eof => break,
      _ => {}
    }
  }

  Ok(rows)
}

/// Cells: 0 checkbox, 1 document link, 2 type, 3 date, 4 unit.
fn build_row(mut cells: Vec<Cell>, base_url: &str) -> Option<DocumentRow> {
  if cells.len() < 2 {
    return None;
  }
  cells.truncate(5);
  let mut cells = cells.into_iter().skip(1);
  let link_cell = cells.next()?;
  let href = link_cell.href?;
  let number = link_cell.link_text.trim().to_owned();
  if number.is_empty() {
    return None;
  }
  let mut text = || cells.next().map(|c| c.text.trim().to_owned()).unwrap_or_default();

  Some(DocumentRow {
    number,
    link: resolve(base_url, href.trim()),
    kind: text(),
    date: text(),
    unit: text(),
  })
}

fn resolve(base_url: &str, href: &str) -> String {
  if href.starts_with("http://") || href.starts_with("https://") {
    href.to_owned()
  } else {
    format!("{}/{}", base_url.trim_end_matches('/'), href.trim_start_matches('/'))
  }
}

//! SOAP 1.1 envelopes: writing requests and leniently reading responses.
//!
//! Responses are read into a small element tree keyed by local name;
//! namespace prefixes and attributes (e.g. `xsi:type`) are ignored, as are
//! elements the caller never asks for.

use std::io::Cursor;

use quick_xml::{
  Reader, Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{Error, FaultDetail, RemoteFault, Result};

pub const NS_ENVELOPE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const NS_SEI: &str = "Sei";

// ─── Request ─────────────────────────────────────────────────────────────────

/// Serialise a call to `operation` with the given child fields, in order.
pub fn envelope(operation: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>> {
  let mut w = Writer::new(Cursor::new(Vec::new()));
  w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    .map_err(quick_xml::Error::from)?;

  let mut env = BytesStart::new("soapenv:Envelope");
  env.push_attribute(("xmlns:soapenv", NS_ENVELOPE));
  write(&mut w, Event::Start(env))?;
  write(&mut w, Event::Start(BytesStart::new("soapenv:Body")))?;

  let mut op = BytesStart::new(operation);
  op.push_attribute(("xmlns", NS_SEI));
  write(&mut w, Event::Start(op))?;
  for (name, value) in fields {
    write(&mut w, Event::Start(BytesStart::new(*name)))?;
    write(&mut w, Event::Text(BytesText::new(value)))?;
    write(&mut w, Event::End(BytesEnd::new(*name)))?;
  }
  write(&mut w, Event::End(BytesEnd::new(operation)))?;

  write(&mut w, Event::End(BytesEnd::new("soapenv:Body")))?;
  write(&mut w, Event::End(BytesEnd::new("soapenv:Envelope")))?;
  Ok(w.into_inner().into_inner())
}

fn write(w: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
  w.write_event(event).map_err(quick_xml::Error::from)?;
  Ok(())
}

// ─── Response tree ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
  /// Local name, prefix stripped.
  pub name:     String,
  pub text:     String,
  pub children: Vec<Element>,
}

impl Element {
  fn named(name: &[u8]) -> Self {
    Self {
      name: String::from_utf8_lossy(local_name(name)).into_owned(),
      ..Default::default()
    }
  }

  pub fn child(&self, name: &str) -> Option<&Element> {
    self.children.iter().find(|c| c.name == name)
  }

  pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    self.children.iter().filter(move |c| c.name == name)
  }

  /// Follow `path` from this element; `None` if any step is missing.
  pub fn at(&self, path: &[&str]) -> Option<&Element> {
    path.iter().try_fold(self, |el, name| el.child(name))
  }

  /// Trimmed text at `path`, or an empty string when absent.
  pub fn text_at(&self, path: &[&str]) -> String {
    self
      .at(path)
      .map(|e| e.text.trim().to_owned())
      .unwrap_or_default()
  }
}

fn local_name(name: &[u8]) -> &[u8] {
  // strip "prefix:" if present
  if let Some(pos) = name.iter().rposition(|&b| b == b':') {
    &name[pos + 1..]
  } else {
    name
  }
}

/// Parse an XML document into a tree under a nameless root.
pub fn parse(xml: &[u8]) -> Result<Element> {
  let mut reader = Reader::from_reader(xml);
  reader.config_mut().trim_text(true);

  let mut stack = vec![Element::default()];
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf)? {
      Event::Start(ref e) => stack.push(Element::named(e.name().as_ref())),
      Event::Empty(ref e) => {
        let el = Element::named(e.name().as_ref());
        if let Some(parent) = stack.last_mut() {
          parent.children.push(el);
        }
      }
      Event::Text(ref t) => {
        let text = t.unescape()?;
        if let Some(top) = stack.last_mut() {
          top.text.push_str(&text);
        }
      }
      Event::CData(ref t) => {
        if let Some(top) = stack.last_mut() {
          top.text.push_str(&String::from_utf8_lossy(t));
        }
      }
      Event::End(_) => {
        if stack.len() > 1 {
          if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
              parent.children.push(done);
            }
          }
        }
      }
      Event::Eof => break,
      _ => {}
    }
    buf.clear();
  }

  // Unclosed elements are folded into their parents.
  while stack.len() > 1 {
    if let Some(done) = stack.pop() {
      if let Some(parent) = stack.last_mut() {
        parent.children.push(done);
      }
    }
  }
  stack
    .pop()
    .ok_or_else(|| Error::Malformed("empty document".into()))
}

/// The `parametros` element of a successful `{operation}Response`.
pub fn response_params(xml: &[u8]) -> Result<Element> {
  let root = parse(xml)?;
  let content = root
    .at(&["Envelope", "Body"])
    .and_then(|body| body.children.first())
    .ok_or_else(|| Error::Malformed("missing SOAP body".into()))?;
  content
    .child("parametros")
    .cloned()
    .ok_or_else(|| Error::Malformed(format!("{} has no parametros", content.name)))
}

/// Decode a fault body returned with HTTP `status`. A body that is not a
/// SOAP fault is reported as [`Error::Status`].
pub fn fault(status: u16, xml: &[u8]) -> Error {
  let not_a_fault = || Error::Status {
    status,
    body: String::from_utf8_lossy(xml).into_owned(),
  };
  let Ok(root) = parse(xml) else {
    return not_a_fault();
  };
  let Some(fault) = root.at(&["Envelope", "Body", "Fault"]) else {
    return not_a_fault();
  };

  let detail = fault
    .child("detail")
    .map(|d| {
      d.children_named("item")
        .map(|item| FaultDetail {
          key:   item.text_at(&["key"]),
          value: item.text_at(&["value"]),
        })
        .collect()
    })
    .unwrap_or_default();

  Error::Fault(RemoteFault {
    status,
    code: fault.text_at(&["faultcode"]),
    message: fault.text_at(&["faultstring"]),
    detail,
  })
}

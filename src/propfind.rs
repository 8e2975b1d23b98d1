//! PROPFIND multistatus parsing
//!
//! Namespace prefixes vary between servers (`D:`, `d:`, none), so elements
//! are matched on their local name only.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::RemoteError;
use crate::remote::{RemoteEntry, DIRECTORY_CONTENT_TYPE};
use crate::url::href_to_path;

/// Request body asking for the properties the walker needs.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:getcontentlength/>
    <D:getcontenttype/>
    <D:getlastmodified/>
    <D:resourcetype/>
  </D:prop>
</D:propfind>"#;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    Length,
    ContentType,
    LastModified,
}

#[derive(Default)]
struct Pending {
    href: String,
    length: String,
    content_type: String,
    last_modified: String,
    collection: bool,
}

impl Pending {
    fn push_text(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Href => &mut self.href,
            Field::Length => &mut self.length,
            Field::ContentType => &mut self.content_type,
            Field::LastModified => &mut self.last_modified,
        };
        target.push_str(text);
    }

    fn finish(self, listing: &mut Multistatus) {
        let href = self.href.trim();
        if href.is_empty() {
            return;
        }
        let Some(name) = href_to_path(href) else {
            listing.undecodable.push(href.to_string());
            return;
        };
        let content_type = Some(self.content_type.trim().to_string()).filter(|s| !s.is_empty());
        let is_directory =
            self.collection || content_type.as_deref() == Some(DIRECTORY_CONTENT_TYPE);
        let size = if is_directory {
            0
        } else {
            self.length.trim().parse().unwrap_or(0)
        };
        listing.entries.push(RemoteEntry {
            name,
            is_directory,
            size,
            content_type,
            modified: parse_http_date(&self.last_modified),
        });
    }
}

/// RFC 1123 dates as sent in `getlastmodified`.
pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Entries of one `207 Multi-Status` body.
#[derive(Debug, Default)]
pub struct Multistatus {
    /// In document order
    pub entries: Vec<RemoteEntry>,
    /// Raw hrefs whose decoded path is not UTF-8; they cannot be named locally.
    pub undecodable: Vec<String>,
}

/// Parse a `207 Multi-Status` body into entries, in document order.
pub fn parse_multistatus(xml: &str) -> Result<Multistatus, RemoteError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut listing = Multistatus::default();
    let mut current: Option<Pending> = None;
    let mut field: Option<Field> = None;
    let mut in_resourcetype = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(Pending::default()),
                b"href" => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::Length),
                b"getcontenttype" => field = Some(Field::ContentType),
                b"getlastmodified" => field = Some(Field::LastModified),
                b"resourcetype" => in_resourcetype = true,
                b"collection" if in_resourcetype => {
                    if let Some(p) = current.as_mut() {
                        p.collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" && in_resourcetype {
                    if let Some(p) = current.as_mut() {
                        p.collection = true;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(f), Some(p)) = (field, current.as_mut()) {
                    let text = t.unescape().map_err(|e| RemoteError::Xml(e.to_string()))?;
                    p.push_text(f, &text);
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(f), Some(p)) = (field, current.as_mut()) {
                    p.push_text(f, &String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(pending) = current.take() {
                        pending.finish(&mut listing);
                    }
                }
                b"href" | b"getcontentlength" | b"getcontenttype" | b"getlastmodified" => {
                    field = None
                }
                b"resourcetype" => in_resourcetype = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(RemoteError::Xml(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
    Ok(listing)
}

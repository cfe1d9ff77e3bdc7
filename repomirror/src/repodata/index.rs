//! Repository index (`repodata/repomd.xml`) parsing.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::checksum::Checksum;
use crate::error::{MirrorError, MirrorResult};
use crate::xml::{attribute, set_once, text};

/// Metadata kind every usable repository must provide.
pub const PRIMARY_KIND: &str = "primary";

/// One `<data>` row of the repository index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// Metadata type, e.g. `primary`, `filelists`, `other`.
    pub kind: String,
    /// Path relative to the repository root.
    pub location: String,
    /// Expected byte length.
    pub size: u64,
    /// Expected digest.
    pub checksum: Checksum,
    /// Fetched body, present between download and persistence.
    pub data: Option<Vec<u8>>,
}

/// Parsed repository index, one entry per metadata kind in document order.
#[derive(Debug, Clone, Default)]
pub struct RepoIndex {
    entries: Vec<MetadataEntry>,
}

impl RepoIndex {
    /// Parse the raw index document.
    ///
    /// # Errors
    ///
    /// `IndexMalformed` if the XML is unreadable, a `<data>` row lacks its
    /// checksum, location or size, or no `primary` row exists.
    pub fn parse(xml: &[u8]) -> MirrorResult<Self> {
        let index = parse_entries(xml)
            .map(|entries| {
                let mut index = Self::default();
                for entry in entries {
                    index.insert(entry);
                }
                index
            })
            .map_err(|reason| MirrorError::IndexMalformed { reason })?;

        if index.primary().is_none() {
            return Err(MirrorError::IndexMalformed {
                reason: format!("no <data type=\"{}\"> entry", PRIMARY_KIND),
            });
        }

        Ok(index)
    }

    /// Insert an entry; a repeated kind replaces the earlier row.
    fn insert(&mut self, entry: MetadataEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.kind == entry.kind) {
            warn!(kind = %entry.kind, "duplicate metadata kind in index, keeping the last one");
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// All entries.
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    /// Mutable access for attaching fetched bodies.
    pub fn entries_mut(&mut self) -> &mut [MetadataEntry] {
        &mut self.entries
    }

    /// Look up an entry by kind.
    pub fn get(&self, kind: &str) -> Option<&MetadataEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    /// The primary metadata entry.
    pub fn primary(&self) -> Option<&MetadataEntry> {
        self.get(PRIMARY_KIND)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index lists no metadata.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct PendingEntry {
    kind: String,
    checksum_type: Option<String>,
    checksum: Option<String>,
    location: Option<String>,
    size: Option<String>,
}

impl PendingEntry {
    fn finish(self) -> Result<MetadataEntry, String> {
        let kind = self.kind;
        let missing = |field: &str| format!("<data type=\"{}\"> has no <{}>", kind, field);

        let algorithm = self.checksum_type.ok_or_else(|| missing("checksum type"))?;
        let value = self.checksum.ok_or_else(|| missing("checksum"))?;
        let location = self.location.ok_or_else(|| missing("location"))?;
        let size = self.size.ok_or_else(|| missing("size"))?;

        let checksum = Checksum::parse(&algorithm, &value).map_err(|e| format!("{}: {}", kind, e))?;
        let size = size
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("<data type=\"{}\"> has invalid size '{}'", kind, size))?;
        if location.is_empty() {
            return Err(missing("location href"));
        }

        Ok(MetadataEntry {
            kind,
            location,
            size,
            checksum,
            data: None,
        })
    }
}

#[derive(Clone, Copy)]
enum TextField {
    Checksum,
    Size,
}

fn parse_entries(xml: &[u8]) -> Result<Vec<MetadataEntry>, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut pending: Option<PendingEntry> = None;
    let mut field: Option<TextField> = None;
    let mut field_text = String::new();

    loop {
        let position = reader.buffer_position();
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("XML error near byte {}: {}", position, e))?
        {
            Event::Start(e) => {
                if let Some(entry) = pending.as_mut() {
                    field = start_field(entry, &e)?;
                    field_text.clear();
                } else if e.name().as_ref() == b"data" {
                    pending = Some(start_entry(&e)?);
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = pending.as_mut() {
                    start_field(entry, &e)?;
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    field_text.push_str(&text(&t)?);
                }
            }
            Event::End(e) => {
                if let (Some(entry), Some(current)) = (pending.as_mut(), field) {
                    let value = std::mem::take(&mut field_text);
                    match (current, e.name().as_ref()) {
                        (TextField::Checksum, b"checksum") => {
                            set_once(&mut entry.checksum, value, "checksum")?;
                            field = None;
                        }
                        (TextField::Size, b"size") => {
                            set_once(&mut entry.size, value, "size")?;
                            field = None;
                        }
                        _ => field_text = value,
                    }
                } else if e.name().as_ref() == b"data" {
                    if let Some(entry) = pending.take() {
                        entries.push(entry.finish()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if pending.is_some() {
        return Err("unterminated <data> element".to_string());
    }

    Ok(entries)
}

fn start_entry(element: &BytesStart<'_>) -> Result<PendingEntry, String> {
    let kind = attribute(element, "type")?
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| "<data> element without a type".to_string())?;

    Ok(PendingEntry {
        kind,
        ..Default::default()
    })
}

/// Handle a child element of `<data>`, returning the text field it opens.
fn start_field(
    entry: &mut PendingEntry,
    element: &BytesStart<'_>,
) -> Result<Option<TextField>, String> {
    match element.name().as_ref() {
        b"checksum" => {
            if let Some(algorithm) = attribute(element, "type")? {
                set_once(&mut entry.checksum_type, algorithm, "checksum type")?;
            }
            Ok(Some(TextField::Checksum))
        }
        b"location" => {
            if let Some(href) = attribute(element, "href")? {
                set_once(&mut entry.location, href, "location")?;
            }
            Ok(None)
        }
        b"size" => Ok(Some(TextField::Size)),
        _ => Ok(None),
    }
}
